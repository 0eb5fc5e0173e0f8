use std::sync::Arc;

use crate::state::state_model::Element;

const RES_ID_APP_ERROR_CLOSE: &str = "android:id/aerr_close";
const RES_ID_APP_ERROR_WAIT: &str = "android:id/aerr_wait";
const RES_ID_RUNTIME_PERMISSION_DIALOG: &str = "com.android.packageinstaller:id/dialog_container";

/// The system "app has stopped" dialog offers both a close and a wait button.
pub fn is_app_has_stopped_dialog(elements: &[Arc<Element>]) -> bool {
    has_resource_id(elements, RES_ID_APP_ERROR_CLOSE) && has_resource_id(elements, RES_ID_APP_ERROR_WAIT)
}

/// Permission requests either use the package installer's dialog container or
/// (for apps customizing the request) offer ALLOW / DENY style buttons. Either
/// way there has to be something that grants the permission.
pub fn is_runtime_permission_dialog(elements: &[Arc<Element>]) -> bool {
    let is_request = elements.iter().any(|e| {
        e.properties.resource_id == RES_ID_RUNTIME_PERMISSION_DIALOG
            || matches!(upper_text(e).as_str(), "ALLOW" | "DENY" | "DON'T ALLOW")
    });

    is_request
        && elements
            .iter()
            .any(|e| matches!(upper_text(e).as_str(), "ALLOW" | "OK"))
}

fn has_resource_id(elements: &[Arc<Element>], res_id: &str) -> bool {
    elements.iter().any(|e| e.properties.resource_id == res_id)
}

fn upper_text(e: &Element) -> String {
    e.properties.text.trim().to_uppercase()
}
