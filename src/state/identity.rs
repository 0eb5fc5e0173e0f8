use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::screen::screen_model::ElementProperties;
use crate::state::normalize::{combined_text, fingerprint_bytes, identity_text, text_fingerprint};
use crate::state::state_model::Element;

// ============================================================================
// Identity values
// ============================================================================

/// 128 bit content identity. Identities of collections are built by wrapping
/// addition, so the order in which parts are combined never matters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub u128);

impl Uid {
    /// Identity of "nothing": the fingerprint of zero bytes.
    pub const EMPTY: Uid = Uid(0xda39a3ee_5e6b4b0d_3255bfef_95601890);

    pub fn of_text(text: &str) -> Uid {
        Uid(text_fingerprint(text))
    }

    pub fn of_bytes(bytes: &[u8]) -> Uid {
        Uid(fingerprint_bytes(bytes))
    }

    pub fn of_int(value: i32) -> Uid {
        Uid::of_text(&value.to_string())
    }
}

impl Add for Uid {
    type Output = Uid;

    fn add(self, other: Uid) -> Uid {
        Uid(self.0.wrapping_add(other.0))
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_u128(self.0).hyphenated())
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self)
    }
}

impl FromStr for Uid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(|u| Uid(u.as_u128()))
    }
}

/// Composite (uid, configId) identity used as primary key for elements and states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConcreteId {
    pub uid: Uid,
    pub config_id: Uid,
}

impl ConcreteId {
    pub const EMPTY: ConcreteId = ConcreteId {
        uid: Uid::EMPTY,
        config_id: Uid::EMPTY,
    };

    pub fn new(uid: Uid, config_id: Uid) -> Self {
        Self { uid, config_id }
    }

    /// Parse the persisted form; `"null"` stands for an absent id.
    pub fn parse_optional(s: &str) -> Result<Option<ConcreteId>, String> {
        let s = s.trim();
        if s == "null" || s.is_empty() {
            return Ok(None);
        }
        s.parse().map(Some)
    }

    pub fn optional_string(id: Option<&ConcreteId>) -> String {
        id.map(ToString::to_string)
            .unwrap_or_else(|| "null".to_string())
    }
}

impl fmt::Display for ConcreteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.uid, self.config_id)
    }
}

impl FromStr for ConcreteId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (uid, config_id) = s
            .trim()
            .split_once('_')
            .ok_or_else(|| format!("'{}' is not a composite id", s))?;
        let uid = uid.parse().map_err(|e| format!("bad uid '{}': {}", uid, e))?;
        let config_id = config_id
            .parse()
            .map_err(|e| format!("bad config id '{}': {}", config_id, e))?;
        Ok(ConcreteId { uid, config_id })
    }
}

impl Serialize for ConcreteId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConcreteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Element identity
// ============================================================================

/// Content identity of an element, stable under geometry and state changes.
///
/// Input fields are identified by their description or resource id, never by
/// their current text. Elements with natural-language content use that content
/// (digits stripped). Everything else falls back to a structural fingerprint.
pub fn compute_uid(p: &ElementProperties) -> Uid {
    if p.is_input_field && !p.is_keyboard {
        return if !p.content_desc.trim().is_empty() {
            Uid::of_text(&p.content_desc)
        } else if !p.resource_id.trim().is_empty() {
            Uid::of_text(&p.resource_id)
        } else {
            Uid::of_int(p.element_hash)
        };
    }

    if let Some(text) = identity_text(&combined_text(&[&p.text, &p.hint_text, &p.content_desc])) {
        return Uid::of_text(&text);
    }

    Uid::of_text(&join_parts(&[
        p.class_name.clone(),
        p.package_name.clone(),
        p.is_password.to_string(),
        p.is_keyboard.to_string(),
        p.element_hash.to_string(),
    ]))
}

/// Identity of the element's current configuration (enabled, checked, bounds, ...).
pub fn compute_config_id(p: &ElementProperties) -> Uid {
    Uid::of_text(&join_parts(&[
        p.enabled.to_string(),
        p.visible.to_string(),
        flag_string(p.checked),
        flag_string(p.focused),
        p.scrollable.to_string(),
        rect_string(&p.bounds),
        p.visible_areas
            .iter()
            .map(rect_string)
            .collect::<Vec<_>>()
            .join("|"),
        p.element_hash.to_string(),
        p.child_hashes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    ]))
}

fn join_parts(parts: &[String]) -> String {
    parts.join("<;>")
}

fn flag_string(flag: Option<bool>) -> String {
    flag.map(|b| b.to_string())
        .unwrap_or_else(|| "disabled".to_string())
}

fn rect_string(r: &crate::screen::screen_model::Rect) -> String {
    format!("{}:{}:{}:{}", r.x, r.y, r.width, r.height)
}

// ============================================================================
// State identity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateIds {
    pub uid: Uid,
    pub config_id: Uid,
    /// uid computed while ignoring every input field
    pub i_edit_id: Uid,
}

impl StateIds {
    pub fn id(&self) -> ConcreteId {
        ConcreteId::new(self.uid, self.config_id)
    }
}

/// Fold the relevant elements of a screen into its identities.
///
/// Keyboard elements only contribute to the configuration id. An element set
/// without relevant elements yields the empty identity.
pub fn compute_state_id<'a>(elements: impl IntoIterator<Item = &'a Element>) -> StateIds {
    elements.into_iter().filter(|e| e.is_relevant_for_id()).fold(
        StateIds {
            uid: Uid::EMPTY,
            config_id: Uid::EMPTY,
            i_edit_id: Uid::EMPTY,
        },
        |ids, e| {
            let counts_for_uid = !e.properties.is_keyboard;
            StateIds {
                uid: if counts_for_uid { ids.uid + e.uid } else { ids.uid },
                config_id: ids.config_id + e.uid + e.config_id,
                i_edit_id: if counts_for_uid && !e.properties.is_input_field {
                    ids.i_edit_id + e.uid
                } else {
                    ids.i_edit_id
                },
            }
        },
    )
}
