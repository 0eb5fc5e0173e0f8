use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use log::warn;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::screen::screen_model::DeviceLog;

/// One JSON line of the device log file.
#[derive(Debug, Serialize)]
pub struct DeviceLogEntry<'a> {
    pub trace_id: Uuid,
    pub action_index: usize,
    pub action: &'a str,
    pub logs: &'a [DeviceLog],
}

/// Appends device logs of executed actions to a JSONL file. Failures are
/// logged and otherwise ignored.
pub struct DeviceLogWriter {
    file: Option<Mutex<File>>,
}

impl DeviceLogWriter {
    pub fn new(path: &Path) -> Self {
        let file = OpenOptions::new().create(true).append(true).open(path);

        match file {
            Ok(f) => Self {
                file: Some(Mutex::new(f)),
            },
            Err(e) => {
                warn!("could not open device log file '{}': {}", path.display(), e);
                Self { file: None }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn log(&self, entry: &DeviceLogEntry<'_>) {
        let Some(file) = &self.file else {
            return; // device logging disabled
        };

        let json = match serde_json::to_string(entry) {
            Ok(j) => j,
            Err(e) => {
                warn!("failed to serialize device logs: {}", e);
                return;
            }
        };

        if let Err(e) = writeln!(file.lock(), "{}", json) {
            warn!("failed to write device logs: {}", e);
        }
    }
}

