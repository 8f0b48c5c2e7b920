use crate::errors::DvrError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    write_lock: Arc<Mutex<()>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), DvrError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DvrError::Io(e.to_string()))?;
            }
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let mut line = serde_json::to_vec(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| DvrError::Io(e.to_string()))?;
        line.push(b'\n');

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DvrError::Io(e.to_string()))?;
        file.write_all(&line)
            .map_err(|e| DvrError::Io(e.to_string()))
    }
}

/// Appends `event_type` when a logger is configured. `payload` is only built
/// in that case. Logging never fails the caller.
pub fn emit(
    logger: Option<&JsonlLogger>,
    level: &str,
    event_type: &str,
    payload: impl FnOnce() -> Value,
) {
    if let Some(logger) = logger {
        let _ = logger.append(&LogEvent {
            level,
            event_type,
            payload: payload(),
        });
    }
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes.saturating_sub(3);
    while !rendered.is_char_boundary(end) {
        end -= 1;
    }
    Value::String(format!("{}...", &rendered[..end]))
}
