//! Wire records sent to the collector.

use serde::{Deserialize, Serialize};

/// The only `status` value the collector uses to acknowledge a payload.
pub const SUCCESS_STATUS: &str = "success";

/// A JSON body the collector accepts on a fixed endpoint.
pub trait Payload: Serialize + Send + Sync {
    /// Path appended to the collector host, e.g. `/api/log`.
    fn endpoint(&self) -> &'static str;

    /// Short label used in log lines.
    fn kind(&self) -> &'static str;
}

/// Deployment log upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    #[serde(rename = "logFileName")]
    pub log_file_name: String,
    pub body: String,
}

impl LogPayload {
    pub fn new(log_file_name: impl Into<String>) -> Self {
        Self {
            log_file_name: log_file_name.into(),
            body: String::new(),
        }
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }
}

impl Payload for LogPayload {
    fn endpoint(&self) -> &'static str {
        "/api/log"
    }

    fn kind(&self) -> &'static str {
        "log"
    }
}

/// FileVault recovery key upload, correlated by the hardware serial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVaultPayload {
    pub key: String,
    #[serde(rename = "serialTag")]
    pub serial_tag: String,
}

impl FileVaultPayload {
    pub fn new(key: impl Into<String>, serial_tag: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            serial_tag: serial_tag.into(),
        }
    }
}

impl Payload for FileVaultPayload {
    fn endpoint(&self) -> &'static str {
        "/api/fv"
    }

    fn kind(&self) -> &'static str {
        "FileVault key"
    }
}

/// Collector reply to either POST.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub content: String,
}

impl CollectorResponse {
    /// Only an exact `"success"` counts, whatever the HTTP status was.
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }
}
