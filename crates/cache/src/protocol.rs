//! Messages exchanged between the foreground and the worker.
//!
//! The serialized shape is the wire format other collaborators speak:
//!
//! ```json
//! {"action": "cache-manual", "manualId": "mb-900", "files": ["manuals/mb-900/images/page_001.jpg"]}
//! {"success": true, "manualId": "mb-900", "fileCount": 4}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Request {
    CacheManual {
        #[serde(rename = "manualId")]
        manual_id: String,
        #[serde(default)]
        files: Vec<String>,
    },
    RemoveManual {
        #[serde(rename = "manualId")]
        manual_id: String,
    },
    CheckVersion,
    GetOfflineManuals,
    /// Fire-and-forget: never answered.
    SkipWaiting,
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Self::CacheManual { .. } => "cache-manual",
            Self::RemoveManual { .. } => "remove-manual",
            Self::CheckVersion => "check-version",
            Self::GetOfflineManuals => "get-offline-manuals",
            Self::SkipWaiting => "skip-waiting",
        }
    }

    pub fn expects_reply(&self) -> bool {
        !matches!(self, Self::SkipWaiting)
    }
}

/// Metadata entry of a manual cache.
///
/// A cache without metadata reads back as the zero-filled default, apart from
/// the id which is recovered from the cache name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualRecord {
    pub id: String,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub cached_at: i64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub file_count: u64,
}

impl ManualRecord {
    /// Whether the record came from a finished download.
    pub fn is_complete(&self) -> bool {
        self.cached_at > 0 && self.file_count > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manuals: Option<Vec<ManualRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    /// The whole version descriptor, unknown fields included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_info: Option<Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_manual(mut self, manual_id: impl Into<String>) -> Self {
        self.manual_id = Some(manual_id.into());
        self
    }
}

/// Version descriptor published next to the application.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct VersionDescriptor {
    pub version: String,
}

/// Outcome of a `check-version` request.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionCheck {
    pub has_update: bool,
    pub current_version: String,
    pub latest_version: String,
    pub update_info: Value,
}
