use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::ObjectLocation;

/// Ingest status of a granule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GranuleStatus {
    Running,
    Completed,
    Failed,
}

impl GranuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GranuleStatus::Running => "running",
            GranuleStatus::Completed => "completed",
            GranuleStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(GranuleStatus::Running),
            "completed" => Some(GranuleStatus::Completed),
            "failed" => Some(GranuleStatus::Failed),
            _ => None,
        }
    }
}

/// A binary artifact owned by a granule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranuleFile {
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl GranuleFile {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            file_name: None,
            size: None,
        }
    }

    pub fn location(&self) -> ObjectLocation {
        ObjectLocation::new(self.bucket.clone(), self.key.clone())
    }
}

/// One ingested data unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Granule {
    pub granule_id: String,
    pub collection_id: String,
    pub status: GranuleStatus,
    /// Set while an external metadata system still references the granule.
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub files: Vec<GranuleFile>,
    pub created_at: DateTime<Utc>,
}

impl Granule {
    /// Object store locations of every file owned by this granule.
    pub fn file_locations(&self) -> Vec<ObjectLocation> {
        self.files.iter().map(GranuleFile::location).collect()
    }
}
