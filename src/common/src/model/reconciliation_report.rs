use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::{LocationError, ObjectLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportType {
    Inventory,
    #[serde(rename = "Granule Inventory")]
    GranuleInventory,
    #[serde(rename = "Granule Not Found")]
    GranuleNotFound,
    Internal,
    #[serde(rename = "ORCA Backup")]
    OrcaBackup,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Inventory => "Inventory",
            ReportType::GranuleInventory => "Granule Inventory",
            ReportType::GranuleNotFound => "Granule Not Found",
            ReportType::Internal => "Internal",
            ReportType::OrcaBackup => "ORCA Backup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Inventory" => Some(ReportType::Inventory),
            "Granule Inventory" => Some(ReportType::GranuleInventory),
            "Granule Not Found" => Some(ReportType::GranuleNotFound),
            "Internal" => Some(ReportType::Internal),
            "ORCA Backup" => Some(ReportType::OrcaBackup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Pending,
    Generated,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "Pending",
            ReportStatus::Generated => "Generated",
            ReportStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(ReportStatus::Pending),
            "Generated" => Some(ReportStatus::Generated),
            "Failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }
}

/// Audit artifact produced by the reconciliation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub name: String,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub status: ReportStatus,
    /// `s3://bucket/key` of the report body, unset while the job is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// Parsed report object location; `None` while the report has no body.
    pub fn object_location(&self) -> Option<Result<ObjectLocation, LocationError>> {
        self.location.as_deref().map(ObjectLocation::parse_s3_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_type_uses_display_names() {
        let doc = serde_json::to_value(ReportType::GranuleInventory).unwrap();
        assert_eq!(doc, serde_json::json!("Granule Inventory"));
        assert_eq!(
            ReportType::parse(ReportType::OrcaBackup.as_str()),
            Some(ReportType::OrcaBackup)
        );
    }

    #[test]
    fn test_object_location_of_pending_report() {
        let report = ReconciliationReport {
            name: "report1".to_string(),
            report_type: ReportType::Inventory,
            status: ReportStatus::Pending,
            location: None,
            created_at: Utc::now(),
        };
        assert!(report.object_location().is_none());

        let generated = ReconciliationReport {
            status: ReportStatus::Generated,
            location: Some("s3://system/reports/report1.json".to_string()),
            ..report
        };
        let location = generated.object_location().unwrap().unwrap();
        assert_eq!(location, ObjectLocation::new("system", "reports/report1.json"));
    }
}
