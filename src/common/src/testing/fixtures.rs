//! Record fixtures shared by unit and integration tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::model::{
    Granule, GranuleFile, GranuleStatus, ObjectLocation, Provider, ReconciliationReport,
    ReportStatus, ReportType, Rule, RuleState, RuleType,
};

/// Whole-second timestamp, stable across SQLite and PostgreSQL round trips
fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Unpublished, completed granule with one file per `s3://bucket/key` URI.
///
/// Panics on a malformed URI.
pub fn fake_granule(granule_id: &str, file_uris: &[&str]) -> Granule {
    let files = file_uris
        .iter()
        .map(|uri| {
            let location = ObjectLocation::parse_s3_uri(uri)
                .unwrap_or_else(|e| panic!("bad fixture uri {uri}: {e}"));
            let file_name = location.key.rsplit('/').next().map(str::to_string);
            GranuleFile {
                file_name,
                size: Some(1024),
                ..GranuleFile::new(location.bucket, location.key)
            }
        })
        .collect();

    Granule {
        granule_id: granule_id.to_string(),
        collection_id: "MOD09GQ___006".to_string(),
        status: GranuleStatus::Completed,
        published: false,
        files,
        created_at: fixed_time(),
    }
}

pub fn fake_provider(name: &str) -> Provider {
    Provider {
        name: name.to_string(),
        protocol: "s3".to_string(),
        host: format!("{name}-host"),
        port: None,
    }
}

/// Enabled onetime rule, optionally bound to `provider`.
pub fn fake_rule(name: &str, provider: Option<&str>) -> Rule {
    Rule {
        name: name.to_string(),
        provider: provider.map(str::to_string),
        rule_type: RuleType::Onetime,
        workflow: "IngestGranule".to_string(),
        state: RuleState::Enabled,
    }
}

/// Generated inventory report whose body lives at `location`, if any.
pub fn fake_report(name: &str, location: Option<&str>) -> ReconciliationReport {
    ReconciliationReport {
        name: name.to_string(),
        report_type: ReportType::Inventory,
        status: ReportStatus::Generated,
        location: location.map(str::to_string),
        created_at: fixed_time(),
    }
}
