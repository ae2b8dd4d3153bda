//! Catalog records shared by both catalog stores.
//!
//! The same structs are written as rows to the relational catalog and as
//! JSON documents to the legacy store, so the serde field names follow the
//! legacy document layout (camelCase).

use serde::Serialize;
use serde::de::DeserializeOwned;

pub mod granule;
pub mod location;
pub mod provider;
pub mod reconciliation_report;
pub mod rule;

pub use granule::{Granule, GranuleFile, GranuleStatus};
pub use location::{LocationError, ObjectLocation};
pub use provider::Provider;
pub use reconciliation_report::{ReconciliationReport, ReportStatus, ReportType};
pub use rule::{Rule, RuleState, RuleType};

/// Kinds of records held in the catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Granule,
    Provider,
    Rule,
    ReconciliationReport,
}

impl EntityKind {
    /// Table name used by the legacy store for this kind.
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Granule => "granules",
            EntityKind::Provider => "providers",
            EntityKind::Rule => "rules",
            EntityKind::ReconciliationReport => "reconciliation_reports",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Granule => "granule",
            EntityKind::Provider => "provider",
            EntityKind::Rule => "rule",
            EntityKind::ReconciliationReport => "reconciliation report",
        };
        f.write_str(name)
    }
}

/// A catalog record addressable by a unique identifier.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Unique identifier of this record within its kind.
    fn id(&self) -> &str;
}

impl Entity for Granule {
    const KIND: EntityKind = EntityKind::Granule;

    fn id(&self) -> &str {
        &self.granule_id
    }
}

impl Entity for Provider {
    const KIND: EntityKind = EntityKind::Provider;

    fn id(&self) -> &str {
        &self.name
    }
}

impl Entity for Rule {
    const KIND: EntityKind = EntityKind::Rule;

    fn id(&self) -> &str {
        &self.name
    }
}

impl Entity for ReconciliationReport {
    const KIND: EntityKind = EntityKind::ReconciliationReport;

    fn id(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_table_names_are_distinct() {
        let kinds = [
            EntityKind::Granule,
            EntityKind::Provider,
            EntityKind::Rule,
            EntityKind::ReconciliationReport,
        ];
        let names: std::collections::HashSet<_> = kinds.iter().map(|k| k.table_name()).collect();
        assert_eq!(names.len(), kinds.len());
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::ReconciliationReport.to_string(), "reconciliation report");
        assert_eq!(EntityKind::Provider.to_string(), "provider");
    }
}
