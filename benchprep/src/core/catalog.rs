//! Catalog records and run selection.

use serde::{Deserialize, Serialize};

/// Minimum number of columns a catalog row must carry.
pub const REQUIRED_COLUMNS: usize = 4;

/// One row of the project catalog.
///
/// Column contract: `id, slug, cve_id, cwe_id, ...`. Columns past `cwe_id`
/// (repository coordinates, commits, tags) are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    /// Stable identifier, also the directory name under `project-sources/`.
    pub slug: String,
    pub cve_id: String,
    pub cwe_id: String,
    #[serde(default)]
    pub extra: Vec<String>,
}

/// Selection criteria for a run. Empty sets mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// OR-matched as substrings of the slug.
    pub include_substrings: Vec<String>,
    /// OR-matched as substrings of the slug; any match deselects.
    pub exclude_substrings: Vec<String>,
    /// Exact matches against `cwe_id`.
    pub cwe_allowlist: Vec<String>,
}

impl FilterSpec {
    pub fn is_unrestricted(&self) -> bool {
        self.include_substrings.is_empty()
            && self.exclude_substrings.is_empty()
            && self.cwe_allowlist.is_empty()
    }

    /// Whether `record` belongs to the working set.
    pub fn selects(&self, record: &ProjectRecord) -> bool {
        let queried_cwe = self.cwe_allowlist.is_empty()
            || self.cwe_allowlist.iter().any(|cwe| *cwe == record.cwe_id);
        let included = self.include_substrings.is_empty()
            || self
                .include_substrings
                .iter()
                .any(|needle| record.slug.contains(needle.as_str()));
        let excluded = self
            .exclude_substrings
            .iter()
            .any(|needle| record.slug.contains(needle.as_str()));
        queried_cwe && included && !excluded
    }
}

/// Apply `spec` to `records`, preserving catalog order.
pub fn filter(records: &[ProjectRecord], spec: &FilterSpec) -> Vec<ProjectRecord> {
    records
        .iter()
        .filter(|record| spec.selects(record))
        .cloned()
        .collect()
}
