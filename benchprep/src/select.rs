//! Catalog loading and filtering for a run.

use anyhow::{Context, Result};
use tracing::info;

use crate::core::catalog::{FilterSpec, ProjectRecord, filter};
use crate::io::catalog;
use crate::io::config::BenchConfig;
use crate::io::layout::Layout;

/// Load the configured catalog and apply `spec`.
///
/// Failures here are fatal to the run: nothing has been dispatched yet.
pub fn select_projects(
    layout: &Layout,
    config: &BenchConfig,
    spec: &FilterSpec,
) -> Result<Vec<ProjectRecord>> {
    let path = config.catalog_path(&layout.root);
    let records =
        catalog::load(&path).with_context(|| format!("load catalog {}", path.display()))?;
    let selected = filter(&records, spec);
    info!(
        catalog = records.len(),
        selected = selected.len(),
        unrestricted = spec.is_unrestricted(),
        "projects selected"
    );
    Ok(selected)
}
