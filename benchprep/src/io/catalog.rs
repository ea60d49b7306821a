//! Catalog loading from the CSV project registry.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::core::catalog::{ProjectRecord, REQUIRED_COLUMNS};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse catalog: {0}")]
    Csv(#[from] csv::Error),
    #[error("catalog line {line}: expected at least {expected} fields, found {found}")]
    Format {
        line: u64,
        found: usize,
        expected: usize,
    },
    #[error("catalog line {line}: slug must be non-empty")]
    EmptySlug { line: u64 },
    #[error("catalog line {line}: duplicate slug {slug}")]
    DuplicateSlug { line: u64, slug: String },
}

/// Load every data row of the catalog at `path`, in file order.
pub fn load(path: &Path) -> Result<Vec<ProjectRecord>, CatalogError> {
    let file = File::open(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse(file)?;
    debug!(path = %path.display(), projects = records.len(), "catalog loaded");
    Ok(records)
}

/// Parse catalog CSV. The first row is a header and is discarded.
pub fn parse<R: Read>(input: R) -> Result<Vec<ProjectRecord>, CatalogError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|pos| pos.line()).unwrap_or_default();
        if row.len() < REQUIRED_COLUMNS {
            return Err(CatalogError::Format {
                line,
                found: row.len(),
                expected: REQUIRED_COLUMNS,
            });
        }
        let field = |index: usize| row.get(index).unwrap_or_default().trim().to_string();
        let slug = field(1);
        if slug.is_empty() {
            return Err(CatalogError::EmptySlug { line });
        }
        if !seen.insert(slug.clone()) {
            return Err(CatalogError::DuplicateSlug { line, slug });
        }
        records.push(ProjectRecord {
            id: field(0),
            slug,
            cve_id: field(2),
            cwe_id: field(3),
            extra: row
                .iter()
                .skip(REQUIRED_COLUMNS)
                .map(str::to_string)
                .collect(),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ID,project_slug,cve_id,cwe_id,cwe_name,github_username\n";

    #[test]
    fn skips_header_and_maps_columns() {
        let input = format!(
            "{HEADER}1,apache__commons-io_CVE-2021-29425_2.6,CVE-2021-29425,CWE-022,\"Improper Limitation of a Pathname, Path Traversal\",apache\n"
        );
        let records = parse(input.as_bytes()).expect("parse");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, "1");
        assert_eq!(record.slug, "apache__commons-io_CVE-2021-29425_2.6");
        assert_eq!(record.cve_id, "CVE-2021-29425");
        assert_eq!(record.cwe_id, "CWE-022");
        assert_eq!(
            record.extra,
            vec!["Improper Limitation of a Pathname, Path Traversal", "apache"]
        );
    }

    #[test]
    fn preserves_file_order() {
        let input = format!("{HEADER}1,c,x,89\n2,a,x,79\n3,b,x,89\n");
        let slugs: Vec<String> = parse(input.as_bytes())
            .expect("parse")
            .into_iter()
            .map(|record| record.slug)
            .collect();
        assert_eq!(slugs, vec!["c", "a", "b"]);
    }

    #[test]
    fn short_row_is_a_format_error() {
        let input = format!("{HEADER}1,a,x,89\n2,b,x\n");
        let err = parse(input.as_bytes()).expect_err("short row");
        match err {
            CatalogError::Format {
                line,
                found,
                expected,
            } => {
                assert_eq!(line, 3);
                assert_eq!(found, 3);
                assert_eq!(expected, REQUIRED_COLUMNS);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_slug_is_rejected_with_its_line() {
        let input = format!("{HEADER}1,a,x,89\n2,  ,y,79\n");
        let err = parse(input.as_bytes()).expect_err("blank slug");
        assert!(matches!(err, CatalogError::EmptySlug { line: 3 }), "got {err}");
    }

    #[test]
    fn rejects_duplicate_slug() {
        let input = format!("{HEADER}1,a,x,89\n2,a,y,79\n");
        let err = parse(input.as_bytes()).expect_err("duplicate");
        assert!(matches!(err, CatalogError::DuplicateSlug { ref slug, .. } if slug == "a"));
    }

    #[test]
    fn header_only_catalog_is_empty() {
        assert!(parse(HEADER.as_bytes()).expect("parse").is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load(&temp.path().join("missing.csv")).expect_err("missing");
        assert!(matches!(err, CatalogError::Io { .. }));
    }
}
