//! Stable exit codes for the `benchprep` CLI.

/// Run completed. Per-project failures are reported in the summary, not here.
pub const OK: i32 = 0;
/// Setup failed before dispatch: config, catalog, directories, or toolchain.
pub const SETUP_FAILED: i32 = 1;
/// Invalid command line (clap's own usage-error code).
pub const USAGE: i32 = 2;
