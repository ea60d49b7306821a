//! Concurrent preparation of a benchmark of external projects.
//!
//! For every selected catalog project the orchestrator fetches sources,
//! builds them, and runs a static-analysis tool over the resulting
//! artifacts. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure logic (catalog filtering, outcomes, aggregation).
//! - **[`io`]**: Side effects (CSV catalog, config, processes, filesystem layout).
//!
//! Orchestration modules ([`select`], [`setup`], [`pool`], [`pipeline`])
//! combine the two to implement the CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod select;
pub mod setup;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
