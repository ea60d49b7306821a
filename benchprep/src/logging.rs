//! Diagnostic tracing for the orchestrator.
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//! - **Banners and summary**: plain stdout lines printed by the pipeline.
//! - **Step logs**: captured command output under `build-info/logs/`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn`, which still surfaces failed steps.
///
/// ```bash
/// RUST_LOG=benchprep=debug benchprep analyze --cwe CWE-022
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
