//! # cvmatch
//!
//! Local resume screening. Jobs and analysis results live in an embedded
//! SQLite database that is checkpointed to the data directory after every
//! change and can be exported to or imported from a single file.

mod batch;
mod commands;
mod config;
mod extract;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays pipeable.
    let default_filter = if commands::is_verbose() {
        "info,cvmatch=debug,cvmatch_store=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    commands::run().await
}
