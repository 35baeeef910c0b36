//! edgenode daemon

mod cli;
mod shutdown;
mod tracing;

use crate::cli::Cli;
use ::tracing::{info, warn};
use clap::Parser;
use edgenode_core::{EdgeConfig, EdgeNode};
use miette::IntoDiagnostic;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    crate::tracing::init_tracing(cli.log_format, cli.log_level)?;

    run(cli).await
}

async fn run(cli: Cli) -> miette::Result<()> {
    let config = EdgeConfig::load(&cli.config)?;
    let node = EdgeNode::start(config).await?;

    let recovery = node.store().last_recovery();
    info!(
        source = ?recovery.source,
        recovered = recovery.recovered,
        dropped = recovery.expired + recovery.corrupt + recovery.missing,
        evicted = recovery.evicted,
        "Store ready"
    );

    let token = shutdown::install_signal_handlers();
    let maintenance = edgenode_store::spawn_maintenance(
        std::sync::Arc::clone(node.store()),
        node.config().store.persist_interval(),
        token.child_token(),
    );

    if !cli.no_warmup && !node.config().warmup.is_empty() {
        if node.config().origin.enabled {
            let report = node.prefetch(&node.config().warmup).await;
            for result in report.results.iter().filter(|r| !r.success) {
                warn!(key = %result.key, error = ?result.error, "Warmup item failed");
            }
        } else {
            warn!("Warmup list ignored, origin is disabled");
        }
    }

    info!(
        capacity = node.stats().capacity,
        entries = node.stats().entry_count,
        "Edge node running"
    );
    token.cancelled().await;

    // Maintenance saves the index once more on its way out
    maintenance.await.into_diagnostic()?;
    info!("Edge node stopped");
    Ok(())
}
