//! Agentscan Indexer service entry point

use agentscan_indexer::storage::EventTable;
use agentscan_indexer::{ids, Config, Indexer, ReplayVerifier, Storage};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "agentscan_indexer=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let args: Vec<String> = std::env::args().collect();
    let mode = if args.len() > 1 { args[1].as_str() } else { "live" };

    // Configuration errors abort before anything touches the database.
    let config = Config::from_env()?;

    info!("Agentscan Indexer starting");
    info!("Configuration:");
    info!(
        "  Database: {}",
        config.database_url.split('@').last().unwrap_or("***")
    );
    info!("  RPC:      {}", config.rpc_url);
    info!("  WS:       {}", config.ws_url);
    info!("  Program:  {}", config.program_address);
    info!("  Mode:     {mode}");

    match mode {
        "compact" => {
            // Maintenance mode: densely renumber every scoped id sequence.
            let storage = Storage::connect(&config.database_url).await?;
            storage.run_migrations().await?;

            ids::compact_agents(storage.pool()).await?;
            for table in [EventTable::Feedback, EventTable::Response, EventTable::Revocation] {
                ids::compact_event_table(storage.pool(), table).await?;
            }
            info!("Compaction complete");
        }
        "replay" => {
            // Audit mode: full hash-chain replay for one asset.
            let Some(asset) = args.get(2) else {
                anyhow::bail!("usage: agentscan-indexer replay <asset>");
            };
            let storage = Arc::new(Storage::connect(&config.database_url).await?);
            storage.run_migrations().await?;

            let replayer = ReplayVerifier::new(storage);
            for table in [EventTable::Feedback, EventTable::Response, EventTable::Revocation] {
                let outcome = replayer.verify_chain(asset, table).await?;
                match outcome.first_mismatch {
                    Some(index) => warn!(
                        "{} chain: MISMATCH at index {index} after {} events",
                        table.chain_type(),
                        outcome.replayed
                    ),
                    None => info!(
                        "{} chain: clean, {} events, digest {}",
                        table.chain_type(),
                        outcome.replayed,
                        outcome.final_digest
                    ),
                }
            }
        }
        _ => {
            info!("  Verifier: {}", config.verification_enabled);
            let indexer = Indexer::new(config).await?;
            indexer.run().await?;
        }
    }

    Ok(())
}
