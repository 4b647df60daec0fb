use std::process::ExitCode;

use search_indexer::{init_logging, Dependencies, IndexingError, Settings};
use search_indexer_repository::opensearch::IndexSchemas;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Search indexer failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), IndexingError> {
    let settings = Settings::from_env()?;
    init_logging(settings.log_format)?;

    info!("Starting search indexer");
    let dependencies = Dependencies::new(&settings, IndexSchemas::new()).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    dependencies
        .orchestrator
        .shutdown(settings.shutdown_timeout)
        .await?;

    info!("Search indexer stopped");
    Ok(())
}
