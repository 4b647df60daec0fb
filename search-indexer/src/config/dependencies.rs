//! Dependency initialization and wiring for the search indexer.

use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::IndexingError;
use search_indexer_pipeline::{MassIndexer, Orchestrator};
use search_indexer_repository::opensearch::IndexSchemas;
use search_indexer_repository::{OpenSearchBackend, SearchBackend};

/// Name of the orchestrator used for document writes.
const ORCHESTRATOR_NAME: &str = "bulk-writes";

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The search backend.
    pub backend: Arc<dyn SearchBackend>,
    /// The running write orchestrator.
    pub orchestrator: Arc<Orchestrator>,
}

impl Dependencies {
    /// Connect to OpenSearch and start the orchestrator.
    ///
    /// # Arguments
    ///
    /// * `settings` - Service settings
    /// * `schemas` - Index creation bodies used when mass indexing drops and
    ///   recreates indexes
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If the backend is unreachable or unhealthy
    pub async fn new(settings: &Settings, schemas: IndexSchemas) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.backend.url,
            queue_count = settings.orchestrator.queue_count,
            queue_capacity = settings.orchestrator.queue_capacity,
            "Initializing dependencies"
        );

        let backend = OpenSearchBackend::new(&settings.backend, schemas).await?;

        // Verify OpenSearch is reachable
        let healthy = backend.health_check().await?;
        if !healthy {
            return Err(IndexingError::config("OpenSearch cluster is unhealthy"));
        }
        info!("OpenSearch connection verified");

        let backend: Arc<dyn SearchBackend> = Arc::new(backend);
        let orchestrator = Arc::new(Orchestrator::with_config(
            ORCHESTRATOR_NAME,
            backend.clone(),
            settings.orchestrator.clone(),
        ));

        Ok(Self {
            backend,
            orchestrator,
        })
    }

    /// A mass indexer writing through the orchestrator.
    pub fn mass_indexer(&self) -> MassIndexer {
        MassIndexer::new(self.orchestrator.clone(), self.backend.clone())
    }
}
