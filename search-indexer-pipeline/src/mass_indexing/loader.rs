//! Pluggable loading of entities for mass indexing.
//!
//! A type group pairs an [`IdentifierLoader`], an [`EntityLoader`] and a
//! [`DocumentBuilder`] for one kind of entity. [`EntityTypeGroup`] combines
//! the three behind the object-safe [`TypeGroup`] trait used by the
//! coordinator.

use async_trait::async_trait;
use futures::stream::BoxStream;
use search_indexer_shared::IndexedDocument;
use tracing::debug;

use super::failure::{FailureKind, IndexingFailure};
use crate::errors::{DocumentBuildError, LoadError};

/// Streams the identifiers of the entities to index.
#[async_trait]
pub trait IdentifierLoader: Send + Sync {
    /// Number of identifiers the stream will yield, if cheaply known.
    async fn total_count(&self) -> Result<Option<u64>, LoadError> {
        Ok(None)
    }

    /// A fresh stream of identifiers.
    fn identifiers(&self) -> BoxStream<'static, Result<String, LoadError>>;
}

/// Loads entities from their identifiers.
#[async_trait]
pub trait EntityLoader: Send + Sync {
    /// The loaded entity type.
    type Entity: Send + Sync + 'static;

    /// Load the entities with the given identifiers. Identifiers without an
    /// entity are left out of the result.
    async fn load(&self, ids: &[String]) -> Result<Vec<Self::Entity>, LoadError>;

    /// Whether [`EntityLoader::load_one`] is available as a fallback when a
    /// whole batch fails to load.
    fn supports_single_loading(&self) -> bool {
        false
    }

    /// Load one entity.
    async fn load_one(&self, _id: &str) -> Result<Option<Self::Entity>, LoadError> {
        Err(LoadError::Unsupported)
    }
}

/// Builds the document indexed for an entity.
pub trait DocumentBuilder<E>: Send + Sync {
    /// Build the document.
    fn build(&self, entity: &E) -> Result<IndexedDocument, DocumentBuildError>;
}

impl<E, F> DocumentBuilder<E> for F
where
    F: Fn(&E) -> Result<IndexedDocument, DocumentBuildError> + Send + Sync,
{
    fn build(&self, entity: &E) -> Result<IndexedDocument, DocumentBuildError> {
        self(entity)
    }
}

/// Documents built for a batch of identifiers.
#[derive(Debug, Default)]
pub struct LoadedBatch {
    /// Documents ready for submission, in identifier order.
    pub documents: Vec<IndexedDocument>,
    /// Failures observed while loading or building.
    pub failures: Vec<IndexingFailure>,
    /// Entities that failed, counted individually.
    pub failed_entities: u64,
    /// Identifiers whose entity no longer exists.
    pub missing: u64,
}

/// One kind of entity indexed into one index.
#[async_trait]
pub trait TypeGroup: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Target index.
    fn index(&self) -> &str;

    /// Expected number of entities, if known.
    async fn total_count(&self) -> Result<Option<u64>, LoadError>;

    /// A fresh stream of identifiers.
    fn identifiers(&self) -> BoxStream<'static, Result<String, LoadError>>;

    /// Load and build the documents for a batch of identifiers. With
    /// `stop_on_failure`, building stops at the first failure.
    async fn load_documents(&self, ids: &[String], stop_on_failure: bool) -> LoadedBatch;
}

/// A [`TypeGroup`] assembled from its three loaders.
pub struct EntityTypeGroup<I, L, B> {
    name: String,
    index: String,
    identifiers: I,
    entities: L,
    builder: B,
}

impl<I, L, B> EntityTypeGroup<I, L, B>
where
    I: IdentifierLoader,
    L: EntityLoader,
    B: DocumentBuilder<L::Entity>,
{
    /// Create a type group.
    pub fn new(
        name: impl Into<String>,
        index: impl Into<String>,
        identifiers: I,
        entities: L,
        builder: B,
    ) -> Self {
        Self {
            name: name.into(),
            index: index.into(),
            identifiers,
            entities,
            builder,
        }
    }

    fn failure(&self, kind: FailureKind, entity_ids: Vec<String>, message: String) -> IndexingFailure {
        IndexingFailure::new(self.name.clone(), kind, entity_ids, message)
    }

    /// Build documents; returns false when stopped on a failure.
    fn build_all(
        &self,
        entities: &[L::Entity],
        stop_on_failure: bool,
        batch: &mut LoadedBatch,
    ) -> bool {
        for entity in entities {
            match self.builder.build(entity) {
                Ok(document) => batch.documents.push(document),
                Err(e) => {
                    batch.failed_entities += 1;
                    batch.failures.push(self.failure(
                        FailureKind::DocumentBuilding,
                        vec![e.entity_id.clone()],
                        e.to_string(),
                    ));
                    if stop_on_failure {
                        return false;
                    }
                }
            }
        }
        true
    }

    async fn load_one_by_one(&self, ids: &[String], stop_on_failure: bool) -> LoadedBatch {
        let mut batch = LoadedBatch::default();
        for id in ids {
            match self.entities.load_one(id).await {
                Ok(Some(entity)) => {
                    if !self.build_all(std::slice::from_ref(&entity), stop_on_failure, &mut batch) {
                        break;
                    }
                }
                Ok(None) => batch.missing += 1,
                Err(e) => {
                    batch.failed_entities += 1;
                    batch.failures.push(self.failure(
                        FailureKind::EntityLoading,
                        vec![id.clone()],
                        e.to_string(),
                    ));
                    if stop_on_failure {
                        break;
                    }
                }
            }
        }
        batch
    }
}

#[async_trait]
impl<I, L, B> TypeGroup for EntityTypeGroup<I, L, B>
where
    I: IdentifierLoader,
    L: EntityLoader,
    B: DocumentBuilder<L::Entity>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> &str {
        &self.index
    }

    async fn total_count(&self) -> Result<Option<u64>, LoadError> {
        self.identifiers.total_count().await
    }

    fn identifiers(&self) -> BoxStream<'static, Result<String, LoadError>> {
        self.identifiers.identifiers()
    }

    async fn load_documents(&self, ids: &[String], stop_on_failure: bool) -> LoadedBatch {
        match self.entities.load(ids).await {
            Ok(entities) => {
                let mut batch = LoadedBatch {
                    missing: ids.len().saturating_sub(entities.len()) as u64,
                    ..LoadedBatch::default()
                };
                self.build_all(&entities, stop_on_failure, &mut batch);
                batch
            }
            Err(e) if self.entities.supports_single_loading() => {
                debug!(
                    type_group = %self.name,
                    count = ids.len(),
                    error = %e,
                    "Batch load failed, loading entities one by one"
                );
                self.load_one_by_one(ids, stop_on_failure).await
            }
            Err(e) => LoadedBatch {
                failures: vec![self.failure(FailureKind::EntityLoading, ids.to_vec(), e.to_string())],
                failed_entities: ids.len() as u64,
                ..LoadedBatch::default()
            },
        }
    }
}
