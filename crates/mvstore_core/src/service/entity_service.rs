//! Entity persistence use-cases.
//!
//! # Responsibility
//! - Translate entity requests into store operators and run them inside one
//!   unit of work per call.
//! - Interpret store acknowledgements: zero matches is `NotFound`, a removal
//!   that modified nothing is `ElementNotFound`.
//! - Enforce read cardinality (`validate_cursor`).
//!
//! # Invariants
//! - Exactly one store update per entity update; two for linkage.
//! - Multi-document writes commit together or not at all.
//! - No retries.

use super::error::{PreconditionError, ServiceError, ServiceResult};
use super::update::EntityUpdate;
use crate::model::artifact::{ArtifactId, SerializedArtifact};
use crate::model::entity::{Entity, EntityId, ValidationError};
use crate::query::{Document, ElementMatch, Filter, FindQuery, Projection, UpdateOp, ID_FIELD};
use crate::repo::{
    ensure_store_ready, parse_uuid, ArtifactMetadata, ArtifactRepository, Collection,
    DocumentRepository, RepoError, UnitOfWork, UpdateResult,
};
use log::{info, warn};
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use std::time::Instant;

const EXPERIMENT_MODELS_FIELD: &str = "models";
const MODEL_EXPERIMENT_FIELD: &str = "experiment_id";
const MODEL_ARTIFACT_FIELD: &str = "serialized_model";

/// Domain service owning the store connection.
pub struct EntityService {
    conn: Connection,
}

impl EntityService {
    /// Wraps a migrated connection.
    pub fn new(conn: Connection) -> ServiceResult<Self> {
        ensure_store_ready(&conn)?;
        Ok(Self { conn })
    }

    /// Underlying connection, for callers that inspect the raw store.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Persists a new entity document.
    pub fn create<E: Entity>(&self, entity: &E) -> ServiceResult<()> {
        let started_at = Instant::now();
        let document = to_document(entity)?;
        let result: ServiceResult<()> = UnitOfWork::run(&self.conn, |uow| {
            let acknowledged = uow.documents(E::COLLECTION).save_one(&document)?;
            if !acknowledged {
                return Err(ServiceError::Store(RepoError::Unacknowledged("save_one")));
            }
            Ok(())
        });
        log_outcome("entity_create", E::COLLECTION, entity.id(), started_at, &result);
        result
    }

    /// Finds entities; `is_list = false` demands exactly one match.
    pub fn find<E: Entity>(&self, query: &FindQuery, is_list: bool) -> ServiceResult<Vec<E>> {
        let filter = query.resolve()?;
        let documents = UnitOfWork::run_read(&self.conn, |uow| {
            let cursor = uow
                .documents(E::COLLECTION)
                .get_many(&filter, &Projection::All)?;
            Ok::<_, ServiceError>(cursor.collect::<Vec<_>>())
        })?;
        Self::validate_cursor(E::COLLECTION, documents, is_list)?
            .into_iter()
            .map(hydrate::<E>)
            .collect()
    }

    /// Reads one entity by id.
    pub fn fetch<E: Entity>(&self, id: EntityId) -> ServiceResult<E> {
        let document = UnitOfWork::run_read(&self.conn, |uow| {
            uow.documents(E::COLLECTION)
                .get_one(&Filter::by_id(id), &Projection::All)
        })?;
        match document {
            Some(document) => hydrate(document),
            None => Err(ServiceError::NotFound {
                collection: E::COLLECTION,
                id,
            }),
        }
    }

    /// Reads entities in insertion order, skipping `skip` and returning at
    /// most `limit`. Empty pages are not an error.
    pub fn list<E: Entity>(&self, skip: usize, limit: usize) -> ServiceResult<Vec<E>> {
        let documents = UnitOfWork::run_read(&self.conn, |uow| {
            let cursor = uow
                .documents(E::COLLECTION)
                .get_many(&Filter::All, &Projection::All)?;
            Ok::<_, ServiceError>(cursor.skip(skip).take(limit).collect::<Vec<_>>())
        })?;
        documents.into_iter().map(hydrate::<E>).collect()
    }

    /// Checks read cardinality.
    ///
    /// # Errors
    /// - `EmptyResult` when nothing matched.
    /// - `AmbiguousResult` when `is_list` is false and more than one matched.
    pub fn validate_cursor(
        collection: Collection,
        documents: Vec<Document>,
        is_list: bool,
    ) -> ServiceResult<Vec<Document>> {
        match documents.len() {
            0 => Err(ServiceError::EmptyResult { collection }),
            1 => Ok(documents),
            matched if !is_list => Err(ServiceError::AmbiguousResult {
                collection,
                matched,
            }),
            _ => Ok(documents),
        }
    }

    /// Applies one entity update to the stored document.
    pub fn apply_update(
        &self,
        collection: Collection,
        id: EntityId,
        update: &EntityUpdate,
    ) -> ServiceResult<()> {
        if !update.applies_to(collection) {
            return Err(ValidationError::UnsupportedUpdate {
                update: update.kind(),
                collection,
            }
            .into());
        }

        let started_at = Instant::now();
        let result: ServiceResult<()> = UnitOfWork::run(&self.conn, |uow| {
            let outcome = uow.documents(collection).update_by_id(id, &update.to_ops())?;
            confirm(collection, id, outcome, update.removal())
        });
        log_outcome(update.kind(), collection, id, started_at, &result);
        result
    }

    /// Deletes one entity document. Links held by other documents are left
    /// as they are; a model's stored artifact goes in the same unit of work.
    pub fn delete_entity(&self, collection: Collection, id: EntityId) -> ServiceResult<()> {
        let started_at = Instant::now();
        let result: ServiceResult<()> = UnitOfWork::run(&self.conn, |uow| {
            if collection == Collection::Models {
                if let Some(artifact_id) = stored_artifact_id(&uow.models(), id)? {
                    match uow.artifacts().delete(artifact_id) {
                        Ok(_) | Err(RepoError::ArtifactNotFound(_)) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
            }
            match uow.documents(collection).delete(id)? {
                0 => Err(ServiceError::NotFound { collection, id }),
                _ => Ok(()),
            }
        });
        log_outcome("entity_delete", collection, id, started_at, &result);
        result
    }

    /// Records the link on both documents in one unit of work.
    ///
    /// The stored model is re-read after the experiment side is written; a
    /// model linked elsewhere in the store rolls back both writes.
    pub fn link_model(&self, experiment_id: EntityId, model_id: EntityId) -> ServiceResult<()> {
        let started_at = Instant::now();
        let result: ServiceResult<()> = UnitOfWork::run(&self.conn, |uow| {
            let listed = uow.experiments().update_by_id(
                experiment_id,
                &[UpdateOp::add_to_set(
                    EXPERIMENT_MODELS_FIELD,
                    [model_id.to_string()],
                )],
            )?;
            confirm(Collection::Experiments, experiment_id, listed, None)?;
            if listed.modified_count == 0 {
                return Err(PreconditionError::ModelAlreadyListed {
                    model_id,
                    experiment_id,
                }
                .into());
            }

            let models = uow.models();
            match stored_model_link(&models, model_id)? {
                StoredLink::Missing => {
                    return Err(ServiceError::NotFound {
                        collection: Collection::Models,
                        id: model_id,
                    })
                }
                StoredLink::Linked(linked) => {
                    return Err(PreconditionError::ModelAlreadyLinked {
                        model_id,
                        experiment_id: linked,
                    }
                    .into())
                }
                StoredLink::Unlinked => {}
            }
            let linked = models.update_by_id(
                model_id,
                &[UpdateOp::set(
                    MODEL_EXPERIMENT_FIELD,
                    experiment_id.to_string(),
                )],
            )?;
            confirm(Collection::Models, model_id, linked, None)
        });
        log_outcome("model_link", Collection::Models, model_id, started_at, &result);
        result
    }

    /// Exact inverse of [`EntityService::link_model`].
    ///
    /// When the model document is gone only the experiment side is pulled,
    /// so ids of deleted models can still be dropped from the list.
    pub fn unlink_model(&self, experiment_id: EntityId, model_id: EntityId) -> ServiceResult<()> {
        let started_at = Instant::now();
        let result: ServiceResult<()> = UnitOfWork::run(&self.conn, |uow| {
            let unlisted = uow.experiments().update_by_id(
                experiment_id,
                &[UpdateOp::pull(
                    EXPERIMENT_MODELS_FIELD,
                    ElementMatch::Equals(Value::from(model_id.to_string())),
                )],
            )?;
            confirm(
                Collection::Experiments,
                experiment_id,
                unlisted,
                Some((EXPERIMENT_MODELS_FIELD, model_id.to_string())),
            )?;

            let models = uow.models();
            match stored_model_link(&models, model_id)? {
                StoredLink::Missing => return Ok(()),
                StoredLink::Linked(linked) if linked == experiment_id => {}
                _ => {
                    return Err(PreconditionError::ModelNotLinked {
                        model_id,
                        experiment_id,
                    }
                    .into())
                }
            }
            let unlinked =
                models.update_by_id(model_id, &[UpdateOp::unset(MODEL_EXPERIMENT_FIELD)])?;
            confirm(Collection::Models, model_id, unlinked, None)
        });
        log_outcome("model_unlink", Collection::Models, model_id, started_at, &result);
        result
    }

    /// Uploads `source` and records it on the model in one unit of work.
    pub fn store_artifact(
        &self,
        model_id: EntityId,
        source: &Path,
        filename: &str,
    ) -> ServiceResult<SerializedArtifact> {
        let started_at = Instant::now();
        let result: ServiceResult<SerializedArtifact> = UnitOfWork::run(&self.conn, |uow| {
            let models = uow.models();
            let stored = models
                .get_one(
                    &Filter::by_id(model_id),
                    &Projection::include([MODEL_ARTIFACT_FIELD]),
                )?
                .ok_or(ServiceError::NotFound {
                    collection: Collection::Models,
                    id: model_id,
                })?;
            if let Some(existing) = stored.get(MODEL_ARTIFACT_FIELD) {
                let artifact_id = existing
                    .get(ID_FIELD)
                    .and_then(Value::as_str)
                    .map(|id| parse_uuid(id, "models.serialized_model._id"))
                    .transpose()?
                    .unwrap_or_default();
                return Err(PreconditionError::ArtifactAlreadyStored {
                    model_id,
                    artifact_id,
                }
                .into());
            }

            let artifact = uow
                .artifacts()
                .put(source, &ArtifactMetadata::new(model_id, filename))?;
            let record = serde_json::to_value(&artifact).map_err(RepoError::from)?;
            let recorded =
                models.update_by_id(model_id, &[UpdateOp::set(MODEL_ARTIFACT_FIELD, record)])?;
            confirm(Collection::Models, model_id, recorded, None)?;
            Ok(artifact)
        });
        log_outcome("artifact_store", Collection::Models, model_id, started_at, &result);
        result
    }

    /// Writes the stored blob to `destination`, or back to its recorded
    /// source path when `destination` is `None`.
    pub fn retrieve_artifact(
        &self,
        artifact_id: ArtifactId,
        destination: Option<&Path>,
    ) -> ServiceResult<SerializedArtifact> {
        let result = UnitOfWork::run_read(&self.conn, |uow| {
            let artifacts = uow.artifacts();
            match destination {
                Some(destination) => artifacts.get(artifact_id, destination),
                None => artifacts.restore(artifact_id),
            }
            .map_err(ServiceError::from)
        });
        match &result {
            Ok(artifact) => info!(
                "event=artifact_load module=service status=ok artifact_id={artifact_id} length={}",
                artifact.length()
            ),
            Err(err) => warn!(
                "event=artifact_load module=service status=error artifact_id={artifact_id} error_code={}",
                err.code()
            ),
        }
        result
    }

    /// Deletes the blob and unsets the model's artifact in one unit of work.
    ///
    /// A partial deletion rolls back, leaving the store as it was found.
    pub fn delete_artifact(&self, model_id: EntityId, artifact_id: ArtifactId) -> ServiceResult<()> {
        let started_at = Instant::now();
        let result: ServiceResult<()> = UnitOfWork::run(&self.conn, |uow| {
            uow.artifacts().delete(artifact_id)?;
            let cleared = uow
                .models()
                .update_by_id(model_id, &[UpdateOp::unset(MODEL_ARTIFACT_FIELD)])?;
            confirm(Collection::Models, model_id, cleared, None)
        });
        log_outcome("artifact_delete", Collection::Models, model_id, started_at, &result);
        result
    }
}

/// Maps a store acknowledgement to the service outcome.
fn confirm(
    collection: Collection,
    id: EntityId,
    outcome: UpdateResult,
    removal: Option<(&'static str, String)>,
) -> ServiceResult<()> {
    if outcome.matched_count == 0 {
        return Err(ServiceError::NotFound { collection, id });
    }
    if let Some((field, key)) = removal {
        if outcome.modified_count == 0 {
            return Err(ServiceError::ElementNotFound {
                collection,
                id,
                field,
                key,
            });
        }
    }
    Ok(())
}

/// Link state of a model as recorded in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoredLink {
    Missing,
    Unlinked,
    Linked(EntityId),
}

fn stored_model_link<R: DocumentRepository>(
    models: &R,
    model_id: EntityId,
) -> ServiceResult<StoredLink> {
    let Some(stored) = models.get_one(
        &Filter::by_id(model_id),
        &Projection::include([MODEL_EXPERIMENT_FIELD]),
    )?
    else {
        return Ok(StoredLink::Missing);
    };
    let linked = stored
        .get(MODEL_EXPERIMENT_FIELD)
        .and_then(Value::as_str)
        .map(|id| parse_uuid(id, "models.experiment_id"))
        .transpose()?;
    Ok(linked.map_or(StoredLink::Unlinked, StoredLink::Linked))
}

/// Artifact id recorded on the stored model, if any.
fn stored_artifact_id<R: DocumentRepository>(
    models: &R,
    model_id: EntityId,
) -> ServiceResult<Option<ArtifactId>> {
    let stored = models.get_one(
        &Filter::by_id(model_id),
        &Projection::include([MODEL_ARTIFACT_FIELD]),
    )?;
    let artifact_id = stored
        .as_ref()
        .and_then(|document| document.get(MODEL_ARTIFACT_FIELD))
        .and_then(|artifact| artifact.get(ID_FIELD))
        .and_then(Value::as_str)
        .map(|id| parse_uuid(id, "models.serialized_model._id"))
        .transpose()?;
    Ok(artifact_id)
}

fn to_document<E: Entity>(entity: &E) -> ServiceResult<Document> {
    match serde_json::to_value(entity).map_err(RepoError::from)? {
        Value::Object(document) => Ok(document),
        _ => Err(RepoError::InvalidData(format!(
            "entity {} does not serialize to a document",
            entity.id()
        ))
        .into()),
    }
}

fn hydrate<E: Entity>(document: Document) -> ServiceResult<E> {
    Ok(serde_json::from_value(Value::Object(document)).map_err(RepoError::from)?)
}

fn log_outcome<T>(
    event: &str,
    collection: Collection,
    id: EntityId,
    started_at: Instant,
    result: &ServiceResult<T>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => info!(
            "event={event} module=service status=ok collection={} id={id} duration_ms={duration_ms}",
            collection.name()
        ),
        Err(err) => warn!(
            "event={event} module=service status=error collection={} id={id} duration_ms={duration_ms} error_code={}",
            collection.name(),
            err.code()
        ),
    }
}
