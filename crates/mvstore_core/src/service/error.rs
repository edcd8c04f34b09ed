//! Service-level error taxonomy.
//!
//! Validation and precondition failures are raised before any store
//! contact. Store failures propagate without retries.

use crate::config::ConfigError;
use crate::db::DbError;
use crate::model::artifact::ArtifactId;
use crate::model::entity::{EntityId, ValidationError};
use crate::query::QueryError;
use crate::repo::{Collection, RepoError};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Entity state makes the requested operation illegal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    ModelAlreadyLinked {
        model_id: EntityId,
        experiment_id: EntityId,
    },
    ModelAlreadyListed {
        model_id: EntityId,
        experiment_id: EntityId,
    },
    ModelNotLinked {
        model_id: EntityId,
        experiment_id: EntityId,
    },
    ArtifactAlreadyStored {
        model_id: EntityId,
        artifact_id: ArtifactId,
    },
    NoArtifact {
        model_id: EntityId,
    },
    DuplicateParam(String),
    DuplicateMetric(String),
}

impl Display for PreconditionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModelAlreadyLinked {
                model_id,
                experiment_id,
            } => write!(
                f,
                "model {model_id} is already linked to experiment {experiment_id}"
            ),
            Self::ModelAlreadyListed {
                model_id,
                experiment_id,
            } => write!(
                f,
                "experiment {experiment_id} already lists model {model_id}"
            ),
            Self::ModelNotLinked {
                model_id,
                experiment_id,
            } => write!(
                f,
                "model {model_id} is not linked to experiment {experiment_id}"
            ),
            Self::ArtifactAlreadyStored {
                model_id,
                artifact_id,
            } => write!(
                f,
                "model {model_id} already stores artifact {artifact_id}; delete it first"
            ),
            Self::NoArtifact { model_id } => write!(f, "model {model_id} has no stored artifact"),
            Self::DuplicateParam(name) => write!(f, "param `{name}` already exists"),
            Self::DuplicateMetric(name) => write!(f, "metric `{name}` already exists"),
        }
    }
}

impl Error for PreconditionError {}

/// Error returned by every service and entity operation.
#[derive(Debug)]
pub enum ServiceError {
    Validation(ValidationError),
    Precondition(PreconditionError),
    /// Update or delete matched no document.
    NotFound {
        collection: Collection,
        id: EntityId,
    },
    /// Removal matched the document but not the element.
    ElementNotFound {
        collection: Collection,
        id: EntityId,
        field: &'static str,
        key: String,
    },
    /// Find matched no document.
    EmptyResult {
        collection: Collection,
    },
    /// Single-result find matched several documents.
    AmbiguousResult {
        collection: Collection,
        matched: usize,
    },
    /// Both a named selector and a raw filter were given.
    ConflictingQuery,
    Store(RepoError),
    StoreTimeout(RepoError),
    PartialDelete {
        artifact_id: ArtifactId,
        files_deleted: usize,
        chunks_deleted: usize,
    },
    ArtifactNotFound(ArtifactId),
    ArtifactExists(ArtifactId),
    /// Load destination already exists.
    FileExists(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Config(ConfigError),
}

impl ServiceError {
    /// Groups every "nothing there" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::ElementNotFound { .. }
                | Self::EmptyResult { .. }
                | Self::ArtifactNotFound(_)
        )
    }

    /// Stable code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Precondition(_) => "precondition",
            Self::NotFound { .. } => "not_found",
            Self::ElementNotFound { .. } => "element_not_found",
            Self::EmptyResult { .. } => "empty_result",
            Self::AmbiguousResult { .. } => "ambiguous_result",
            Self::ConflictingQuery => "conflicting_query",
            Self::Store(_) => "store_write",
            Self::StoreTimeout(_) => "store_timeout",
            Self::PartialDelete { .. } => "partial_delete",
            Self::ArtifactNotFound(_) => "artifact_not_found",
            Self::ArtifactExists(_) => "artifact_exists",
            Self::FileExists(_) => "file_exists",
            Self::Io { .. } => "io",
            Self::Config(_) => "config",
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Precondition(err) => write!(f, "{err}"),
            Self::NotFound { collection, id } => {
                write!(f, "no document {id} in `{collection}`")
            }
            Self::ElementNotFound {
                collection,
                id,
                field,
                key,
            } => write!(
                f,
                "`{field}` of document {id} in `{collection}` holds no `{key}`"
            ),
            Self::EmptyResult { collection } => write!(f, "no match in `{collection}`"),
            Self::AmbiguousResult {
                collection,
                matched,
            } => write!(
                f,
                "{matched} matches in `{collection}` where one was expected"
            ),
            Self::ConflictingQuery => {
                write!(f, "use either a named selector or a raw filter, not both")
            }
            Self::Store(err) => write!(f, "store write failed: {err}"),
            Self::StoreTimeout(err) => write!(f, "store timed out: {err}"),
            Self::PartialDelete {
                artifact_id,
                files_deleted,
                chunks_deleted,
            } => write!(
                f,
                "artifact {artifact_id} partially deleted (files={files_deleted} chunks={chunks_deleted}); store left unchanged"
            ),
            Self::ArtifactNotFound(id) => write!(f, "artifact not found: {id}"),
            Self::ArtifactExists(id) => write!(f, "artifact already exists: {id}"),
            Self::FileExists(path) => write!(f, "file already exists: {}", path.display()),
            Self::Io { path, source } => write!(f, "i/o failure on {}: {source}", path.display()),
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Precondition(err) => Some(err),
            Self::Store(err) | Self::StoreTimeout(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        if value.is_timeout() {
            return Self::StoreTimeout(value);
        }
        match value {
            RepoError::ArtifactNotFound(id) => Self::ArtifactNotFound(id),
            RepoError::ArtifactExists(id) => Self::ArtifactExists(id),
            RepoError::DestinationExists(path) => Self::FileExists(path),
            RepoError::Io { path, source } => Self::Io { path, source },
            RepoError::PartialDelete {
                artifact_id,
                files_deleted,
                chunks_deleted,
            } => Self::PartialDelete {
                artifact_id,
                files_deleted,
                chunks_deleted,
            },
            other => Self::Store(other),
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(value: DbError) -> Self {
        Self::from(RepoError::Db(value))
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<PreconditionError> for ServiceError {
    fn from(value: PreconditionError) -> Self {
        Self::Precondition(value)
    }
}

impl From<QueryError> for ServiceError {
    fn from(value: QueryError) -> Self {
        match value {
            QueryError::Conflicting => Self::ConflictingQuery,
            QueryError::Empty => Self::Validation(ValidationError::MissingSelector),
        }
    }
}

impl From<ConfigError> for ServiceError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceError;
    use crate::model::entity::ValidationError;
    use crate::query::QueryError;
    use crate::repo::{Collection, RepoError};
    use uuid::Uuid;

    #[test]
    fn not_found_class_groups_missing_documents_and_elements() {
        let id = Uuid::new_v4();
        assert!(ServiceError::NotFound {
            collection: Collection::Models,
            id
        }
        .is_not_found());
        assert!(ServiceError::ElementNotFound {
            collection: Collection::Models,
            id,
            field: "params",
            key: "lr".to_string()
        }
        .is_not_found());
        assert!(!ServiceError::ConflictingQuery.is_not_found());
    }

    #[test]
    fn repo_errors_keep_their_artifact_meaning() {
        let id = Uuid::new_v4();
        let err = ServiceError::from(RepoError::ArtifactNotFound(id));
        assert!(matches!(err, ServiceError::ArtifactNotFound(found) if found == id));
        assert_eq!(ServiceError::from(RepoError::MissingId).code(), "store_write");
    }

    #[test]
    fn empty_query_is_a_validation_error() {
        assert!(matches!(
            ServiceError::from(QueryError::Empty),
            ServiceError::Validation(ValidationError::MissingSelector)
        ));
    }
}
