//! Repository layer over the document and blob namespaces.
//!
//! # Responsibility
//! - Be the only code that issues SQL against `documents` and `serialized_*`.
//! - Report raw store acknowledgements (`UpdateResult`, deleted counts) and
//!   leave their interpretation to the service layer.
//!
//! # Invariants
//! - Repositories are constructed only over migrated connections.
//! - Document bodies are JSON objects carrying a string `_id`.

use crate::db::migrations::{latest_version, schema_version};
use crate::db::DbError;
use crate::model::artifact::ArtifactId;
use crate::query::UpdateError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use uuid::Uuid;

pub mod artifact_repo;
pub mod document_repo;
pub mod unit_of_work;

pub use artifact_repo::{
    ArtifactDeletion, ArtifactMetadata, ArtifactRepository, SqliteArtifactRepository, CHUNK_SIZE,
};
pub use document_repo::{
    Collection, Cursor, DocumentRepository, SqliteDocumentRepository, UpdateResult,
};
pub use unit_of_work::UnitOfWork;

const REQUIRED_TABLES: [&str; 3] = ["documents", "serialized_files", "serialized_chunks"];

pub type RepoResult<T> = Result<T, RepoError>;

/// Store-level failure raised by repositories.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    InvalidData(String),
    Serialization(serde_json::Error),
    InvalidUpdate(UpdateError),
    DuplicateId {
        collection: Collection,
        id: String,
    },
    /// Document has no string `_id`.
    MissingId,
    /// Store reported zero affected rows for a write that must affect one.
    Unacknowledged(&'static str),
    ArtifactNotFound(ArtifactId),
    ArtifactExists(ArtifactId),
    DestinationExists(PathBuf),
    /// No destination was given and the artifact records no source path.
    NoSourcePath(ArtifactId),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Only one of file record / chunks was found for deletion.
    PartialDelete {
        artifact_id: ArtifactId,
        files_deleted: usize,
        chunks_deleted: usize,
    },
}

impl RepoError {
    /// Whether the store gave up waiting on a lock.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Db(err) => err.is_timeout(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection is not migrated: expected schema version {expected_version}, found {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::InvalidData(message) => write!(f, "invalid stored document: {message}"),
            Self::Serialization(err) => write!(f, "document serialization failed: {err}"),
            Self::InvalidUpdate(err) => write!(f, "update rejected: {err}"),
            Self::DuplicateId { collection, id } => {
                write!(f, "document `{id}` already exists in `{collection}`")
            }
            Self::MissingId => write!(f, "document has no string `_id`"),
            Self::Unacknowledged(operation) => {
                write!(f, "store did not acknowledge `{operation}`")
            }
            Self::ArtifactNotFound(id) => write!(f, "artifact not found: {id}"),
            Self::ArtifactExists(id) => write!(f, "artifact already exists: {id}"),
            Self::DestinationExists(path) => {
                write!(f, "destination already exists: {}", path.display())
            }
            Self::NoSourcePath(id) => {
                write!(f, "artifact {id} records no source path to restore to")
            }
            Self::Io { path, source } => write!(f, "i/o failure on {}: {source}", path.display()),
            Self::PartialDelete {
                artifact_id,
                files_deleted,
                chunks_deleted,
            } => write!(
                f,
                "artifact {artifact_id} partially deleted: files={files_deleted} chunks={chunks_deleted}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::InvalidUpdate(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl From<UpdateError> for RepoError {
    fn from(value: UpdateError) -> Self {
        Self::InvalidUpdate(value)
    }
}

/// Checks that `conn` carries the current schema and every required table.
pub fn ensure_store_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
