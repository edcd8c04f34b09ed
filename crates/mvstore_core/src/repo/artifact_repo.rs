//! Chunked blob storage for serialized model artifacts.
//!
//! # Responsibility
//! - Store a local file as one `serialized_files` record plus ordered
//!   `serialized_chunks` rows, and stream it back out.
//!
//! # Invariants
//! - Every stored artifact has at least one chunk; empty files store one
//!   empty chunk.
//! - Retrieval never overwrites an existing destination, including the
//!   recorded source path used by `restore`.
//! - Retrieved bytes are verified against the recorded length and SHA-256.

use super::{parse_uuid, RepoError, RepoResult};
use crate::model::artifact::{ArtifactId, SerializedArtifact};
use crate::model::entity::EntityId;
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Bytes per chunk row.
pub const CHUNK_SIZE: usize = 255 * 1024;

const FILE_SELECT_SQL: &str = "SELECT
    id,
    model_id,
    filename,
    length,
    chunk_size,
    sha256,
    upload_date,
    source_path
FROM serialized_files";

/// Caller-supplied attributes of a new artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    /// Identifier to store under; fresh by default.
    pub id: ArtifactId,
    pub model_id: EntityId,
    pub filename: String,
}

impl ArtifactMetadata {
    pub fn new(model_id: EntityId, filename: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model_id,
            filename: filename.into(),
        }
    }
}

/// Rows removed by one artifact deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactDeletion {
    pub files_deleted: usize,
    pub chunks_deleted: usize,
}

/// Repository interface for the blob namespace.
pub trait ArtifactRepository {
    /// Uploads the file at `source`.
    fn put(&self, source: &Path, metadata: &ArtifactMetadata) -> RepoResult<SerializedArtifact>;
    /// Writes the blob to `destination`, which must not exist yet.
    fn get(&self, artifact_id: ArtifactId, destination: &Path) -> RepoResult<SerializedArtifact>;
    /// Writes the blob back to the path it was uploaded from.
    fn restore(&self, artifact_id: ArtifactId) -> RepoResult<SerializedArtifact>;
    /// Reads the file record without its chunks.
    fn find(&self, artifact_id: ArtifactId) -> RepoResult<Option<SerializedArtifact>>;
    /// Removes the file record and every chunk.
    fn delete(&self, artifact_id: ArtifactId) -> RepoResult<ArtifactDeletion>;
}

/// SQLite-backed blob store.
pub struct SqliteArtifactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteArtifactRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        super::ensure_store_ready(conn)?;
        Ok(Self::bound(conn))
    }

    pub(crate) fn bound(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn read_content(&self, artifact_id: ArtifactId) -> RepoResult<Vec<u8>> {
        let mut stmt = self.conn.prepare(
            "SELECT data
             FROM serialized_chunks
             WHERE files_id = ?1
             ORDER BY n ASC;",
        )?;
        let mut rows = stmt.query([artifact_id.to_string()])?;
        let mut content = Vec::new();
        while let Some(row) = rows.next()? {
            let chunk: Vec<u8> = row.get(0)?;
            content.extend_from_slice(&chunk);
        }
        Ok(content)
    }
}

impl ArtifactRepository for SqliteArtifactRepository<'_> {
    fn put(&self, source: &Path, metadata: &ArtifactMetadata) -> RepoResult<SerializedArtifact> {
        let content = std::fs::read(source).map_err(|source_err| RepoError::Io {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        if self.find(metadata.id)?.is_some() {
            return Err(RepoError::ArtifactExists(metadata.id));
        }

        let artifact_id = metadata.id.to_string();
        let length = i64::try_from(content.len())
            .map_err(|_| RepoError::InvalidData("artifact exceeds i64 length".to_string()))?;
        let sha256 = hex::encode(Sha256::digest(&content));

        self.conn.execute(
            "INSERT INTO serialized_files (
                id, model_id, filename, length, chunk_size, sha256, source_path
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                artifact_id,
                metadata.model_id.to_string(),
                metadata.filename,
                length,
                CHUNK_SIZE as i64,
                sha256,
                source.to_str()
            ],
        )?;

        let mut insert_chunk = self.conn.prepare(
            "INSERT INTO serialized_chunks (files_id, n, data)
             VALUES (?1, ?2, ?3);",
        )?;
        if content.is_empty() {
            insert_chunk.execute(params![artifact_id, 0_i64, Vec::<u8>::new()])?;
        }
        for (n, chunk) in content.chunks(CHUNK_SIZE).enumerate() {
            insert_chunk.execute(params![artifact_id, n as i64, chunk])?;
        }

        self.find(metadata.id)?
            .ok_or(RepoError::Unacknowledged("artifact put"))
    }

    fn get(&self, artifact_id: ArtifactId, destination: &Path) -> RepoResult<SerializedArtifact> {
        let mut record = self
            .find(artifact_id)?
            .ok_or(RepoError::ArtifactNotFound(artifact_id))?;
        if destination.exists() {
            return Err(RepoError::DestinationExists(destination.to_path_buf()));
        }

        let content = self.read_content(artifact_id)?;
        if content.len() as u64 != record.length {
            return Err(RepoError::InvalidData(format!(
                "artifact {artifact_id} has {} bytes, expected {}",
                content.len(),
                record.length
            )));
        }
        if hex::encode(Sha256::digest(&content)) != record.sha256 {
            return Err(RepoError::InvalidData(format!(
                "artifact {artifact_id} content hash mismatch"
            )));
        }

        let io_error = |source: std::io::Error| RepoError::Io {
            path: destination.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|err| {
                if err.kind() == ErrorKind::AlreadyExists {
                    RepoError::DestinationExists(destination.to_path_buf())
                } else {
                    io_error(err)
                }
            })?;
        file.write_all(&content).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;

        record.path = Some(destination.to_path_buf());
        Ok(record)
    }

    fn restore(&self, artifact_id: ArtifactId) -> RepoResult<SerializedArtifact> {
        let record = self
            .find(artifact_id)?
            .ok_or(RepoError::ArtifactNotFound(artifact_id))?;
        let source_path = record
            .source_path
            .ok_or(RepoError::NoSourcePath(artifact_id))?;
        self.get(artifact_id, &source_path)
    }

    fn find(&self, artifact_id: ArtifactId) -> RepoResult<Option<SerializedArtifact>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{FILE_SELECT_SQL} WHERE id = ?1;"))?;
        let record = stmt
            .query_row([artifact_id.to_string()], |row| Ok(read_file_row(row)))
            .optional()?;
        record.transpose()
    }

    fn delete(&self, artifact_id: ArtifactId) -> RepoResult<ArtifactDeletion> {
        let id = artifact_id.to_string();
        let files_deleted = self
            .conn
            .execute("DELETE FROM serialized_files WHERE id = ?1;", [&id])?;
        let chunks_deleted = self
            .conn
            .execute("DELETE FROM serialized_chunks WHERE files_id = ?1;", [&id])?;

        match (files_deleted, chunks_deleted) {
            (0, 0) => Err(RepoError::ArtifactNotFound(artifact_id)),
            (0, _) | (_, 0) => Err(RepoError::PartialDelete {
                artifact_id,
                files_deleted,
                chunks_deleted,
            }),
            _ => Ok(ArtifactDeletion {
                files_deleted,
                chunks_deleted,
            }),
        }
    }
}

fn read_file_row(row: &Row<'_>) -> RepoResult<SerializedArtifact> {
    let id: String = row.get("id")?;
    let model_id: String = row.get("model_id")?;
    let length: i64 = row.get("length")?;
    let chunk_size: i64 = row.get("chunk_size")?;

    Ok(SerializedArtifact {
        id: parse_uuid(&id, "serialized_files.id")?,
        model_id: parse_uuid(&model_id, "serialized_files.model_id")?,
        filename: row.get("filename")?,
        length: u64::try_from(length).map_err(|_| {
            RepoError::InvalidData(format!("negative length `{length}` in serialized_files"))
        })?,
        chunk_size: u32::try_from(chunk_size).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid chunk size `{chunk_size}` in serialized_files"
            ))
        })?,
        sha256: row.get("sha256")?,
        upload_date: row.get("upload_date")?,
        source_path: row.get::<_, Option<String>>("source_path")?.map(PathBuf::from),
        path: None,
    })
}
