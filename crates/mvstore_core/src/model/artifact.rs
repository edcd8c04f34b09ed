//! Serialized model artifact record.

use super::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Identifier assigned by the blob store.
pub type ArtifactId = Uuid;

/// Metadata of one stored blob, embedded in its model document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedArtifact {
    #[serde(rename = "_id")]
    pub(crate) id: ArtifactId,
    pub(crate) model_id: EntityId,
    pub(crate) filename: String,
    pub(crate) length: u64,
    pub(crate) chunk_size: u32,
    pub(crate) sha256: String,
    /// Store-assigned upload time, epoch milliseconds.
    pub(crate) upload_date: i64,
    /// Local file the blob was uploaded from, when it is valid UTF-8.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) source_path: Option<PathBuf>,
    /// Local file written by the last successful load. Not persisted.
    #[serde(skip)]
    pub(crate) path: Option<PathBuf>,
}

impl SerializedArtifact {
    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn model_id(&self) -> EntityId {
        self.model_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Hex-encoded SHA-256 of the blob content.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn upload_date(&self) -> i64 {
        self.upload_date
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
