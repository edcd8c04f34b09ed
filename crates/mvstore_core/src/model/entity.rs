//! Shared entity header, validation rules and the [`Entity`] trait.
//!
//! # Invariants
//! - `name` is never empty after trimming.
//! - `tags` hold no blank values and no duplicates; first-seen order is kept.
//! - Mutating methods take the service explicitly; entities never hold one.

use crate::repo::Collection;
use crate::service::{EntityService, EntityUpdate, ServiceResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable client-generated identifier for experiments and models.
pub type EntityId = Uuid;

/// Input rejected before any store contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyName,
    BlankTag,
    EmptyTagList,
    EmptyParamName,
    EmptyMetricName,
    /// Metric values must be a number or a string.
    NonScalarMetric { metric: String },
    DuplicateParam(String),
    DuplicateMetric(String),
    EmptyFilename,
    /// Model config and weights must be a JSON object or array.
    NotAJsonStructure { field: &'static str },
    /// Lookup names neither a selector nor a raw filter.
    MissingSelector,
    /// Update kind does not exist for the target collection.
    UnsupportedUpdate {
        update: &'static str,
        collection: Collection,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "name must not be empty"),
            Self::BlankTag => write!(f, "tags must not be blank"),
            Self::EmptyTagList => write!(f, "at least one tag is required"),
            Self::EmptyParamName => write!(f, "param name must not be empty"),
            Self::EmptyMetricName => write!(f, "metric name must not be empty"),
            Self::NonScalarMetric { metric } => {
                write!(f, "metric `{metric}` must be a number or a string")
            }
            Self::DuplicateParam(name) => write!(f, "param `{name}` is listed twice"),
            Self::DuplicateMetric(name) => write!(f, "metric `{name}` is listed twice"),
            Self::EmptyFilename => write!(f, "artifact filename must not be empty"),
            Self::NotAJsonStructure { field } => {
                write!(f, "`{field}` must be a JSON object or array")
            }
            Self::MissingSelector => {
                write!(f, "a named selector or a raw filter is required")
            }
            Self::UnsupportedUpdate { update, collection } => {
                write!(f, "update `{update}` is not supported for `{collection}`")
            }
        }
    }
}

impl Error for ValidationError {}

/// Fields shared by every persisted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityHeader {
    #[serde(rename = "_id")]
    id: EntityId,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    /// Creation time, epoch milliseconds.
    date: i64,
}

impl EntityHeader {
    pub(crate) fn new<S: AsRef<str>>(name: &str, tags: &[S]) -> Result<Self, ValidationError> {
        Ok(Self {
            id: Uuid::new_v4(),
            name: validate_name(name)?,
            tags: normalize_tags(tags)?,
            date: now_epoch_ms(),
        })
    }
}

/// Persisted domain record stored in one collection.
///
/// Provided methods follow one contract: validate locally, ask the service
/// for exactly one confirmed store update, then mirror it in memory.
pub trait Entity: Serialize + DeserializeOwned {
    /// Collection holding documents of this entity kind.
    const COLLECTION: Collection;

    fn header(&self) -> &EntityHeader;
    fn header_mut(&mut self) -> &mut EntityHeader;

    fn id(&self) -> EntityId {
        self.header().id
    }

    fn name(&self) -> &str {
        &self.header().name
    }

    fn tags(&self) -> &[String] {
        &self.header().tags
    }

    /// Creation time in epoch milliseconds.
    fn date(&self) -> i64 {
        self.header().date
    }

    /// Renames the entity in the store, then locally.
    fn rename(&mut self, service: &EntityService, new_name: &str) -> ServiceResult<()> {
        let name = validate_name(new_name)?;
        service.apply_update(
            Self::COLLECTION,
            self.id(),
            &EntityUpdate::Rename(name.clone()),
        )?;
        self.header_mut().name = name;
        Ok(())
    }

    /// Adds tags with set semantics; tags already present are kept once.
    fn add_tag<S: AsRef<str>>(&mut self, service: &EntityService, tags: &[S]) -> ServiceResult<()> {
        let tags = non_empty_tags(tags)?;
        service.apply_update(
            Self::COLLECTION,
            self.id(),
            &EntityUpdate::AddTags(tags.clone()),
        )?;
        let current = &mut self.header_mut().tags;
        for tag in tags {
            if !current.contains(&tag) {
                current.push(tag);
            }
        }
        Ok(())
    }

    /// Removes tags; fails when none of them is stored.
    fn remove_tag<S: AsRef<str>>(
        &mut self,
        service: &EntityService,
        tags: &[S],
    ) -> ServiceResult<()> {
        let tags = non_empty_tags(tags)?;
        service.apply_update(
            Self::COLLECTION,
            self.id(),
            &EntityUpdate::RemoveTags(tags.clone()),
        )?;
        self.header_mut().tags.retain(|tag| !tags.contains(tag));
        Ok(())
    }

    /// Deletes the stored document; the value is consumed.
    ///
    /// Links held by other documents are left as they are. A model's stored
    /// artifact is deleted with it.
    fn delete(self, service: &EntityService) -> ServiceResult<()>
    where
        Self: Sized,
    {
        service.delete_entity(Self::COLLECTION, self.id())
    }
}

/// Trims and checks a display name.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed.to_string())
}

/// Trims tags, rejects blanks and drops duplicates keeping first-seen order.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Result<Vec<String>, ValidationError> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let trimmed = tag.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::BlankTag);
        }
        if !normalized.iter().any(|existing| existing == trimmed) {
            normalized.push(trimmed.to_string());
        }
    }
    Ok(normalized)
}

fn non_empty_tags<S: AsRef<str>>(tags: &[S]) -> Result<Vec<String>, ValidationError> {
    if tags.is_empty() {
        return Err(ValidationError::EmptyTagList);
    }
    normalize_tags(tags)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
