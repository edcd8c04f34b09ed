//! Caller-facing selectors for entity lookups.
//!
//! A lookup names exactly one selector (`FindBy`) or supplies a raw
//! [`Filter`]; combining both is a caller error.

use super::Filter;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Named selector forms.
#[derive(Debug, Clone, PartialEq)]
pub enum FindBy {
    /// Exact identifier match.
    Id(Uuid),
    /// Exact name match.
    Name(String),
    /// Any of the tags is present.
    Tags(Vec<String>),
    /// Created strictly before the epoch-millisecond threshold.
    DateBefore(i64),
}

impl FindBy {
    pub fn to_filter(&self) -> Filter {
        match self {
            Self::Id(id) => Filter::by_id(id),
            Self::Name(name) => Filter::eq("name", name.as_str()),
            Self::Tags(tags) => Filter::any_of("tags", tags.iter().map(String::as_str)),
            Self::DateBefore(threshold) => Filter::lt("date", *threshold),
        }
    }
}

/// Lookup request accepted by the client facade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub find_by: Option<FindBy>,
    pub filter: Option<Filter>,
}

impl FindQuery {
    pub fn by(find_by: FindBy) -> Self {
        Self {
            find_by: Some(find_by),
            filter: None,
        }
    }

    pub fn raw(filter: Filter) -> Self {
        Self {
            find_by: None,
            filter: Some(filter),
        }
    }

    pub fn id(id: Uuid) -> Self {
        Self::by(FindBy::Id(id))
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::by(FindBy::Name(name.into()))
    }

    pub fn tags<S: Into<String>>(tags: impl IntoIterator<Item = S>) -> Self {
        Self::by(FindBy::Tags(tags.into_iter().map(Into::into).collect()))
    }

    pub fn date_before(threshold_epoch_ms: i64) -> Self {
        Self::by(FindBy::DateBefore(threshold_epoch_ms))
    }

    /// Resolves the request into one store filter.
    ///
    /// # Errors
    /// - `Conflicting` when both a selector and a raw filter are set.
    /// - `Empty` when neither is set.
    pub fn resolve(&self) -> Result<Filter, QueryError> {
        match (&self.find_by, &self.filter) {
            (Some(_), Some(_)) => Err(QueryError::Conflicting),
            (Some(find_by), None) => Ok(find_by.to_filter()),
            (None, Some(filter)) => Ok(filter.clone()),
            (None, None) => Err(QueryError::Empty),
        }
    }
}

/// Malformed lookup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    Conflicting,
    Empty,
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflicting => write!(
                f,
                "specify either a named selector or a raw filter, not both"
            ),
            Self::Empty => write!(f, "a named selector or a raw filter is required"),
        }
    }
}

impl Error for QueryError {}
