//! Document query language evaluated over stored JSON bodies.
//!
//! # Responsibility
//! - Describe which documents a read touches (`Filter`, `Projection`).
//! - Describe partial updates with store-native operators (`UpdateOp`).
//! - Translate caller-facing selectors into filters (`FindQuery`).
//!
//! # Invariants
//! - Every stored document carries its identifier under [`ID_FIELD`].
//! - Update operators never rewrite [`ID_FIELD`].

pub mod filter;
pub mod find;
pub mod update;

pub use filter::{Filter, Projection};
pub use find::{FindBy, FindQuery, QueryError};
pub use update::{apply_update, ElementMatch, UpdateError, UpdateOp};

/// One stored JSON document.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Field holding the document identifier.
pub const ID_FIELD: &str = "_id";
