//! Document mapping layer for experiment and model run metadata.
//! Entities persist through an embedded SQLite document store; serialized
//! model artifacts live in a chunked blob namespace next to them.

pub mod client;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;

pub use client::{MvClient, NewModel, DEFAULT_PAGE_SIZE};
pub use config::{ConfigError, StoreConfig, DEFAULT_TIMEOUT_MS};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings};
pub use model::artifact::{ArtifactId, SerializedArtifact};
pub use model::entity::{Entity, EntityId, ValidationError};
pub use model::experiment::Experiment;
pub use model::ml_model::Model;
pub use model::values::{Metric, Param};
pub use query::{Filter, FindBy, FindQuery, Projection};
pub use repo::{Collection, RepoError, RepoResult};
pub use service::{EntityService, EntityUpdate, PreconditionError, ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
