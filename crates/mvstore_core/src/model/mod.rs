//! Entity model for experiment and model run metadata.
//!
//! # Responsibility
//! - Define the persisted records (`Experiment`, `Model`) and their value
//!   objects (`Param`, `Metric`, `SerializedArtifact`).
//! - Host the mutating entity methods that persist through the service.
//!
//! # Invariants
//! - Identifiers and creation timestamps never change after construction.
//! - In-memory fields change only after the store confirms the write.
//! - A model id appears in at most one experiment's `models` list, and that
//!   experiment's id is the model's `experiment_id`.

pub mod artifact;
pub mod entity;
pub mod experiment;
pub mod ml_model;
pub mod values;
