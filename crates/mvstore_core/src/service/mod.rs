//! Domain service layer.
//!
//! # Responsibility
//! - Own the store connection and open one unit of work per call.
//! - Turn entity update requests into store operators and store
//!   acknowledgements into semantic errors.
//!
//! # Invariants
//! - Validation and precondition failures never reach the store.
//! - Entities change in memory only after a call here returns `Ok`.

pub mod entity_service;
pub mod error;
pub mod update;

pub use entity_service::EntityService;
pub use error::{PreconditionError, ServiceError, ServiceResult};
pub use update::EntityUpdate;
