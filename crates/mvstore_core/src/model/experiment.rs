//! Experiment entity and the model linkage protocol.

use super::entity::{Entity, EntityHeader, EntityId, ValidationError};
use super::ml_model::Model;
use crate::repo::Collection;
use crate::service::{EntityService, PreconditionError, ServiceResult};
use serde::{Deserialize, Serialize};

/// Groups models trained under one experimental setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(flatten)]
    header: EntityHeader,
    /// Linked model ids in link order.
    #[serde(default)]
    models: Vec<EntityId>,
}

impl Entity for Experiment {
    const COLLECTION: Collection = Collection::Experiments;

    fn header(&self) -> &EntityHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self.header
    }
}

impl Experiment {
    /// Creates an unsaved experiment with a fresh id and timestamp.
    pub fn new<S: AsRef<str>>(name: &str, tags: &[S]) -> Result<Self, ValidationError> {
        Ok(Self {
            header: EntityHeader::new(name, tags)?,
            models: Vec::new(),
        })
    }

    pub fn models(&self) -> &[EntityId] {
        &self.models
    }

    /// Links `model` to this experiment on both sides.
    ///
    /// # Contract
    /// - `model` must be unlinked and not already listed here.
    /// - Both documents change in one unit of work; both in-memory values
    ///   change only after it commits.
    pub fn add_model(&mut self, service: &EntityService, model: &mut Model) -> ServiceResult<()> {
        if let Some(linked) = model.experiment_id() {
            return Err(PreconditionError::ModelAlreadyLinked {
                model_id: model.id(),
                experiment_id: linked,
            }
            .into());
        }
        if self.models.contains(&model.id()) {
            return Err(PreconditionError::ModelAlreadyListed {
                model_id: model.id(),
                experiment_id: self.id(),
            }
            .into());
        }

        service.link_model(self.id(), model.id())?;
        self.models.push(model.id());
        model.set_experiment_id(Some(self.id()));
        Ok(())
    }

    /// Unlinks `model`; the exact inverse of [`Experiment::add_model`].
    ///
    /// # Contract
    /// - `model.experiment_id()` must equal this experiment's id and the id
    ///   must be listed here.
    pub fn remove_model(
        &mut self,
        service: &EntityService,
        model: &mut Model,
    ) -> ServiceResult<()> {
        if model.experiment_id() != Some(self.id()) || !self.models.contains(&model.id()) {
            return Err(PreconditionError::ModelNotLinked {
                model_id: model.id(),
                experiment_id: self.id(),
            }
            .into());
        }

        service.unlink_model(self.id(), model.id())?;
        let model_id = model.id();
        self.models.retain(|id| *id != model_id);
        model.set_experiment_id(None);
        Ok(())
    }
}
