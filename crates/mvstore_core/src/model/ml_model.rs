//! Model entity: params, metrics, description, experiment link and artifact.

use super::artifact::SerializedArtifact;
use super::entity::{Entity, EntityHeader, EntityId, ValidationError};
use super::values::{ensure_unique_names, Metric, Param};
use crate::repo::Collection;
use crate::service::{EntityService, EntityUpdate, PreconditionError, ServiceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// One trained model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(flatten)]
    header: EntityHeader,
    #[serde(default)]
    params: Vec<Param>,
    #[serde(default)]
    metrics: Vec<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    experiment_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    serialized_model: Option<SerializedArtifact>,
    /// Two-element input shape, stored as a JSON array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input_shape: Option<(Value, Value)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    weights: Option<Value>,
}

impl Entity for Model {
    const COLLECTION: Collection = Collection::Models;

    fn header(&self) -> &EntityHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self.header
    }
}

impl Model {
    /// Creates an unsaved, unlinked model without params, metrics or artifact.
    pub fn new<S: AsRef<str>>(name: &str, tags: &[S]) -> Result<Self, ValidationError> {
        Ok(Self {
            header: EntityHeader::new(name, tags)?,
            params: Vec::new(),
            metrics: Vec::new(),
            description: None,
            experiment_id: None,
            serialized_model: None,
            input_shape: None,
            config: None,
            weights: None,
        })
    }

    /// Sets initial params on an unsaved model.
    pub fn with_params(mut self, params: Vec<Param>) -> Result<Self, ValidationError> {
        ensure_unique_names(params.iter().map(Param::name), ValidationError::DuplicateParam)?;
        self.params = params;
        Ok(self)
    }

    /// Sets the initial description on an unsaved model.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Sets the input shape on an unsaved model.
    pub fn with_input_shape(mut self, input_shape: Option<(Value, Value)>) -> Self {
        self.input_shape = input_shape;
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|param| param.name() == name)
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|metric| metric.name() == name)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn experiment_id(&self) -> Option<EntityId> {
        self.experiment_id
    }

    pub fn serialized_model(&self) -> Option<&SerializedArtifact> {
        self.serialized_model.as_ref()
    }

    pub fn input_shape(&self) -> Option<&(Value, Value)> {
        self.input_shape.as_ref()
    }

    pub fn config(&self) -> Option<&Value> {
        self.config.as_ref()
    }

    pub fn weights(&self) -> Option<&Value> {
        self.weights.as_ref()
    }

    pub(crate) fn set_experiment_id(&mut self, experiment_id: Option<EntityId>) {
        self.experiment_id = experiment_id;
    }

    /// Appends a param; its name must not be in use.
    pub fn add_param(&mut self, service: &EntityService, param: Param) -> ServiceResult<()> {
        if self.param(param.name()).is_some() {
            return Err(PreconditionError::DuplicateParam(param.name().to_string()).into());
        }
        service.apply_update(
            Self::COLLECTION,
            self.id(),
            &EntityUpdate::AddParam(param.clone()),
        )?;
        self.params.push(param);
        Ok(())
    }

    /// Removes the param with `name`; fails when the store holds none.
    pub fn remove_param(&mut self, service: &EntityService, name: &str) -> ServiceResult<()> {
        service.apply_update(
            Self::COLLECTION,
            self.id(),
            &EntityUpdate::RemoveParam(name.to_string()),
        )?;
        self.params.retain(|param| param.name() != name);
        Ok(())
    }

    /// Appends a metric; its name must not be in use.
    pub fn add_metric(&mut self, service: &EntityService, metric: Metric) -> ServiceResult<()> {
        if self.metric(metric.name()).is_some() {
            return Err(PreconditionError::DuplicateMetric(metric.name().to_string()).into());
        }
        service.apply_update(
            Self::COLLECTION,
            self.id(),
            &EntityUpdate::AddMetric(metric.clone()),
        )?;
        self.metrics.push(metric);
        Ok(())
    }

    /// Removes the metric with `name`; fails when the store holds none.
    pub fn remove_metric(&mut self, service: &EntityService, name: &str) -> ServiceResult<()> {
        service.apply_update(
            Self::COLLECTION,
            self.id(),
            &EntityUpdate::RemoveMetric(name.to_string()),
        )?;
        self.metrics.retain(|metric| metric.name() != name);
        Ok(())
    }

    /// Sets or clears (`None`) the free-text description.
    pub fn set_description(
        &mut self,
        service: &EntityService,
        description: Option<&str>,
    ) -> ServiceResult<()> {
        let description = description.map(str::to_string);
        service.apply_update(
            Self::COLLECTION,
            self.id(),
            &EntityUpdate::SetDescription(description.clone()),
        )?;
        self.description = description;
        Ok(())
    }

    /// Replaces the stored config; must be a JSON object or array.
    pub fn set_config(&mut self, service: &EntityService, config: Value) -> ServiceResult<()> {
        ensure_structure("config", &config)?;
        service.apply_update(
            Self::COLLECTION,
            self.id(),
            &EntityUpdate::SetConfig(config.clone()),
        )?;
        self.config = Some(config);
        Ok(())
    }

    /// Replaces the stored weights; must be a JSON object or array.
    pub fn set_weights(&mut self, service: &EntityService, weights: Value) -> ServiceResult<()> {
        ensure_structure("weights", &weights)?;
        service.apply_update(
            Self::COLLECTION,
            self.id(),
            &EntityUpdate::SetWeights(weights.clone()),
        )?;
        self.weights = Some(weights);
        Ok(())
    }

    /// Stores the file at `source` as this model's artifact.
    ///
    /// # Contract
    /// - At most one live artifact per model: delete the current one first.
    pub fn dump(
        &mut self,
        service: &EntityService,
        source: &Path,
        filename: &str,
    ) -> ServiceResult<()> {
        if let Some(current) = &self.serialized_model {
            return Err(PreconditionError::ArtifactAlreadyStored {
                model_id: self.id(),
                artifact_id: current.id(),
            }
            .into());
        }
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(ValidationError::EmptyFilename.into());
        }

        let artifact = service.store_artifact(self.id(), source, filename)?;
        self.serialized_model = Some(artifact);
        Ok(())
    }

    /// Writes the stored artifact to `destination`, which must not exist.
    pub fn load(&mut self, service: &EntityService, destination: &Path) -> ServiceResult<()> {
        let model_id = self.id();
        let Some(current) = self.serialized_model.as_mut() else {
            return Err(PreconditionError::NoArtifact { model_id }.into());
        };
        service.retrieve_artifact(current.id(), Some(destination))?;
        current.path = Some(destination.to_path_buf());
        Ok(())
    }

    /// Writes the stored artifact back to the path it was dumped from, which
    /// must no longer exist.
    pub fn restore(&mut self, service: &EntityService) -> ServiceResult<()> {
        let model_id = self.id();
        let Some(current) = self.serialized_model.as_mut() else {
            return Err(PreconditionError::NoArtifact { model_id }.into());
        };
        let restored = service.retrieve_artifact(current.id(), None)?;
        current.path = restored.path;
        Ok(())
    }

    /// Deletes the stored artifact (file record and chunks).
    pub fn delete_artifact(&mut self, service: &EntityService) -> ServiceResult<()> {
        let Some(current) = &self.serialized_model else {
            return Err(PreconditionError::NoArtifact { model_id: self.id() }.into());
        };
        service.delete_artifact(self.id(), current.id())?;
        self.serialized_model = None;
        Ok(())
    }
}

fn ensure_structure(field: &'static str, value: &Value) -> Result<(), ValidationError> {
    match value {
        Value::Object(_) | Value::Array(_) => Ok(()),
        _ => Err(ValidationError::NotAJsonStructure { field }),
    }
}
