//! Client facade: connection setup, entity creation, listing and lookup.
//!
//! Mutating entity methods take [`MvClient::service`] explicitly.

use crate::config::StoreConfig;
use crate::db::open_store;
use crate::model::entity::Entity;
use crate::model::experiment::Experiment;
use crate::model::ml_model::Model;
use crate::model::values::Param;
use crate::query::FindQuery;
use crate::service::{EntityService, ServiceError, ServiceResult};
use log::info;
use serde_json::Value;

/// Page size used when callers do not pick one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Attributes of a model to create.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewModel {
    pub name: String,
    pub tags: Vec<String>,
    pub params: Vec<Param>,
    pub description: Option<String>,
    pub input_shape: Option<(Value, Value)>,
}

impl NewModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn params(mut self, params: Vec<Param>) -> Self {
        self.params = params;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn input_shape(mut self, rows: impl Into<Value>, cols: impl Into<Value>) -> Self {
        self.input_shape = Some((rows.into(), cols.into()));
        self
    }
}

/// Entry point owning the store connection.
pub struct MvClient {
    config: StoreConfig,
    service: EntityService,
}

impl MvClient {
    /// Connects using a `sqlite:` connection string.
    pub fn connect(uri: &str) -> ServiceResult<Self> {
        Self::from_config(StoreConfig::from_uri(uri)?)
    }

    /// Opens (and migrates) the store described by `config`.
    pub fn from_config(config: StoreConfig) -> ServiceResult<Self> {
        let conn = open_store(&config)?;
        let service = EntityService::new(conn)?;
        info!(
            "event=client_connect module=client status=ok mode={}",
            config.mode_label()
        );
        Ok(Self { config, service })
    }

    /// Private in-memory store.
    pub fn in_memory() -> ServiceResult<Self> {
        Self::from_config(StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Domain service to pass into entity mutating methods.
    pub fn service(&self) -> &EntityService {
        &self.service
    }

    /// Creates and persists an experiment.
    pub fn create_experiment<S: AsRef<str>>(
        &self,
        name: &str,
        tags: &[S],
    ) -> ServiceResult<Experiment> {
        let experiment = Experiment::new(name, tags)?;
        self.service.create(&experiment)?;
        Ok(experiment)
    }

    /// Creates and persists an unlinked model without an artifact.
    pub fn create_model(&self, new_model: NewModel) -> ServiceResult<Model> {
        let model = Model::new(&new_model.name, &new_model.tags)?
            .with_params(new_model.params)?
            .with_description(new_model.description)
            .with_input_shape(new_model.input_shape);
        self.service.create(&model)?;
        Ok(model)
    }

    /// Page `page` (zero-based) of `num` experiments in insertion order.
    pub fn list_experiments(&self, num: usize, page: usize) -> ServiceResult<Vec<Experiment>> {
        self.list(num, page)
    }

    /// Page `page` (zero-based) of `num` models in insertion order.
    pub fn list_models(&self, num: usize, page: usize) -> ServiceResult<Vec<Model>> {
        self.list(num, page)
    }

    /// Exactly one experiment matching `query`.
    pub fn find_experiment(&self, query: &FindQuery) -> ServiceResult<Experiment> {
        self.find_one(query)
    }

    /// Every experiment matching `query`; no match is `EmptyResult`.
    pub fn find_experiments(&self, query: &FindQuery) -> ServiceResult<Vec<Experiment>> {
        self.service.find(query, true)
    }

    /// Exactly one model matching `query`.
    pub fn find_model(&self, query: &FindQuery) -> ServiceResult<Model> {
        self.find_one(query)
    }

    /// Every model matching `query`; no match is `EmptyResult`.
    pub fn find_models(&self, query: &FindQuery) -> ServiceResult<Vec<Model>> {
        self.service.find(query, true)
    }

    fn list<E: Entity>(&self, num: usize, page: usize) -> ServiceResult<Vec<E>> {
        let skip = num.saturating_mul(page);
        self.service.list(skip, num)
    }

    fn find_one<E: Entity>(&self, query: &FindQuery) -> ServiceResult<E> {
        self.service
            .find::<E>(query, false)?
            .pop()
            .ok_or(ServiceError::EmptyResult {
                collection: E::COLLECTION,
            })
    }
}
