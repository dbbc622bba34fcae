//! Process-wide registry of deployed artifacts.
//!
//! The registry is written during the single-threaded deployment phase and
//! read concurrently afterwards; after startup it is effectively immutable.
//! It is created once by the lifecycle coordinator and injected as an
//! `Arc<ConfigRegistry>` wherever lookups are needed, which keeps tests free
//! to build isolated instances.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

use crate::artifacts::{Api, Endpoint, InboundDef, Sequence};
use crate::config::DeploymentConfig;

/// Registration failures. Names are unique per artifact kind; a duplicate is
/// refused and the caller decides whether to skip or abort.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate {kind} registration: {name}")]
    Duplicate { kind: &'static str, name: String },
}

/// Name-indexed container of deployed artifacts plus deployment settings.
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    apis: DashMap<String, Arc<Api>>,
    endpoints: DashMap<String, Arc<Endpoint>>,
    sequences: DashMap<String, Arc<Sequence>>,
    inbounds: DashMap<String, Arc<InboundDef>>,
    deployment: RwLock<Option<DeploymentConfig>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_api(&self, api: Api) -> Result<Arc<Api>, RegistryError> {
        insert_unique(&self.apis, "API", api.name.clone(), api)
    }

    pub fn register_endpoint(&self, endpoint: Endpoint) -> Result<Arc<Endpoint>, RegistryError> {
        insert_unique(&self.endpoints, "endpoint", endpoint.name.clone(), endpoint)
    }

    pub fn register_sequence(&self, sequence: Sequence) -> Result<Arc<Sequence>, RegistryError> {
        insert_unique(&self.sequences, "sequence", sequence.name.clone(), sequence)
    }

    pub fn register_inbound(&self, inbound: InboundDef) -> Result<Arc<InboundDef>, RegistryError> {
        insert_unique(&self.inbounds, "inbound", inbound.name.clone(), inbound)
    }

    pub fn get_api(&self, name: &str) -> Option<Arc<Api>> {
        self.apis.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn get_endpoint(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn get_sequence(&self, name: &str) -> Option<Arc<Sequence>> {
        self.sequences.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn get_inbound(&self, name: &str) -> Option<Arc<InboundDef>> {
        self.inbounds.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn api_count(&self) -> usize {
        self.apis.len()
    }

    pub fn set_deployment_config(&self, config: DeploymentConfig) {
        *self.deployment.write().expect("deployment lock poisoned") = Some(config);
    }

    pub fn deployment_config(&self) -> Option<DeploymentConfig> {
        self.deployment
            .read()
            .expect("deployment lock poisoned")
            .clone()
    }
}

fn insert_unique<T>(
    map: &DashMap<String, Arc<T>>,
    kind: &'static str,
    name: String,
    value: T,
) -> Result<Arc<T>, RegistryError> {
    match map.entry(name) {
        Entry::Occupied(occupied) => Err(RegistryError::Duplicate {
            kind,
            name: occupied.key().clone(),
        }),
        Entry::Vacant(vacant) => {
            let value = Arc::new(value);
            vacant.insert(Arc::clone(&value));
            Ok(value)
        }
    }
}
