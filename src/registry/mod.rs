//! Endpoint registry: named Ollama servers plus the active selection.
//!
//! RegistryState is the persisted shape; Registry wraps a loaded state and a
//! [`StateStore`] and is the only way to mutate it. Every mutation is applied to a
//! copy, persisted, and only then committed in memory.

pub mod address;
pub mod store;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use store::{RegistryStore, StateStore, StoreError};

/// Name of the sentinel endpoint that always exists and cannot be removed.
pub const DEFAULT_NAME: &str = "default";

/// A named server address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    /// Canonical `host:port`.
    pub address: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Everything persisted in the registry file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(rename = "servers", default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(rename = "current", default)]
    pub active_name: String,
}

impl Default for RegistryState {
    /// A single `default` endpoint on loopback, selected.
    fn default() -> Self {
        Self {
            endpoints: vec![Endpoint::new(DEFAULT_NAME, address::loopback_address())],
            active_name: DEFAULT_NAME.to_string(),
        }
    }
}

impl RegistryState {
    pub fn find(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}

/// User-facing registry failures. None of them change state.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Server name cannot be empty")]
    EmptyName,

    #[error("Server address cannot be empty")]
    EmptyAddress,

    #[error("Server with name '{0}' already exists")]
    DuplicateName(String),

    #[error("Server with name '{0}' not found")]
    NotFound(String),

    #[error("Cannot remove the default server")]
    ProtectedName,

    #[error("failed to save registry")]
    PersistFailed(#[source] StoreError),
}

/// Operations over a loaded [`RegistryState`].
pub struct Registry<'s> {
    store: &'s dyn StateStore,
    state: RegistryState,
}

impl<'s> Registry<'s> {
    pub fn new(store: &'s dyn StateStore, state: RegistryState) -> Self {
        Self { store, state }
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    /// Register a new endpoint; the address is normalized first.
    pub fn add(&mut self, name: &str, raw_address: &str) -> Result<Endpoint, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if raw_address.is_empty() {
            return Err(RegistryError::EmptyAddress);
        }
        if self.state.find(name).is_some() {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        let endpoint = Endpoint::new(name, address::normalize(raw_address));
        let mut next = self.state.clone();
        next.endpoints.push(endpoint.clone());
        self.commit(next)?;
        Ok(endpoint)
    }

    /// Endpoints in insertion order.
    pub fn list(&self) -> &[Endpoint] {
        &self.state.endpoints
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.state.active_name == name
    }

    /// Select `name` as the active endpoint.
    pub fn use_endpoint(&mut self, name: &str) -> Result<Endpoint, RegistryError> {
        let endpoint = self
            .state
            .find(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let mut next = self.state.clone();
        next.active_name = endpoint.name.clone();
        self.commit(next)?;
        Ok(endpoint)
    }

    /// Delete `name`; the active selection falls back to `default` if it pointed here.
    pub fn remove(&mut self, name: &str) -> Result<(), RegistryError> {
        if name == DEFAULT_NAME {
            return Err(RegistryError::ProtectedName);
        }
        let idx = self
            .state
            .endpoints
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let mut next = self.state.clone();
        next.endpoints.remove(idx);
        if next.active_name == name {
            next.active_name = DEFAULT_NAME.to_string();
        }
        self.commit(next)
    }

    /// The endpoint named by the active selection, if it resolves.
    pub fn active(&self) -> Option<&Endpoint> {
        self.state.find(&self.state.active_name)
    }

    fn commit(&mut self, next: RegistryState) -> Result<(), RegistryError> {
        self.store.save(&next).map_err(RegistryError::PersistFailed)?;
        debug!(current = %next.active_name, servers = next.endpoints.len(), "registry updated");
        self.state = next;
        Ok(())
    }
}
