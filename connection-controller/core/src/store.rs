use crate::{OwnerEnvKey, ResourceId};
use openchoreo_connection_controller_k8s_api::{
    ConnectionBinding, ConnectionBindingStatus, ReleaseBinding,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// Errors returned by store reads and writes.
///
/// None of these describe a resolution outcome; they are infrastructure
/// failures that leave the binding's status untouched.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,

    #[error("resource was modified concurrently")]
    Conflict,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Reads `ReleaseBinding`s through the composite owner/environment index.
pub trait ReleaseBindingStore {
    /// Lists every ReleaseBinding in `key.namespace` owned by `key.project`
    /// and `key.component` and bound to `key.environment`.
    fn list_release_bindings(&self, key: &OwnerEnvKey) -> Result<Vec<ReleaseBinding>, StoreError>;
}

pub trait ConnectionBindingStore {
    fn get_connection_binding(&self, id: &ResourceId) -> Result<ConnectionBinding, StoreError>;
}

/// Persists the status of a `ConnectionBinding`.
#[async_trait::async_trait]
pub trait StatusStore {
    /// Replaces the binding's status.
    ///
    /// When `resource_version` is set, the write fails with
    /// [`StoreError::Conflict`] if the binding was modified since that version
    /// was observed.
    async fn update_status(
        &self,
        id: &ResourceId,
        resource_version: Option<String>,
        status: ConnectionBindingStatus,
    ) -> Result<(), StoreError>;
}

// === impl StoreError ===

impl StoreError {
    /// Indicates whether the read-compute-write cycle should be run again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

impl<T: ReleaseBindingStore> ReleaseBindingStore for Arc<RwLock<T>> {
    fn list_release_bindings(&self, key: &OwnerEnvKey) -> Result<Vec<ReleaseBinding>, StoreError> {
        self.read().list_release_bindings(key)
    }
}

impl<T: ConnectionBindingStore> ConnectionBindingStore for Arc<RwLock<T>> {
    fn get_connection_binding(&self, id: &ResourceId) -> Result<ConnectionBinding, StoreError> {
        self.read().get_connection_binding(id)
    }
}
