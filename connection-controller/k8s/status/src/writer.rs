use openchoreo_connection_controller_core::{ResourceId, StatusStore, StoreError};
use openchoreo_connection_controller_k8s_api::{
    Api, Client, ConnectionBinding, ConnectionBindingStatus, Error, ErrorResponse, Patch,
    PatchParams, Resource,
};

const FIELD_MANAGER: &str = "connection-controller.openchoreo.dev";

/// Writes `ConnectionBinding` status through the Kubernetes API.
#[derive(Clone)]
pub struct StatusWriter {
    client: Client,
    patch_params: PatchParams,
}

// === impl StatusWriter ===

impl StatusWriter {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            patch_params: PatchParams::apply(FIELD_MANAGER),
        }
    }
}

#[async_trait::async_trait]
impl StatusStore for StatusWriter {
    async fn update_status(
        &self,
        id: &ResourceId,
        resource_version: Option<String>,
        status: ConnectionBindingStatus,
    ) -> Result<(), StoreError> {
        let api = Api::<ConnectionBinding>::namespaced(self.client.clone(), &id.namespace);
        let patch = status_patch(resource_version, &status);
        api.patch_status(&id.name, &self.patch_params, &Patch::Merge(patch))
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

/// Builds a merge patch that replaces the status subresource.
///
/// When a resource version is set it's included as a precondition, so the
/// write is rejected if the binding changed after it was read.
fn status_patch(
    resource_version: Option<String>,
    status: &ConnectionBindingStatus,
) -> serde_json::Value {
    let mut metadata = serde_json::Map::new();
    if let Some(resource_version) = resource_version {
        metadata.insert(
            "resourceVersion".to_string(),
            serde_json::Value::String(resource_version),
        );
    }
    serde_json::json!({
        "apiVersion": ConnectionBinding::api_version(&()),
        "kind": ConnectionBinding::kind(&()),
        "metadata": metadata,
        "status": status,
    })
}

fn store_error(error: Error) -> StoreError {
    match error {
        Error::Api(ErrorResponse { code: 409, .. }) => StoreError::Conflict,
        Error::Api(ErrorResponse { code: 404, .. }) => StoreError::NotFound,
        error => StoreError::Other(error.into()),
    }
}
