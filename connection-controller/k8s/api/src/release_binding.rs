use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binds a released component to an environment.
///
/// The status publishes the URLs of the component's endpoints once they are
/// deployed.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "openchoreo.dev",
    version = "v1alpha1",
    kind = "ReleaseBinding",
    status = "ReleaseBindingStatus",
    derive = "PartialEq",
    namespaced,
    printcolumn = r#"{"name":"Project", "type":"string", "jsonPath":".spec.owner.projectName"}"#,
    printcolumn = r#"{"name":"Component", "type":"string", "jsonPath":".spec.owner.componentName"}"#,
    printcolumn = r#"{"name":"Environment", "type":"string", "jsonPath":".spec.environment"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBindingSpec {
    pub owner: ReleaseBindingOwner,
    pub environment: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,

    #[serde(default)]
    pub state: ReleaseState,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBindingOwner {
    pub project_name: String,
    pub component_name: String,
}

/// The desired state of the release created by a binding.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ReleaseState {
    /// Resources are deployed normally.
    #[default]
    Active,

    /// Workloads are scaled to zero but their resources remain.
    Suspend,

    /// Resources are removed from the data plane.
    Undeploy,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBindingStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// The resolved URLs of each named workload endpoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<EndpointUrlStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndpointUrlStatus {
    /// The endpoint name as defined in the workload.
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub endpoint_type: Option<EndpointType>,

    /// The in-cluster service URL.
    #[serde(
        rename = "serviceURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub service_url: Option<EndpointUrl>,

    #[serde(rename = "invokeURL", default, skip_serializing_if = "Option::is_none")]
    pub invoke_url: Option<String>,

    #[serde(
        rename = "internalURLs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub internal_urls: Option<EndpointGatewayUrls>,

    #[serde(
        rename = "externalURLs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub external_urls: Option<EndpointGatewayUrls>,
}

/// URLs exposed through a gateway, one per protocol.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct EndpointGatewayUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<EndpointUrl>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<EndpointUrl>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<EndpointUrl>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct EndpointUrl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum EndpointType {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "REST")]
    Rest,
    #[serde(rename = "GraphQL")]
    GraphQl,
    #[serde(rename = "Websocket")]
    Websocket,
    #[serde(rename = "gRPC")]
    Grpc,
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,

    /// Any protocol not known to this controller. Endpoint types are never
    /// consulted during resolution.
    #[serde(other)]
    Unknown,
}

// === impl ReleaseBinding ===

impl ReleaseBinding {
    pub fn is_undeployed(&self) -> bool {
        self.spec.state == ReleaseState::Undeploy
    }

    /// Returns the published endpoints, or an empty slice if the binding has
    /// no status yet.
    pub fn endpoints(&self) -> &[EndpointUrlStatus] {
        self.status
            .as_ref()
            .map(|status| status.endpoints.as_slice())
            .unwrap_or_default()
    }
}

// === impl EndpointUrl ===

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{scheme}://")?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if let Some(path) = &self.path {
            if !path.starts_with('/') {
                f.write_str("/")?;
            }
            f.write_str(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_defaults_to_active() {
        let spec: ReleaseBindingSpec = serde_json::from_value(serde_json::json!({
            "owner": { "projectName": "shop", "componentName": "cart" },
            "environment": "dev",
        }))
        .unwrap();
        assert_eq!(spec.state, ReleaseState::Active);
    }

    #[test]
    fn endpoint_status_field_names() {
        let status: EndpointUrlStatus = serde_json::from_value(serde_json::json!({
            "name": "http-ep",
            "type": "HTTP",
            "serviceURL": { "scheme": "http", "host": "cart.default.svc", "port": 8080 },
            "externalURLs": { "https": { "scheme": "https", "host": "cart.example.com" } },
        }))
        .unwrap();
        assert_eq!(status.endpoint_type, Some(EndpointType::Http));
        assert_eq!(
            status.service_url.as_ref().map(|url| url.to_string()),
            Some("http://cart.default.svc:8080".to_string())
        );
        assert!(status.internal_urls.is_none());
        assert_eq!(
            status
                .external_urls
                .and_then(|urls| urls.https)
                .map(|url| url.host),
            Some("cart.example.com".to_string())
        );
    }

    #[test]
    fn unknown_endpoint_type_still_decodes() {
        let rb: ReleaseBinding = serde_json::from_value(serde_json::json!({
            "apiVersion": "openchoreo.dev/v1alpha1",
            "kind": "ReleaseBinding",
            "metadata": { "name": "cart-dev", "namespace": "default" },
            "spec": {
                "owner": { "projectName": "shop", "componentName": "cart" },
                "environment": "dev",
            },
            "status": {
                "endpoints": [{
                    "name": "events",
                    "type": "AMQP",
                    "serviceURL": { "scheme": "amqp", "host": "cart.default.svc", "port": 5672 },
                }],
            },
        }))
        .unwrap();
        assert_eq!(rb.endpoints().len(), 1);
        assert_eq!(rb.endpoints()[0].endpoint_type, Some(EndpointType::Unknown));
        assert!(rb.endpoints()[0].service_url.is_some());
    }

    #[test]
    fn display_url_with_path() {
        let url = EndpointUrl {
            scheme: Some("https".to_string()),
            host: "api.example.com".to_string(),
            port: Some(443),
            path: Some("v1".to_string()),
        };
        assert_eq!(url.to_string(), "https://api.example.com:443/v1");
    }
}
