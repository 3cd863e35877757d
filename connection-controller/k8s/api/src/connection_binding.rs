use crate::release_binding::EndpointUrl;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares the endpoints of other components that a component connects to.
///
/// Every connection resolves within the binding's own environment.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "openchoreo.dev",
    version = "v1alpha1",
    kind = "ConnectionBinding",
    status = "ConnectionBindingStatus",
    derive = "PartialEq",
    namespaced,
    printcolumn = r#"{"name":"ReleaseBinding", "type":"string", "jsonPath":".spec.releaseBindingRef"}"#,
    printcolumn = r#"{"name":"Environment", "type":"string", "jsonPath":".spec.environment"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionBindingSpec {
    /// Names the ReleaseBinding this binding belongs to.
    pub release_binding_ref: String,

    /// The environment in which all connections are resolved.
    pub environment: String,

    #[serde(default)]
    pub connections: Vec<ConnectionTarget>,
}

/// Identifies an endpoint on another component.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTarget {
    /// The control plane namespace of the target component.
    pub namespace: String,
    pub project: String,
    pub component: String,
    pub endpoint: String,
    pub visibility: EndpointVisibility,
}

/// The access scope under which an endpoint URL is requested.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum EndpointVisibility {
    #[serde(rename = "project")]
    Project,
    #[serde(rename = "namespace")]
    Namespace,
    #[serde(rename = "internal")]
    Internal,
    #[serde(rename = "external")]
    External,

    /// Any value not known to this controller. Never resolves to a URL.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionBindingStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub resolved: Vec<ResolvedConnection>,

    #[serde(default)]
    pub pending: Vec<PendingConnection>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConnection {
    pub namespace: String,
    pub project: String,
    pub component: String,
    pub endpoint: String,
    pub url: EndpointUrl,
}

/// A connection that could not be resolved, with a reason meant for operators.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingConnection {
    pub namespace: String,
    pub project: String,
    pub component: String,
    pub endpoint: String,
    pub reason: String,
}

// === impl ConnectionTarget ===

impl ConnectionTarget {
    pub fn resolved(&self, url: EndpointUrl) -> ResolvedConnection {
        ResolvedConnection {
            namespace: self.namespace.clone(),
            project: self.project.clone(),
            component: self.component.clone(),
            endpoint: self.endpoint.clone(),
            url,
        }
    }

    pub fn pending(&self, reason: impl Into<String>) -> PendingConnection {
        PendingConnection {
            namespace: self.namespace.clone(),
            project: self.project.clone(),
            component: self.component.clone(),
            endpoint: self.endpoint.clone(),
            reason: reason.into(),
        }
    }
}

// === impl EndpointVisibility ===

impl fmt::Display for EndpointVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Project => "project",
            Self::Namespace => "namespace",
            Self::Internal => "internal",
            Self::External => "external",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
