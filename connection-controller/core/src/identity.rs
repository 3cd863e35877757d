use openchoreo_connection_controller_k8s_api::{ConnectionTarget, ReleaseBindingSpec};
use std::fmt;

/// Identifies a namespaced resource.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

/// The composite key under which a `ReleaseBinding` is indexed: a component
/// deployed into an environment.
///
/// At most one ReleaseBinding is expected per key.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct OwnerEnvKey {
    pub namespace: String,
    pub project: String,
    pub component: String,
    pub environment: String,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: String, name: String) -> Self {
        Self { namespace, name }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl OwnerEnvKey ===

impl OwnerEnvKey {
    /// The key a ReleaseBinding is published under.
    pub fn for_release_binding(namespace: impl Into<String>, spec: &ReleaseBindingSpec) -> Self {
        Self {
            namespace: namespace.into(),
            project: spec.owner.project_name.clone(),
            component: spec.owner.component_name.clone(),
            environment: spec.environment.clone(),
        }
    }

    /// The key a connection target is looked up by. Connections always resolve
    /// within the environment of the binding that declares them.
    pub fn for_target(target: &ConnectionTarget, environment: &str) -> Self {
        Self {
            namespace: target.namespace.clone(),
            project: target.project.clone(),
            component: target.component.clone(),
            environment: environment.to_string(),
        }
    }
}

impl fmt::Display for OwnerEnvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.namespace, self.project, self.component, self.environment
        )
    }
}
