use openchoreo_connection_controller_core::OwnerEnvKey;
use openchoreo_connection_controller_k8s_api::{ReleaseBinding, ResourceExt};

/// Indicates whether an observed `ReleaseBinding` may change the outcome of
/// any resolution that depends on it.
///
/// Newly observed bindings are always admitted. An update is admitted only if
/// the lifecycle state, the published endpoints, or the binding's owner or
/// environment changed. Endpoint lists are compared in order, so a reordering
/// is treated as a change.
pub fn admits_update(old: Option<&ReleaseBinding>, new: &ReleaseBinding) -> bool {
    let Some(old) = old else {
        return true;
    };

    old.spec.state != new.spec.state
        || old.endpoints() != new.endpoints()
        || owner_env_key(old) != owner_env_key(new)
}

fn owner_env_key(rb: &ReleaseBinding) -> OwnerEnvKey {
    OwnerEnvKey::for_release_binding(rb.namespace().unwrap_or_default(), &rb.spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openchoreo_connection_controller_k8s_api::{
        EndpointUrl, EndpointUrlStatus, ReleaseBindingOwner, ReleaseBindingSpec,
        ReleaseBindingStatus, ReleaseState,
    };

    fn mk_release_binding(endpoints: Vec<EndpointUrlStatus>) -> ReleaseBinding {
        let mut rb = ReleaseBinding::new(
            "rb",
            ReleaseBindingSpec {
                owner: ReleaseBindingOwner {
                    project_name: "shop".to_string(),
                    component_name: "cart".to_string(),
                },
                environment: "dev".to_string(),
                release_name: Some("cart-1".to_string()),
                state: ReleaseState::Active,
            },
        );
        rb.metadata.namespace = Some("default".to_string());
        rb.status = Some(ReleaseBindingStatus {
            conditions: vec![],
            endpoints,
        });
        rb
    }

    fn mk_endpoint(name: &str, port: i32) -> EndpointUrlStatus {
        EndpointUrlStatus {
            name: name.to_string(),
            service_url: Some(EndpointUrl {
                scheme: Some("http".to_string()),
                host: "cart.default.svc".to_string(),
                port: Some(port),
                path: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn creation_is_admitted() {
        assert!(admits_update(None, &mk_release_binding(vec![])));
    }

    #[test]
    fn state_change_is_admitted() {
        let old = mk_release_binding(vec![]);
        let mut new = old.clone();
        new.spec.state = ReleaseState::Undeploy;
        assert!(admits_update(Some(&old), &new));
    }

    #[test]
    fn endpoint_change_is_admitted() {
        let old = mk_release_binding(vec![mk_endpoint("http", 8080)]);
        let new = mk_release_binding(vec![mk_endpoint("http", 9090)]);
        assert!(admits_update(Some(&old), &new));

        let new = mk_release_binding(vec![]);
        assert!(admits_update(Some(&old), &new));
    }

    #[test]
    fn endpoint_reorder_is_admitted() {
        let old = mk_release_binding(vec![mk_endpoint("a", 80), mk_endpoint("b", 81)]);
        let new = mk_release_binding(vec![mk_endpoint("b", 81), mk_endpoint("a", 80)]);
        assert!(admits_update(Some(&old), &new));
    }

    #[test]
    fn unrelated_churn_is_ignored() {
        let old = mk_release_binding(vec![mk_endpoint("http", 8080)]);
        let mut new = old.clone();
        new.metadata.resource_version = Some("42".to_string());
        new.spec.release_name = Some("cart-2".to_string());
        new.metadata.labels = Some(
            [("team".to_string(), "payments".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(!admits_update(Some(&old), &new));
    }

    #[test]
    fn missing_status_equals_empty_endpoints() {
        let old = mk_release_binding(vec![]);
        let mut new = old.clone();
        new.status = None;
        assert!(!admits_update(Some(&old), &new));
    }
}
