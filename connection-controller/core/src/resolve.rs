use crate::{condition, OwnerEnvKey, ReleaseBindingStore, StoreError};
use openchoreo_connection_controller_k8s_api::{
    ConnectionBinding, ConnectionBindingSpec, ConnectionBindingStatus, ConnectionTarget,
    EndpointGatewayUrls, EndpointUrl, EndpointUrlStatus, EndpointVisibility, PendingConnection,
    ResolvedConnection, Time,
};
use tracing::trace;

/// Partitions a binding's declared connections.
///
/// `resolved.len() + pending.len()` always equals the number of declared
/// connections, and each list preserves declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub resolved: Vec<ResolvedConnection>,
    pub pending: Vec<PendingConnection>,
}

enum Outcome {
    Resolved(ResolvedConnection),
    Pending(PendingConnection),
}

/// Computes the complete status of a binding from the current state of the
/// store.
///
/// The existing status is consulted only to carry over condition transition
/// times, so calling this twice against an unchanged store yields equal
/// statuses.
pub fn resolve_status<S>(
    binding: &ConnectionBinding,
    store: &S,
    now: Time,
) -> Result<ConnectionBindingStatus, StoreError>
where
    S: ReleaseBindingStore + ?Sized,
{
    let Resolution { resolved, pending } = resolve_connections(&binding.spec, store)?;

    let mut conditions = binding
        .status
        .as_ref()
        .map(|status| status.conditions.clone())
        .unwrap_or_default();
    let all_resolved = condition::all_resolved(
        binding.spec.connections.len(),
        pending.len(),
        binding.metadata.generation,
        now,
    );
    condition::set_condition(&mut conditions, all_resolved);

    Ok(ConnectionBindingStatus {
        conditions,
        resolved,
        pending,
    })
}

/// Resolves every declared connection in a single pass.
///
/// A store failure aborts the whole pass; it is never recorded as a pending
/// connection.
pub fn resolve_connections<S>(
    spec: &ConnectionBindingSpec,
    store: &S,
) -> Result<Resolution, StoreError>
where
    S: ReleaseBindingStore + ?Sized,
{
    let mut resolution = Resolution::default();
    for target in &spec.connections {
        match resolve_connection(target, &spec.environment, store)? {
            Outcome::Resolved(conn) => resolution.resolved.push(conn),
            Outcome::Pending(conn) => resolution.pending.push(conn),
        }
    }
    Ok(resolution)
}

fn resolve_connection<S>(
    target: &ConnectionTarget,
    environment: &str,
    store: &S,
) -> Result<Outcome, StoreError>
where
    S: ReleaseBindingStore + ?Sized,
{
    let key = OwnerEnvKey::for_target(target, environment);
    let mut bindings = store.list_release_bindings(&key)?;

    let binding = match bindings.len() {
        0 => {
            return Ok(Outcome::Pending(target.pending(format!(
                "ReleaseBinding not found for component {}/{}",
                target.project, target.component
            ))))
        }
        1 => bindings.remove(0),
        n => {
            trace!(%key, bindings = n, "Ambiguous ReleaseBindings");
            return Ok(Outcome::Pending(target.pending(format!(
                "multiple ReleaseBindings found for component {}/{} in environment {}",
                target.project, target.component, environment
            ))));
        }
    };

    // Endpoints recorded before an undeploy may be stale.
    if binding.is_undeployed() {
        return Ok(Outcome::Pending(target.pending("component is undeployed")));
    }

    let Some(endpoint) = binding
        .endpoints()
        .iter()
        .find(|ep| ep.name == target.endpoint)
    else {
        return Ok(Outcome::Pending(target.pending(format!(
            "endpoint {:?} not yet resolved",
            target.endpoint
        ))));
    };

    match url_for_visibility(endpoint, &target.visibility) {
        Some(url) => Ok(Outcome::Resolved(target.resolved(url.clone()))),
        None => Ok(Outcome::Pending(target.pending(format!(
            "endpoint {:?} has no URL for visibility {}",
            target.endpoint, target.visibility
        )))),
    }
}

/// Selects the URL of an endpoint that is reachable under `visibility`.
///
/// Project and namespace visibility only ever use the in-cluster service URL.
/// Internal and external visibility use their gateway's URLs, preferring HTTPS,
/// then HTTP, then TLS.
pub fn url_for_visibility<'e>(
    endpoint: &'e EndpointUrlStatus,
    visibility: &EndpointVisibility,
) -> Option<&'e EndpointUrl> {
    match visibility {
        EndpointVisibility::Project | EndpointVisibility::Namespace => {
            endpoint.service_url.as_ref()
        }
        EndpointVisibility::Internal => endpoint.internal_urls.as_ref().and_then(gateway_url),
        EndpointVisibility::External => endpoint.external_urls.as_ref().and_then(gateway_url),
        EndpointVisibility::Unknown => None,
    }
}

fn gateway_url(urls: &EndpointGatewayUrls) -> Option<&EndpointUrl> {
    urls.https
        .as_ref()
        .or(urls.http.as_ref())
        .or(urls.tls.as_ref())
}
