use crate::{
    index::{Index, SharedIndex},
    k8s::{self, api::coordination::v1 as coordv1, Deployment, ObjectMeta, Resource},
};
use anyhow::{Context, Result};
use kube::api::{Patch, PatchParams};
use kubert::lease::Claim;
use std::sync::Arc;
use tokio::{sync::watch, time};
use tracing::{debug, info};

const LEASE_DURATION: time::Duration = time::Duration::from_secs(30);
const LEASE_NAME: &str = "connection-controller-write";
const RENEW_GRACE_PERIOD: time::Duration = time::Duration::from_secs(1);

pub async fn init<T>(
    runtime: &kubert::Runtime<T>,
    ns: &str,
    deployment_name: &str,
    hostname: &str,
) -> Result<watch::Receiver<Arc<Claim>>> {
    // The controller's Deployment owns the Lease so that it's removed along
    // with the controller.
    let api = k8s::Api::<Deployment>::namespaced(runtime.client(), ns);
    let deployment = api
        .get(deployment_name)
        .await
        .with_context(|| format!("failed to get Deployment {ns}/{deployment_name}"))?;
    let owner = deployment
        .controller_owner_ref(&())
        .context("Deployment must have a name and uid")?;

    let lease = coordv1::Lease {
        metadata: ObjectMeta {
            name: Some(LEASE_NAME.to_string()),
            namespace: Some(ns.to_string()),
            // Specifying a resource version of "0" means that we will
            // only create the Lease if it does not already exist.
            resource_version: Some("0".to_string()),
            owner_references: Some(vec![owner]),
            labels: Some(
                [(
                    "app.kubernetes.io/component".to_string(),
                    "connection-controller".to_string(),
                )]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        spec: None,
    };
    let api = k8s::Api::<coordv1::Lease>::namespaced(runtime.client(), ns);
    match api
        .patch(
            LEASE_NAME,
            &PatchParams {
                field_manager: Some("connection-controller".to_string()),
                ..Default::default()
            },
            &Patch::Apply(lease),
        )
        .await
    {
        Ok(lease) => info!(?lease, "Created Lease resource"),
        Err(k8s::Error::Api(_)) => debug!("Lease already exists, no need to create it"),
        Err(error) => {
            return Err(error.into());
        }
    };

    let params = kubert::lease::ClaimParams {
        lease_duration: LEASE_DURATION,
        renew_grace_period: RENEW_GRACE_PERIOD,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(api, LEASE_NAME)
        .await?
        .spawn(hostname, params)
        .await?;
    Ok(claims)
}

/// Publishes every known binding each time this replica acquires the write
/// lease.
pub async fn resync_on_acquire(
    index: SharedIndex,
    mut claims: watch::Receiver<Arc<Claim>>,
    hostname: String,
) {
    let mut leading = false;
    loop {
        let is_leader = claims.borrow_and_update().is_current_for(&hostname);
        if is_leader && !leading {
            info!(%hostname, "Acquired write lease; resyncing");
            if !Index::resync(&index).await {
                return;
            }
        } else if !is_leader && leading {
            info!(%hostname, "Lost write lease");
        }
        leading = is_leader;

        if claims.changed().await.is_err() {
            return;
        }
    }
}
