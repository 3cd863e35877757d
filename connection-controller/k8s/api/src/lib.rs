#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod connection_binding;
pub mod release_binding;

pub use self::{
    connection_binding::{
        ConnectionBinding, ConnectionBindingSpec, ConnectionBindingStatus, ConnectionTarget,
        EndpointVisibility, PendingConnection, ResolvedConnection,
    },
    release_binding::{
        EndpointGatewayUrls, EndpointType, EndpointUrl, EndpointUrlStatus, ReleaseBinding,
        ReleaseBindingOwner, ReleaseBindingSpec, ReleaseBindingStatus, ReleaseState,
    },
};
pub use k8s_openapi::{
    api::{self, apps::v1::Deployment},
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
};
pub use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, Resource, ResourceExt},
    error::ErrorResponse,
    Client, Error,
};

/// The API group shared by all OpenChoreo custom resources.
pub const API_GROUP: &str = "openchoreo.dev";
