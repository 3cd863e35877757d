//! Resolves the connections declared by `ConnectionBinding` resources into
//! endpoint URLs published by the `ReleaseBinding`s of their targets.
//!
//! Resolution is a pure function of a binding and read access to the
//! ReleaseBindings in the store:
//!
//! ```text
//! [ ConnectionBinding ] -> (namespace, project, component, environment) -> [ ReleaseBinding ]
//! ```
//!
//! Each declared connection yields exactly one `ResolvedConnection` or
//! `PendingConnection`. Missing, ambiguous, or undeployed targets are reported
//! as pending connections rather than errors; only store failures are errors.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod condition;
mod identity;
pub mod resolve;
mod store;


pub use self::{
    identity::{OwnerEnvKey, ResourceId},
    resolve::{resolve_connections, resolve_status, url_for_visibility, Resolution},
    store::{ConnectionBindingStore, ReleaseBindingStore, StatusStore, StoreError},
};
