//! OpenChoreo Connection Controller Index
//!
//! Caches the `ReleaseBinding` and `ConnectionBinding` resources observed by the
//! controller's watches and maintains two indexes over them:
//!
//! - A forward index from `(namespace, project, component, environment)` to the
//!   ReleaseBindings published under that key. Resolution lists targets
//!   through this index instead of scanning every ReleaseBinding.
//! - A reverse index from the same key to the ConnectionBindings that declare
//!   a connection to it.
//!
//! ```text
//! [ ReleaseBinding ] -> (ns, project, component, env) <- [ ConnectionBinding ]
//! ```
//!
//! When a ReleaseBinding changes in a way that can affect resolution, every
//! dependent ConnectionBinding is published on the update channel so that it is
//! reconciled. ConnectionBindings are published whenever they change.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod filter;
mod index;
pub mod metrics;


pub use self::{
    index::{dependency_keys, Index, SharedIndex},
    metrics::IndexMetrics,
};
