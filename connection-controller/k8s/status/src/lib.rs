//! Writes the resolved status of `ConnectionBinding` resources.
//!
//! Keys published by the index are collected in a deduplicating
//! [`WorkQueue`] and drained by a pool of workers. Each worker recomputes a
//! binding's status from the index and writes it only when it differs from
//! the stored status. Only the replica holding the write lease runs workers.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod controller;
mod metrics;
mod queue;
mod writer;


pub use self::{
    controller::{reconcile, Config, Controller, Reconciled},
    metrics::ControllerMetrics,
    queue::{Backoff, Enqueued, WorkQueue},
    writer::StatusWriter,
};
