//! Runtime support shared by every activation on a host.
//!
//! This module provides the consumer registry that decides when a query
//! parameter may be removed from the URL, and the activation ids it tracks.

mod registry;

pub use registry::{ActivationId, ConsumerRegistry};
