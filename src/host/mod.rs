//! Host capabilities: the current location and the two storage areas.
//!
//! Everything the crate knows about its environment goes through these
//! traits, so a server-side render can use [`Host::detached`] and tests can
//! use [`Host::in_memory`].

mod host;
mod location;
mod storage;

pub use host::Host;
pub use location::{LocationStore, MemoryLocation, NoLocation};
pub use storage::{KeyValueStore, MemoryStorage, NoStorage};
