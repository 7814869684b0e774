//! Single-source store adapters.
//!
//! An adapter binds one key to one external store: a URL query parameter,
//! session storage, or persistent storage.

mod adapter;

pub use adapter::{SourceKind, StoreAdapter};
