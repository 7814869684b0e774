//! # Stowed
//!
//! Reactive state cells kept in sync with a URL query parameter, session
//! storage, or persistent storage.
//!
//! Stowed provides two levels of abstraction:
//!
//! ## Adapters (Low-level bindings)
//!
//! - `StoreAdapter<T>` - Binds one key to exactly one store, reads it once
//!   and writes every change back
//! - `ConsumerRegistry` - Tracks which activations use each query key, so a
//!   parameter leaves the URL only when its last user is gone
//!
//! ## Stored state (High-level state management)
//!
//! - `StoredState<T>` - A validated state cell hydrated from its stores by
//!   precedence (query, then storage, then default)
//! - Parse/serialize customization with a built-in codec for booleans,
//!   numbers and strings
//! - Subscriptions and cloneable setters
//!
//! Everything the crate knows about its environment goes through [`Host`],
//! so a context without a document simply reads nothing and writes nowhere.
//!
//! ```
//! use stowed::{Host, StoredState, StoredStateOptions};
//!
//! let host = Host::in_memory("https://example.com/?tab=settings");
//! let tab = StoredState::activate(
//!     &host,
//!     StoredStateOptions::new("overview".to_string())
//!         .query_key("tab")
//!         .session_storage_key("tab")
//!         .valid_values(["overview".to_string(), "settings".to_string()]),
//! )?;
//!
//! assert_eq!(tab.get(), "settings");
//! assert_eq!(host.session_storage().get("tab").as_deref(), Some("settings"));
//! # Ok::<(), stowed::ConfigError>(())
//! ```

pub mod adapter;
pub mod codec;
pub mod error;
pub mod host;
pub mod runtime;
pub mod store;

// Re-export main types for convenience
pub use adapter::{SourceKind, StoreAdapter};
pub use codec::Codec;
pub use error::ConfigError;
pub use host::Host;
pub use store::{StoreKeys, StoredSetter, StoredState, StoredStateOptions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        // Basic smoke test
        let host = Host::in_memory("https://example.com/");
        let state = StoredState::activate(&host, StoredStateOptions::new(0).query_key("n")).unwrap();
        assert_eq!(state.get(), 0);
        assert!(state.set(42));
        assert_eq!(host.query_param("n").as_deref(), Some("42"));
    }
}
