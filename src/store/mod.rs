//! Stored state: one value kept in sync with up to three external stores.
//!
//! [`StoredState`] is the public surface. It checks its options, binds one
//! adapter per store kind, resolves the initial value and fans every
//! accepted update out to the configured stores.

mod cell;
mod options;
mod stored_state;

pub use options::{StoreKeys, StoredStateOptions};
pub use stored_state::{StoredSetter, StoredState};
