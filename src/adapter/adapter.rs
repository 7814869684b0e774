use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::host::{Host, KeyValueStore};
use crate::runtime::ActivationId;

/// Which external store an adapter is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// A URL query parameter.
    Query,
    /// Session-scoped storage.
    Session,
    /// Persistent storage.
    Persistent,
}

impl SourceKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Session => "session",
            Self::Persistent => "persistent",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Binds one key to exactly one external store.
///
/// The stored value is read once when the adapter is activated (and again
/// on [`rebind`](Self::rebind)), and every [`set_value`](Self::set_value)
/// writes the serialized value back. A query adapter also registers its
/// activation with the host's consumer registry so the parameter is removed
/// from the URL only when the last binding for that key goes away.
///
/// An adapter with no key is inert: it reads nothing and writes nothing.
///
/// # Examples
///
/// ```
/// use stowed::adapter::{SourceKind, StoreAdapter};
/// use stowed::codec::Codec;
/// use stowed::host::Host;
///
/// let host = Host::in_memory("https://example.com/?page=3");
/// let mut page = StoreAdapter::activate(
///     &host,
///     Some("page".to_string()),
///     SourceKind::Query,
///     Codec::for_value(&0_u32),
/// );
/// assert_eq!(page.value(), Some(&3));
///
/// page.set_value(4);
/// assert_eq!(host.query_param("page").as_deref(), Some("4"));
///
/// page.deactivate();
/// assert_eq!(host.query_param("page"), None);
/// ```
pub struct StoreAdapter<T> {
    host: Host,
    id: ActivationId,
    source: SourceKind,
    key: Option<String>,
    codec: Codec<T>,
    value: Option<T>,
    registered: Option<String>,
    active: bool,
}

impl<T: Clone + 'static> StoreAdapter<T> {
    /// Activate a new adapter with its own activation id.
    pub fn activate(host: &Host, key: Option<String>, source: SourceKind, codec: Codec<T>) -> Self {
        let id = host.registry().next_id();
        Self::activate_as(host, id, key, source, codec)
    }

    /// Activate an adapter on behalf of an existing activation.
    pub(crate) fn activate_as(
        host: &Host,
        id: ActivationId,
        key: Option<String>,
        source: SourceKind,
        codec: Codec<T>,
    ) -> Self {
        let mut adapter = Self {
            host: host.clone(),
            id,
            source,
            key,
            codec,
            value: None,
            registered: None,
            active: true,
        };
        adapter.register();
        adapter.value = adapter.read();
        adapter
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn activation_id(&self) -> ActivationId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The last value read from or written to the store.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Store `value` and write it to the bound source.
    ///
    /// Does nothing when the adapter has no key or has been deactivated.
    pub fn set_value(&mut self, value: T) {
        if !self.active || self.key.is_none() {
            return;
        }
        self.write(&value);
        self.value = Some(value);
    }

    /// Switch to a new key and codec, then read again.
    ///
    /// For a query adapter whose key changes, the old key is released
    /// (removing its parameter if this was the last consumer) before the
    /// new key is registered. Rebinding to the same key keeps the existing
    /// registration.
    pub fn rebind(&mut self, key: Option<String>, codec: Codec<T>) {
        if key != self.key {
            self.release();
            self.key = key;
            if self.active {
                self.register();
            }
        }
        self.codec = codec;
        self.value = if self.active { self.read() } else { None };
    }

    /// End this activation.
    ///
    /// Releases the query key registration, removing the parameter from the
    /// URL if no other activation still uses it. Stored session and
    /// persistent values are left in place. Calling this more than once is
    /// harmless.
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.release();
    }

    fn register(&mut self) {
        if self.source != SourceKind::Query {
            return;
        }
        if let Some(key) = &self.key {
            self.host.registry().register(key, self.id);
            self.registered = Some(key.clone());
        }
    }

    fn release(&mut self) {
        let Some(key) = self.registered.take() else {
            return;
        };
        if self.host.registry().unregister(&key, self.id) {
            tracing::debug!(key = %key, id = %self.id, "last consumer gone; removing query parameter");
            self.host.remove_query_param(&key);
        }
    }

    fn storage(&self) -> Option<&dyn KeyValueStore> {
        let storage = match self.source {
            SourceKind::Query => return None,
            SourceKind::Session => self.host.session_storage(),
            SourceKind::Persistent => self.host.local_storage(),
        };
        storage.is_available().then_some(&**storage)
    }

    fn read(&self) -> Option<T> {
        let key = self.key.as_deref()?;
        let raw = match self.source {
            SourceKind::Query => self.host.query_param(key),
            SourceKind::Session | SourceKind::Persistent => self.storage()?.get(key),
        };
        tracing::trace!(source = %self.source, key, raw = ?raw, "read stored value");
        self.codec.parse(&raw?)
    }

    fn write(&self, value: &T) {
        let Some(key) = self.key.as_deref() else {
            return;
        };
        let Some(raw) = self.codec.serialize(value) else {
            tracing::trace!(source = %self.source, key, "no serializer for this type; skipping write");
            return;
        };
        tracing::trace!(source = %self.source, key, raw = %raw, "writing stored value");
        match self.source {
            SourceKind::Query => self.host.set_query_param(key, &raw),
            SourceKind::Session | SourceKind::Persistent => {
                if let Some(storage) = self.storage() {
                    storage.set(key, &raw);
                }
            }
        }
    }
}

impl<T> Drop for StoreAdapter<T> {
    fn drop(&mut self) {
        if let Some(key) = self.registered.take() {
            if self.host.registry().unregister(&key, self.id) {
                self.host.remove_query_param(&key);
            }
        }
    }
}

impl<T> fmt::Debug for StoreAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreAdapter")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("key", &self.key)
            .field("active", &self.active)
            .finish()
    }
}
