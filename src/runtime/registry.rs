use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Opaque identifier of one activation of a stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivationId(usize);

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tracks which activations currently reference each query key.
///
/// A query parameter is removed from the URL only once the last activation
/// bound to its key has released it. Entries are created on first
/// registration and dropped as soon as their set becomes empty.
///
/// # Examples
///
/// ```
/// use stowed::runtime::ConsumerRegistry;
///
/// let registry = ConsumerRegistry::new();
/// let a = registry.next_id();
/// let b = registry.next_id();
///
/// registry.register("tab", a);
/// registry.register("tab", b);
/// assert!(!registry.unregister("tab", a));
/// assert!(registry.unregister("tab", b));
/// assert!(registry.is_empty("tab"));
/// ```
pub struct ConsumerRegistry {
    next_id: AtomicUsize,
    consumers: Mutex<HashMap<String, HashSet<ActivationId>>>,
}

impl ConsumerRegistry {
    /// Create a new, isolated registry.
    pub fn new() -> Arc<Self> {
        Arc::new(ConsumerRegistry {
            next_id: AtomicUsize::new(0),
            consumers: Mutex::new(HashMap::new()),
        })
    }

    /// Get or create the process-wide registry.
    ///
    /// Hosts built with [`Host::new`](crate::host::Host::new) share this one,
    /// the way every binding in a single document shares one URL.
    pub fn global() -> Arc<Self> {
        static REGISTRY: OnceLock<Arc<ConsumerRegistry>> = OnceLock::new();
        Arc::clone(REGISTRY.get_or_init(Self::new))
    }

    /// Generate the next unique activation id.
    pub fn next_id(&self) -> ActivationId {
        ActivationId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Record that `id` consumes `key`.
    pub fn register(&self, key: &str, id: ActivationId) {
        let mut consumers = self.lock();
        let inserted = consumers.entry(key.to_string()).or_default().insert(id);
        tracing::trace!(key, %id, inserted, "registered query key consumer");
    }

    /// Release `id` from `key`.
    ///
    /// Returns `true` when this release emptied the set, i.e. the caller was
    /// the last consumer and should remove the parameter. Releasing an id
    /// that is not registered is a no-op and returns `false`.
    pub fn unregister(&self, key: &str, id: ActivationId) -> bool {
        let mut consumers = self.lock();
        let Some(ids) = consumers.get_mut(key) else {
            return false;
        };
        if !ids.remove(&id) {
            return false;
        }
        tracing::trace!(key, %id, remaining = ids.len(), "released query key consumer");
        if ids.is_empty() {
            consumers.remove(key);
            true
        } else {
            false
        }
    }

    /// Whether no activation currently references `key`.
    pub fn is_empty(&self, key: &str) -> bool {
        self.lock().get(key).map_or(true, HashSet::is_empty)
    }

    /// Number of activations currently referencing `key`.
    pub fn consumer_count(&self, key: &str) -> usize {
        self.lock().get(key).map_or(0, HashSet::len)
    }

    /// Clear all entries.
    ///
    /// Useful for resetting between tests. The id counter keeps running, so
    /// ids handed out before the clear are never reused.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashSet<ActivationId>>> {
        self.consumers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ConsumerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerRegistry")
            .field("keys", &self.lock().len())
            .finish()
    }
}
