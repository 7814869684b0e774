use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::cell::StateCell;
use super::options::{StoredStateOptions, Validation};
use crate::adapter::{SourceKind, StoreAdapter};
use crate::codec::Codec;
use crate::error::Result;
use crate::host::Host;
use crate::runtime::ActivationId;

/// The adapters and validation behind one activation.
struct Bindings<T> {
    validation: Validation<T>,
    query: StoreAdapter<T>,
    session: StoreAdapter<T>,
    local: StoreAdapter<T>,
    hydrated_from: Option<SourceKind>,
    active: bool,
}

impl<T: Clone + Send + Sync + 'static> Bindings<T> {
    fn adapters_mut(&mut self) -> [&mut StoreAdapter<T>; 3] {
        [&mut self.query, &mut self.session, &mut self.local]
    }

    /// Pick the initial value: query, then storage, then the default.
    ///
    /// Missing values never reach the validator.
    fn hydrate(&mut self, default_value: T) -> T {
        let candidate = [&self.query, &self.session, &self.local]
            .into_iter()
            .find_map(|adapter| {
                adapter
                    .value()
                    .filter(|value| self.validation.accepts(value))
                    .map(|value| (adapter.source(), value.clone()))
            });
        match candidate {
            Some((source, value)) => {
                self.hydrated_from = Some(source);
                value
            }
            None => {
                self.hydrated_from = None;
                default_value
            }
        }
    }

    /// Write `value` to every configured store.
    fn sync(&mut self, value: &T) {
        for adapter in self.adapters_mut() {
            adapter.set_value(value.clone());
        }
    }

    fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        for adapter in self.adapters_mut() {
            adapter.deactivate();
        }
    }
}

/// Validate `candidate`, then store it and fan it out to every configured
/// store. Returns whether the value was accepted.
fn commit<T>(cell: &StateCell<T>, bindings: &Mutex<Bindings<T>>, candidate: T) -> bool
where
    T: Clone + Send + Sync + 'static,
{
    let mut bindings = lock(bindings);
    if !bindings.active {
        tracing::trace!("ignoring update on an ended activation");
        return false;
    }
    if !bindings.validation.accepts(&candidate) {
        tracing::trace!("rejected update that failed validation");
        return false;
    }
    cell.replace(candidate.clone());
    bindings.sync(&candidate);
    drop(bindings);
    cell.notify();
    true
}

fn lock<T>(bindings: &Mutex<Bindings<T>>) -> MutexGuard<'_, Bindings<T>> {
    bindings.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A state value kept in sync with a URL query parameter and/or a storage
/// area.
///
/// Activating a stored state resolves its initial value, in order of
/// precedence, from the query parameter, then session or persistent storage,
/// then the default value. Stored values that cannot be parsed or fail
/// validation are skipped. The resolved value is immediately written back to
/// every configured store, so all of them agree.
///
/// Updates go through [`set`](Self::set): invalid values are ignored, valid
/// ones replace the current value and are written to every configured store.
///
/// Dropping the state (or calling [`deactivate`](Self::deactivate)) ends the
/// activation. The query parameter is removed once no other activation uses
/// the same key; storage entries are kept.
///
/// # Examples
///
/// ```
/// use stowed::host::Host;
/// use stowed::{StoredState, StoredStateOptions};
///
/// let host = Host::in_memory("https://example.com/?volume=40");
/// let volume = StoredState::activate(
///     &host,
///     StoredStateOptions::new(50_u8)
///         .query_key("volume")
///         .local_storage_key("volume")
///         .validate(|v| *v <= 100),
/// )
/// .unwrap();
///
/// assert_eq!(volume.get(), 40);
/// assert_eq!(host.local_storage().get("volume").as_deref(), Some("40"));
///
/// assert!(!volume.set(120));
/// assert!(volume.set(70));
/// assert_eq!(host.query_param("volume").as_deref(), Some("70"));
/// ```
pub struct StoredState<T> {
    host: Host,
    id: ActivationId,
    cell: StateCell<T>,
    bindings: Arc<Mutex<Bindings<T>>>,
}

impl<T: Clone + Send + Sync + 'static> StoredState<T> {
    /// Check `options`, bind the configured stores and hydrate.
    ///
    /// Fails with a [`ConfigError`](crate::ConfigError) before touching any
    /// store if the options are inconsistent.
    pub fn activate(host: &Host, options: StoredStateOptions<T>) -> Result<Self> {
        let resolved = options.resolve()?;
        let id = host.registry().next_id();
        warn_if_unwritable(&resolved.codec);

        let keys = resolved.keys;
        let bind = |key: Option<String>, source: SourceKind, codec: &Codec<T>| {
            StoreAdapter::activate_as(host, id, key, source, codec.clone())
        };
        let mut bindings = Bindings {
            validation: resolved.validation,
            query: bind(keys.query_key, SourceKind::Query, &resolved.codec),
            session: bind(keys.session_storage_key, SourceKind::Session, &resolved.codec),
            local: bind(keys.local_storage_key, SourceKind::Persistent, &resolved.codec),
            hydrated_from: None,
            active: true,
        };

        let initial = bindings.hydrate(resolved.default_value);
        bindings.sync(&initial);
        tracing::debug!(
            %id,
            source = bindings.hydrated_from.map_or("default", |source| source.label()),
            "activated stored state"
        );

        Ok(Self {
            host: host.clone(),
            id,
            cell: StateCell::new(initial),
            bindings: Arc::new(Mutex::new(bindings)),
        })
    }

    /// The current value.
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Read the current value without cloning it.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.cell.read(f)
    }

    /// Replace the value if `candidate` passes validation, writing it to
    /// every configured store. Returns whether it was accepted.
    pub fn set(&self, candidate: T) -> bool {
        commit(&self.cell, &self.bindings, candidate)
    }

    /// Apply `f` to a copy of the current value and [`set`](Self::set) the
    /// result.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    /// Call `callback` with the new value after every accepted update and
    /// every [`reconfigure`](Self::reconfigure).
    ///
    /// Callbacks run with no lock held and may subscribe or set again. A
    /// callback that sets unconditionally never terminates.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.cell.subscribe(callback);
    }

    /// A cloneable handle that sets this state.
    pub fn setter(&self) -> StoredSetter<T> {
        StoredSetter {
            cell: self.cell.clone(),
            bindings: Arc::downgrade(&self.bindings),
        }
    }

    /// The current value and a setter, as a pair.
    pub fn pair(&self) -> (T, StoredSetter<T>) {
        (self.get(), self.setter())
    }

    /// Which store the initial value came from; `None` means the default.
    pub fn hydrated_from(&self) -> Option<SourceKind> {
        lock(&self.bindings).hydrated_from
    }

    /// Apply a new configuration to this activation.
    ///
    /// The options are checked first; on error nothing changes. Otherwise
    /// every adapter is rebound (a changed query key releases the old key
    /// before registering the new one), the value is hydrated again and
    /// written back to every configured store.
    ///
    /// Subscribers are always notified once after a successful reconfigure,
    /// even when the hydrated value is unchanged: the new configuration may
    /// mean the same value now comes from a different store. A failed
    /// reconfigure notifies nobody.
    pub fn reconfigure(&self, options: StoredStateOptions<T>) -> Result<()> {
        let resolved = options.resolve()?;
        warn_if_unwritable(&resolved.codec);

        let mut bindings = lock(&self.bindings);
        let keys = resolved.keys;
        bindings.query.rebind(keys.query_key, resolved.codec.clone());
        bindings.session.rebind(keys.session_storage_key, resolved.codec.clone());
        bindings.local.rebind(keys.local_storage_key, resolved.codec);
        bindings.validation = resolved.validation;
        if !bindings.active {
            return Ok(());
        }

        let value = bindings.hydrate(resolved.default_value);
        bindings.sync(&value);
        tracing::debug!(
            id = %self.id,
            source = bindings.hydrated_from.map_or("default", |source| source.label()),
            "reconfigured stored state"
        );
        drop(bindings);

        self.cell.replace(value);
        self.cell.notify();
        Ok(())
    }

    /// End this activation. Safe to call more than once.
    pub fn deactivate(&self) {
        let mut bindings = lock(&self.bindings);
        if bindings.active {
            tracing::debug!(id = %self.id, "deactivating stored state");
        }
        bindings.deactivate();
    }

    pub fn is_active(&self) -> bool {
        lock(&self.bindings).active
    }

    pub fn activation_id(&self) -> ActivationId {
        self.id
    }

    pub fn host(&self) -> &Host {
        &self.host
    }
}

fn warn_if_unwritable<T: 'static>(codec: &Codec<T>) {
    if !codec.can_serialize() {
        tracing::warn!(
            state_type = std::any::type_name::<T>(),
            "no codec for this state type; stored values will be ignored and nothing will be written"
        );
    }
}

impl<T> Drop for StoredState<T> {
    fn drop(&mut self) {
        let mut bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        // Adapters release their query keys when dropped.
        bindings.active = false;
    }
}

impl<T: fmt::Debug + Clone> fmt::Debug for StoredState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredState")
            .field("id", &self.id)
            .field("value", &self.cell.get())
            .finish()
    }
}

/// Sets the value of a [`StoredState`] from anywhere.
///
/// Behaves exactly like [`StoredState::set`]. Once the activation has ended
/// every call is ignored.
pub struct StoredSetter<T> {
    cell: StateCell<T>,
    bindings: Weak<Mutex<Bindings<T>>>,
}

impl<T: Clone + Send + Sync + 'static> StoredSetter<T> {
    pub fn set(&self, candidate: T) -> bool {
        match self.bindings.upgrade() {
            Some(bindings) => commit(&self.cell, &bindings, candidate),
            None => false,
        }
    }
}

impl<T> Clone for StoredSetter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            bindings: Weak::clone(&self.bindings),
        }
    }
}

impl<T> fmt::Debug for StoredSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSetter")
            .field("active", &(self.bindings.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn host() -> Host {
        Host::in_memory("https://example.com/")
    }

    #[test]
    fn default_is_written_back() {
        let host = host();
        let state = StoredState::activate(
            &host,
            StoredStateOptions::new("home".to_string()).session_storage_key("page"),
        )
        .unwrap();

        assert_eq!(state.get(), "home");
        assert_eq!(state.hydrated_from(), None);
        assert_eq!(host.session_storage().get("page").as_deref(), Some("home"));
    }

    #[test]
    fn query_wins_over_storage() {
        let host = Host::in_memory("https://example.com/?v=Q");
        host.session_storage().set("v", "S");

        let state = StoredState::activate(
            &host,
            StoredStateOptions::new("D".to_string())
                .query_key("v")
                .session_storage_key("v"),
        )
        .unwrap();

        assert_eq!(state.get(), "Q");
        assert_eq!(state.hydrated_from(), Some(SourceKind::Query));
        assert_eq!(host.session_storage().get("v").as_deref(), Some("Q"));
    }

    #[test]
    fn invalid_query_falls_through_to_storage() {
        let host = Host::in_memory("https://example.com/?v=c");
        host.local_storage().set("v", "b");

        let state = StoredState::activate(
            &host,
            StoredStateOptions::new("a".to_string())
                .query_key("v")
                .local_storage_key("v")
                .valid_values(["a".to_string(), "b".to_string()]),
        )
        .unwrap();

        assert_eq!(state.get(), "b");
        assert_eq!(state.hydrated_from(), Some(SourceKind::Persistent));
        assert_eq!(host.query_param("v").as_deref(), Some("b"));
    }

    #[test]
    fn validator_never_sees_missing_values() {
        let host = host();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let state = StoredState::activate(
            &host,
            StoredStateOptions::new(1_i32).query_key("n").validate(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                true
            }),
        )
        .unwrap();

        // Only the default check ran: the query was empty.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.get(), 1);
    }

    #[test]
    fn rejected_update_changes_nothing() {
        let host = host();
        let state = StoredState::activate(
            &host,
            StoredStateOptions::new(10_i32)
                .query_key("n")
                .validate(|v| (0..=100).contains(v)),
        )
        .unwrap();

        assert!(!state.set(120));
        assert_eq!(state.get(), 10);
        assert_eq!(host.query_param("n").as_deref(), Some("10"));
    }

    #[test]
    fn update_and_subscribe() {
        let host = host();
        let state = StoredState::activate(&host, StoredStateOptions::new(0_u32).query_key("n")).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        state.subscribe(move |value| {
            seen_clone.store(*value as usize, Ordering::SeqCst);
        });

        assert!(state.update(|n| *n += 5));
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(host.query_param("n").as_deref(), Some("5"));
    }

    #[test]
    fn setter_outlives_activation_harmlessly() {
        let host = host();
        let state = StoredState::activate(&host, StoredStateOptions::new(false).query_key("on")).unwrap();
        let (value, setter) = state.pair();
        assert!(!value);

        assert!(setter.set(true));
        assert!(state.get());

        state.deactivate();
        assert!(!setter.set(false));
        assert!(state.get());

        drop(state);
        assert!(!setter.set(false));
        assert_eq!(host.query_param("on"), None);
    }

    #[test]
    fn failed_reconfigure_leaves_state_untouched() {
        let host = host();
        let state = StoredState::activate(&host, StoredStateOptions::new(3_i32).query_key("n")).unwrap();

        let err = state
            .reconfigure(StoredStateOptions::new(3).session_storage_key("a").local_storage_key("b"))
            .unwrap_err();
        assert_eq!(err, ConfigError::ConflictingStorageKeys);
        assert_eq!(host.query_param("n").as_deref(), Some("3"));
        assert_eq!(host.registry().consumer_count("n"), 1);
    }

    #[test]
    fn reconfigure_notifies_once_even_when_value_is_unchanged() {
        let host = host();
        let state = StoredState::activate(&host, StoredStateOptions::new(3_i32).query_key("n")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        state.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        state.reconfigure(StoredStateOptions::new(3).query_key("n")).unwrap();
        assert_eq!(state.get(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = state
            .reconfigure(StoredStateOptions::new(3).session_storage_key("a").local_storage_key("b"))
            .unwrap_err();
        assert_eq!(err, ConfigError::ConflictingStorageKeys);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_can_set_from_callback() {
        let host = host();
        let state = StoredState::activate(&host, StoredStateOptions::new(0_i32).query_key("n")).unwrap();
        let setter = state.setter();
        state.subscribe(move |value| {
            if *value % 2 == 1 {
                setter.set(*value + 1);
            }
        });

        assert!(state.set(5));
        assert_eq!(state.get(), 6);
        assert_eq!(host.query_param("n").as_deref(), Some("6"));
    }

    #[test]
    fn reconfigure_rebinds_and_rehydrates() {
        let host = Host::in_memory("https://example.com/?b=7");
        let state = StoredState::activate(&host, StoredStateOptions::new(0_i32).query_key("a")).unwrap();
        assert_eq!(host.query_param("a").as_deref(), Some("0"));

        state
            .reconfigure(StoredStateOptions::new(0).query_key("b").validate(|n| *n < 10))
            .unwrap();
        assert_eq!(state.get(), 7);
        assert_eq!(host.query_param("a"), None);
        assert!(host.registry().is_empty("a"));
        assert_eq!(host.registry().consumer_count("b"), 1);

        assert!(!state.set(12));
        assert!(state.set(8));
        assert_eq!(host.query_param("b").as_deref(), Some("8"));
    }
}
