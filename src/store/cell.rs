use std::sync::{Arc, PoisonError, RwLock};

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// The runtime value of a stored state plus its change subscribers.
///
/// Cloning yields another handle to the same value.
pub(crate) struct StateCell<T> {
    state: Arc<RwLock<T>>,
    subscribers: Arc<RwLock<Vec<Subscriber<T>>>>,
}

impl<T: Clone> StateCell<T> {
    pub(crate) fn new(initial: T) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial)),
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub(crate) fn get(&self) -> T {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the value without notifying anyone.
    pub(crate) fn replace(&self, value: T) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    pub(crate) fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Call every subscriber with the current value.
    ///
    /// No lock is held while callbacks run, so a callback may subscribe or
    /// set again. Subscribers added during a round are first called on the
    /// next one.
    pub(crate) fn notify(&self) {
        let state = self.get();
        let subscribers: Vec<Subscriber<T>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in &subscribers {
            subscriber(&state);
        }
    }

    pub(crate) fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&*state)
    }
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn replace_is_silent_until_notify() {
        let cell = StateCell::new(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        cell.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.replace(2);
        assert_eq!(cell.get(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cell.notify();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_may_subscribe_during_notify() {
        let cell = StateCell::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let inner_cell = cell.clone();
        let inner_calls = calls.clone();
        cell.subscribe(move |_| {
            let calls = inner_calls.clone();
            inner_cell.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        });

        cell.notify();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cell.notify();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clones_share_state() {
        let cell = StateCell::new("a".to_string());
        let other = cell.clone();
        other.replace("b".to_string());
        assert_eq!(cell.read(|s| s.len()), 1);
        assert_eq!(cell.get(), "b");
    }
}
