use std::sync::{PoisonError, RwLock};

/// Access to the current document location.
///
/// Implementations wrap whatever the host exposes as "the current URL" and
/// "replace the current history entry".
pub trait LocationStore: Send + Sync {
    /// The current absolute URL, or `None` when there is no addressable
    /// location (server rendering, headless contexts).
    fn href(&self) -> Option<String>;

    /// Replace the current history entry with `href` without navigating.
    fn replace(&self, href: &str);
}

/// An in-memory location, for tests and non-browser hosts.
///
/// # Examples
///
/// ```
/// use stowed::host::{LocationStore, MemoryLocation};
///
/// let location = MemoryLocation::new("https://example.com/?tab=a");
/// location.replace("https://example.com/?tab=b");
/// assert_eq!(location.href().as_deref(), Some("https://example.com/?tab=b"));
/// ```
#[derive(Debug)]
pub struct MemoryLocation {
    href: RwLock<String>,
    replacements: RwLock<usize>,
}

impl MemoryLocation {
    /// Create a location pointing at `href`.
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: RwLock::new(href.into()),
            replacements: RwLock::new(0),
        }
    }

    /// Simulate the user editing the address bar.
    pub fn navigate(&self, href: impl Into<String>) {
        *self.href.write().unwrap_or_else(PoisonError::into_inner) = href.into();
    }

    /// How many times the history entry has been replaced.
    pub fn replacements(&self) -> usize {
        *self.replacements.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocationStore for MemoryLocation {
    fn href(&self) -> Option<String> {
        Some(self.href.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn replace(&self, href: &str) {
        *self.href.write().unwrap_or_else(PoisonError::into_inner) = href.to_string();
        *self.replacements.write().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// A location for contexts with no document: never addressable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationStore for NoLocation {
    fn href(&self) -> Option<String> {
        None
    }

    fn replace(&self, _href: &str) {}
}
