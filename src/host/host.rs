use std::fmt;
use std::sync::Arc;

use url::Url;

use super::location::{LocationStore, MemoryLocation, NoLocation};
use super::storage::{KeyValueStore, MemoryStorage, NoStorage};
use crate::runtime::ConsumerRegistry;

/// The capabilities of the environment a stored state runs in.
///
/// A host bundles the current location, the session and persistent storage
/// areas, and the consumer registry shared by every activation bound to that
/// location. Cloning a host is cheap and yields a handle to the same
/// environment.
///
/// # Examples
///
/// ```
/// use stowed::host::Host;
///
/// let host = Host::in_memory("https://example.com/?tab=a+b");
/// assert_eq!(host.query_param("tab").as_deref(), Some("a b"));
///
/// host.set_query_param("page", "2");
/// assert_eq!(host.href().as_deref(), Some("https://example.com/?tab=a+b&page=2"));
/// ```
#[derive(Clone)]
pub struct Host {
    location: Arc<dyn LocationStore>,
    session: Arc<dyn KeyValueStore>,
    local: Arc<dyn KeyValueStore>,
    registry: Arc<ConsumerRegistry>,
}

impl Host {
    /// Bind real capabilities. Uses the process-wide consumer registry.
    pub fn new(
        location: Arc<dyn LocationStore>,
        session: Arc<dyn KeyValueStore>,
        local: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            location,
            session,
            local,
            registry: ConsumerRegistry::global(),
        }
    }

    /// A self-contained in-memory environment starting at `href`, with
    /// empty storage and its own registry.
    pub fn in_memory(href: impl Into<String>) -> Self {
        Self {
            location: Arc::new(MemoryLocation::new(href)),
            session: Arc::new(MemoryStorage::new()),
            local: Arc::new(MemoryStorage::new()),
            registry: ConsumerRegistry::new(),
        }
    }

    /// An environment with no document: every read is `None`, every write
    /// is dropped.
    pub fn detached() -> Self {
        Self {
            location: Arc::new(NoLocation),
            session: Arc::new(NoStorage),
            local: Arc::new(NoStorage),
            registry: ConsumerRegistry::new(),
        }
    }

    /// Use `registry` instead of the current one.
    pub fn with_registry(mut self, registry: Arc<ConsumerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn location(&self) -> &Arc<dyn LocationStore> {
        &self.location
    }

    pub fn session_storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.session
    }

    pub fn local_storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.local
    }

    pub fn registry(&self) -> &Arc<ConsumerRegistry> {
        &self.registry
    }

    /// The current URL, if the host has one.
    pub fn href(&self) -> Option<String> {
        self.location.href()
    }

    /// Whether the host has an addressable location.
    pub fn has_location(&self) -> bool {
        self.current_url().is_some()
    }

    /// First value of the query parameter `key`, decoded.
    pub fn query_param(&self, key: &str) -> Option<String> {
        let url = self.current_url()?;
        url.query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    /// Set the query parameter `key` to `value` and replace the current
    /// history entry.
    ///
    /// The first occurrence keeps its position and any duplicates are
    /// dropped; a missing parameter is appended.
    pub fn set_query_param(&self, key: &str, value: &str) {
        let Some(mut url) = self.current_url() else {
            return;
        };
        let mut pairs = query_pairs(&url);
        match pairs.iter().position(|(name, _)| name == key) {
            Some(index) => {
                pairs[index].1 = value.to_string();
                let mut seen = false;
                pairs.retain(|(name, _)| {
                    if name != key {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => pairs.push((key.to_string(), value.to_string())),
        }
        write_pairs(&mut url, &pairs);
        self.location.replace(url.as_str());
    }

    /// Remove every occurrence of the query parameter `key` and replace the
    /// current history entry. A query left empty drops the `?`.
    pub fn remove_query_param(&self, key: &str) {
        let Some(mut url) = self.current_url() else {
            return;
        };
        let mut pairs = query_pairs(&url);
        let before = pairs.len();
        pairs.retain(|(name, _)| name != key);
        if pairs.len() == before {
            return;
        }
        write_pairs(&mut url, &pairs);
        self.location.replace(url.as_str());
    }

    fn current_url(&self) -> Option<Url> {
        let href = self.location.href()?;
        match Url::parse(&href) {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(%href, %err, "current location is not a valid URL");
                None
            }
        }
    }
}

fn query_pairs(url: &Url) -> Vec<(String, String)> {
    url.query_pairs()
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect()
}

fn write_pairs(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("href", &self.location.href())
            .field("session", &self.session.is_available())
            .field("local", &self.local.is_available())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_occurrence() {
        let host = Host::in_memory("https://example.com/?tab=a&tab=b");
        assert_eq!(host.query_param("tab").as_deref(), Some("a"));
        assert_eq!(host.query_param("missing"), None);
    }

    #[test]
    fn set_replaces_in_place_and_drops_duplicates() {
        let host = Host::in_memory("https://example.com/path?tab=a&page=1&tab=b#top");
        host.set_query_param("tab", "c d");
        assert_eq!(
            host.href().as_deref(),
            Some("https://example.com/path?tab=c+d&page=1#top")
        );
    }

    #[test]
    fn set_appends_missing_parameter() {
        let host = Host::in_memory("https://example.com/");
        host.set_query_param("q", "a&b=c");
        assert_eq!(host.query_param("q").as_deref(), Some("a&b=c"));
        assert_eq!(host.href().as_deref(), Some("https://example.com/?q=a%26b%3Dc"));
    }

    #[test]
    fn removing_last_parameter_drops_question_mark() {
        let host = Host::in_memory("https://example.com/?tab=a");
        host.remove_query_param("tab");
        assert_eq!(host.href().as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn removing_absent_parameter_leaves_history_alone() {
        let location = Arc::new(MemoryLocation::new("https://example.com/?tab=a"));
        let host = Host::new(
            location.clone(),
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
        )
        .with_registry(ConsumerRegistry::new());

        host.remove_query_param("page");
        assert_eq!(location.replacements(), 0);
        host.remove_query_param("tab");
        assert_eq!(location.replacements(), 1);
    }

    #[test]
    fn malformed_location_counts_as_no_location() {
        let host = Host::in_memory("not a url");
        assert!(!host.has_location());
        assert_eq!(host.query_param("tab"), None);
        host.set_query_param("tab", "a");
        assert_eq!(host.href().as_deref(), Some("not a url"));
    }

    #[test]
    fn detached_host_is_inert() {
        let host = Host::detached();
        assert!(!host.has_location());
        host.set_query_param("tab", "a");
        assert_eq!(host.href(), None);
        assert!(!host.session_storage().is_available());
    }
}
