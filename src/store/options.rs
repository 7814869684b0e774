use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::{Codec, ParseFn, SerializeFn};
use crate::error::{ConfigError, Result};

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// The keys a stored state is bound to, under their external names.
///
/// Deserializable so key bindings can live in application configuration:
///
/// ```
/// use stowed::StoreKeys;
///
/// let keys: StoreKeys = serde_json::from_str(r#"{ "queryKey": "tab", "localStorageKey": "last-tab" }"#).unwrap();
/// assert_eq!(keys.query_key.as_deref(), Some("tab"));
/// assert_eq!(keys.session_storage_key, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_storage_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_storage_key: Option<String>,
}

impl StoreKeys {
    /// Check the key combination: at least one key, non-empty keys, and at
    /// most one storage key.
    pub fn check(&self) -> Result<()> {
        if self.query_key.is_none()
            && self.session_storage_key.is_none()
            && self.local_storage_key.is_none()
        {
            return Err(ConfigError::NoKey);
        }
        if self.session_storage_key.is_some() && self.local_storage_key.is_some() {
            return Err(ConfigError::ConflictingStorageKeys);
        }
        for (field, key) in [
            ("queryKey", &self.query_key),
            ("sessionStorageKey", &self.session_storage_key),
            ("localStorageKey", &self.local_storage_key),
        ] {
            if key.as_deref() == Some("") {
                return Err(ConfigError::EmptyKey { field });
            }
        }
        Ok(())
    }
}

/// The active validation strategy.
pub(crate) enum Validation<T> {
    Unrestricted,
    OneOf(Predicate<T>),
    Predicate(Predicate<T>),
}

impl<T> Validation<T> {
    pub(crate) fn accepts(&self, value: &T) -> bool {
        match self {
            Validation::Unrestricted => true,
            Validation::OneOf(check) | Validation::Predicate(check) => check(value),
        }
    }
}

impl<T> fmt::Debug for Validation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Validation::Unrestricted => "Unrestricted",
            Validation::OneOf(_) => "OneOf",
            Validation::Predicate(_) => "Predicate",
        })
    }
}

/// Options after every construction check has passed.
pub(crate) struct ResolvedOptions<T> {
    pub(crate) default_value: T,
    pub(crate) keys: StoreKeys,
    pub(crate) validation: Validation<T>,
    pub(crate) codec: Codec<T>,
}

/// Configuration for a [`StoredState`](crate::StoredState).
///
/// Built from a default value; every other option is optional. The option
/// groups are checked when the state is activated:
///
/// - at least one key, and not both storage keys;
/// - at most one of [`valid_values`](Self::valid_values) and
///   [`validate`](Self::validate);
/// - [`parse`](Self::parse) and [`serialize`](Self::serialize) together or
///   not at all;
/// - the default value must pass validation.
///
/// # Examples
///
/// ```
/// use stowed::StoredStateOptions;
///
/// let options = StoredStateOptions::new("list".to_string())
///     .query_key("view")
///     .local_storage_key("preferred-view")
///     .valid_values(["list".to_string(), "grid".to_string()]);
/// # let _ = options;
/// ```
pub struct StoredStateOptions<T> {
    default_value: T,
    keys: StoreKeys,
    valid_values: Option<Predicate<T>>,
    validate: Option<Predicate<T>>,
    parse: Option<ParseFn<T>>,
    serialize: Option<SerializeFn<T>>,
}

impl<T: Clone + Send + Sync + 'static> StoredStateOptions<T> {
    pub fn new(default_value: T) -> Self {
        Self {
            default_value,
            keys: StoreKeys::default(),
            valid_values: None,
            validate: None,
            parse: None,
            serialize: None,
        }
    }

    /// Bind to the URL query parameter `key`.
    pub fn query_key(mut self, key: impl Into<String>) -> Self {
        self.keys.query_key = Some(key.into());
        self
    }

    /// Bind to session storage under `key`.
    pub fn session_storage_key(mut self, key: impl Into<String>) -> Self {
        self.keys.session_storage_key = Some(key.into());
        self
    }

    /// Bind to persistent storage under `key`.
    pub fn local_storage_key(mut self, key: impl Into<String>) -> Self {
        self.keys.local_storage_key = Some(key.into());
        self
    }

    /// Replace all three keys at once.
    pub fn keys(mut self, keys: StoreKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Only accept values equal to one of `values`.
    pub fn valid_values<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: PartialEq,
    {
        let values: Vec<T> = values.into_iter().collect();
        self.valid_values = Some(Arc::new(move |value: &T| values.contains(value)));
        self
    }

    /// Only accept values for which `predicate` returns `true`.
    pub fn validate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(predicate));
        self
    }

    /// Parse raw stored strings. Requires [`serialize`](Self::serialize).
    pub fn parse<F>(mut self, parse: F) -> Self
    where
        F: Fn(&str) -> Option<T> + Send + Sync + 'static,
    {
        self.parse = Some(Arc::new(parse));
        self
    }

    /// Serialize values for storage. Requires [`parse`](Self::parse).
    pub fn serialize<F>(mut self, serialize: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(serialize));
        self
    }

    /// Set [`parse`](Self::parse) and [`serialize`](Self::serialize)
    /// together.
    pub fn codec<P, S>(self, parse: P, serialize: S) -> Self
    where
        P: Fn(&str) -> Option<T> + Send + Sync + 'static,
        S: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.parse(parse).serialize(serialize)
    }

    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    pub fn store_keys(&self) -> &StoreKeys {
        &self.keys
    }

    /// Run every construction check, in order, before any store is touched.
    pub(crate) fn resolve(self) -> Result<ResolvedOptions<T>> {
        self.keys.check()?;

        let validation = match (self.valid_values, self.validate) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingValidation),
            (Some(check), None) => Validation::OneOf(check),
            (None, Some(check)) => Validation::Predicate(check),
            (None, None) => Validation::Unrestricted,
        };

        let codec = match (self.parse, self.serialize) {
            (Some(parse), Some(serialize)) => Codec::from_parts(parse, serialize),
            (Some(_), None) => return Err(ConfigError::UnpairedCodec { missing: "serialize" }),
            (None, Some(_)) => return Err(ConfigError::UnpairedCodec { missing: "parse" }),
            (None, None) => Codec::for_value(&self.default_value),
        };

        if !validation.accepts(&self.default_value) {
            return Err(ConfigError::InvalidDefault);
        }

        Ok(ResolvedOptions {
            default_value: self.default_value,
            keys: self.keys,
            validation,
            codec,
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for StoredStateOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredStateOptions")
            .field("default_value", &self.default_value)
            .field("keys", &self.keys)
            .field("valid_values", &self.valid_values.is_some())
            .field("validate", &self.validate.is_some())
            .field("parse", &self.parse.is_some())
            .field("serialize", &self.serialize.is_some())
            .finish()
    }
}
