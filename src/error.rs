//! Configuration errors raised when a stored state is activated.

use thiserror::Error;

/// Errors returned by [`StoredState::activate`](crate::StoredState::activate)
/// and [`StoredState::reconfigure`](crate::StoredState::reconfigure).
///
/// Only configuration problems are errors. Unusable stored values and
/// rejected updates are not reported here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// None of the three keys was set.
    #[error("no key provided: set at least one of queryKey, sessionStorageKey or localStorageKey")]
    NoKey,

    /// Both storage keys were set.
    #[error("mutually exclusive storage keys: sessionStorageKey and localStorageKey cannot both be set")]
    ConflictingStorageKeys,

    /// A key was set to an empty string.
    #[error("{field} must be a non-empty string")]
    EmptyKey {
        /// External name of the offending option.
        field: &'static str,
    },

    /// Both validation strategies were set.
    #[error("validValues and validate cannot both be set")]
    ConflictingValidation,

    /// Only one half of the codec was supplied.
    #[error("parse and serialize must be provided together (missing {missing})")]
    UnpairedCodec {
        /// External name of the missing option.
        missing: &'static str,
    },

    /// The default value does not pass the configured validation.
    #[error("default value invalid: it does not pass validation")]
    InvalidDefault,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
