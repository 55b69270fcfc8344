//! Shared error taxonomy for the Ferrite plugin/service framework.
//!
//! Every crate in the workspace wraps [`CoreError`] into its own
//! `thiserror` enum rather than inventing a parallel set of variants —
//! see `ferrite_registry::error::RegistryError` and
//! `ferrite_configadmin::error::ConfigAdminError`.

use thiserror::Error;

/// Errors raised by the foundation layer: version parsing, filter parsing,
/// and property-map construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed input that can never be made valid by retrying: an empty
    /// service-class list, duplicate property keys under case-insensitive
    /// comparison, a PID/class mismatch, or a rejected version/filter literal.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was attempted on an object in a state that forbids it:
    /// an unregistered registration, an unopened tracker, a closed
    /// framework, or a comparison involving the undefined version sentinel.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// LDAP filter parsing failed. The message reproduces one of the five
    /// diagnostics named in the filter grammar: `Null query`,
    /// `Trailing garbage '<rest>'`, `Unexpected end of query`,
    /// `Malformed query`, `Undefined operator`.
    #[error("{0}")]
    FilterParse(String),
}

impl CoreError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn filter_parse(msg: impl Into<String>) -> Self {
        Self::FilterParse(msg.into())
    }
}

/// Result type aliased to [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;
