//! SMART launch error types.
//!
//! Errors fall into two groups. Caller misuse (a missing issuer, a malformed
//! request descriptor) is always returned to the caller. Environmental
//! failures (no pending session, an unreachable server, inaccessible session
//! storage) are usually degraded to a safe default by the operation that hits
//! them and only surface here when an operation has no sensible default.

use std::fmt;

/// Errors that can occur while launching or using a SMART on FHIR session.
#[derive(Debug, thiserror::Error)]
pub enum SmartError {
    /// Authorization was requested without an issuer (`iss`) to authorize against.
    #[error("SMART/FHIR base URL (iss) is missing")]
    MissingIssuer,

    /// A request descriptor is neither a resource path nor a request object.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the descriptor was rejected.
        message: String,
    },

    /// The delegated OAuth 2.0 client library could not be acquired.
    #[error("SMART client library is not available: {message}")]
    DependencyMissing {
        /// Description of why the library could not be loaded.
        message: String,
    },

    /// The delegated library reported a failure (network, protocol, no session).
    #[error("SMART client library error: {message}")]
    Library {
        /// Description of the library failure.
        message: String,
    },

    /// Session storage could not be read or written.
    #[error("Session storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// The adapter configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl SmartError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `DependencyMissing` error.
    #[must_use]
    pub fn dependency_missing(message: impl Into<String>) -> Self {
        Self::DependencyMissing {
            message: message.into(),
        }
    }

    /// Creates a new `Library` error.
    #[must_use]
    pub fn library(message: impl Into<String>) -> Self {
        Self::Library {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if the error was caused by how the adapter was called.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::MissingIssuer | Self::InvalidRequest { .. } | Self::Configuration { .. }
        )
    }

    /// Returns `true` if the error reflects an environmental or transient condition.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DependencyMissing { .. } | Self::Library { .. } | Self::Storage { .. }
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingIssuer => ErrorCategory::Configuration,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::DependencyMissing { .. } => ErrorCategory::Dependency,
            Self::Library { .. } => ErrorCategory::Library,
            Self::Storage { .. } => ErrorCategory::Storage,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }
}

/// Categories of SMART launch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or invalid configuration.
    Configuration,
    /// Malformed arguments.
    Validation,
    /// The delegated library is not installed or failed to load.
    Dependency,
    /// Failures reported by the delegated library.
    Library,
    /// Session storage failures.
    Storage,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Validation => write!(f, "validation"),
            Self::Dependency => write!(f, "dependency"),
            Self::Library => write!(f, "library"),
            Self::Storage => write!(f, "storage"),
        }
    }
}
