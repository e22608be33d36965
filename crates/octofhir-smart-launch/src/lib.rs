//! # octofhir-smart-launch
//!
//! SMART on FHIR app launch adapter for browser-hosted form applications.
//!
//! This crate provides:
//! - Launch parameter detection from the current page URL
//! - PKCE-protected authorization through a delegated OAuth 2.0 client library
//! - Launch context retrieval (patient, encounter, user)
//! - A request facade exposing the shape form renderers expect
//! - Token refresh scheduling ahead of access token expiry
//! - Sign-out with session storage and URL cleanup
//!
//! ## Overview
//!
//! The OAuth handshake itself (discovery, PKCE, code exchange, token storage)
//! is performed by the client library behind [`SmartLibrary`]. The library is
//! loaded lazily through [`LazyLibrary`] so hosts that never launch through
//! SMART never pay for it. The browser environment is reached through the
//! [`Location`] and [`SessionStore`] traits.
//!
//! ## Modules
//!
//! - [`params`] - Launch parameter detection
//! - [`library`] - Delegated library capability and lazy handle
//! - [`launch`] - Authorization delegate and [`SmartLauncher`]
//! - [`context`] - Launch context retrieval
//! - [`client`] - Request facade for form renderers
//! - [`refresh`] - Token refresh scheduling
//! - [`signout`] - Session teardown
//! - [`host`] - Host environment traits and in-memory implementations
//! - [`config`] - Client registration and policies
//! - [`error`] - Error types

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod launch;
pub mod library;
pub mod params;
pub mod refresh;
pub mod signout;

pub use client::{DEFAULT_FHIR_VERSION, KnownIds, RequestDescriptor, ResourceStub, SmartFhirClient};
pub use config::{ConfigError, SmartConfig};
pub use context::{FhirContext, get_context};
pub use error::{ErrorCategory, SmartError};
pub use host::{Location, MemoryLocation, MemorySessionStore, SessionStore};
pub use launch::{
    AuthorizeRequest, LaunchOutcome, SmartLauncher, authorize, ensure_ready, smart_base,
};
pub use library::{
    AuthorizeParams, ClientState, FhirRequest, LazyLibrary, LibraryLoader, Method,
    RequestOptions, SmartLibrary, SmartSession, TokenResponse,
};
pub use params::{LaunchParameters, detect_launch_parameters};
pub use refresh::{RefreshHandle, RefreshPolicy, refresh_delay, schedule_refresh};
pub use signout::{SignOutPolicy, clear_session_storage, sign_out, strip_oauth_params};

/// Type alias for SMART launch results.
pub type SmartResult<T> = Result<T, SmartError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use octofhir_smart_launch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::SmartResult;
    pub use crate::client::{KnownIds, RequestDescriptor, SmartFhirClient};
    pub use crate::config::SmartConfig;
    pub use crate::context::FhirContext;
    pub use crate::error::{ErrorCategory, SmartError};
    pub use crate::host::{Location, SessionStore};
    pub use crate::launch::{LaunchOutcome, SmartLauncher};
    pub use crate::library::{FhirRequest, LazyLibrary, SmartLibrary, SmartSession};
    pub use crate::params::LaunchParameters;
    pub use crate::refresh::RefreshHandle;
}
