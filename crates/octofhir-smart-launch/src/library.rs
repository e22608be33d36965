//! Delegated SMART on FHIR client library.
//!
//! PKCE, token exchange, token refresh, session persistence and the FHIR
//! REST transport are all owned by an external OAuth 2.0 client library.
//! This module describes the capability the adapter needs from that library
//! ([`SmartLibrary`], [`SmartSession`]) and how the library handle is
//! acquired ([`LazyLibrary`]).
//!
//! # Session state
//!
//! The session state is owned by the library and its shape depends on the
//! authorization flow that produced it: a standalone launch without
//! `offline_access` has no refresh token, a launch without `launch/patient`
//! has no patient. Every field of [`ClientState`] and [`TokenResponse`] is
//! therefore optional.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::{SmartError, SmartResult};

// ============================================================================
// Session State
// ============================================================================

/// Token endpoint response as retained by the library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenResponse {
    /// Bearer token for FHIR requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Refresh token, present when `offline_access` or `online_access` was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Access token lifetime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Granted scopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Patient in context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,

    /// Encounter in context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter: Option<String>,

    /// OpenID Connect identity token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenResponse {
    /// Returns the refresh token if one was issued and is non-empty.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Returns the token lifetime if one was reported and is non-zero.
    #[must_use]
    pub fn expires_in(&self) -> Option<u64> {
        self.expires_in.filter(|secs| *secs > 0)
    }
}

/// Snapshot of the library's session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientState {
    /// FHIR server base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Last token response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_response: Option<TokenResponse>,

    /// When the token response was received (unix seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    /// Requested scopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

// ============================================================================
// Requests
// ============================================================================

/// HTTP method of a FHIR request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Returns the method name in upper case.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = SmartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(SmartError::invalid_request(format!(
                "unsupported HTTP method: {other}"
            ))),
        }
    }
}

impl TryFrom<String> for Method {
    type Error = SmartError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.as_str().to_string()
    }
}

/// A normalized FHIR request handed to the library.
///
/// `url` is either relative to the FHIR base (`Patient/123`, `metadata`)
/// or absolute; resolving it is the library's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FhirRequest {
    pub url: String,

    #[serde(default)]
    pub method: Method,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl FhirRequest {
    /// A GET request for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Response shaping options passed with every request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Return Bundle entries as a flat array of resources instead of the Bundle.
    pub flat: bool,
}

/// Parameters of an authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeParams {
    /// FHIR server base URL to authorize against.
    pub iss: String,
    /// EHR launch token, absent for standalone launches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    /// Use the PKCE-protected authorization code flow.
    pub pkce: bool,
}

// ============================================================================
// Library Capability
// ============================================================================

/// Entry points of the delegated OAuth 2.0 client library.
#[async_trait]
pub trait SmartLibrary: Send + Sync {
    /// Completes a pending redirect handshake or recovers an established session.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no pending handshake and no stored session,
    /// or if completing the handshake fails.
    async fn ready(&self) -> SmartResult<Arc<dyn SmartSession>>;

    /// Starts the authorization redirect. On a browser host this navigates away
    /// from the current page.
    ///
    /// # Errors
    ///
    /// Returns an error if the server's SMART configuration cannot be discovered
    /// or the redirect cannot be started.
    async fn authorize(&self, params: AuthorizeParams) -> SmartResult<()>;
}

/// An established SMART session.
#[async_trait]
pub trait SmartSession: Send + Sync {
    /// Current session state snapshot.
    fn state(&self) -> ClientState;

    /// Patient in context.
    async fn patient_id(&self) -> SmartResult<Option<String>>;

    /// Encounter in context.
    async fn encounter_id(&self) -> SmartResult<Option<String>>;

    /// Authenticated user as a FHIR reference (e.g. `Practitioner/123`).
    async fn fhir_user(&self) -> SmartResult<Option<String>>;

    /// Performs an authenticated FHIR request.
    async fn request(&self, request: FhirRequest, options: RequestOptions) -> SmartResult<Value>;

    /// Exchanges the refresh token for a new access token.
    async fn refresh(&self) -> SmartResult<()>;
}

// ============================================================================
// Lazy Library Handle
// ============================================================================

/// Async loader producing the library, or `None` if it is not installed.
pub type LibraryLoader =
    Box<dyn Fn() -> BoxFuture<'static, Option<Arc<dyn SmartLibrary>>> + Send + Sync>;

static GLOBAL_LIBRARY: OnceLock<LazyLibrary> = OnceLock::new();
static UNAVAILABLE_LIBRARY: OnceLock<LazyLibrary> = OnceLock::new();

/// Deferred, memoized handle to the delegated library.
///
/// The loader runs on first acquisition. A successful load is cached for the
/// lifetime of the handle; a failed load is not, so a later acquisition tries
/// again.
pub struct LazyLibrary {
    cell: OnceCell<Arc<dyn SmartLibrary>>,
    loader: Option<LibraryLoader>,
}

impl LazyLibrary {
    /// Creates a handle that loads the library with `loader` on first use.
    #[must_use]
    pub fn new(loader: LibraryLoader) -> Self {
        Self {
            cell: OnceCell::new(),
            loader: Some(loader),
        }
    }

    /// Creates a handle around an already constructed library.
    #[must_use]
    pub fn ready(library: Arc<dyn SmartLibrary>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(library)),
            loader: None,
        }
    }

    /// Creates a handle whose acquisition always fails with `DependencyMissing`.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            cell: OnceCell::new(),
            loader: None,
        }
    }

    /// Installs the process-wide handle. Returns `false` if one is already installed.
    pub fn install_global(loader: LibraryLoader) -> bool {
        GLOBAL_LIBRARY.set(Self::new(loader)).is_ok()
    }

    /// The process-wide handle; unavailable until [`LazyLibrary::install_global`] is called.
    #[must_use]
    pub fn global() -> &'static LazyLibrary {
        // Never store the fallback in GLOBAL_LIBRARY, so a later install still wins.
        GLOBAL_LIBRARY
            .get()
            .unwrap_or_else(|| UNAVAILABLE_LIBRARY.get_or_init(Self::unavailable))
    }

    /// Returns `true` once the library has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Acquires the library, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns `SmartError::DependencyMissing` if no loader is configured or
    /// the loader cannot produce the library.
    pub async fn acquire(&self) -> SmartResult<Arc<dyn SmartLibrary>> {
        let library = self
            .cell
            .get_or_try_init(|| async {
                let loader = self.loader.as_ref().ok_or_else(|| {
                    SmartError::dependency_missing("no SMART client library is installed")
                })?;
                tracing::debug!("loading SMART client library");
                loader().await.ok_or_else(|| {
                    SmartError::dependency_missing("SMART client library failed to load")
                })
            })
            .await?;
        Ok(Arc::clone(library))
    }
}

impl fmt::Debug for LazyLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyLibrary")
            .field("loaded", &self.is_loaded())
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}
