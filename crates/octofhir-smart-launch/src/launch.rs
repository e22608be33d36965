//! Authorization delegate and launch orchestration.
//!
//! # Flow
//!
//! 1. The EHR (or the user, for a standalone launch) opens the app with
//!    `?iss=...&launch=...`
//! 2. The app calls [`authorize`], which hands off to the library; the library
//!    redirects to the authorization server with a PKCE challenge
//! 3. The authorization server redirects back with `?code=...&state=...`
//! 4. The app calls [`ensure_ready`], which lets the library exchange the code
//!    and returns the established session
//!
//! [`SmartLauncher`] wires these steps to the host environment and the
//! configuration.

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::client::{KnownIds, SmartFhirClient};
use crate::config::SmartConfig;
use crate::context::{FhirContext, get_context};
use crate::host::{Location, SessionStore};
use crate::library::{AuthorizeParams, LazyLibrary, SmartSession};
use crate::params::{LaunchParameters, detect_launch_parameters};
use crate::refresh::{RefreshHandle, schedule_refresh};
use crate::signout::sign_out;
use crate::{SmartError, SmartResult};

/// Arguments of an authorization request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    /// FHIR server base URL. Required.
    pub issuer: Option<String>,
    /// EHR launch token.
    pub launch: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
}

/// Completes a pending redirect handshake or recovers an established session.
///
/// Never fails: a missing library, a failed handshake and the absence of any
/// session all yield `None`.
pub async fn ensure_ready(library: &LazyLibrary) -> Option<Arc<dyn SmartSession>> {
    let library = match library.acquire().await {
        Ok(library) => library,
        Err(e) => {
            tracing::debug!(error = %e, "SMART client library unavailable");
            return None;
        }
    };

    match library.ready().await {
        Ok(session) => {
            tracing::debug!(server = ?session.state().server_url, "SMART session ready");
            Some(session)
        }
        Err(e) => {
            tracing::debug!(error = %e, "no SMART session");
            None
        }
    }
}

/// Starts a PKCE-protected authorization code flow against `request.issuer`.
///
/// # Errors
///
/// Returns `SmartError::MissingIssuer` if the issuer is absent or empty,
/// before the library is touched. Returns `SmartError::DependencyMissing` if
/// the library cannot be acquired, and the library's error if the redirect
/// cannot be started.
pub async fn authorize(library: &LazyLibrary, request: AuthorizeRequest) -> SmartResult<()> {
    let issuer = request
        .issuer
        .filter(|iss| !iss.trim().is_empty())
        .ok_or(SmartError::MissingIssuer)?;

    let library = library.acquire().await?;
    tracing::info!(
        issuer = %issuer,
        ehr_launch = request.launch.is_some(),
        client_id = %request.client_id,
        "starting SMART authorization"
    );

    library
        .authorize(AuthorizeParams {
            iss: issuer,
            launch: request.launch,
            client_id: request.client_id,
            redirect_uri: request.redirect_uri,
            scope: request.scope,
            pkce: true,
        })
        .await
}

/// FHIR server base URL of the session.
#[must_use]
pub fn smart_base(session: &dyn SmartSession) -> Option<String> {
    session
        .state()
        .server_url
        .filter(|url| !url.is_empty())
}

/// Result of [`SmartLauncher::start`].
#[derive(Clone)]
pub enum LaunchOutcome {
    /// A session is established.
    Ready(Arc<dyn SmartSession>),
    /// Authorization was started; the host is navigating to the authorization server.
    Redirecting,
    /// No launch parameters and no recoverable session.
    NoSession,
}

impl LaunchOutcome {
    /// The session, if one is established.
    #[must_use]
    pub fn session(&self) -> Option<&Arc<dyn SmartSession>> {
        match self {
            Self::Ready(session) => Some(session),
            _ => None,
        }
    }
}

impl std::fmt::Debug for LaunchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(session) => f
                .debug_tuple("Ready")
                .field(&session.state().server_url)
                .finish(),
            Self::Redirecting => f.write_str("Redirecting"),
            Self::NoSession => f.write_str("NoSession"),
        }
    }
}

/// SMART launch adapter bound to a host environment and configuration.
pub struct SmartLauncher {
    config: SmartConfig,
    library: Arc<LazyLibrary>,
    location: Arc<dyn Location>,
    storage: Arc<dyn SessionStore>,
}

impl SmartLauncher {
    #[must_use]
    pub fn new(
        config: SmartConfig,
        library: Arc<LazyLibrary>,
        location: Arc<dyn Location>,
        storage: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            library,
            location,
            storage,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SmartConfig {
        &self.config
    }

    /// Launch parameters of the current page.
    #[must_use]
    pub fn launch_parameters(&self) -> LaunchParameters {
        detect_launch_parameters(self.location.as_ref())
    }

    /// Redirect URI for the current page.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        self.config.redirect_uri_for(&self.location.href())
    }

    /// See [`ensure_ready`].
    pub async fn ensure_ready(&self) -> Option<Arc<dyn SmartSession>> {
        ensure_ready(&self.library).await
    }

    /// Authorizes against `issuer` with the configured client id, scopes and
    /// redirect URI.
    ///
    /// # Errors
    ///
    /// See [`authorize`].
    pub async fn authorize(&self, issuer: Option<&str>, launch: Option<&str>) -> SmartResult<()> {
        authorize(
            &self.library,
            AuthorizeRequest {
                issuer: issuer.map(String::from),
                launch: launch.map(String::from),
                client_id: self.config.client_id.clone(),
                redirect_uri: self.redirect_uri(),
                scope: self.config.default_scopes.clone(),
            },
        )
        .await
    }

    /// Decides how to proceed from the current page:
    ///
    /// - on the authorization callback, completes the handshake;
    /// - with an issuer, starts authorization;
    /// - otherwise, tries to recover an existing session.
    ///
    /// # Errors
    ///
    /// Returns an error only if authorization has to be started and fails.
    pub async fn start(&self) -> SmartResult<LaunchOutcome> {
        let params = self.launch_parameters();

        if !params.has_authorization_code {
            if let Some(issuer) = params.issuer.as_deref() {
                self.authorize(Some(issuer), params.launch.as_deref()).await?;
                return Ok(LaunchOutcome::Redirecting);
            }
        }

        Ok(match self.ensure_ready().await {
            Some(session) => LaunchOutcome::Ready(session),
            None => LaunchOutcome::NoSession,
        })
    }

    /// See [`get_context`].
    pub async fn context(&self, session: &dyn SmartSession) -> FhirContext {
        get_context(session).await
    }

    /// Builds a request facade with ids taken from the session's context.
    pub async fn client(&self, session: Arc<dyn SmartSession>) -> SmartFhirClient {
        let ctx = get_context(session.as_ref()).await;
        SmartFhirClient::new(session, KnownIds::from(&ctx))
    }

    /// Schedules token refresh with the configured policy. See [`schedule_refresh`].
    pub fn schedule_refresh<F>(&self, session: Arc<dyn SmartSession>, on_refreshed: F) -> Option<RefreshHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        schedule_refresh(session, &self.config.refresh, on_refreshed)
    }

    /// Signs out and navigates to the cleaned URL. See [`sign_out`].
    pub fn sign_out(&self) -> Url {
        sign_out(self.storage.as_ref(), self.location.as_ref(), &self.config.sign_out)
    }
}

impl std::fmt::Debug for SmartLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartLauncher")
            .field("config", &self.config)
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}
