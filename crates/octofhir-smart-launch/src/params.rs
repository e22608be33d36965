//! Launch parameter detection.
//!
//! A SMART app is entered in one of three ways, each recognisable from the
//! query string of the page it is loaded on:
//!
//! - EHR launch: `?iss=<fhir base>&launch=<opaque token>`
//! - Standalone launch: `?iss=<fhir base>`
//! - Authorization callback: `?code=<authorization code>&state=<state key>`

use serde::{Deserialize, Serialize};
use url::Url;

use crate::host::Location;

/// Query parameter carrying the FHIR server base URL.
pub const PARAM_ISSUER: &str = "iss";

/// Query parameter carrying the opaque EHR launch token.
pub const PARAM_LAUNCH: &str = "launch";

/// Query parameter carrying the authorization code on the redirect callback.
pub const PARAM_CODE: &str = "code";

/// Query parameter carrying the OAuth `state` on the redirect callback.
pub const PARAM_STATE: &str = "state";

/// Launch context derived from the page URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchParameters {
    /// FHIR server base URL (`iss`).
    pub issuer: Option<String>,

    /// Opaque launch token from the EHR (`launch`).
    pub launch: Option<String>,

    /// Whether `code` or `state` is present, i.e. this is the redirect callback.
    pub has_authorization_code: bool,
}

impl LaunchParameters {
    /// Derives launch parameters from a URL. Empty values count as absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use octofhir_smart_launch::LaunchParameters;
    /// use url::Url;
    ///
    /// let url = Url::parse("https://app.example.com/?iss=https%3A%2F%2Ffhir.example.com&launch=xyz").unwrap();
    /// let params = LaunchParameters::from_url(&url);
    /// assert_eq!(params.issuer.as_deref(), Some("https://fhir.example.com"));
    /// assert_eq!(params.launch.as_deref(), Some("xyz"));
    /// assert!(!params.has_authorization_code);
    /// ```
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self {
            issuer: query_param(url, PARAM_ISSUER),
            launch: query_param(url, PARAM_LAUNCH),
            has_authorization_code: query_param(url, PARAM_CODE).is_some()
                || query_param(url, PARAM_STATE).is_some(),
        }
    }

    /// Returns `true` if the page was opened with an issuer to authorize against.
    #[must_use]
    pub fn is_launch(&self) -> bool {
        self.issuer.is_some()
    }

    /// Returns `true` if the launch came from an EHR (carries a launch token).
    #[must_use]
    pub fn is_ehr_launch(&self) -> bool {
        self.issuer.is_some() && self.launch.is_some()
    }
}

/// Detects launch parameters from the host's current location.
#[must_use]
pub fn detect_launch_parameters(location: &dyn Location) -> LaunchParameters {
    LaunchParameters::from_url(&location.href())
}

/// Value of the first occurrence of a query parameter, if non-empty.
fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
