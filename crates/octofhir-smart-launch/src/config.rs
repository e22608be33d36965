//! SMART launch configuration.
//!
//! Configuration is read from an optional TOML file and `SMART__*`
//! environment variables (e.g. `SMART__CLIENT_ID=my-app`,
//! `SMART__REFRESH__LEAD=2m`), environment taking precedence.

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::refresh::RefreshPolicy;
use crate::signout::SignOutPolicy;

/// Client id registered for the public demo client.
pub const DEFAULT_CLIENT_ID: &str = "lhc-forms-demo-public";

/// Patient-context read access, identity claims and offline refresh.
pub const DEFAULT_SCOPES: &str = "launch/patient openid profile fhirUser patient/*.read offline_access";

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "SMART";

/// Root SMART launch configuration.
///
/// # Example (TOML)
///
/// ```toml
/// client_id = "my-registered-app"
/// default_scopes = "launch openid fhirUser user/*.read"
///
/// [refresh]
/// lead = "2m"
///
/// [sign_out]
/// storage_key_pattern = "smart|fhirclient"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SmartConfig {
    /// Client id registered with the authorization server.
    /// A public (PKCE) client; no secret is configured.
    pub client_id: String,

    /// Redirect URI. When unset, the current page's origin and path are used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Space-delimited scopes requested on authorization.
    pub default_scopes: String,

    /// Token refresh timing.
    pub refresh: RefreshPolicy,

    /// Sign-out cleanup.
    pub sign_out: SignOutPolicy,
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: None,
            default_scopes: DEFAULT_SCOPES.to_string(),
            refresh: RefreshPolicy::default(),
            sign_out: SignOutPolicy::default(),
        }
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl SmartConfig {
    /// Loads configuration from `path` (if given and present) and the
    /// environment, then validates it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if a source cannot be read or deserialized,
    /// or the validation error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            } else {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );

        let config: SmartConfig = builder
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `client_id` or `default_scopes` is
    /// empty, and `ConfigError::InvalidValue` if the redirect URI does not
    /// parse, the storage key pattern does not compile, or the minimum
    /// refresh delay is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("client_id".into()));
        }
        if self.default_scopes.trim().is_empty() {
            return Err(ConfigError::Missing("default_scopes".into()));
        }
        if let Some(uri) = &self.redirect_uri {
            Url::parse(uri)
                .map_err(|e| ConfigError::InvalidValue(format!("redirect_uri '{uri}': {e}")))?;
        }
        if self.refresh.min_delay.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh.min_delay must be greater than zero".into(),
            ));
        }
        self.sign_out.key_matcher().map_err(|e| {
            ConfigError::InvalidValue(format!("sign_out.storage_key_pattern: {e}"))
        })?;
        Ok(())
    }

    /// Redirect URI for authorization: the configured one, or `current`'s
    /// origin and path (query and fragment dropped).
    #[must_use]
    pub fn redirect_uri_for(&self, current: &Url) -> String {
        if let Some(uri) = &self.redirect_uri {
            return uri.clone();
        }
        let mut uri = current.clone();
        uri.set_query(None);
        uri.set_fragment(None);
        uri.to_string()
    }

    /// Requested scopes as individual tokens.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.default_scopes.split_whitespace()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SmartConfig::default();
        config.validate().unwrap();
        assert_eq!(config.client_id, "lhc-forms-demo-public");
        assert!(config.scopes().any(|s| s == "offline_access"));
        assert!(config.scopes().any(|s| s == "launch/patient"));
        assert_eq!(config.refresh.lead, Duration::from_secs(60));
        assert_eq!(config.refresh.min_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_redirect_uri_defaults_to_origin_and_path() {
        let config = SmartConfig::default();
        let current = Url::parse("https://app.example.com/forms/index.html?code=c&state=s#top").unwrap();
        assert_eq!(
            config.redirect_uri_for(&current),
            "https://app.example.com/forms/index.html"
        );
    }

    #[test]
    fn test_redirect_uri_override() {
        let config = SmartConfig {
            redirect_uri: Some("https://app.example.com/callback".into()),
            ..SmartConfig::default()
        };
        let current = Url::parse("https://app.example.com/").unwrap();
        assert_eq!(config.redirect_uri_for(&current), "https://app.example.com/callback");
    }

    #[test]
    fn test_validation_errors() {
        let empty_client = SmartConfig {
            client_id: " ".into(),
            ..SmartConfig::default()
        };
        assert!(matches!(empty_client.validate(), Err(ConfigError::Missing(_))));

        let bad_redirect = SmartConfig {
            redirect_uri: Some("not a url".into()),
            ..SmartConfig::default()
        };
        assert!(matches!(bad_redirect.validate(), Err(ConfigError::InvalidValue(_))));

        let mut bad_pattern = SmartConfig::default();
        bad_pattern.sign_out.storage_key_pattern = "[".into();
        assert!(matches!(bad_pattern.validate(), Err(ConfigError::InvalidValue(_))));

        let mut zero_delay = SmartConfig::default();
        zero_delay.refresh.min_delay = Duration::ZERO;
        assert!(matches!(zero_delay.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_parse_toml() {
        let config: SmartConfig = toml::from_str(
            r#"
            client_id = "my-app"

            [refresh]
            lead = "2m"

            [sign_out]
            strip_params = ["code", "state"]
            "#,
        )
        .unwrap();

        assert_eq!(config.client_id, "my-app");
        assert_eq!(config.default_scopes, DEFAULT_SCOPES);
        assert_eq!(config.refresh.lead, Duration::from_secs(120));
        assert_eq!(config.refresh.min_delay, Duration::from_secs(5));
        assert_eq!(config.sign_out.strip_params, vec!["code", "state"]);
        assert_eq!(config.sign_out.storage_key_pattern, "smart|fhirclient");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "client_id = \"file-client\"").unwrap();
        writeln!(file, "redirect_uri = \"https://app.example.com/launch\"").unwrap();

        let config = SmartConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.client_id, "file-client");
        assert_eq!(
            config.redirect_uri.as_deref(),
            Some("https://app.example.com/launch")
        );
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = SmartConfig::load(Some(Path::new("/nonexistent/smart.toml"))).unwrap();
        assert_eq!(config.default_scopes, DEFAULT_SCOPES);
    }
}
