//! Session teardown.
//!
//! Signing out removes the delegated library's state from session storage,
//! strips the OAuth parameters from the current URL, and navigates to the
//! cleaned URL so that every in-memory artifact of the session (including
//! pending refresh timers) is discarded with the page.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::SmartResult;
use crate::host::{Location, SessionStore};

/// Default pattern for session storage keys owned by the SMART library.
pub const DEFAULT_STORAGE_KEY_PATTERN: &str = "smart|fhirclient";

/// Query parameters removed from the URL on sign-out.
pub const OAUTH_QUERY_PARAMS: [&str; 6] = ["iss", "launch", "code", "state", "scope", "aud"];

/// What sign-out removes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SignOutPolicy {
    /// Session storage keys matching this pattern (case-insensitive) are removed.
    pub storage_key_pattern: String,

    /// Query parameters stripped from the URL.
    pub strip_params: Vec<String>,
}

impl Default for SignOutPolicy {
    fn default() -> Self {
        Self {
            storage_key_pattern: DEFAULT_STORAGE_KEY_PATTERN.to_string(),
            strip_params: OAUTH_QUERY_PARAMS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl SignOutPolicy {
    /// Compiles the storage key pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex error if the pattern does not compile.
    pub fn key_matcher(&self) -> Result<Regex, regex::Error> {
        RegexBuilder::new(&self.storage_key_pattern)
            .case_insensitive(true)
            .build()
    }
}

/// Signs out: clears matching session storage keys and navigates to the
/// current URL without OAuth parameters. Returns the URL navigated to.
///
/// Storage failures are logged and skipped; navigation always happens.
pub fn sign_out(
    storage: &dyn SessionStore,
    location: &dyn Location,
    policy: &SignOutPolicy,
) -> Url {
    match clear_session_storage(storage, policy) {
        Ok(removed) => tracing::info!(removed, "cleared SMART session storage"),
        Err(e) => tracing::warn!(error = %e, "could not clear SMART session storage"),
    }

    let target = strip_oauth_params(&location.href(), &policy.strip_params);
    location.assign(&target);
    target
}

/// Removes session storage keys matching the policy's pattern.
/// Returns the number of keys removed.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or storage cannot be enumerated.
/// Failures removing individual keys are logged and skipped.
pub fn clear_session_storage(storage: &dyn SessionStore, policy: &SignOutPolicy) -> SmartResult<usize> {
    let matcher = policy
        .key_matcher()
        .map_err(|e| crate::SmartError::configuration(format!("invalid storage key pattern: {e}")))?;

    let mut removed = 0;
    for key in storage.keys()? {
        if !matcher.is_match(&key) {
            continue;
        }
        match storage.remove_item(&key) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(key = %key, error = %e, "could not remove session storage key"),
        }
    }
    Ok(removed)
}

/// Returns `url` without the given query parameters. A query left empty is
/// dropped entirely. Other parameters keep their order.
#[must_use]
pub fn strip_oauth_params<S: AsRef<str>>(url: &Url, params: &[S]) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !params.iter().any(|p| p.as_ref() == &**key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SmartError;
    use crate::host::{MemoryLocation, MemorySessionStore};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_strip_all_oauth_params() {
        let cleaned = strip_oauth_params(
            &url("https://app.example.com/form/?iss=https://fhir&launch=l&code=c&state=s&scope=x&aud=a"),
            &OAUTH_QUERY_PARAMS,
        );
        assert_eq!(cleaned.as_str(), "https://app.example.com/form/");
    }

    #[test]
    fn test_strip_keeps_unrelated_params() {
        let cleaned = strip_oauth_params(
            &url("https://app.example.com/?q=Form%201&code=c&lang=de#section"),
            &OAUTH_QUERY_PARAMS,
        );
        let keys: Vec<String> = cleaned.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(keys, vec!["q", "lang"]);
        assert_eq!(cleaned.fragment(), Some("section"));
        assert_eq!(
            cleaned.query_pairs().next().map(|(_, v)| v.into_owned()),
            Some("Form 1".to_string())
        );
    }

    #[test]
    fn test_strip_without_query() {
        let original = url("https://app.example.com/index.html");
        assert_eq!(strip_oauth_params(&original, &OAUTH_QUERY_PARAMS), original);
    }

    #[test]
    fn test_sign_out_clears_matching_keys() {
        let storage = MemorySessionStore::new();
        storage.set_item("SMART_KEY", "\"k1\"").unwrap();
        storage.set_item("k1", "{\"serverUrl\":\"https://fhir\"}").unwrap();
        storage.set_item("fhirclient-state", "{}").unwrap();
        storage.set_item("MySmartApp.cache", "{}").unwrap();
        storage.set_item("form-draft", "{}").unwrap();

        let location = MemoryLocation::new(url("https://app.example.com/?code=c&state=s&tab=2"));
        let target = sign_out(&storage, &location, &SignOutPolicy::default());

        let mut keys = storage.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["form-draft".to_string(), "k1".to_string()]);

        assert_eq!(target.as_str(), "https://app.example.com/?tab=2");
        assert_eq!(location.href(), target);
        assert_eq!(location.navigation_count(), 1);
    }

    struct LockedStorage;

    impl SessionStore for LockedStorage {
        fn keys(&self) -> SmartResult<Vec<String>> {
            Err(SmartError::storage("access denied"))
        }

        fn get_item(&self, _: &str) -> SmartResult<Option<String>> {
            Err(SmartError::storage("access denied"))
        }

        fn set_item(&self, _: &str, _: &str) -> SmartResult<()> {
            Err(SmartError::storage("access denied"))
        }

        fn remove_item(&self, _: &str) -> SmartResult<()> {
            Err(SmartError::storage("access denied"))
        }
    }

    #[test]
    fn test_sign_out_navigates_despite_storage_failure() {
        let location = MemoryLocation::new(url("https://app.example.com/?iss=https://fhir&launch=l"));
        let target = sign_out(&LockedStorage, &location, &SignOutPolicy::default());

        assert_eq!(target.as_str(), "https://app.example.com/");
        assert_eq!(location.navigation_count(), 1);
    }

    #[test]
    fn test_invalid_pattern_is_swallowed() {
        let storage = MemorySessionStore::new();
        storage.set_item("SMART_KEY", "x").unwrap();
        let location = MemoryLocation::new(url("https://app.example.com/?code=c"));
        let policy = SignOutPolicy {
            storage_key_pattern: "(".into(),
            ..SignOutPolicy::default()
        };

        let target = sign_out(&storage, &location, &policy);
        assert_eq!(target.as_str(), "https://app.example.com/");
        assert_eq!(storage.len(), 1);

        let err = clear_session_storage(&storage, &policy).unwrap_err();
        assert!(matches!(err, SmartError::Configuration { .. }));
    }
}
