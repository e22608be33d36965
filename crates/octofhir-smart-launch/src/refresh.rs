//! Background access token refresh.
//!
//! The access token is renewed shortly before it expires. Each renewal is a
//! one-shot timer: it sleeps until `lead` before the expiry computed from the
//! current token response, refreshes, and re-arms from the new token response.
//! A failed refresh ends the chain; there is no retry.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::library::{ClientState, SmartSession};

/// Timing of the refresh chain.
///
/// # Example (TOML)
///
/// ```toml
/// [refresh]
/// lead = "60s"
/// min_delay = "5s"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshPolicy {
    /// How long before expiry to refresh.
    #[serde(with = "humantime_serde")]
    pub lead: Duration,

    /// Lower bound on the delay, so that skewed clocks and already expired
    /// tokens do not produce a zero or negative delay.
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            lead: Duration::from_secs(60),
            min_delay: Duration::from_secs(5),
        }
    }
}

/// Current unix time in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Delay until the next refresh, or `None` if the session cannot be refreshed
/// (no refresh token or no token lifetime).
///
/// The expiry is `created_at + expires_in`, with `created_at` defaulting to
/// `now` when the library did not record it.
#[must_use]
pub fn refresh_delay(state: &ClientState, now: i64, policy: &RefreshPolicy) -> Option<Duration> {
    let token = state.token_response.as_ref()?;
    token.refresh_token()?;
    let expires_in = i64::try_from(token.expires_in()?).unwrap_or(i64::MAX);

    let created_at = state.created_at.unwrap_or(now);
    let expiry = created_at.saturating_add(expires_in);
    let lead = i64::try_from(policy.lead.as_secs()).unwrap_or(i64::MAX);
    let min_delay = i64::try_from(policy.min_delay.as_secs()).unwrap_or(i64::MAX);

    let delay = expiry.saturating_sub(now).saturating_sub(lead).max(min_delay);
    Some(Duration::from_secs(delay.unsigned_abs()))
}

/// Handle of a running refresh chain.
///
/// Dropping the handle leaves the chain running; it ends on the first
/// failed refresh, when the session stops being refreshable, or on
/// [`RefreshHandle::cancel`].
#[derive(Debug)]
pub struct RefreshHandle {
    first_delay: Duration,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Delay before the first refresh.
    #[must_use]
    pub fn first_delay(&self) -> Duration {
        self.first_delay
    }

    /// Returns `true` once the chain has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the chain.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

/// Schedules token refresh for `session`.
///
/// Returns `None` without scheduling anything if the session has no refresh
/// token or no token lifetime. `on_refreshed` runs after every successful
/// refresh. Each call starts an independent chain.
///
/// Outside a tokio runtime nothing is scheduled and `None` is returned.
pub fn schedule_refresh<F>(
    session: Arc<dyn SmartSession>,
    policy: &RefreshPolicy,
    on_refreshed: F,
) -> Option<RefreshHandle>
where
    F: Fn() + Send + Sync + 'static,
{
    let first_delay = refresh_delay(&session.state(), now_unix(), policy)?;
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(error = %e, "token refresh not scheduled: no tokio runtime");
            return None;
        }
    };
    let policy = policy.clone();

    tracing::debug!(delay_secs = first_delay.as_secs(), "token refresh scheduled");

    let task = runtime.spawn(async move {
        let mut delay = first_delay;
        loop {
            tokio::time::sleep(delay).await;

            if let Err(e) = session.refresh().await {
                tracing::warn!(error = %e, "SMART token refresh failed");
                return;
            }
            on_refreshed();

            match refresh_delay(&session.state(), now_unix(), &policy) {
                Some(next) => {
                    tracing::debug!(delay_secs = next.as_secs(), "token refreshed, next refresh scheduled");
                    delay = next;
                }
                None => {
                    tracing::debug!("token refreshed, session no longer refreshable");
                    return;
                }
            }
        }
    });

    Some(RefreshHandle { first_delay, task })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::library::{FhirRequest, RequestOptions, TokenResponse};
    use crate::{SmartError, SmartResult};

    fn state(refresh_token: Option<&str>, expires_in: Option<u64>, created_at: Option<i64>) -> ClientState {
        ClientState {
            server_url: Some("https://fhir.example.com".into()),
            token_response: Some(TokenResponse {
                access_token: Some("access".into()),
                refresh_token: refresh_token.map(String::from),
                expires_in,
                ..TokenResponse::default()
            }),
            created_at,
            scope: None,
        }
    }

    #[test]
    fn test_delay_one_hour_token() {
        let now = 1_700_000_000;
        let delay = refresh_delay(&state(Some("r"), Some(3600), Some(now)), now, &RefreshPolicy::default());
        assert_eq!(delay, Some(Duration::from_millis((3600 - 60) * 1000)));
    }

    #[test]
    fn test_delay_floor_for_short_token() {
        let now = 1_700_000_000;
        let delay = refresh_delay(&state(Some("r"), Some(30), Some(now)), now, &RefreshPolicy::default());
        assert_eq!(delay, Some(Duration::from_millis(5 * 1000)));
    }

    #[test]
    fn test_delay_floor_for_expired_token() {
        let now = 1_700_000_000;
        let delay = refresh_delay(
            &state(Some("r"), Some(3600), Some(now - 7200)),
            now,
            &RefreshPolicy::default(),
        );
        assert_eq!(delay, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_delay_accounts_for_token_age() {
        let now = 1_700_000_000;
        let delay = refresh_delay(
            &state(Some("r"), Some(3600), Some(now - 600)),
            now,
            &RefreshPolicy::default(),
        );
        assert_eq!(delay, Some(Duration::from_secs(3600 - 600 - 60)));
    }

    #[test]
    fn test_missing_created_at_means_now() {
        let now = 1_700_000_000;
        let delay = refresh_delay(&state(Some("r"), Some(300), None), now, &RefreshPolicy::default());
        assert_eq!(delay, Some(Duration::from_secs(240)));
    }

    #[test]
    fn test_not_refreshable() {
        let policy = RefreshPolicy::default();
        assert!(refresh_delay(&state(None, Some(3600), None), 0, &policy).is_none());
        assert!(refresh_delay(&state(Some("r"), None, None), 0, &policy).is_none());
        assert!(refresh_delay(&state(Some("r"), Some(0), None), 0, &policy).is_none());
        assert!(refresh_delay(&ClientState::default(), 0, &policy).is_none());
    }

    #[test]
    fn test_custom_policy() {
        let policy = RefreshPolicy {
            lead: Duration::from_secs(300),
            min_delay: Duration::from_secs(30),
        };
        let now = 1_000;
        assert_eq!(
            refresh_delay(&state(Some("r"), Some(3600), Some(now)), now, &policy),
            Some(Duration::from_secs(3300))
        );
        assert_eq!(
            refresh_delay(&state(Some("r"), Some(60), Some(now)), now, &policy),
            Some(Duration::from_secs(30))
        );
    }

    /// Session whose refresh outcomes are scripted; a successful refresh
    /// renews `created_at` to the current time.
    struct ScriptedSession {
        state: Mutex<ClientState>,
        outcomes: Mutex<Vec<bool>>,
        refreshes: AtomicUsize,
    }

    impl ScriptedSession {
        fn new(expires_in: u64, outcomes: Vec<bool>) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(state(Some("r"), Some(expires_in), Some(now_unix()))),
                outcomes: Mutex::new(outcomes),
                refreshes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SmartSession for ScriptedSession {
        fn state(&self) -> ClientState {
            self.state.lock().unwrap().clone()
        }

        async fn patient_id(&self) -> SmartResult<Option<String>> {
            Ok(None)
        }

        async fn encounter_id(&self) -> SmartResult<Option<String>> {
            Ok(None)
        }

        async fn fhir_user(&self) -> SmartResult<Option<String>> {
            Ok(None)
        }

        async fn request(&self, _: FhirRequest, _: RequestOptions) -> SmartResult<Value> {
            Ok(Value::Null)
        }

        async fn refresh(&self) -> SmartResult<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            let succeed = {
                let mut outcomes = self.outcomes.lock().unwrap();
                if outcomes.is_empty() { false } else { outcomes.remove(0) }
            };
            if succeed {
                self.state.lock().unwrap().created_at = Some(now_unix());
                Ok(())
            } else {
                Err(SmartError::library("invalid_grant"))
            }
        }
    }

    #[tokio::test]
    async fn test_schedule_without_refresh_token_returns_none() {
        let session: Arc<dyn SmartSession> = Arc::new(ScriptedSession {
            state: Mutex::new(state(None, Some(3600), Some(now_unix()))),
            outcomes: Mutex::new(Vec::new()),
            refreshes: AtomicUsize::new(0),
        });
        assert!(schedule_refresh(session, &RefreshPolicy::default(), || {}).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_renews_until_failure() {
        let session = ScriptedSession::new(30, vec![true, true, false]);
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);

        let handle = schedule_refresh(session.clone(), &RefreshPolicy::default(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(handle.first_delay(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert_eq!(session.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;

        // Two successes then a terminal failure; no further attempts.
        assert_eq!(session.refreshes.load(Ordering::SeqCst), 3);
        assert_eq!(notified.load(Ordering::SeqCst), 2);
        assert!(handle.is_finished());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(session.refreshes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_chain() {
        let session = ScriptedSession::new(3600, vec![true]);
        let handle = schedule_refresh(session.clone(), &RefreshPolicy::default(), || {}).unwrap();
        // Session creation and scheduling read the wall clock separately.
        let first = handle.first_delay().as_secs();
        assert!((3539..=3540).contains(&first), "first delay {first}s");

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(4000)).await;
        tokio::task::yield_now().await;

        assert_eq!(session.refreshes.load(Ordering::SeqCst), 0);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_schedule_outside_runtime_returns_none() {
        let session = ScriptedSession::new(3600, vec![true]);
        assert!(schedule_refresh(session.clone(), &RefreshPolicy::default(), || {}).is_none());
        assert_eq!(session.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_chains() {
        let session = ScriptedSession::new(30, vec![true, true]);
        let first = schedule_refresh(session.clone(), &RefreshPolicy::default(), || {}).unwrap();
        let second = schedule_refresh(session.clone(), &RefreshPolicy::default(), || {}).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert_eq!(session.refreshes.load(Ordering::SeqCst), 2);
        first.cancel();
        second.cancel();
    }
}
