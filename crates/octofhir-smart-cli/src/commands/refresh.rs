use anyhow::Result;
use octofhir_smart_launch::refresh::now_unix;
use octofhir_smart_launch::{ClientState, SmartConfig, TokenResponse, refresh_delay};
use serde_json::json;

use crate::cli::{OutputFormat, RefreshPlanArgs};
use crate::output::print_value;

pub fn plan(cfg: &SmartConfig, args: &RefreshPlanArgs, format: OutputFormat) -> Result<()> {
    let now = now_unix();
    let state = ClientState {
        token_response: Some(TokenResponse {
            refresh_token: (!args.no_refresh_token).then(|| "refresh".to_string()),
            expires_in: Some(args.expires_in),
            ..TokenResponse::default()
        }),
        created_at: args.created_at,
        ..ClientState::default()
    };

    let report = match refresh_delay(&state, now, &cfg.refresh) {
        Some(delay) => json!({
            "scheduled": true,
            "delaySeconds": delay.as_secs(),
            "refreshAt": now.saturating_add_unsigned(delay.as_secs()),
            "expiresAt": args.created_at.unwrap_or(now).saturating_add_unsigned(args.expires_in),
        }),
        None => json!({
            "scheduled": false,
            "reason": if args.no_refresh_token { "no refresh token" } else { "no token lifetime" },
        }),
    };
    print_value(&report, format);
    Ok(())
}
