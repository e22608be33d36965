use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use octofhir_smart_launch::{
    AuthorizeParams, LaunchOutcome, LazyLibrary, MemoryLocation, MemorySessionStore, SmartConfig,
    SmartError, SmartLauncher, SmartLibrary, SmartResult, SmartSession,
};
use serde_json::json;
use url::Url;

use crate::cli::OutputFormat;
use crate::output::{print_success, print_value};

/// Library stand-in that records the authorization it would start.
#[derive(Default)]
struct DryRunLibrary {
    authorized: Mutex<Option<AuthorizeParams>>,
}

#[async_trait]
impl SmartLibrary for DryRunLibrary {
    async fn ready(&self) -> SmartResult<Arc<dyn SmartSession>> {
        Err(SmartError::library("no stored session in a dry run"))
    }

    async fn authorize(&self, params: AuthorizeParams) -> SmartResult<()> {
        let mut slot = self
            .authorized
            .lock()
            .map_err(|_| SmartError::library("dry run state poisoned"))?;
        *slot = Some(params);
        Ok(())
    }
}

fn launcher_for(cfg: &SmartConfig, url: &str, library: Arc<dyn SmartLibrary>) -> Result<SmartLauncher> {
    let url = Url::parse(url).with_context(|| format!("Invalid page URL: {url}"))?;
    Ok(SmartLauncher::new(
        cfg.clone(),
        Arc::new(LazyLibrary::ready(library)),
        Arc::new(MemoryLocation::new(url)),
        Arc::new(MemorySessionStore::new()),
    ))
}

pub async fn inspect(cfg: &SmartConfig, url: &str, format: OutputFormat) -> Result<()> {
    let library = Arc::new(DryRunLibrary::default());
    let launcher = launcher_for(cfg, url, library.clone())?;
    let params = launcher.launch_parameters();

    let kind = if params.has_authorization_code {
        "authorization callback"
    } else if params.is_ehr_launch() {
        "EHR launch"
    } else if params.is_launch() {
        "standalone launch"
    } else {
        "no launch"
    };

    let next_step = match launcher.start().await? {
        LaunchOutcome::Redirecting => "authorize",
        LaunchOutcome::Ready(_) => "ready",
        LaunchOutcome::NoSession if params.has_authorization_code => "complete code exchange",
        LaunchOutcome::NoSession => "recover stored session",
    };

    let authorize = library
        .authorized
        .lock()
        .ok()
        .and_then(|slot| slot.clone())
        .map(serde_json::to_value)
        .transpose()?;

    let report = json!({
        "launchKind": kind,
        "issuer": params.issuer,
        "launch": params.launch,
        "hasAuthorizationCode": params.has_authorization_code,
        "redirectUri": launcher.redirect_uri(),
        "nextStep": next_step,
    });

    match format {
        OutputFormat::Table => {
            print_value(&report, format);
            if let Some(authorize) = &authorize {
                println!("{}", "Authorization request".cyan());
                print_value(authorize, format);
            }
        }
        OutputFormat::Json => {
            let mut report = report;
            report["authorize"] = authorize.unwrap_or_default();
            print_value(&report, format);
        }
    }
    Ok(())
}

pub fn sign_out_url(cfg: &SmartConfig, url: &str) -> Result<()> {
    let launcher = launcher_for(cfg, url, Arc::new(DryRunLibrary::default()))?;
    let target = launcher.sign_out();
    print_success(&format!("Sign-out navigates to {target}"));
    Ok(())
}
