use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "octofhir-smart")]
#[command(about = "Inspect SMART on FHIR app launches, refresh timing and sign-out")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the SMART launch config file (defaults to ~/.octofhir/smart.toml)
    #[arg(short, long, global = true, env = "OCTOFHIR_SMART_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show launch parameters, redirect URI and next step for a page URL
    Inspect(InspectArgs),
    /// Show the URL a page navigates to on sign-out
    SignOutUrl(SignOutUrlArgs),
    /// Compute when a token would be refreshed
    RefreshPlan(RefreshPlanArgs),
    /// Normalize a request descriptor (path or JSON request object)
    Request(RequestArgs),
    /// Manage SMART launch configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct InspectArgs {
    /// Page URL (e.g. https://app.example.com/?iss=...&launch=...)
    pub url: String,
}

#[derive(clap::Args)]
pub struct SignOutUrlArgs {
    /// Page URL
    pub url: String,
}

#[derive(clap::Args)]
pub struct RefreshPlanArgs {
    /// Access token lifetime in seconds
    #[arg(long)]
    pub expires_in: u64,
    /// When the token was issued (unix seconds, defaults to now)
    #[arg(long)]
    pub created_at: Option<i64>,
    /// Treat the session as having no refresh token
    #[arg(long)]
    pub no_refresh_token: bool,
}

#[derive(clap::Args)]
pub struct RequestArgs {
    /// Resource path (e.g. Patient/123) or JSON request object
    pub descriptor: String,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective config (file plus SMART__* environment)
    Show,
    /// Show where the config file is read from
    Path,
}
