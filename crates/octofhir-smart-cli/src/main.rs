mod cli;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, ConfigCommands};
use output::print_error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" });

    if let Err(e) = run(cli).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn init_tracing(level: &str) {
    // Prefer RUST_LOG from env, otherwise use the level from --verbose.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.format.unwrap_or_default();
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Inspect(args) => {
            let cfg = config::load(config_path)?;
            commands::launch::inspect(&cfg, &args.url, format).await?;
        }
        Commands::SignOutUrl(args) => {
            let cfg = config::load(config_path)?;
            commands::launch::sign_out_url(&cfg, &args.url)?;
        }
        Commands::RefreshPlan(args) => {
            let cfg = config::load(config_path)?;
            commands::refresh::plan(&cfg, args, format)?;
        }
        Commands::Request(args) => {
            commands::request::normalize(&args.descriptor, format)?;
        }
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => {
                let cfg = config::load(config_path)?;
                print!("{}", toml::to_string_pretty(&cfg)?);
            }
            ConfigCommands::Path => {
                let path = config::resolve_path(config_path)?;
                let state = if path.exists() {
                    "exists".green()
                } else {
                    "not found, using defaults".yellow()
                };
                println!("{} ({state})", path.display());
            }
        },
    }

    Ok(())
}
