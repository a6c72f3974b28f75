// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Palaver - a multi-tenant WhatsApp assistant.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod config_cmd;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use palaver_config::{ConfigError, PalaverConfig};

/// Palaver - a multi-tenant WhatsApp assistant.
#[derive(Parser, Debug)]
#[command(name = "palaver", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook server and background tasks.
    Serve,
    /// Inspect the effective configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate the configuration and exit.
    Check,
    /// Print the effective configuration as TOML, secrets redacted.
    Show,
}

fn load(path: Option<&PathBuf>) -> Result<PalaverConfig, Vec<ConfigError>> {
    match path {
        Some(path) => {
            let config = palaver_config::load_config_from_path(path).map_err(|err| {
                let sources = std::fs::read_to_string(path)
                    .map(|content| vec![(path.display().to_string(), content)])
                    .unwrap_or_default();
                palaver_config::diagnostic::figment_to_config_errors(err, &sources)
            })?;
            palaver_config::validation::validate_config(&config)?;
            Ok(config)
        }
        None => palaver_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            palaver_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Check => {
                println!("palaver: configuration is valid");
                Ok(())
            }
            ConfigAction::Show => config_cmd::show(&config),
        },
        None => {
            println!("palaver: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
