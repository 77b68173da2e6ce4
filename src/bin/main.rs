use anyhow::Result;
use clap::{Parser, Subcommand};
use dataporten_gate::{AccessToken, GateSettings, load_settings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_DIRECTIVE: &str = "dataporten_gate=info";

#[derive(Parser)]
#[command(name = "dataporten-gate")]
#[command(about = "Dataporten identity resolution and group authorization")]
struct Cli {
    /// Settings file (defaults to $DATAPORTEN_GATE_CONFIG or ./dataporten-gate.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Comma-separated allowed groups, overrides the settings file
    #[arg(long, global = true, env = "DATAPORTEN_ALLOWED_GROUPS")]
    allowed_groups: Option<String>,
    /// Secondary group-membership endpoint, overrides the settings file
    #[arg(long, global = true, env = "DATAPORTEN_SECONDARY_GROUPS_URL")]
    secondary_groups_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the identity for a bearer token
    Resolve {
        #[arg(long, env = "DATAPORTEN_ACCESS_TOKEN")]
        token: String,
    },
    /// List the group memberships seen for a bearer token
    Groups {
        #[arg(long, env = "DATAPORTEN_ACCESS_TOKEN")]
        token: String,
    },
    /// Print the resolved endpoint set
    Endpoints,
    /// Run the forward-auth HTTP server
    Serve {
        #[arg(long, default_value = "127.0.0.1:4180")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    subscriber(env_filter(std::env::var("RUST_LOG").ok().as_deref())).init();

    let cli = Cli::parse();
    let settings = apply_overrides(
        load_settings(cli.config.as_deref())?,
        cli.allowed_groups,
        cli.secondary_groups_url,
    );
    let gate = settings.build_gate()?;

    match cli.command {
        Commands::Resolve { token } => {
            match gate.resolve_identity(&AccessToken::new(token)).await {
                Ok(identity) => println!("{}", identity),
                Err(e) => {
                    warn!("Identity resolution failed: {}", e);
                    eprintln!("Login denied.");
                    std::process::exit(1);
                }
            }
        }
        Commands::Groups { token } => {
            let groups = gate.group_memberships(&AccessToken::new(token)).await?;
            if groups.is_empty() {
                println!("No group memberships (or group authorization disabled).");
            }
            for group in groups {
                let marker = if gate.policy().allows(group.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{} {}", marker, group);
            }
        }
        Commands::Endpoints => {
            let endpoints = gate.endpoints();
            println!("Provider:  {}", endpoints.provider_name());
            println!("Login:     {}", endpoints.login());
            println!("Redeem:    {}", endpoints.redeem());
            println!("Profile:   {}", endpoints.profile());
            println!("Validate:  {}", endpoints.validate());
            println!("Scope:     {}", endpoints.scope());
            match endpoints.primary_groups() {
                Some(url) => println!("Groups:    {}", url),
                None => println!("Groups:    - (group authorization disabled)"),
            }
            if let Some(url) = endpoints.secondary_groups() {
                println!("Secondary: {}", url);
            }
        }
        Commands::Serve { bind } => {
            info!("Starting forward-auth server ({:?})", gate.state());
            dataporten_gate::server::serve(Arc::new(gate), &bind).await?;
        }
    }

    Ok(())
}

/// `RUST_LOG` when set and valid, otherwise `dataporten_gate=info`.
fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))
}

fn subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

/// Apply CLI/env overrides on top of the settings file.
fn apply_overrides(
    mut settings: GateSettings,
    allowed_groups: Option<String>,
    secondary_groups_url: Option<String>,
) -> GateSettings {
    if let Some(groups) = allowed_groups {
        settings.allowed_groups = groups;
    }
    if let Some(url) = secondary_groups_url {
        settings.secondary_groups_url = url;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    /// (info enabled, debug enabled) for the fetcher's target.
    fn levels_with(rust_log: Option<&str>) -> (bool, bool) {
        tracing::subscriber::with_default(subscriber(env_filter(rust_log)), || {
            (
                tracing::enabled!(target: "dataporten_gate::fetcher", Level::INFO),
                tracing::enabled!(target: "dataporten_gate::fetcher", Level::DEBUG),
            )
        })
    }

    #[test]
    fn test_default_filter_is_info() {
        assert_eq!(levels_with(None), (true, false));
    }

    #[test]
    fn test_rust_log_enables_debug() {
        assert_eq!(levels_with(Some("dataporten_gate=debug")), (true, true));
    }

    #[test]
    fn test_invalid_rust_log_falls_back_to_default() {
        assert_eq!(levels_with(Some("dataporten_gate=verbose")), (true, false));
    }

    #[test]
    fn test_cli_overrides_settings() {
        let settings = apply_overrides(
            GateSettings::default(),
            Some("testgroup".to_string()),
            Some("https://mas.example.com/groups".to_string()),
        );
        assert_eq!(settings.allowed_groups, "testgroup");
        assert_eq!(settings.secondary_groups_url, "https://mas.example.com/groups");

        let untouched = apply_overrides(settings.clone(), None, None);
        assert_eq!(untouched.allowed_groups, "testgroup");
    }
}
