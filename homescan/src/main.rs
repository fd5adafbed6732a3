use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog_sqlite::Db;
use homescan_core::{NewProfile, ProfileId, ServiceId};
use scan_engine::{EngineConfig, ScanEngine};

mod api;
mod auth;
mod config;
mod detector;
mod errors;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json }

#[derive(Debug, Parser)]
#[command(name = "homescan", version, about = "Home network service dashboard backend")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./homescan.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database path (overrides database.path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `scan_engine=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Output format for offline commands
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Run the HTTP API
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Scan a profile's target now and merge the results
    Scan {
        #[arg(long)]
        profile: ProfileId,
        /// IP, CIDR or hostname; defaults to the profile's scan target
        #[arg(long)]
        target: Option<String>,
    },
    /// Manage profiles
    Profiles {
        #[command(subcommand)]
        cmd: ProfilesCmd,
    },
    /// Inspect services
    Services {
        #[command(subcommand)]
        cmd: ServicesCmd,
    },
    /// Set a profile's display order; ids must list every service of the profile
    Reorder {
        #[arg(long)]
        profile: ProfileId,
        #[arg(required = true)]
        ids: Vec<ServiceId>,
    },
    /// Site settings
    Settings {
        #[command(subcommand)]
        cmd: SettingsCmd,
    },
}

#[derive(Debug, Subcommand)]
enum ProfilesCmd {
    List,
    Add {
        name: String,
        #[arg(long)]
        target: Option<String>,
    },
    Rm { id: ProfileId },
    /// Make a profile the one guests see
    GuestDefault { id: ProfileId },
}

#[derive(Debug, Subcommand)]
enum ServicesCmd {
    List {
        #[arg(long)]
        profile: ProfileId,
        /// Include hidden services
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCmd {
    Show,
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_engine(cfg: &config::Config, db_path: PathBuf) -> Result<ScanEngine> {
    let db = Db::open_or_create(&db_path).with_context(|| format!("opening {}", db_path.display()))?;
    let det = detector::NetworkDetector::new(cfg.detector_options()?)?;
    let engine = ScanEngine::new(db, Arc::new(det), EngineConfig { scan_timeout: cfg.scan_timeout() })?;
    Ok(engine)
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", text(value)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    let cfg = config::load_config(cli.config.as_deref())?;
    let db_path = cli.db.clone().unwrap_or_else(|| cfg.db_path());
    let format = cli.format;

    match cli.command {
        Commands::Version => {
            println!("homescan {} (core {})", env!("CARGO_PKG_VERSION"), homescan_core::version());
        }
        Commands::Serve { bind } => {
            let engine = Arc::new(build_engine(&cfg, db_path)?);
            let password = std::env::var(config::PASSWORD_ENV).ok();
            let auth = Arc::new(auth::Auth::new(cfg.credentials(password), cfg.token_ttl()));
            let app = api::router(api::AppState { engine, auth });
            let addr = bind.unwrap_or_else(|| cfg.bind().to_string());
            let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
            info!(%addr, "listening");
            axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
        }
        Commands::Scan { profile, target } => {
            let engine = build_engine(&cfg, db_path)?;
            let report = engine.trigger_scan(profile, target.as_deref()).await?;
            emit(format, &report, |r| {
                format!(
                    "{}: detected {} inserted {} updated {} locked {} untouched {} (total {})",
                    r.target, r.detected, r.inserted, r.updated, r.locked, r.untouched, r.total
                )
            })?;
        }
        Commands::Profiles { cmd } => {
            let engine = build_engine(&cfg, db_path)?;
            match cmd {
                ProfilesCmd::List => {
                    let profiles = engine.list_profiles(true)?;
                    emit(format, &profiles, |ps| {
                        ps.iter()
                            .map(|p| {
                                let guest = if p.is_guest_default { " [guest]" } else { "" };
                                format!("{}\t{}\t{}{}", p.id, p.name, p.scan_target.as_deref().unwrap_or("-"), guest)
                            })
                            .collect::<Vec<_>>()
                            .join("\n")
                    })?;
                }
                ProfilesCmd::Add { name, target } => {
                    let p = engine.create_profile(&NewProfile { name, scan_target: target })?;
                    emit(format, &p, |p| format!("created profile {} ({})", p.id, p.name))?;
                }
                ProfilesCmd::Rm { id } => {
                    let p = engine.delete_profile(id).await?;
                    emit(format, &p, |p| format!("deleted profile {} ({})", p.id, p.name))?;
                }
                ProfilesCmd::GuestDefault { id } => {
                    let p = engine.set_guest_default(id)?;
                    emit(format, &p, |p| format!("guests now see profile {} ({})", p.id, p.name))?;
                }
            }
        }
        Commands::Services { cmd: ServicesCmd::List { profile, all } } => {
            let engine = build_engine(&cfg, db_path)?;
            let services = engine.list_services(profile, all)?;
            emit(format, &services, |ss| {
                ss.iter()
                    .map(|s| {
                        let lock = if s.is_manual_lock { " [locked]" } else { "" };
                        let hidden = if s.is_visible { "" } else { " [hidden]" };
                        format!("{}\t{}\t{}\t{}{}{}", s.sort_order, s.id, s.key(), s.display_name(), lock, hidden)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Commands::Reorder { profile, ids } => {
            let engine = build_engine(&cfg, db_path)?;
            engine.reorder(Some(profile), &ids).await?;
            let order = engine.list_services(profile, true)?.iter().map(|s| s.id).collect::<Vec<_>>();
            emit(format, &order, |o| format!("profile {profile} order: {o:?}"))?;
        }
        Commands::Settings { cmd: SettingsCmd::Show } => {
            let engine = build_engine(&cfg, db_path)?;
            let settings = engine.settings();
            emit(format, &settings, |s| {
                format!(
                    "title: {}\nview: {}\ngrid: {}\ntheme: {}\naccent: {}\nsort: {}",
                    s.site_title,
                    s.view_mode.as_str(),
                    s.grid_size.as_str(),
                    s.theme_mode.as_str(),
                    s.accent_color,
                    s.default_sort_by.as_str()
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offline_commands() {
        let cli = Cli::parse_from(["homescan", "--format", "json", "reorder", "--profile", "2", "5", "3", "4"]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Reorder { profile, ids } => {
                assert_eq!(profile, 2);
                assert_eq!(ids, vec![5, 3, 4]);
            }
            other => panic!("unexpected command {other:?}"),
        }
        let cli = Cli::parse_from(["homescan", "profiles", "guest-default", "3"]);
        assert!(matches!(cli.command, Commands::Profiles { cmd: ProfilesCmd::GuestDefault { id: 3 } }));
    }

    #[test]
    fn reorder_requires_ids() {
        assert!(Cli::try_parse_from(["homescan", "reorder", "--profile", "1"]).is_err());
    }
}
