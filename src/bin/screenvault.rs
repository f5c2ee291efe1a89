//! ScreenVault CLI
//!
//! Operator command line over the filesystem backends

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use screenvault::{
    AppId, FsVersionManager, ScreenDetails, ScreenDetailsPatch, ScreenName, ScreenQuery,
    ScreenVersion, VaultBuilder, VaultConfig,
};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "screenvault")]
#[command(about = "Versioned registry of UI-definition screens")]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Data directory used when no config file is given
    #[arg(short = 'd', long, global = true, default_value = "./screenvault-data")]
    data_dir: PathBuf,

    /// Owner recorded on the app identity
    #[arg(long, global = true, default_value = "cli")]
    owner: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Target {
    /// Application namespace (e.g. com.example.shop)
    #[arg(short = 'a', long)]
    app: String,

    /// Screen name
    #[arg(short = 's', long)]
    screen: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a screen at its first version
    Create {
        #[command(flatten)]
        target: Target,
        #[arg(short = 'v', long)]
        version: String,
        /// File holding the screen document
        #[arg(short = 'f', long)]
        file: PathBuf,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Upload a new version
    Upload {
        #[command(flatten)]
        target: Target,
        #[arg(short = 'v', long)]
        version: String,
        #[arg(short = 'f', long)]
        file: PathBuf,
    },
    /// Print the content of a version (current if omitted)
    Get {
        #[command(flatten)]
        target: Target,
        #[arg(short = 'v', long)]
        version: Option<String>,
    },
    /// Restore an archived version as a new version
    Rollback {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        to: String,
    },
    /// Delete a screen and all its blobs
    Delete {
        #[command(flatten)]
        target: Target,
    },
    /// List the versions of a screen, newest first
    Versions {
        #[command(flatten)]
        target: Target,
    },
    /// List the screens of an application
    List {
        #[arg(short = 'a', long)]
        app: String,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Check metadata against blob contents and repair what can be rebuilt
    Reconcile {
        #[arg(short = 'a', long)]
        app: Option<String>,
    },
    /// Register content found at the legacy flat key
    Adopt {
        #[command(flatten)]
        target: Target,
        /// Version to assign to the legacy content
        #[arg(short = 'v', long, default_value = "1.0.0")]
        version: String,
    },
    /// Edit descriptive fields or the active flag
    Details {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
        #[arg(long)]
        active: Option<bool>,
    },
}

fn app_id(owner: &str, namespace: &str) -> anyhow::Result<AppId> {
    AppId::new(owner, namespace).with_context(|| format!("invalid app '{}'", namespace))
}

fn resolve(owner: &str, target: &Target) -> anyhow::Result<(AppId, ScreenName)> {
    let app = app_id(owner, &target.app)?;
    let name = ScreenName::new(target.screen.as_str())
        .with_context(|| format!("invalid screen name '{}'", target.screen))?;
    Ok((app, name))
}

fn version(raw: &str) -> anyhow::Result<ScreenVersion> {
    ScreenVersion::parse(raw).with_context(|| format!("invalid version '{}'", raw))
}

async fn read_content(path: &PathBuf) -> anyhow::Result<Bytes> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {:?}", path))?;
    if raw.is_empty() {
        bail!("{:?} is empty", path);
    }
    Ok(Bytes::from(raw))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open(cli: &Cli) -> anyhow::Result<FsVersionManager> {
    let config = match &cli.config {
        Some(path) => VaultConfig::load(path)?,
        None => {
            let mut config = VaultConfig::with_data_dir(&cli.data_dir);
            config.apply_overrides(|name| std::env::var(name).ok())?;
            config
        }
    };

    // Reconciliation is an explicit subcommand here.
    let manager = VaultBuilder::new()
        .config(config)
        .reconcile(false)
        .build()
        .await
        .context("opening vault")?;
    Ok(manager)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let manager = open(&cli).await?;
    let owner = cli.owner.as_str();

    match cli.command {
        Command::Create {
            target,
            version: raw,
            file,
            display_name,
            description,
            category,
            tags,
        } => {
            let (app, name) = resolve(owner, &target)?;
            let details = ScreenDetails {
                display_name,
                description,
                category,
                tags,
            };
            let record = manager
                .create(&app, &name, &version(&raw)?, read_content(&file).await?, details)
                .await?;
            print_json(&record)?;
        }
        Command::Upload {
            target,
            version: raw,
            file,
        } => {
            let (app, name) = resolve(owner, &target)?;
            let record = manager
                .upload(&app, &name, &version(&raw)?, read_content(&file).await?)
                .await?;
            print_json(&record)?;
        }
        Command::Get {
            target,
            version: raw,
        } => {
            let (app, name) = resolve(owner, &target)?;
            let wanted = match raw {
                Some(raw) => version(&raw)?,
                None => manager.describe(&app, &name).await?.current_version,
            };
            let content = manager.get_version(&app, &name, &wanted).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content.data)?;
            stdout.flush()?;
        }
        Command::Rollback { target, to } => {
            let (app, name) = resolve(owner, &target)?;
            let record = manager.rollback(&app, &name, &version(&to)?).await?;
            print_json(&record)?;
        }
        Command::Delete { target } => {
            let (app, name) = resolve(owner, &target)?;
            let report = manager.delete(&app, &name).await?;
            print_json(&report)?;
            if !report.is_clean() {
                bail!("{} blob(s) could not be deleted", report.failed.len());
            }
        }
        Command::Versions { target } => {
            let (app, name) = resolve(owner, &target)?;
            print_json(&manager.list_versions(&app, &name).await?)?;
        }
        Command::List {
            app,
            search,
            active,
            page,
            limit,
        } => {
            let app = app_id(owner, &app)?;
            let query = ScreenQuery {
                search,
                is_active: active,
                page,
                limit,
            };
            print_json(&manager.list_screens(&app, &query).await?)?;
        }
        Command::Reconcile { app } => {
            let app = app.map(|ns| app_id(owner, &ns)).transpose()?;
            let report = manager.reconcile(app.as_ref()).await?;
            print_json(&report)?;
            if report.corrupt > 0 {
                bail!("{} corrupt item(s) found", report.corrupt);
            }
        }
        Command::Adopt {
            target,
            version: raw,
        } => {
            let (app, name) = resolve(owner, &target)?;
            let record = manager
                .adopt_legacy(&app, &name, &version(&raw)?, ScreenDetails::default())
                .await?;
            print_json(&record)?;
        }
        Command::Details {
            target,
            display_name,
            description,
            category,
            tags,
            active,
        } => {
            let (app, name) = resolve(owner, &target)?;
            let patch = ScreenDetailsPatch {
                display_name,
                description,
                category,
                tags,
                is_active: active,
            };
            print_json(&manager.update_details(&app, &name, patch).await?)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("screenvault {}", env!("CARGO_PKG_VERSION"));
    run(cli).await
}
