//! Webots-Manager - side-by-side Webots installations with shared templates
//!
//! Main entry point

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use webots_manager_core::catalog::CatalogListing;
use webots_manager_core::overlay::ReconcileReport;
use webots_manager_core::{Manager, ManagerConfig, Version};

mod template_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "webots-manager",
    about = "Install Webots releases side by side and share templates between them",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Configuration file (defaults to the user config directory)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Installation root, overriding the configured one
    #[clap(long, global = true)]
    root: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Create the installation root and the alias
    Init,

    /// List installed versions, and optionally the available ones
    List {
        /// Include versions available from the release catalog
        #[clap(long)]
        available: bool,

        /// Force refresh of the release catalog (bypass cache)
        #[clap(long, requires = "available")]
        refresh: bool,

        /// Output results as JSON
        #[clap(long)]
        json: bool,
    },

    /// Download and install a version
    Install {
        /// Version identifier, or "latest"
        version: String,

        /// Force refresh of the release catalog (bypass cache)
        #[clap(long)]
        refresh: bool,
    },

    /// Make an installed version the active one
    Use {
        /// Version identifier
        version: Version,
    },

    /// Uninstall a version
    Remove {
        /// Version identifier
        version: Version,
    },

    /// Re-link templates into every installed version
    Apply,

    /// Manage templates shared between versions
    Template {
        #[clap(subcommand)]
        command: template_cli::TemplateCommand,
    },
}

/// Initialize tracing with CLI flags
fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::new(log_level.to_filter_directive());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // logs to stderr, stdout is for listings
        .init();
}

/// Load the config file and apply the `--root` override
fn resolve_config(config: Option<PathBuf>, root: Option<PathBuf>) -> Result<ManagerConfig> {
    let mut resolved = ManagerConfig::load(config.as_deref())?;
    if let Some(root) = root {
        // The alias and prefix follow an explicit root
        let relocated = ManagerConfig::with_root(root);
        resolved.prefix = relocated.prefix;
        resolved.root = relocated.root;
        resolved.alias = relocated.alias;
    }
    debug!("Using installation root {}", resolved.root.display());
    Ok(resolved)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);

    let config = resolve_config(cli.config, cli.root)?;

    match cli.command {
        Command::Init => init_command(config),
        Command::List {
            available,
            refresh,
            json,
        } => list_command(config, available, refresh, json).await,
        Command::Install { version, refresh } => install_command(config, &version, refresh).await,
        Command::Use { version } => use_command(config, &version),
        Command::Remove { version } => {
            Manager::open(config)?.remove(&version)?;
            Ok(())
        }
        Command::Apply => {
            let report = Manager::open(config)?.apply_templates()?;
            print_report(&report);
            Ok(())
        }
        Command::Template { command } => command.execute(config),
    }
}

fn init_command(config: ManagerConfig) -> Result<()> {
    let manager = Manager::init(config)?;
    let config = manager.config();
    println!("✅ Installation root ready at {}", config.root.display());
    println!("   Alias: {} -> {}", config.alias.display(), config.in_use_link().display());
    if !manager.versions().home_matches() {
        println!(
            "\nConsider adding to your shell profile:\n  export {}={}",
            config.home_var,
            config.alias.display()
        );
    }
    Ok(())
}

async fn fetch_listing(manager: &Manager, refresh: bool) -> Result<CatalogListing> {
    let client = manager.catalog()?;
    if refresh {
        eprintln!("Fetching release catalog (refreshing cache)...");
        Ok(client.fetch_fresh().await?)
    } else {
        eprintln!("Fetching release catalog...");
        Ok(client.fetch().await?)
    }
}

#[derive(Serialize)]
struct VersionStatus {
    version: String,
    installed: bool,
    in_use: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Installed")]
    installed: String,
    #[tabled(rename = "In use")]
    in_use: String,
}

fn mark(flag: bool) -> String {
    let mark = if flag { "✓" } else { "" };
    mark.to_string()
}

async fn list_command(
    config: ManagerConfig,
    available: bool,
    refresh: bool,
    json_output: bool,
) -> Result<()> {
    let manager = Manager::open(config)?;
    let versions = manager.versions();

    let mut statuses: Vec<VersionStatus> = versions
        .installed()
        .iter()
        .map(|v| VersionStatus {
            version: v.to_string(),
            installed: true,
            in_use: versions.is_active(v),
            url: None,
        })
        .collect();

    if available {
        let listing = fetch_listing(&manager, refresh).await?;
        for entry in listing.entries() {
            match statuses.iter().position(|s| s.version == entry.version.as_str()) {
                Some(i) => statuses[i].url = Some(entry.url.clone()),
                None => statuses.push(VersionStatus {
                    version: entry.version.to_string(),
                    installed: false,
                    in_use: false,
                    url: Some(entry.url.clone()),
                }),
            }
        }
        statuses.sort_by(|a, b| match (Version::parse(&a.version), Version::parse(&b.version)) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => a.version.cmp(&b.version),
        });
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("\nNo versions installed. Run 'webots-manager list --available' to see releases.");
        return Ok(());
    }

    let table_rows: Vec<VersionRow> = statuses
        .iter()
        .map(|s| VersionRow {
            version: s.version.clone(),
            installed: mark(s.installed),
            in_use: mark(s.in_use),
        })
        .collect();

    let table = Table::new(&table_rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("{table}");
    Ok(())
}

async fn install_command(config: ManagerConfig, requested: &str, refresh: bool) -> Result<()> {
    let mut manager = Manager::open(config)?;
    let listing = fetch_listing(&manager, refresh).await?;

    let version = if requested == "latest" {
        listing
            .latest()
            .map(|entry| entry.version.clone())
            .ok_or_else(|| anyhow!("The release catalog lists no versions"))?
    } else {
        requested
            .parse::<Version>()
            .with_context(|| format!("Cannot install '{requested}'"))?
    };

    println!("Installing {version}...");
    let report = manager.install(&version, &listing).await?;

    println!("✅ Installed {version}");
    if let Some(active) = manager.versions().active() {
        println!("   In use: {active}");
    }
    print_report(&report);
    Ok(())
}

fn use_command(config: ManagerConfig, version: &Version) -> Result<()> {
    let mut manager = Manager::open(config)?;
    manager.activate(version)?;
    println!("✅ Now using {version}");
    Ok(())
}

fn print_report(report: &ReconcileReport) {
    if report.changes() == 0 && report.skipped == 0 {
        println!("Templates up to date ({} links)", report.unchanged);
        return;
    }
    println!(
        "Templates: {} created, {} replaced, {} removed, {} unchanged",
        report.created, report.replaced, report.removed, report.unchanged
    );
    if report.skipped > 0 {
        println!(
            "⚠️  {} target(s) hold user files and were left untouched",
            report.skipped
        );
    }
}
