//! # Ocurator: The Voice
//! The `ocurator` CLI lists the asset catalog for a project and installs or
//! removes entries from it.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use hermitcrab::config;
use indicatif::ProgressBar;
use rusty_curator::Curator;
use rusty_curator_core::backend::{AlwaysConfirm, RemovalPrompt};
use rusty_curator_core::protocol::{CuratorEvent, OperationKind};
use rusty_curator_stem::AssetInfo;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory (overrides settings and CURATOR_PROJECT)
    #[arg(long, global = true)]
    project: Option<PathBuf>,
    /// Catalog URL (overrides settings)
    #[arg(long, global = true)]
    catalog: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog assets and their install state
    List {
        /// Include the "other" group
        #[arg(long)]
        all: bool,
    },
    /// Install or update an asset
    Install {
        /// Display name, package identifier or reference id
        name: String,
    },
    /// Remove an installed asset
    Remove {
        /// Display name, package identifier or reference id
        name: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Re-synchronize the catalog and report the result
    Reload,
    /// Show where settings are read from and their effective values
    Config {
        /// Save the effective settings (including overrides) to settings.toml
        #[arg(long)]
        write: bool,
    },
}

/// Asks on the terminal before deleting an imported archive.
struct TerminalPrompt;

impl RemovalPrompt for TerminalPrompt {
    fn confirm(&self, asset_name: &str, path: Option<&Path>) -> bool {
        if !std::io::stdin().is_terminal() {
            eprintln!("Refusing to delete {} without --yes", asset_name.cyan());
            return false;
        }
        let location = path
            .map(|p| format!(" at {}", p.display()))
            .unwrap_or_default();
        Confirm::new()
            .with_prompt(format!("Delete {}{}?", asset_name, location))
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

fn status_label(asset: &AssetInfo) -> ColoredString {
    if asset.is_busy() {
        if asset.is_being_installed() {
            "installing".yellow()
        } else {
            "removing".yellow()
        }
    } else if asset.has_update() {
        "update".bright_magenta()
    } else if asset.is_installed() {
        "installed".green()
    } else {
        "available".dimmed()
    }
}

fn print_group(title: &str, assets: &[AssetInfo]) {
    println!("{} ({})", title.bold(), assets.len());
    for asset in assets {
        let by = if asset.author.is_empty() {
            String::new()
        } else {
            format!(" by {}", asset.author)
        };
        println!(
            "  {:<11} {}{}  {}",
            status_label(asset),
            asset.display_name.cyan(),
            by,
            format!("[{:?}]", asset.route()).dimmed()
        );
    }
}

async fn load(curator: &Curator) -> Option<String> {
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Fetching {}", curator.settings().catalog_url));

    let mut events = curator.subscribe();
    curator.load_now().await;
    spinner.finish_and_clear();

    let mut failure = None;
    while let Ok(Some(event)) = events.try_next() {
        if let CuratorEvent::CatalogFailed(error) = event {
            failure = Some(error);
        }
    }
    failure
}

async fn run_operation(curator: &Curator, name: &str, kind: OperationKind) -> Result<()> {
    let verb = match kind {
        OperationKind::Install => "Installing",
        OperationKind::Uninstall => "Removing",
    };
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("{} {}", verb, name));

    let result = match kind {
        OperationKind::Install => curator.install_and_wait(name).await,
        OperationKind::Uninstall => curator.remove_and_wait(name).await,
    };
    spinner.finish_and_clear();

    match result? {
        CuratorEvent::OperationFinished { asset, installed, .. } => {
            let state = if installed { "installed" } else { "removed" };
            println!("✅ {} {}", asset.cyan(), state.green());
        }
        CuratorEvent::OperationCancelled { asset, .. } => {
            println!("↩️  Left {} in place", asset.cyan());
        }
        CuratorEvent::OperationFailed { asset, error, .. } => {
            eprintln!("❌ {} failed: {}", asset.cyan(), error.red());
            std::process::exit(1);
        }
        _ => {}
    }
    Ok(())
}

#[async_std::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let mut settings = config::load_settings()?;
    if let Some(project) = cli.project {
        settings.project_dir = project;
    }
    if let Some(url) = cli.catalog {
        settings.catalog_url = url;
    }

    if let Commands::Config { write } = cli.command {
        let dir = config::config_dir()?;
        println!("{} {}", "Config dir:".bold(), dir.display());
        println!("{:#?}", settings);
        if write {
            config::save_settings_to(&dir, &settings)?;
            println!("✅ Saved {}", dir.join("settings.toml").display().to_string().green());
        }
        return Ok(());
    }

    let prompt: Arc<dyn RemovalPrompt> = match cli.command {
        Commands::Remove { yes: true, .. } => Arc::new(AlwaysConfirm),
        _ => Arc::new(TerminalPrompt),
    };
    let curator = Curator::from_settings(settings, prompt)?;

    if let Some(error) = load(&curator).await {
        eprintln!("❌ Catalog unavailable: {}", error.red());
        std::process::exit(1);
    }

    match cli.command {
        Commands::List { all } => {
            print_group("Curated", &curator.curated_assets());
            if all {
                println!();
                print_group("Other", &curator.other_assets());
            }
        }
        Commands::Install { name } => run_operation(&curator, &name, OperationKind::Install).await?,
        Commands::Remove { name, .. } => {
            run_operation(&curator, &name, OperationKind::Uninstall).await?
        }
        Commands::Reload => {
            let curated = curator.curated_assets();
            let other = curator.other_assets();
            let installed = curated
                .iter()
                .chain(other.iter())
                .filter(|a| a.is_installed())
                .count();
            println!(
                "🔄 {} curated, {} other, {} installed",
                curated.len().to_string().cyan(),
                other.len().to_string().cyan(),
                installed.to_string().green()
            );
        }
        Commands::Config { .. } => {}
    }
    Ok(())
}
