use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use sibim_core::normalizer::{Record, MOVEMENT_SCHEMA};
use sibim_core::{Config, InventoryItem, Sibim, SessionStatus};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sibim", about = "SIBIM municipal inventory client")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lists the inventory.
    Items {
        /// Skip the cache and re-fetch from the sheet.
        #[arg(long)]
        force: bool,
    },
    /// Shows one item by id or codigo.
    Show { id: String },
    Search { query: String },
    /// Inventory totals plus breakdowns.
    Stats,
    Departments,
    Movements,
    Updates,
    /// Rows of the system configuration sheet.
    Settings,
    /// Appends an inventory item read from a JSON file.
    Add {
        #[arg(long)]
        file: PathBuf,
    },
    Update {
        #[arg(long)]
        file: PathBuf,
    },
    /// Restores a JSON array of items in one batch.
    Restore {
        #[arg(long)]
        file: PathBuf,
    },
    /// Records a movement read from a JSON file.
    Move {
        #[arg(long)]
        file: PathBuf,
    },
    /// Appends a change-log row read from a JSON file.
    LogUpdate {
        #[arg(long)]
        file: PathBuf,
    },
    /// Checks that every sheet is reachable.
    Check,
    /// Writes a config file with every default filled in.
    InitConfig {
        #[arg(default_value = "config.toml")]
        path: PathBuf,
    },
    Login { username: String, password: String },
    Logout,
    Whoami,
    /// Checks whether the signed-in user may open a page.
    CanAccess { page: String },
    /// Shows the saved theme, or saves a new one ("none" clears it).
    Theme { name: Option<String> },
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let default_level = if config.application.debug_mode { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Commands::InitConfig { path } = &cli.command {
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        config.save_to_file(path)?;
        println!("📝 Wrote {}", path.display());
        return Ok(());
    }

    let sibim = Sibim::from_config(&config).context("failed to initialise SIBIM")?;

    // Expire idle sessions before doing anything on their behalf
    if let SessionStatus::Active(_) = sibim.session.check_timeout()? {
        sibim.session.touch()?;
    }

    match cli.command {
        Commands::Items { force } => {
            let items = if force {
                sibim.api.force_refresh_items().await
            } else {
                sibim.api.fetch_items().await
            };
            print_json(&items)?;
        }
        Commands::Show { id } => match sibim.api.get_item_by_id(&id).await {
            Some(item) => print_json(&item)?,
            None => bail!("No item with id or codigo '{}'", id),
        },
        Commands::Search { query } => print_json(&sibim.api.search_items(&query).await)?,
        Commands::Stats => print_json(&sibim.api.get_stats().await.stats)?,
        Commands::Departments => print_json(&sibim.api.get_departments().await)?,
        Commands::Movements => print_json(&sibim.api.get_movements().await)?,
        Commands::Updates => print_json(&sibim.api.get_updates().await)?,
        Commands::Settings => print_json(&sibim.api.get_system_config().await)?,
        Commands::Add { file } => {
            let item = InventoryItem::from_raw(&read_object(&file)?);
            print_json(&sibim.api.add_item(&item).await?)?;
        }
        Commands::Update { file } => {
            let item = InventoryItem::from_raw(&read_object(&file)?);
            if item.key().is_none() {
                bail!("{} has neither an id nor a codigo", file.display());
            }
            print_json(&sibim.api.update_item(&item).await?)?;
        }
        Commands::Restore { file } => {
            let items: Vec<InventoryItem> = match read_json(&file)? {
                Value::Array(rows) => rows
                    .iter()
                    .filter_map(Value::as_object)
                    .map(InventoryItem::from_raw)
                    .collect(),
                _ => bail!("{} must contain a JSON array of items", file.display()),
            };
            println!("♻️ Restoring {} item(s)", items.len());
            print_json(&sibim.api.batch_restore(&items).await?)?;
        }
        Commands::Move { file } => {
            let movement: Record = MOVEMENT_SCHEMA.normalize_record(&read_object(&file)?);
            print_json(&sibim.api.record_movement(&movement).await?)?;
        }
        Commands::LogUpdate { file } => {
            let update: Record = read_object(&file)?.into_iter().collect();
            print_json(&sibim.api.record_update(&update).await?)?;
        }
        Commands::Check => {
            let report = sibim.api.check_connection().await;
            print_json(&report)?;
            if !report.all_accessible() {
                bail!(
                    "{}/{} sheets reachable",
                    report.accessible_count(),
                    report.sheets.len()
                );
            }
        }
        Commands::InitConfig { .. } => {}
        Commands::Login { username, password } => {
            if sibim.session.login(&username, &password).await {
                println!("✅ Signed in as {}", username);
            } else {
                bail!("Invalid username or password");
            }
        }
        Commands::Logout => {
            sibim.session.logout()?;
            println!("👋 Signed out");
        }
        Commands::Whoami => match sibim.session.current_user() {
            Some(user) => print_json(&user)?,
            None => println!("Not signed in"),
        },
        Commands::CanAccess { page } => {
            let allowed = sibim.session.is_page_allowed(&page);
            println!("{}: {}", page, if allowed { "allowed" } else { "denied" });
            if !allowed {
                std::process::exit(1);
            }
        }
        Commands::Theme { name } => match name.as_deref() {
            Some("none") => sibim.session.apply_theme(None)?,
            Some(theme) => sibim.session.apply_theme(Some(theme))?,
            None => println!("{}", sibim.session.saved_theme().unwrap_or_else(|| "default".to_string())),
        },
        Commands::ClearCache => {
            sibim.api.cache().purge()?;
            println!("🧹 Cache cleared");
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}
