//! # Pantry CLI (`pantry`)
//!
//! Every screen action of the pantry tracker as a command.
//!
//! ## Usage
//!
//! ```bash
//! pantry --config ./config/pantry.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pantry init` | Create the SQLite database and schema |
//! | `pantry list` | Show items, optionally filtered by name |
//! | `pantry add <name>` | Add items, creating the entry if needed |
//! | `pantry remove <name>` | Remove one item, deleting the entry at zero |
//! | `pantry recipes` | Ask for recipe suggestions using every item |
//! | `pantry classify <image>` | Label an image with the classifier |
//! | `pantry serve` | Start the JSON HTTP API |
//!
//! Logs go to stderr; set `RUST_LOG` (e.g. `RUST_LOG=debug`) to see more.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pantry_tracker::capture::ImageBlob;
use pantry_tracker::classify::{HttpClassifier, ImageClassifier};
use pantry_tracker::config::{self, Config};
use pantry_tracker::inventory::Inventory;
use pantry_tracker::migrate;
use pantry_tracker::models::InventoryItem;
use pantry_tracker::recipes::ChatRecipes;
use pantry_tracker::server;
use pantry_tracker::store;
use pantry_tracker::view::{Action, EffectFailure, ViewController};

/// Pantry tracker: keep count of what is in the pantry, get recipe ideas
/// from it, and label new items from a photo.
#[derive(Parser)]
#[command(name = "pantry", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pantry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Safe to run repeatedly.
    Init,

    /// List items.
    List {
        /// Only show items whose name contains this text (case-insensitive).
        #[arg(long)]
        search: Option<String>,
    },

    /// Add items, creating the entry when it does not exist yet.
    ///
    /// Dates and classification are only written when given; existing
    /// values are kept otherwise.
    Add {
        name: String,

        #[arg(long, default_value_t = 1)]
        quantity: u64,

        /// Expiration date (free-form).
        #[arg(long)]
        exp: Option<String>,

        /// Manufacture date (free-form).
        #[arg(long)]
        mfg: Option<String>,

        /// Classification label. Overrides the one obtained from `--image`.
        #[arg(long)]
        classification: Option<String>,

        /// Image to send to the classifier before adding.
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Remove one item. The entry is deleted when the last one goes.
    Remove { name: String },

    /// Suggest recipes using every item in the pantry.
    Recipes,

    /// Classify an image and print the label.
    Classify { image: PathBuf },

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::List { search } => {
            let mut view = controller(&cfg).await?;
            ensure_ok(view.refresh().await)?;
            if let Some(term) = search {
                view.dispatch(Action::SearchChanged(term)).await;
            }
            print_items(&view.filtered_view());
        }
        Commands::Add {
            name,
            quantity,
            exp,
            mfg,
            classification,
            image,
        } => {
            let mut view = controller(&cfg).await?;
            view.dispatch(Action::OpenModal).await;

            if let Some(path) = image {
                view.dispatch(Action::ImageSelected(ImageBlob::from_path(&path)?))
                    .await;
                // A failed classification is logged and the item is added
                // without a label.
                view.dispatch(Action::ClassifyImage).await;
            }
            if let Some(label) = classification {
                view.dispatch(Action::ClassificationReceived(label)).await;
            }

            view.dispatch(Action::FormNameChanged(name.clone())).await;
            view.dispatch(Action::FormQuantityChanged(quantity)).await;
            view.dispatch(Action::FormExpirationChanged(exp.unwrap_or_default()))
                .await;
            view.dispatch(Action::FormManufactureChanged(mfg.unwrap_or_default()))
                .await;
            ensure_ok(view.submit_new_item().await)?;

            match view.state().items.iter().find(|i| i.name == name) {
                Some(item) => println!("{}", format_item(item)),
                None => println!("{}: not found after add", name),
            }
        }
        Commands::Remove { name } => {
            let mut view = controller(&cfg).await?;
            ensure_ok(view.dispatch(Action::RemoveOne(name.clone())).await)?;
            match view.state().items.iter().find(|i| i.name == name) {
                Some(item) => println!("{}", format_item(item)),
                None => println!("{}: none left", name),
            }
        }
        Commands::Recipes => {
            let mut view = controller(&cfg).await?;
            ensure_ok(view.refresh().await)?;
            if view.state().items.is_empty() {
                println!("The pantry is empty.");
                return Ok(());
            }
            ensure_ok(view.dispatch(Action::RequestRecipes).await)?;
            let recipes = &view.state().recipes;
            if recipes.is_empty() {
                println!("No recipe suggestions.");
            }
            for (i, recipe) in recipes.iter().enumerate() {
                println!("--- Suggestion {} ---\n{}\n", i + 1, recipe);
            }
        }
        Commands::Classify { image } => {
            println!("{}", classify_file(&cfg, &image).await?);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn controller(cfg: &Config) -> Result<ViewController> {
    let store = store::open(cfg).await?;
    Ok(ViewController::new(
        Inventory::from_config(store, cfg),
        Arc::new(ChatRecipes::new(&cfg.recipes)?),
        Arc::new(HttpClassifier::new(&cfg.classifier)?),
    ))
}

async fn classify_file(cfg: &Config, path: &Path) -> Result<String> {
    let image = ImageBlob::from_path(path)?;
    HttpClassifier::new(&cfg.classifier)?
        .classify(&image)
        .await
        .with_context(|| format!("Failed to classify {}", path.display()))
}

/// Turn the first failed view command into the command's error.
fn ensure_ok(failures: Vec<EffectFailure>) -> Result<()> {
    match failures.into_iter().next() {
        Some(failure) => Err(failure
            .error
            .context(format!("{} failed", failure.command))),
        None => Ok(()),
    }
}

fn format_item(item: &InventoryItem) -> String {
    let mut line = format!("{:<24} {:>6}", item.name, item.quantity);
    if let Some(exp) = &item.expiration_date {
        line.push_str(&format!("  exp={}", exp));
    }
    if let Some(mfg) = &item.manufacture_date {
        line.push_str(&format!("  mfg={}", mfg));
    }
    if let Some(class) = &item.classification {
        line.push_str(&format!("  class={}", class));
    }
    line
}

fn print_items(items: &[&InventoryItem]) {
    if items.is_empty() {
        println!("No items.");
        return;
    }
    for item in items {
        println!("{}", format_item(item));
    }
}
