use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use catchup::app::App;
use catchup::config::Config;
use catchup::events::{EventBus, FeedEvent};
use catchup::feed::Refresher;
use catchup::query::ItemQuery;
use catchup::storage::{Store, StoreError};
use catchup::ui;

/// Get the config directory path (~/.config/catchup/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("catchup"))
}

#[derive(Parser, Debug)]
#[command(
    name = "catchup",
    about = "Terminal feed reader with a rolling two-year item window"
)]
struct Args {
    /// Feed URL (overrides the config file)
    #[arg(long, value_name = "URL")]
    feed: Option<String>,

    /// Reset the item store (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Fetch once, print a summary, and exit without starting the TUI
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Set up config directory
    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // User-only access on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let mut config = Config::load(&config_dir.join("config.toml"))?;
    if let Some(feed) = args.feed {
        url::Url::parse(&feed).with_context(|| format!("Invalid feed URL: {}", feed))?;
        config.feed_url = feed;
    }

    let db_path = config_dir.join("items.db");

    // Handle --reset-db flag
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete item store")?;
        println!("Item store reset.");
    }

    // Open the store
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in store path"))?;
    let store = match Store::open(db_path_str).await {
        Ok(store) => store,
        Err(e @ StoreError::InstanceLocked) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open item store: {}", e));
        }
    };

    // Enforce retention before the query is built
    let cutoff = config.cutoff_timestamp();
    store
        .prune_older_than(cutoff)
        .await
        .context("Failed to prune old items")?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("catchup/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let events = EventBus::new();
    let refresher = Refresher::new(client, config.feed_url.clone(), store.clone(), events.clone());

    if args.once {
        return run_once(&refresher, &events).await;
    }

    // Live query over the rolling window, then the initial fetch; the app
    // always refreshes the feed at startup.
    let mut query = ItemQuery::new(&store, cutoff)
        .await
        .context("Failed to execute initial item fetch")?;
    let mut app = App::new(query.rows().to_vec());
    app.refreshing = refresher.spawn_refresh();

    ui::install_panic_hook();
    ui::run(&mut app, &store, &mut query, &refresher, &events, &config).await?;

    println!("Goodbye!");
    Ok(())
}

/// Headless mode: fetch the feed once and report the outcome.
async fn run_once(refresher: &Refresher, events: &EventBus) -> Result<()> {
    let mut rx = events.subscribe();
    refresher.spawn_refresh();

    match rx.recv().await? {
        FeedEvent::ItemsAdded { items, skipped } => {
            println!("Committed {} items ({} skipped)", items.len(), skipped);
            Ok(())
        }
        FeedEvent::ParseFailed(msg) | FeedEvent::FetchFailed(msg) => {
            eprintln!("Refresh failed: {}", msg);
            std::process::exit(1);
        }
    }
}
