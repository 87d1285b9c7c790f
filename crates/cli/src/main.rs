//! cartsync CLI - migrations and a command-line cart.
//!
//! # Usage
//!
//! ```bash
//! # Run account store migrations
//! cartsync migrate
//!
//! # Browse the catalog
//! cartsync catalog
//!
//! # Anonymous cart (local store only)
//! cartsync cart show
//! cartsync wishlist show
//!
//! # Signed-in cart (account store, local fallback)
//! cartsync --account 7d1e5b0c-2f4a-4b8e-9d6c-1a2b3c4d5e6f cart add <product-id> -q 2 --color red
//! cartsync --account 7d1e5b0c-2f4a-4b8e-9d6c-1a2b3c4d5e6f wishlist move <product-id>
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run account store migrations
//! - `catalog` - List products
//! - `cart` - Show and change the cart
//! - `wishlist` - Show and change the wishlist

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use cartsync_core::AccountId;
use cartsync_storefront::SyncConfig;

mod commands;

use commands::cart::CartAction;
use commands::wishlist::WishlistAction;
use commands::{CliError, Session};

#[derive(Parser)]
#[command(name = "cartsync")]
#[command(author, version, about = "cartsync CLI tools")]
struct Cli {
    /// Act as this signed-in account. Omit to stay anonymous.
    #[arg(long, global = true)]
    account: Option<Uuid>,

    /// Directory backing the local store (overrides `CARTSYNC_STORE_DIR`)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Ignore the configured database; every account store call fails
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run account store migrations
    Migrate,
    /// List catalog products
    Catalog,
    /// Show and change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Show and change the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Invalid configuration: {e}");
            }
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartsync_storefront=info,cartsync_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        sentry::capture_error(&e);
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mut config: SyncConfig) -> Result<(), CliError> {
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }
    let account = cli.account.map(AccountId::new);

    match cli.command {
        Commands::Migrate => commands::migrate::run(&config).await,
        Commands::Catalog => commands::catalog::run(&config, cli.offline).await,
        Commands::Cart { action } => {
            let session = Session::open(&config, account, cli.offline).await?;
            let result = commands::cart::run(&session, action).await;
            session.close().await;
            result
        }
        Commands::Wishlist { action } => {
            let session = Session::open(&config, account, cli.offline).await?;
            let result = commands::wishlist::run(&session, action).await;
            session.close().await;
            result
        }
    }
}
