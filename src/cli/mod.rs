use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::application::CoinShop;
use crate::config::{DEFAULT_DATABASE_PATH, StoreConfig};
use crate::domain::{AccountInfo, Coins};

/// Coinshop - virtual coin wallet and merch shop
#[derive(Parser)]
#[command(name = "coinshop")]
#[command(about = "Buy merch and send coins, backed by a transactional SQLite ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "COINSHOP_DATABASE", default_value = DEFAULT_DATABASE_PATH)]
    pub database: PathBuf,

    /// Maximum number of pooled database connections
    #[arg(long, env = "COINSHOP_MAX_CONNECTIONS", default_value_t = 8)]
    pub max_connections: u32,

    /// How long to wait for a busy database, in milliseconds
    #[arg(long, env = "COINSHOP_BUSY_TIMEOUT_MS", default_value_t = 5_000)]
    pub busy_timeout_ms: u64,

    /// Deadline for a single operation, in milliseconds
    #[arg(long, env = "COINSHOP_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database and seed the catalog
    Init,

    /// Create a new account
    Register {
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// Check credentials (registers the account on first login)
    Login {
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// Show balance, inventory and coin history
    Info {
        /// Acting user
        #[arg(short, long)]
        user: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the merch catalog
    Items,

    /// Buy one item
    Buy {
        /// Item name (e.g., "t-shirt")
        item: String,

        /// Acting user
        #[arg(short, long)]
        user: String,
    },

    /// Send coins to another user
    Send {
        /// Number of coins
        amount: Coins,

        /// Acting user
        #[arg(long)]
        from: String,

        /// Recipient
        #[arg(long)]
        to: String,
    },
}

impl Cli {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.database)
            .with_max_connections(self.max_connections)
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
    }

    pub async fn run(self) -> Result<()> {
        let config = self.store_config();

        match self.command {
            Commands::Init => {
                let shop = CoinShop::init(&config).await?;
                shop.repository().close().await;
                println!("Database initialized: {}", config.database_path.display());
            }

            Commands::Register { username, password } => {
                let shop = CoinShop::connect(&config).await?;
                let user = shop.create_account(&username, &password).await?;
                println!("Created account: {} ({} coins)", user.username, user.balance);
            }

            Commands::Login { username, password } => {
                let shop = CoinShop::connect(&config).await?;
                let user = shop.authenticate(&username, &password).await?;
                println!("Logged in as {} ({} coins)", user.username, user.balance);
            }

            Commands::Info { user, json } => {
                let shop = CoinShop::connect(&config).await?;
                let info = shop.get_account_info(&user).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&info)?);
                } else {
                    print_info(&user, &info);
                }
            }

            Commands::Items => {
                let shop = CoinShop::connect(&config).await?;
                let items = shop.list_items().await?;
                println!("{:<16} {:>6}", "ITEM", "PRICE");
                println!("{}", "-".repeat(23));
                for item in items {
                    println!("{:<16} {:>6}", item.name, item.price);
                }
            }

            Commands::Buy { item, user } => {
                let shop = CoinShop::connect(&config).await?;
                shop.buy_item(&item, &user).await?;
                println!("{} bought {}", user, item);
            }

            Commands::Send { amount, from, to } => {
                let shop = CoinShop::connect(&config).await?;
                shop.transfer_coins(&from, &to, amount).await?;
                println!("Sent {} coins: {} -> {}", amount, from, to);
            }
        }

        Ok(())
    }
}

fn print_info(username: &str, info: &AccountInfo) {
    println!("Account: {}", username);
    println!("  Coins: {}", info.coins);

    println!();
    println!("Inventory:");
    if info.inventory.is_empty() {
        println!("  (empty)");
    }
    for line in &info.inventory {
        println!("  {:<16} x{}", line.item_type, line.quantity);
    }

    println!();
    println!("Sent ({} total):", info.coin_history.total_sent());
    for sent in &info.coin_history.sent {
        println!("  -> {:<16} {:>6}", sent.to_user, sent.amount);
    }
    println!("Received ({} total):", info.coin_history.total_received());
    for received in &info.coin_history.received {
        println!("  <- {:<16} {:>6}", received.from_user, received.amount);
    }
}
