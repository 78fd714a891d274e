// Application layer - use cases and orchestration.
// `CoinShop` is the entry point for any client (CLI, HTTP, tests); the
// services below it each own one group of use cases.

pub mod account;
pub mod commerce;
pub mod error;
pub mod password;

pub use account::AccountService;
pub use commerce::CommerceService;
pub use error::*;
pub use password::{Argon2Hasher, PasswordError, PasswordHasher};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::warn;

use crate::config::StoreConfig;
use crate::domain::{AccountInfo, Coins, Item, User};
use crate::storage::Repository;

/// The core operations of the shop, each bounded by a request deadline.
///
/// When the deadline passes the in-flight use case is dropped, which rolls
/// back its open transaction.
#[derive(Clone)]
pub struct CoinShop {
    repo: Repository,
    accounts: AccountService,
    commerce: CommerceService,
    request_timeout: Duration,
}

impl CoinShop {
    pub fn new(
        repo: Repository,
        hasher: Arc<dyn PasswordHasher>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            accounts: AccountService::new(repo.clone(), hasher),
            commerce: CommerceService::new(repo.clone()),
            repo,
            request_timeout,
        }
    }

    /// Initialize the database (create + migrate) and build the shop.
    pub async fn init(config: &StoreConfig) -> Result<Self, AppError> {
        Self::init_with_hasher(config, Arc::new(Argon2Hasher::default())).await
    }

    pub async fn init_with_hasher(
        config: &StoreConfig,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Result<Self, AppError> {
        let repo = Repository::init(config).await?;
        Ok(Self::new(repo, hasher, config.request_timeout))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &StoreConfig) -> Result<Self, AppError> {
        let repo = Repository::connect(config).await?;
        Ok(Self::new(
            repo,
            Arc::new(Argon2Hasher::default()),
            config.request_timeout,
        ))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn commerce(&self) -> &CommerceService {
        &self.commerce
    }

    pub async fn create_account(&self, username: &str, password: &str) -> Result<User, AppError> {
        self.bounded("create_account", self.accounts.create(username, password))
            .await
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AppError> {
        self.bounded("authenticate", self.accounts.authenticate(username, password))
            .await
    }

    pub async fn get_account_info(&self, username: &str) -> Result<AccountInfo, AppError> {
        self.bounded("get_account_info", self.accounts.info(username))
            .await
    }

    pub async fn buy_item(&self, item_name: &str, username: &str) -> Result<(), AppError> {
        self.bounded("buy_item", self.commerce.buy_item(item_name, username))
            .await
    }

    pub async fn transfer_coins(&self, from: &str, to: &str, amount: Coins) -> Result<(), AppError> {
        self.bounded("transfer_coins", self.commerce.transfer(from, to, amount))
            .await
    }

    pub async fn get_item(&self, name: &str) -> Result<Item, AppError> {
        self.bounded("get_item", self.commerce.get_item(name)).await
    }

    pub async fn list_items(&self) -> Result<Vec<Item>, AppError> {
        self.bounded("list_items", self.commerce.list_items()).await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout = ?self.request_timeout, "request deadline exceeded");
                Err(AppError::Internal(anyhow!(
                    "{operation} timed out after {:?}",
                    self.request_timeout
                )))
            }
        }
    }
}
