use std::sync::Arc;

use anyhow::{Context, anyhow};
use tracing::{info, instrument, warn};

use crate::domain::{AccountInfo, NewUser, User};
use crate::storage::{Repository, TxMode, is_unique_violation};

use super::{AppError, PasswordHasher};

/// Account creation, login and the aggregated account view.
#[derive(Clone)]
pub struct AccountService {
    repo: Repository,
    hasher: Arc<dyn PasswordHasher>,
}

impl AccountService {
    pub fn new(repo: Repository, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { repo, hasher }
    }

    /// Create an account with the starting balance.
    #[instrument(skip(self, password))]
    pub async fn create(&self, username: &str, password: &str) -> Result<User, AppError> {
        if username.is_empty() || password.is_empty() {
            return Err(AppError::bad_request("username and password are required"));
        }

        let (hash, salt) = self.hash_password(password).await?;
        let new_user = NewUser::new(username, hash, salt);

        match self.repo.create_user(self.repo.pool(), &new_user).await {
            Ok(user_id) => info!(user_id, "account created"),
            Err(err) if is_unique_violation(&err) => {
                return Err(AppError::UserAlreadyExists(username.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        self.repo
            .find_user(self.repo.pool(), username)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow!("user '{username}' missing after insert")))
    }

    /// Balance, inventory and transfer history read from one snapshot.
    ///
    /// Store failures are logged here and reported as a generic internal error.
    #[instrument(skip(self))]
    pub async fn info(&self, username: &str) -> Result<AccountInfo, AppError> {
        if username.is_empty() {
            return Err(AppError::bad_request("username is required"));
        }

        self.repo
            .with_transaction(TxMode::Read, |uow| {
                Box::pin(async move {
                    let user = self
                        .repo
                        .find_user(uow.conn(), username)
                        .await?
                        .ok_or_else(|| AppError::unauthorized(format!("unknown user '{username}'")))?;

                    let inventory = self
                        .repo
                        .list_inventory(uow.conn(), user.id)
                        .await
                        .context("Failed to load inventory")?;

                    let coin_history = self
                        .repo
                        .list_transactions(uow.conn(), user.id)
                        .await
                        .context("Failed to load transaction history")?;

                    Ok::<_, AppError>(AccountInfo {
                        coins: user.balance,
                        inventory,
                        coin_history,
                    })
                })
            })
            .await
            .map_err(|err| match err {
                AppError::Internal(cause) => {
                    warn!(error = %format!("{cause:#}"), "failed to load account info");
                    AppError::Internal(anyhow!("failed to load account info"))
                }
                other => other,
            })
    }

    /// Check credentials, registering the user on first login.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AppError> {
        if username.is_empty() || password.is_empty() {
            return Err(AppError::bad_request("username and password are required"));
        }

        let user = match self.repo.find_user(self.repo.pool(), username).await? {
            Some(user) => user,
            None => match self.create(username, password).await {
                Ok(user) => user,
                // Lost a registration race; the other login created the row.
                Err(AppError::UserAlreadyExists(_)) => self
                    .repo
                    .find_user(self.repo.pool(), username)
                    .await?
                    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?,
                Err(err) => return Err(err),
            },
        };

        if !self.verify_password(password, &user).await? {
            return Err(AppError::unauthorized("invalid credentials"));
        }

        Ok(user)
    }

    async fn hash_password(&self, password: &str) -> Result<(Vec<u8>, Vec<u8>), AppError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_owned();

        let hashed = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("Password hashing task failed")?
            .context("Failed to hash password")?;
        Ok(hashed)
    }

    async fn verify_password(&self, password: &str, user: &User) -> Result<bool, AppError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_owned();
        let hash = user.password.clone();
        let salt = user.salt.clone();

        let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash, &salt))
            .await
            .context("Password verification task failed")?;
        Ok(matches)
    }
}
