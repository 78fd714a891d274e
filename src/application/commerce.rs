use tracing::{info, instrument};

use crate::domain::{Coins, Item, User};
use crate::storage::{Repository, TxMode, is_check_violation};

use super::AppError;

/// Purchases and coin transfers: the use cases that move money.
///
/// Each use case runs as one [`TxMode::Write`] unit of work. Input
/// validation happens before the transaction is opened.
#[derive(Clone)]
pub struct CommerceService {
    repo: Repository,
}

impl CommerceService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    // ========================
    // Catalog
    // ========================

    /// Get a catalog item by name.
    pub async fn get_item(&self, name: &str) -> Result<Item, AppError> {
        if name.is_empty() {
            return Err(AppError::bad_request("item name is required"));
        }

        self.repo
            .find_item(self.repo.pool(), name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("item '{name}'")))
    }

    /// List the whole catalog.
    pub async fn list_items(&self) -> Result<Vec<Item>, AppError> {
        Ok(self.repo.list_items(self.repo.pool()).await?)
    }

    // ========================
    // Purchases
    // ========================

    /// Buy one unit of `item_name` for `username`.
    ///
    /// The buyer must exist (a missing buyer is an auth failure), the item
    /// must exist and the buyer must afford its price.
    #[instrument(skip(self))]
    pub async fn buy_item(&self, item_name: &str, username: &str) -> Result<(), AppError> {
        if username.is_empty() {
            return Err(AppError::unauthorized("missing user identity"));
        }
        if item_name.is_empty() {
            return Err(AppError::bad_request("item name is required"));
        }

        self.repo
            .with_transaction(TxMode::Write, |uow| {
                Box::pin(async move {
                    let user = self
                        .repo
                        .find_user(uow.conn(), username)
                        .await?
                        .ok_or_else(|| AppError::unauthorized(format!("unknown user '{username}'")))?;

                    let item = self
                        .repo
                        .find_item(uow.conn(), item_name)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("item '{item_name}'")))?;

                    ensure_funds(&user, item.price)?;

                    self.repo
                        .make_purchase(uow.conn(), user.id, item.id, item.price)
                        .await
                        .map_err(|err| funds_or_internal(err, &user, item.price))?;

                    info!(user_id = user.id, item = %item.name, price = item.price, "item purchased");
                    Ok::<_, AppError>(())
                })
            })
            .await
    }

    // ========================
    // Transfers
    // ========================

    /// Send `amount` coins from `from` to `to`.
    ///
    /// An unknown sender is an auth failure, an unknown recipient is a
    /// client error.
    #[instrument(skip(self))]
    pub async fn transfer(&self, from: &str, to: &str, amount: Coins) -> Result<(), AppError> {
        if from.is_empty() {
            return Err(AppError::unauthorized("missing user identity"));
        }
        if amount <= 0 {
            return Err(AppError::bad_request("amount must be positive"));
        }
        if to.is_empty() {
            return Err(AppError::bad_request("recipient is required"));
        }
        if from == to {
            return Err(AppError::bad_request("cannot send coins to yourself"));
        }

        self.repo
            .with_transaction(TxMode::Write, |uow| {
                Box::pin(async move {
                    let sender = self
                        .repo
                        .find_user(uow.conn(), from)
                        .await?
                        .ok_or_else(|| AppError::unauthorized(format!("unknown user '{from}'")))?;

                    ensure_funds(&sender, amount)?;

                    let receiver = self
                        .repo
                        .find_user(uow.conn(), to)
                        .await?
                        .ok_or_else(|| AppError::bad_request(format!("unknown recipient '{to}'")))?;

                    self.repo
                        .make_transfer(uow.conn(), sender.id, receiver.id, amount)
                        .await
                        .map_err(|err| funds_or_internal(err, &sender, amount))?;

                    info!(
                        sender_id = sender.id,
                        receiver_id = receiver.id,
                        amount,
                        "coins transferred"
                    );
                    Ok::<_, AppError>(())
                })
            })
            .await
    }
}

fn ensure_funds(user: &User, required: Coins) -> Result<(), AppError> {
    if user.can_afford(required) {
        Ok(())
    } else {
        Err(AppError::InsufficientFunds {
            required,
            available: user.balance,
        })
    }
}

/// The non-negative balance constraint is the store-side backstop of
/// [`ensure_funds`]; report it the same way.
fn funds_or_internal(err: anyhow::Error, user: &User, required: Coins) -> AppError {
    if is_check_violation(&err) {
        AppError::InsufficientFunds {
            required,
            available: user.balance,
        }
    } else {
        AppError::Internal(err)
    }
}
