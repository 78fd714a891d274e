use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Acquire, Executor, Row, Sqlite, SqlitePool};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::domain::{
    CoinHistory, Coins, CoinsReceived, CoinsSent, InventoryItem, Item, ItemId, NewUser, User,
    UserId,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_CATALOG, TxMode, UnitOfWork};

/// Typed data access for users, items, purchases and transfers.
///
/// Every query method takes the store to run against: pass [`Repository::pool`]
/// for a standalone call, or [`UnitOfWork::conn`] to take part in an open
/// transaction. Methods issuing more than one statement open their own nested
/// scope, a transaction on the pool or a savepoint inside a unit of work.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to an existing database.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        Self::open(config, false).await
    }

    /// Initialize a database (create if missing + migrate).
    pub async fn init(config: &StoreConfig) -> Result<Self> {
        let repo = Self::open(config, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    async fn open(config: &StoreConfig, create_if_missing: bool) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(config.connect_options(create_if_missing))
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to database {}",
                    config.database_path.display()
                )
            })?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run more than once.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::raw_sql(MIGRATION_002_CATALOG)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// The direct, non-transactional store handle.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // Unit of work
    // ========================

    /// Run `f` inside one transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err` and
    /// hands that error back untouched. A panic in `f`, or dropping the
    /// returned future, rolls the transaction back as well.
    pub async fn with_transaction<'a, T, E, F>(&self, mode: TxMode, f: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut UnitOfWork<'a>) -> BoxFuture<'t, Result<T, E>>,
        E: From<anyhow::Error>,
    {
        let mut uow = UnitOfWork::begin(&self.pool, mode).await?;

        match f(&mut uow).await {
            Ok(value) => {
                uow.commit().await?;
                debug!(?mode, "transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(?mode, error = %rollback_err, "rollback failed");
                } else {
                    debug!(?mode, "transaction rolled back");
                }
                Err(err)
            }
        }
    }

    // ========================
    // User operations
    // ========================

    /// Get a user by username. `None` when no such user exists.
    pub async fn find_user<'c, E>(&self, db: E, username: &str) -> Result<Option<User>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let row = sqlx::query(
            r#"
            SELECT id, username, password, salt, balance, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await
        .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Insert a new user and return the store-assigned id.
    /// The starting balance comes from the column default.
    pub async fn create_user<'c, E>(&self, db: E, user: &NewUser) -> Result<UserId>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password, salt, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.password)
        .bind(&user.salt)
        .bind(user.created_at.to_rfc3339())
        .execute(db)
        .await
        .context("Failed to insert user")?;

        Ok(result.last_insert_rowid())
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            password: row.get("password"),
            salt: row.get("salt"),
            balance: row.get("balance"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Catalog operations
    // ========================

    /// Get an item by name. `None` when the catalog has no such item.
    pub async fn find_item<'c, E>(&self, db: E, name: &str) -> Result<Option<Item>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let row = sqlx::query("SELECT id, name, price FROM items WHERE name = ?")
            .bind(name)
            .fetch_optional(db)
            .await
            .context("Failed to fetch item")?;

        Ok(row.as_ref().map(Self::row_to_item))
    }

    /// List the whole catalog, ordered by name.
    pub async fn list_items<'c, E>(&self, db: E) -> Result<Vec<Item>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let rows = sqlx::query("SELECT id, name, price FROM items ORDER BY name")
            .fetch_all(db)
            .await
            .context("Failed to list items")?;

        Ok(rows.iter().map(Self::row_to_item).collect())
    }

    fn row_to_item(row: &SqliteRow) -> Item {
        Item {
            id: row.get("id"),
            name: row.get("name"),
            price: row.get("price"),
        }
    }

    // ========================
    // Purchase operations
    // ========================

    /// Record one more unit of `item_id` for the user and charge `price`.
    pub async fn make_purchase<'c, A>(
        &self,
        db: A,
        user_id: UserId,
        item_id: ItemId,
        price: Coins,
    ) -> Result<()>
    where
        A: Acquire<'c, Database = Sqlite>,
    {
        let mut tx = db.begin().await.context("Failed to open purchase scope")?;

        sqlx::query(
            r#"
            INSERT INTO purchases (user_id, item_id, quantity)
            VALUES (?, ?, 1)
            ON CONFLICT (user_id, item_id)
            DO UPDATE SET quantity = quantity + 1
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .execute(&mut *tx)
        .await
        .context("Failed to record purchase")?;

        sqlx::query("UPDATE users SET balance = balance - ? WHERE id = ?")
            .bind(price)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update balance")?;

        tx.commit().await.context("Failed to close purchase scope")?;
        Ok(())
    }

    /// Items the user owns with their quantities, ordered by item name.
    pub async fn list_inventory<'c, E>(&self, db: E, user_id: UserId) -> Result<Vec<InventoryItem>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let rows = sqlx::query(
            r#"
            SELECT items.name AS name, purchases.quantity AS quantity
            FROM purchases
            JOIN items ON items.id = purchases.item_id
            WHERE purchases.user_id = ?
            ORDER BY items.name
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
        .context("Failed to list inventory")?;

        Ok(rows
            .iter()
            .map(|row| InventoryItem {
                item_type: row.get("name"),
                quantity: row.get("quantity"),
            })
            .collect())
    }

    // ========================
    // Transfer operations
    // ========================

    /// Move `amount` coins from sender to receiver and add it to the
    /// accumulator of the ordered (sender, receiver) pair.
    ///
    /// Balance rows are updated in ascending id order whichever side sends,
    /// so two opposite transfers between the same users lock rows in the
    /// same order.
    pub async fn make_transfer<'c, A>(
        &self,
        db: A,
        sender_id: UserId,
        receiver_id: UserId,
        amount: Coins,
    ) -> Result<()>
    where
        A: Acquire<'c, Database = Sqlite>,
    {
        let mut tx = db.begin().await.context("Failed to open transfer scope")?;

        sqlx::query(
            r#"
            INSERT INTO transfers (sender_id, receiver_id, amount)
            VALUES (?, ?, ?)
            ON CONFLICT (sender_id, receiver_id)
            DO UPDATE SET amount = amount + excluded.amount
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .context("Failed to record transfer")?;

        for (user_id, delta) in balance_updates(sender_id, receiver_id, amount) {
            sqlx::query("UPDATE users SET balance = balance + ? WHERE id = ?")
                .bind(delta)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to update balance of user {user_id} by {delta}"))?;
        }

        tx.commit().await.context("Failed to close transfer scope")?;
        Ok(())
    }

    /// Cumulative amounts sent to and received from each counterparty.
    pub async fn list_transactions<'c, E>(&self, db: E, user_id: UserId) -> Result<CoinHistory>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let rows = sqlx::query(
            r#"
            SELECT 'sent' AS direction, users.username AS username, transfers.amount AS amount
            FROM transfers
            JOIN users ON users.id = transfers.receiver_id
            WHERE transfers.sender_id = ?

            UNION ALL

            SELECT 'received' AS direction, users.username AS username, transfers.amount AS amount
            FROM transfers
            JOIN users ON users.id = transfers.sender_id
            WHERE transfers.receiver_id = ?

            ORDER BY direction, username
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(db)
        .await
        .context("Failed to list transactions")?;

        let mut history = CoinHistory::default();
        for row in &rows {
            let direction: String = row.get("direction");
            let username: String = row.get("username");
            let amount: Coins = row.get("amount");

            match direction.as_str() {
                "sent" => history.sent.push(CoinsSent {
                    to_user: username,
                    amount,
                }),
                "received" => history.received.push(CoinsReceived {
                    from_user: username,
                    amount,
                }),
                other => anyhow::bail!("Invalid transfer direction: {other}"),
            }
        }

        Ok(history)
    }
}

/// Balance deltas of a transfer in canonical order (ascending user id).
pub(crate) fn balance_updates(
    sender_id: UserId,
    receiver_id: UserId,
    amount: Coins,
) -> [(UserId, Coins); 2] {
    let mut updates = [(sender_id, -amount), (receiver_id, amount)];
    updates.sort_by_key(|&(user_id, _)| user_id);
    updates
}
