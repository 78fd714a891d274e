// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use coinshop::application::{Argon2Hasher, CoinShop};
use coinshop::config::StoreConfig;
use coinshop::domain::{Coins, User};
use sqlx::Row;
use tempfile::TempDir;

/// Helper to create a test shop with a temporary database
pub async fn test_shop() -> Result<(CoinShop, TempDir)> {
    test_shop_with(|config| config).await
}

/// Same as [`test_shop`] with a tweaked store configuration
pub async fn test_shop_with(
    configure: impl FnOnce(StoreConfig) -> StoreConfig,
) -> Result<(CoinShop, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = configure(StoreConfig::new(temp_dir.path().join("test.db")));
    let shop = CoinShop::init_with_hasher(&config, Arc::new(Argon2Hasher::fast())).await?;
    Ok((shop, temp_dir))
}

/// Create accounts with the starting balance
pub async fn create_users(shop: &CoinShop, usernames: &[&str]) -> Result<Vec<User>> {
    let mut users = Vec::new();
    for username in usernames {
        users.push(shop.create_account(username, "secret").await?);
    }
    Ok(users)
}

pub async fn balance(shop: &CoinShop, username: &str) -> Result<Coins> {
    let repo = shop.repository();
    let user = repo
        .find_user(repo.pool(), username)
        .await?
        .with_context(|| format!("user {username} not found"))?;
    Ok(user.balance)
}

pub async fn total_balance(shop: &CoinShop) -> Result<Coins> {
    let row = sqlx::query("SELECT COALESCE(SUM(balance), 0) AS total FROM users")
        .fetch_one(shop.repository().pool())
        .await?;
    Ok(row.get("total"))
}

/// Quantity on the purchase row of (user, item), if any
pub async fn purchase_quantity(shop: &CoinShop, username: &str, item: &str) -> Result<Option<i64>> {
    let row = sqlx::query(
        r#"
        SELECT purchases.quantity AS quantity
        FROM purchases
        JOIN users ON users.id = purchases.user_id
        JOIN items ON items.id = purchases.item_id
        WHERE users.username = ? AND items.name = ?
        "#,
    )
    .bind(username)
    .bind(item)
    .fetch_optional(shop.repository().pool())
    .await?;
    Ok(row.map(|r| r.get("quantity")))
}

/// Accumulated amount on the transfer row of the ordered (sender, receiver) pair
pub async fn transfer_amount(shop: &CoinShop, sender: &str, receiver: &str) -> Result<Option<i64>> {
    let row = sqlx::query(
        r#"
        SELECT transfers.amount AS amount
        FROM transfers
        JOIN users s ON s.id = transfers.sender_id
        JOIN users r ON r.id = transfers.receiver_id
        WHERE s.username = ? AND r.username = ?
        "#,
    )
    .bind(sender)
    .bind(receiver)
    .fetch_optional(shop.repository().pool())
    .await?;
    Ok(row.map(|r| r.get("amount")))
}

pub async fn count_rows(shop: &CoinShop, table: &str) -> Result<i64> {
    let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {table}"))
        .fetch_one(shop.repository().pool())
        .await?;
    Ok(row.get("count"))
}
