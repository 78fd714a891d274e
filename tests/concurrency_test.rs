//! Concurrent use cases against one database file.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use coinshop::application::{AppError, ErrorKind};
use futures::future::join_all;
use tokio::sync::Barrier;

use common::{
    balance, create_users, purchase_quantity, test_shop, test_shop_with, total_balance,
    transfer_amount,
};

const ROUNDS: usize = 20;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_do_not_deadlock() -> Result<()> {
    let (shop, _temp) =
        test_shop_with(|config| config.with_busy_timeout(Duration::from_secs(30))).await?;
    create_users(&shop, &["alice", "bob"]).await?;

    let barrier = Arc::new(Barrier::new(2 * ROUNDS));
    let mut handles = Vec::new();

    for _ in 0..ROUNDS {
        for (from, to, amount) in [("alice", "bob", 7), ("bob", "alice", 3)] {
            let shop = shop.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                shop.transfer_coins(from, to, amount).await
            }));
        }
    }

    for result in join_all(handles).await {
        result??;
    }

    let rounds = ROUNDS as i64;
    assert_eq!(balance(&shop, "alice").await?, 1000 - 7 * rounds + 3 * rounds);
    assert_eq!(balance(&shop, "bob").await?, 1000 + 7 * rounds - 3 * rounds);
    assert_eq!(transfer_amount(&shop, "alice", "bob").await?, Some(7 * rounds));
    assert_eq!(transfer_amount(&shop, "bob", "alice").await?, Some(3 * rounds));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_purchases_never_overspend() -> Result<()> {
    let (shop, _temp) =
        test_shop_with(|config| config.with_busy_timeout(Duration::from_secs(30))).await?;
    create_users(&shop, &["alice"]).await?;

    let attempts = 5;
    let barrier = Arc::new(Barrier::new(attempts));
    let handles: Vec<_> = (0..attempts)
        .map(|_| {
            let shop = shop.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                shop.buy_item("pink-hoody", "alice").await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut rejected = 0;
    for result in join_all(handles).await {
        match result? {
            Ok(()) => succeeded += 1,
            // Rejected buyers checked the balance after both winners committed.
            Err(AppError::InsufficientFunds {
                required,
                available,
            }) => {
                assert_eq!(required, 500);
                assert_eq!(available, 0);
                rejected += 1;
            }
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert_eq!(succeeded, 2);
    assert_eq!(rejected, 3);
    assert_eq!(balance(&shop, "alice").await?, 0);
    assert_eq!(purchase_quantity(&shop, "alice", "pink-hoody").await?, Some(2));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ring_transfers_conserve_total() -> Result<()> {
    let (shop, _temp) =
        test_shop_with(|config| config.with_busy_timeout(Duration::from_secs(30))).await?;
    let names = ["alice", "bob", "carol", "dave"];
    create_users(&shop, &names).await?;

    let transfers: Vec<(usize, usize, i64)> = (0..48)
        .map(|i| (i % 4, (i + 1 + i / 4) % 4, (i as i64 % 50) + 1))
        .filter(|(from, to, _)| from != to)
        .collect();

    let mut expected = [1000i64; 4];
    for &(from, to, amount) in &transfers {
        expected[from] -= amount;
        expected[to] += amount;
    }

    let handles: Vec<_> = transfers
        .iter()
        .map(|&(from, to, amount)| {
            let shop = shop.clone();
            tokio::spawn(async move { shop.transfer_coins(names[from], names[to], amount).await })
        })
        .collect();

    for result in join_all(handles).await {
        result??;
    }

    assert_eq!(total_balance(&shop).await?, 4000);
    for (name, expected_balance) in names.iter().zip(expected) {
        assert_eq!(balance(&shop, name).await?, expected_balance, "{name}");
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_rolls_back_blocked_transfer() -> Result<()> {
    let (shop, _temp) = test_shop_with(|config| {
        config
            .with_busy_timeout(Duration::from_secs(2))
            .with_request_timeout(Duration::from_millis(200))
    })
    .await?;
    // Unbounded service calls so account setup never races the deadline
    shop.accounts().create("alice", "secret").await?;
    shop.accounts().create("bob", "secret").await?;

    // Hold the writer lock from another connection
    let mut blocker = shop.repository().pool().acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *blocker).await?;

    let err = shop.transfer_coins("alice", "bob", 10).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(err.to_string().contains("timed out"), "{err}");

    sqlx::query("ROLLBACK").execute(&mut *blocker).await?;
    drop(blocker);

    assert_eq!(balance(&shop, "alice").await?, 1000);
    assert_eq!(balance(&shop, "bob").await?, 1000);
    assert_eq!(transfer_amount(&shop, "alice", "bob").await?, None);

    shop.commerce().transfer("alice", "bob", 10).await?;
    assert_eq!(balance(&shop, "bob").await?, 1010);

    Ok(())
}

#[tokio::test]
async fn test_reads_do_not_wait_for_writers() -> Result<()> {
    let (shop, _temp) = test_shop().await?;
    create_users(&shop, &["alice"]).await?;
    shop.buy_item("cup", "alice").await?;

    let mut blocker = shop.repository().pool().acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *blocker).await?;
    sqlx::query("UPDATE users SET balance = 0 WHERE username = 'alice'")
        .execute(&mut *blocker)
        .await?;

    // Uncommitted writes stay invisible to a read unit of work
    let info = shop.get_account_info("alice").await?;
    assert_eq!(info.coins, 980);
    assert_eq!(info.inventory.len(), 1);

    sqlx::query("ROLLBACK").execute(&mut *blocker).await?;
    Ok(())
}
