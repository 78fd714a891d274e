mod repository;
mod unit_of_work;

pub use repository::*;
pub use unit_of_work::*;

use sqlx::error::ErrorKind;

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration seeding the merch catalog
pub const MIGRATION_002_CATALOG: &str = include_str!("migrations/002_catalog.sql");

/// True when a store error was caused by a duplicate key.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(database_error_kind(err), Some(ErrorKind::UniqueViolation))
}

/// True when a store error was caused by a `CHECK` constraint,
/// e.g. a balance update that would take an account below zero.
pub fn is_check_violation(err: &anyhow::Error) -> bool {
    matches!(database_error_kind(err), Some(ErrorKind::CheckViolation))
}

fn database_error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .and_then(|sqlx_err| match sqlx_err {
            sqlx::Error::Database(db_err) => Some(db_err.kind()),
            _ => None,
        })
}
