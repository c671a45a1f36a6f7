//! Postgres-backed cash store.
//!
//! [`SeaStore`] implements the store ports of `mavuno-core`. Every atomic
//! unit runs inside one database transaction and locks the rows it decides
//! on with `SELECT ... FOR UPDATE`.

use chrono::{DateTime, FixedOffset, Utc};
use mavuno_core::CashError;
use sea_orm::{DatabaseConnection, DbErr, SqlErr};

/// Cash store backed by a `SeaORM` connection pool.
#[derive(Debug, Clone)]
pub struct SeaStore {
    pub(crate) db: DatabaseConnection,
}

impl SeaStore {
    /// Creates a store on an existing connection.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// The underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Maps a database error onto the cash error taxonomy.
///
/// Connection failures are transient and let callers take the degraded path.
pub(crate) fn store_err(err: DbErr) -> CashError {
    match &err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => CashError::StoreUnavailable(err.to_string()),
        _ => CashError::Store(err.to_string()),
    }
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Parses a text column into a domain enum.
pub(crate) fn parse_column<T>(
    value: &str,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, CashError> {
    parse(value).ok_or_else(|| CashError::Store(format!("unknown {column} '{value}'")))
}

pub(crate) fn to_db_time(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.fixed_offset()
}

pub(crate) fn from_db_time(at: DateTime<FixedOffset>) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

pub(crate) fn to_db_int(value: u32, column: &str) -> Result<i32, CashError> {
    i32::try_from(value).map_err(|_| CashError::Store(format!("{column} {value} out of range")))
}

pub(crate) fn from_db_int(value: i32, column: &str) -> Result<u32, CashError> {
    u32::try_from(value).map_err(|_| CashError::Store(format!("negative {column} {value}")))
}
