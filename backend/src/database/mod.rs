//! Access to the `prices` table.
//!
//! Handlers only see the `Gateway` trait, injected as `web::Data<dyn Gateway>`.
//! Two implementations exist: `PostgresGateway` for production and
//! `SqliteGateway` for local runs and tests. Both keep one connection behind a
//! mutex; an open `Transaction` holds that lock until it is committed, rolled
//! back or dropped, so work from concurrent requests never interleaves.

mod pg;
mod sqlite;

pub use self::pg::PostgresGateway;
pub use self::sqlite::SqliteGateway;

use crate::config::DatabaseConfig;
use crate::errors::DatabaseError;
use common::model::price::PriceRow;
use std::sync::Arc;

/// Table-wide aggregates returned after an import.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub categories: u64,
    pub price: f64,
}

pub trait Gateway: Send + Sync {
    /// Opens a transaction on the shared connection.
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, DatabaseError>;

    /// Every stored row, in whatever order the database returns them.
    fn rows(&self) -> Result<Vec<PriceRow>, DatabaseError>;

    /// Distinct category count and price sum over the whole table.
    fn totals(&self) -> Result<Totals, DatabaseError>;

    fn count(&self) -> Result<i64, DatabaseError>;
}

/// An open transaction. Dropping it without calling `commit` rolls back.
pub trait Transaction {
    fn insert(&mut self, row: &PriceRow) -> Result<(), DatabaseError>;

    fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// Connects to the configured backend. Blocking: call it off the async runtime.
pub fn open(config: &DatabaseConfig) -> Result<Arc<dyn Gateway>, DatabaseError> {
    match config {
        DatabaseConfig::Postgres(pg) => Ok(Arc::new(PostgresGateway::connect(pg)?)),
        DatabaseConfig::Sqlite(path) => {
            let gateway = SqliteGateway::open(path)?;
            gateway.ensure_schema()?;
            Ok(Arc::new(gateway))
        }
    }
}

fn counted(column: &'static str, value: i64) -> Result<u64, DatabaseError> {
    u64::try_from(value).map_err(|_| DatabaseError::Decode {
        column,
        value: value.to_string(),
    })
}

fn parse_date(value: String) -> Result<chrono::NaiveDate, DatabaseError> {
    chrono::NaiveDate::parse_from_str(&value, common::model::price::DATE_FORMAT).map_err(|_| {
        DatabaseError::Decode {
            column: "create_date",
            value,
        }
    })
}
