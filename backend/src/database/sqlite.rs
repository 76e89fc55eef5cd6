use super::{counted, parse_date, Gateway, Totals, Transaction};
use crate::errors::DatabaseError;
use common::model::price::{PriceRow, DATE_FORMAT};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    price TEXT NOT NULL,
    create_date TEXT NOT NULL
)";

pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        SqliteGateway {
            conn: Mutex::new(conn),
        }
    }

    /// Creates the `prices` table when it does not exist yet.
    pub fn ensure_schema(&self) -> Result<(), DatabaseError> {
        self.lock()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }
}

impl Gateway for SqliteGateway {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, DatabaseError> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN")?;
        Ok(Box::new(SqliteTransaction {
            conn,
            finished: false,
        }))
    }

    fn rows(&self) -> Result<Vec<PriceRow>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, category, CAST(price AS TEXT), create_date FROM prices",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, name, category, price, create_date)| {
                Ok::<_, DatabaseError>(PriceRow {
                    id: Some(id),
                    name,
                    category,
                    price,
                    create_date: parse_date(create_date)?,
                })
            })
            .collect()
    }

    fn totals(&self) -> Result<Totals, DatabaseError> {
        let (categories, price) = self.lock()?.query_row(
            "SELECT COUNT(DISTINCT category), COALESCE(SUM(CAST(price AS REAL)), 0.0) FROM prices",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;
        Ok(Totals {
            categories: counted("category", categories)?,
            price,
        })
    }

    fn count(&self) -> Result<i64, DatabaseError> {
        Ok(self
            .lock()?
            .query_row("SELECT COUNT(*) FROM prices", [], |row| row.get(0))?)
    }
}

struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Transaction for SqliteTransaction<'_> {
    fn insert(&mut self, row: &PriceRow) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO prices (name, category, price, create_date) VALUES (?1, ?2, ?3, ?4)",
            params![
                row.name,
                row.category,
                row.price,
                row.create_date.format(DATE_FORMAT).to_string()
            ],
        )?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), DatabaseError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), DatabaseError> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::warn!("Rollback of abandoned transaction failed: {}", e);
            }
        }
    }
}
