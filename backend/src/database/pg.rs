use super::{counted, parse_date, Gateway, Totals, Transaction};
use crate::config::PostgresConfig;
use crate::errors::DatabaseError;
use common::model::price::{PriceRow, DATE_FORMAT};
use postgres::config::SslMode;
use postgres::{Client, NoTls};
use std::sync::{Mutex, MutexGuard};

/// Gateway over a single synchronous PostgreSQL client.
///
/// The client runs its own small runtime, so every call must happen on a
/// blocking thread (`tokio::task::spawn_blocking`), never directly inside an
/// async handler.
pub struct PostgresGateway {
    client: Mutex<Option<Client>>,
}

impl PostgresGateway {
    /// Connects and pings the server. Fails when either step fails.
    pub fn connect(config: &PostgresConfig) -> Result<Self, DatabaseError> {
        let mut client = postgres::Config::new()
            .host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(&config.password)
            .dbname(&config.dbname)
            .ssl_mode(SslMode::Disable)
            .connect(NoTls)?;
        client.simple_query("SELECT 1")?;
        log::debug!(
            "Connected to postgres at {}:{}/{}",
            config.host,
            config.port,
            config.dbname
        );
        Ok(PostgresGateway {
            client: Mutex::new(Some(client)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Client>>, DatabaseError> {
        self.client.lock().map_err(|_| DatabaseError::Poisoned)
    }
}

fn client(slot: &mut Option<Client>) -> Result<&mut Client, DatabaseError> {
    slot.as_mut().ok_or(DatabaseError::Closed)
}

impl Gateway for PostgresGateway {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, DatabaseError> {
        let mut guard = self.lock()?;
        client(&mut guard)?.batch_execute("BEGIN")?;
        Ok(Box::new(PostgresTransaction {
            guard,
            finished: false,
        }))
    }

    fn rows(&self) -> Result<Vec<PriceRow>, DatabaseError> {
        let mut guard = self.lock()?;
        let rows = client(&mut guard)?.query(
            "SELECT id::bigint, name, category, price::text, TO_CHAR(create_date, 'YYYY-MM-DD') \
             FROM prices",
            &[],
        )?;

        rows.iter()
            .map(|row| -> Result<PriceRow, DatabaseError> {
                Ok(PriceRow {
                    id: Some(row.try_get::<_, i64>(0)?),
                    name: row.try_get(1)?,
                    category: row.try_get(2)?,
                    price: row.try_get(3)?,
                    create_date: parse_date(row.try_get(4)?)?,
                })
            })
            .collect()
    }

    fn totals(&self) -> Result<Totals, DatabaseError> {
        let mut guard = self.lock()?;
        let row = client(&mut guard)?.query_one(
            "SELECT COUNT(DISTINCT category), \
             COALESCE(SUM(CAST(price AS numeric)), 0)::float8 \
             FROM prices",
            &[],
        )?;
        Ok(Totals {
            categories: counted("category", row.try_get::<_, i64>(0)?)?,
            price: row.try_get(1)?,
        })
    }

    fn count(&self) -> Result<i64, DatabaseError> {
        let mut guard = self.lock()?;
        let row = client(&mut guard)?.query_one("SELECT COUNT(*) FROM prices", &[])?;
        Ok(row.try_get(0)?)
    }
}

impl Drop for PostgresGateway {
    // Closing the client blocks on its runtime, which panics on an async
    // worker thread. Hand it to a plain thread instead.
    fn drop(&mut self) {
        let slot = match self.client.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(client) = slot.take() {
            if std::thread::spawn(move || drop(client)).join().is_err() {
                log::warn!("Closing the postgres connection panicked");
            }
        }
    }
}

struct PostgresTransaction<'a> {
    guard: MutexGuard<'a, Option<Client>>,
    finished: bool,
}

impl Transaction for PostgresTransaction<'_> {
    fn insert(&mut self, row: &PriceRow) -> Result<(), DatabaseError> {
        let create_date = row.create_date.format(DATE_FORMAT).to_string();
        client(&mut self.guard)?.execute(
            "INSERT INTO prices (name, category, price, create_date) \
             VALUES ($1, $2, $3::text::numeric, $4::text::date)",
            &[&row.name, &row.category, &row.price, &create_date],
        )?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), DatabaseError> {
        client(&mut self.guard)?.batch_execute("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), DatabaseError> {
        self.finished = true;
        client(&mut self.guard)?.batch_execute("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for PostgresTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(client) = self.guard.as_mut() {
            if let Err(e) = client.batch_execute("ROLLBACK") {
                log::warn!("Rollback of abandoned transaction failed: {}", e);
            }
        }
    }
}
