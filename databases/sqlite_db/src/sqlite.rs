// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # SQLite claim store backend.
//!
//! Claims live in a single `claims` table. Every mutation runs inside an `IMMEDIATE`
//! transaction, which takes the database write lock up front, so concurrent claims issued from
//! several connections (or several processes) are serialized by SQLite itself. Statements run on
//! the tokio blocking pool.
//!

use store::{ClaimStore, Error, check_claim};

use async_trait::async_trait;
use rusqlite::{
    Connection, OpenFlags, OptionalExtension, TransactionBehavior, params,
};
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS claims (key TEXT NOT NULL, owner TEXT \
    NOT NULL, expires_at INTEGER NOT NULL, PRIMARY KEY (key))";

/// Claim store backed by a SQLite database file.
///
/// # Storage Model
///
/// - **Table**: `claims (key, owner, expires_at)` with `key` as primary key
/// - **Lease**: `expires_at` holds wall clock milliseconds since the Unix epoch
/// - **Connection**: Thread-safe shared connection using Arc<Mutex<Connection>>
///
/// Expired rows are treated as absent and replaced lazily by the next claim.
///
#[derive(Clone)]
pub struct SqliteClaimStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteClaimStore {
    /// Opens or creates the claim database in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory path where the database file will be created.
    ///            The database file will be named "claims.db" within this directory.
    ///
    /// # Errors
    ///
    /// Returns Error::CreateStore if the directory, the connection or the table cannot be
    /// created.
    ///
    pub fn new(path: &str) -> Result<Self, Error> {
        info!("Creating SQLite claim store");
        if !Path::new(&path).exists() {
            info!("Path does not exist, creating it");
            fs::create_dir_all(path).map_err(|e| {
                Error::CreateStore(format!(
                    "fail SQLite create directory: {}",
                    e
                ))
            })?;
        }

        let conn = open(format!("{}/claims.db", path)).map_err(|e| {
            Error::CreateStore(format!("fail SQLite open connection: {}", e))
        })?;
        conn.execute(CREATE_TABLE, ()).map_err(|e| {
            Error::CreateStore(format!("fail SQLite create table: {}", e))
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl SqliteClaimStore {
    /// Runs `job` on the blocking pool with the connection locked.
    ///
    /// Statements may wait on the database lock for up to the busy timeout, which must not
    /// happen on an executor thread.
    async fn with_connection<T, F>(&self, job: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                Error::Store(format!("sqlite open connection: {}", e))
            })?;
            job(&mut *conn)
        })
        .await
        .map_err(|e| Error::Store(format!("sqlite blocking task: {}", e)))?
    }
}

#[async_trait]
impl ClaimStore for SqliteClaimStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn try_claim(
        &self,
        key: &str,
        candidate: &str,
        ttl: Duration,
    ) -> Result<String, Error> {
        check_claim(key, candidate)?;
        let now = now_millis()?;
        let expires_at = now.saturating_add(ttl_millis(ttl));

        let (owner, inserted) = {
            let key = key.to_owned();
            let candidate = candidate.to_owned();
            self.with_connection(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(|e| {
                        Error::Store(format!("sqlite begin transaction: {}", e))
                    })?;
                tx.execute(
                    "DELETE FROM claims WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now],
                )
                .map_err(|e| Error::Store(format!("sqlite delete error: {}", e)))?;
                let inserted = tx
                    .execute(
                        "INSERT OR IGNORE INTO claims (key, owner, expires_at) VALUES (?1, ?2, ?3)",
                        params![key, candidate, expires_at],
                    )
                    .map_err(|e| Error::Store(format!("sqlite insert error: {}", e)))?;
                let owner: String = tx
                    .query_row(
                        "SELECT owner FROM claims WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .map_err(|e| Error::Store(format!("sqlite select error: {}", e)))?;
                tx.commit()
                    .map_err(|e| Error::Store(format!("sqlite commit error: {}", e)))?;
                Ok((owner, inserted == 1))
            })
            .await?
        };

        if inserted {
            debug!("Claim {} taken by {}.", key, owner);
        }
        Ok(owner)
    }

    async fn extend_lease(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, Error> {
        check_claim(key, owner)?;
        let now = now_millis()?;
        let expires_at = now.saturating_add(ttl_millis(ttl));

        let key = key.to_owned();
        let owner = owner.to_owned();
        let updated = self
            .with_connection(move |conn| {
                conn.execute(
                    "UPDATE claims SET expires_at = ?1 WHERE key = ?2 AND owner = ?3 \
                    AND expires_at > ?4",
                    params![expires_at, key, owner, now],
                )
                .map_err(|e| Error::Store(format!("sqlite update error: {}", e)))
            })
            .await?;
        Ok(updated == 1)
    }

    async fn owner(&self, key: &str) -> Result<Option<String>, Error> {
        let now = now_millis()?;
        let key = key.to_owned();
        self.with_connection(move |conn| {
            conn.query_row(
                "SELECT owner FROM claims WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Store(format!("sqlite select error: {}", e)))
        })
        .await
    }
}

fn now_millis() -> Result<i64, Error> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Store(format!("system clock error: {}", e)))?;
    Ok(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Open a SQLite database connection.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection, Error> {
    let path = path.as_ref();
    let flags =
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        Error::Store(format!("SQLite failed to open connection: {}", e))
    })?;

    // Writers from other processes wait for the lock instead of failing.
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA busy_timeout=5000;
        ",
    )
    .map_err(|e| {
        Error::Store(format!("SQLite failed to execute batch: {}", e))
    })?;

    Ok(conn)
}
