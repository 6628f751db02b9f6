//! SQLite connection management for the memory store
//!
//! One connection per store instance behind a mutex. Every mutating
//! operation runs while holding the lock, which serializes writes FIFO per
//! store instance; reads take the same lock briefly and may observe any
//! interleaving of completed writes. Each store owns its own connection, so
//! multiple stores in one process never contend with each other.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::Result;
use crate::types::StoreConfig;

/// Connection handle shared by all operations of one store instance
#[derive(Debug)]
pub(crate) struct StoreConnection {
    conn: Arc<Mutex<Connection>>,
}

impl StoreConnection {
    /// Open or create the database for the given configuration
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let conn = Self::create_connection(config)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_connection(config: &StoreConfig) -> Result<Connection> {
        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            Connection::open_with_flags(&config.db_path, flags)?
        };

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )?;

        Ok(conn)
    }

    /// Execute a read with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a read-modify-write atomically inside a transaction
    ///
    /// The lock is held for the whole closure, so concurrent callers against
    /// the same store instance apply strictly one at a time.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}
