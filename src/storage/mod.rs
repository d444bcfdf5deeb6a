//! SQLite storage layer -- schema, sessions, entity tables.

pub mod downtime;
pub mod machines;
pub mod operators;
pub mod reasons;
pub mod runs;
pub mod schema;
pub mod shifts;

use std::path::Path;

use r2d2::{Pool as R2D2Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;

use crate::model::RunStatus;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("referenced record does not exist: {0}")]
    InvalidReference(String),

    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("production run {run_id} is {status}; cannot {action}")]
    InvalidTransition {
        run_id: i64,
        status: RunStatus,
        action: &'static str,
    },
}

impl StoreError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        StoreError::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("UNIQUE") => {
                StoreError::Conflict(msg.clone())
            }
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("FOREIGN KEY") => {
                StoreError::InvalidReference(msg.clone())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: impl AsRef<Path>, max_size: u32) -> Result<Pool, StoreError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::builder().max_size(max_size.max(1)).build(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;
    tracing::debug!(path = %path.display(), "database ready");

    Ok(pool)
}

/// A checked-out connection. Every report and mutation runs against an
/// explicit session; the connection returns to the pool when it is dropped.
pub struct Session {
    conn: PooledConnection<SqliteConnectionManager>,
}

impl Session {
    pub fn open(pool: &Pool) -> Result<Self, StoreError> {
        Ok(Self { conn: pool.get()? })
    }

    /// Raw connection for single-statement operations (autocommit).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a deferred transaction so every query sees one snapshot.
    /// The transaction rolls back if `f` fails.
    pub fn read<T>(
        &mut self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self.conn.transaction()?;
        let out = f(&*tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` inside an immediate (write-locked) transaction, committing on
    /// success and rolling back on error.
    pub fn write<T>(
        &mut self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&*tx)?;
        tx.commit()?;
        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::temp_pool;
    use super::*;

    #[test]
    fn test_open_pool_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db").join("oee.db");
        let pool = open_pool(&path, 1).unwrap();
        drop(pool);
        assert!(path.exists());
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let (_dir, pool) = temp_pool();
        let mut session = Session::open(&pool).unwrap();

        let res: Result<(), StoreError> = session.write(|c| {
            shifts::create(c, "Night")?;
            Err(StoreError::validation("name", "forced failure"))
        });
        assert!(res.is_err());

        let all = shifts::list(session.conn()).unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let (_dir, pool) = temp_pool();
        let session = Session::open(&pool).unwrap();
        reasons::create(session.conn(), "JAM", "Material jam", false).unwrap();
        let err = reasons::create(session.conn(), "JAM", "Again", false).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
    }
}
