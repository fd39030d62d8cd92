pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Which service owns this database. Each service keeps its single table in
/// its own file; nothing is shared across services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Identity,
    Profiles,
    Certificates,
}

pub struct Database {
    conn: Mutex<Connection>,
    schema: Schema,
}

impl Database {
    pub fn open(path: &Path, schema: Schema) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn, schema)?;

        info!("{:?} database opened at {}", schema, path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            schema,
        })
    }

    pub fn open_in_memory(schema: Schema) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn, schema)?;
        Ok(Self {
            conn: Mutex::new(conn),
            schema,
        })
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }
}

/// True when `err` wraps a SQLite UNIQUE/constraint failure.
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
