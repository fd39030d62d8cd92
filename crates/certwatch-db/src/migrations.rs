use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::Schema;

pub fn run(conn: &Connection, schema: Schema) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("{:?} DB: running migration v1 (initial schema)", schema);
        conn.execute_batch(initial(schema))?;
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    }

    Ok(())
}

fn initial(schema: Schema) -> &'static str {
    match schema {
        Schema::Identity => {
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'user',
                phone       TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_users_role ON users(role);
            "
        }
        // The mirror takes ids from the identity service, so no AUTOINCREMENT
        // and no uniqueness beyond the key: a stale row must never block an
        // incoming upsert.
        Schema::Profiles => {
            "
            CREATE TABLE profiles (
                id          INTEGER PRIMARY KEY,
                username    TEXT NOT NULL,
                email       TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'user',
                phone       TEXT,
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_profiles_username ON profiles(username);
            CREATE INDEX idx_profiles_email ON profiles(email);
            "
        }
        Schema::Certificates => {
            "
            CREATE TABLE certificates (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                date_start  TEXT NOT NULL,
                date_end    TEXT NOT NULL,
                owner_id    INTEGER NOT NULL
            );

            CREATE INDEX idx_certificates_owner ON certificates(owner_id);
            CREATE INDEX idx_certificates_end ON certificates(date_end);
            "
        }
    }
}
