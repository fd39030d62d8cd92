use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use certwatch_types::models::UserSnapshot;

use crate::Database;
use crate::models::ProfileRow;

impl Database {
    // -- Profiles --

    /// Insert or overwrite the profile keyed by `user.id`. Last write wins.
    pub fn upsert_profile(&self, user: &UserSnapshot) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, username, email, role, phone, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
                 ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    email = excluded.email,
                    role = excluded.role,
                    phone = excluded.phone,
                    updated_at = excluded.updated_at",
                rusqlite::params![user.id, user.username, user.email, user.role.as_str(), user.phone],
            )?;
            Ok(())
        })
    }

    /// Plain insert; fails with a constraint violation if the id exists.
    pub fn insert_profile(&self, user: &UserSnapshot) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, username, email, role, phone) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![user.id, user.username, user.email, user.role.as_str(), user.phone],
            )?;
            Ok(())
        })
    }

    pub fn update_profile(&self, user: &UserSnapshot) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE profiles SET username = ?1, email = ?2, role = ?3, phone = ?4,
                    updated_at = datetime('now')
                 WHERE id = ?5",
                rusqlite::params![user.username, user.email, user.role.as_str(), user.phone, user.id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_profile(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM profiles WHERE id = ?1", [id])? > 0))
    }

    pub fn get_profile(&self, id: i64) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, email, role, phone FROM profiles WHERE id = ?1",
                    [id],
                    map_profile,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, username, email, role, phone FROM profiles ORDER BY id")?;
            let rows = stmt
                .query_map([], map_profile)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the name of the first field (`username` or `email`) already used
    /// by a profile other than `except_id`.
    pub fn profile_conflict(
        &self,
        username: &str,
        email: &str,
        except_id: i64,
    ) -> Result<Option<&'static str>> {
        self.with_conn(|conn| {
            if taken(conn, "username", username, except_id)? {
                return Ok(Some("username"));
            }
            if taken(conn, "email", email, except_id)? {
                return Ok(Some("email"));
            }
            Ok(None)
        })
    }
}

fn taken(conn: &Connection, column: &'static str, value: &str, except_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT id FROM profiles WHERE {column} = ?1 AND id != ?2 LIMIT 1"),
            rusqlite::params![value, except_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn map_profile(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        phone: row.get(4)?,
    })
}
