use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::Database;
use crate::models::{IdentityRow, NewIdentity};

const SELECT_IDENTITY: &str =
    "SELECT id, username, email, password, role, phone, created_at FROM users";

impl Database {
    // -- Identities --

    pub fn create_identity(&self, new: &NewIdentity<'_>) -> Result<i64> {
        self.with_conn_mut(|conn| insert_identity(conn, new))
    }

    pub fn get_identity_by_id(&self, id: i64) -> Result<Option<IdentityRow>> {
        self.with_conn(|conn| query_identity(conn, "id", &id))
    }

    pub fn get_identity_by_username(&self, username: &str) -> Result<Option<IdentityRow>> {
        self.with_conn(|conn| query_identity(conn, "username", &username))
    }

    pub fn get_identity_by_email(&self, email: &str) -> Result<Option<IdentityRow>> {
        self.with_conn(|conn| query_identity(conn, "email", &email))
    }

    /// Overwrite the mutable identity fields. Returns false if `id` is unknown.
    pub fn update_identity(
        &self,
        id: i64,
        email: &str,
        role: &str,
        phone: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET email = ?1, role = ?2, phone = ?3 WHERE id = ?4",
                rusqlite::params![email, role, phone, id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Insert `new` only if no manager exists yet. Check and insert run in one
    /// transaction, so repeated startups never seed twice.
    /// Returns the new id when a manager was created.
    pub fn seed_manager_if_missing(&self, new: &NewIdentity<'_>) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing: Option<i64> = tx
                .query_row("SELECT id FROM users WHERE role = 'manager' LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()?;

            if existing.is_some() {
                return Ok(None);
            }

            let id = insert_identity(&tx, new)?;
            tx.commit()?;
            Ok(Some(id))
        })
    }

    pub fn count_managers(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users WHERE role = 'manager'", [], |r| {
                r.get(0)
            })?)
        })
    }
}

fn insert_identity(conn: &Connection, new: &NewIdentity<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (username, email, password, role, phone) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![new.username, new.email, new.password_hash, new.role, new.phone],
    )?;
    Ok(conn.last_insert_rowid())
}

fn query_identity(
    conn: &Connection,
    column: &'static str,
    value: &dyn rusqlite::ToSql,
) -> Result<Option<IdentityRow>> {
    let mut stmt = conn.prepare(&format!("{SELECT_IDENTITY} WHERE {column} = ?1"))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(IdentityRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                role: row.get(4)?,
                phone: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use crate::{Database, Schema, is_constraint_violation};
    use crate::models::NewIdentity;

    fn identity<'a>(username: &'a str, email: &'a str, role: &'a str) -> NewIdentity<'a> {
        NewIdentity {
            username,
            email,
            password_hash: "$argon2id$stub",
            role,
            phone: None,
        }
    }

    #[test]
    fn create_and_lookup() {
        let db = Database::open_in_memory(Schema::Identity).unwrap();
        let id = db.create_identity(&identity("alice", "a@x.io", "user")).unwrap();

        let by_name = db.get_identity_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.id, id);
        assert_eq!(by_name.role, "user");
        assert!(db.get_identity_by_email("a@x.io").unwrap().is_some());
        assert!(db.get_identity_by_id(id + 1).unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_constraint_violation() {
        let db = Database::open_in_memory(Schema::Identity).unwrap();
        db.create_identity(&identity("alice", "a@x.io", "user")).unwrap();

        let err = db.create_identity(&identity("alice", "other@x.io", "user")).unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn seeding_is_idempotent() {
        let db = Database::open_in_memory(Schema::Identity).unwrap();
        let seed = identity("admin", "admin@x.io", "manager");

        assert!(db.seed_manager_if_missing(&seed).unwrap().is_some());
        assert!(db.seed_manager_if_missing(&seed).unwrap().is_none());
        assert_eq!(db.count_managers().unwrap(), 1);
    }

    #[test]
    fn update_reports_unknown_ids() {
        let db = Database::open_in_memory(Schema::Identity).unwrap();
        let id = db.create_identity(&identity("bob", "b@x.io", "user")).unwrap();

        assert!(db.update_identity(id, "new@x.io", "manager", Some("+1")).unwrap());
        assert!(!db.update_identity(id + 10, "n@x.io", "user", None).unwrap());

        let row = db.get_identity_by_id(id).unwrap().unwrap();
        assert_eq!(row.email, "new@x.io");
        assert_eq!(row.phone.as_deref(), Some("+1"));
    }
}
