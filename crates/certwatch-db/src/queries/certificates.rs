use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, Row};

use crate::Database;
use crate::models::{CertificateFields, CertificateRow};

const SELECT_CERTIFICATE: &str =
    "SELECT id, name, date_start, date_end, owner_id FROM certificates";

impl Database {
    // -- Certificates --

    pub fn insert_certificate(&self, fields: &CertificateFields<'_>) -> Result<CertificateRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO certificates (name, date_start, date_end, owner_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![fields.name, fields.date_start, fields.date_end, fields.owner_id],
            )?;
            Ok(CertificateRow {
                id: conn.last_insert_rowid(),
                name: fields.name.to_string(),
                date_start: fields.date_start,
                date_end: fields.date_end,
                owner_id: fields.owner_id,
            })
        })
    }

    pub fn update_certificate(&self, id: i64, fields: &CertificateFields<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE certificates SET name = ?1, date_start = ?2, date_end = ?3, owner_id = ?4
                 WHERE id = ?5",
                rusqlite::params![fields.name, fields.date_start, fields.date_end, fields.owner_id, id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_certificate(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute("DELETE FROM certificates WHERE id = ?1", [id])? > 0)
        })
    }

    pub fn get_certificate(&self, id: i64) -> Result<Option<CertificateRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(&format!("{SELECT_CERTIFICATE} WHERE id = ?1"), [id], map_certificate)
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_certificates(&self) -> Result<Vec<CertificateRow>> {
        self.query_certificates(&format!("{SELECT_CERTIFICATE} ORDER BY id"), &[])
    }

    pub fn list_certificates_by_owner(&self, owner_id: i64) -> Result<Vec<CertificateRow>> {
        self.query_certificates(
            &format!("{SELECT_CERTIFICATE} WHERE owner_id = ?1 ORDER BY id"),
            rusqlite::params![owner_id],
        )
    }

    /// Certificates whose end date is exactly `date_end`.
    pub fn certificates_ending_on(&self, date_end: NaiveDate) -> Result<Vec<CertificateRow>> {
        self.query_certificates(
            &format!("{SELECT_CERTIFICATE} WHERE date_end = ?1 ORDER BY id"),
            rusqlite::params![date_end],
        )
    }

    fn query_certificates(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<CertificateRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, map_certificate)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_certificate(row: &Row<'_>) -> rusqlite::Result<CertificateRow> {
    Ok(CertificateRow {
        id: row.get(0)?,
        name: row.get(1)?,
        date_start: row.get(2)?,
        date_end: row.get(3)?,
        owner_id: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Days, NaiveDate};

    use crate::models::CertificateFields;
    use crate::{Database, Schema};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn fields(name: &str, end: NaiveDate, owner_id: i64) -> CertificateFields<'_> {
        CertificateFields {
            name,
            date_start: date("2025-01-01"),
            date_end: end,
            owner_id,
        }
    }

    #[test]
    fn owner_filter_and_full_list() {
        let db = Database::open_in_memory(Schema::Certificates).unwrap();
        db.insert_certificate(&fields("a", date("2025-02-01"), 1)).unwrap();
        db.insert_certificate(&fields("b", date("2025-02-01"), 2)).unwrap();
        db.insert_certificate(&fields("c", date("2025-03-01"), 1)).unwrap();

        assert_eq!(db.list_certificates().unwrap().len(), 3);
        let mine = db.list_certificates_by_owner(1).unwrap();
        assert_eq!(mine.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), ["a", "c"]);
    }

    #[test]
    fn ending_on_matches_exact_date_only() {
        let db = Database::open_in_memory(Schema::Certificates).unwrap();
        let target = date("2025-06-10");
        let before = target.checked_sub_days(Days::new(1)).unwrap();
        let after = target.checked_add_days(Days::new(1)).unwrap();
        for end in [before, target, after] {
            db.insert_certificate(&fields("c", end, 1)).unwrap();
        }

        let hits = db.certificates_ending_on(target).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].date_end, target);
    }

    #[test]
    fn update_and_delete_round_trip_through_storage() {
        let db = Database::open_in_memory(Schema::Certificates).unwrap();
        let row = db.insert_certificate(&fields("old", date("2025-02-01"), 1)).unwrap();

        assert!(db.update_certificate(row.id, &fields("new", date("2025-04-01"), 3)).unwrap());
        let stored = db.get_certificate(row.id).unwrap().unwrap();
        assert_eq!(stored.name, "new");
        assert_eq!(stored.owner_id, 3);
        assert_eq!(stored.date_end, date("2025-04-01"));

        assert!(db.delete_certificate(row.id).unwrap());
        assert!(!db.delete_certificate(row.id).unwrap());
    }
}
