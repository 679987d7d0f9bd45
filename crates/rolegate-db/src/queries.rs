use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::Database;
use crate::error::StoreError;
use crate::models::{RedemptionRow, TokenRow};

impl Database {
    // -- Issuance --

    /// Insert a freshly issued token. A primary-key collision surfaces as
    /// `DuplicateToken` so the issuer can regenerate.
    pub fn create_token(
        &self,
        token: &str,
        requester_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            match conn.execute(
                "INSERT INTO verify_tokens (token, requester_id, created_at) VALUES (?1, ?2, ?3)",
                params![token, requester_id, created_at],
            ) {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::DuplicateToken)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    // -- Redemption --

    pub fn get_token(&self, token: &str) -> Result<Option<TokenRow>, StoreError> {
        self.with_conn(|conn| query_token(conn, token))
    }

    /// Atomically consume a token. The conditional `used = 0` guard means
    /// that under any number of concurrent callers exactly one UPDATE
    /// changes a row; every other caller sees zero rows changed and gets
    /// `AlreadyUsed` (or `NotFound` if the token never existed).
    pub fn mark_used(
        &self,
        token: &str,
        used_at: DateTime<Utc>,
        source_addr: &str,
    ) -> Result<TokenRow, StoreError> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE verify_tokens SET used = 1, used_at = ?2, source_addr = ?3
                 WHERE token = ?1 AND used = 0",
                params![token, used_at, source_addr],
            )?;

            if changed == 1 {
                return query_token(conn, token)?.ok_or(StoreError::NotFound);
            }

            // Zero rows changed: disambiguate under the writer lock.
            match query_token(conn, token)? {
                Some(_) => Err(StoreError::AlreadyUsed),
                None => Err(StoreError::NotFound),
            }
        })
    }

    // -- Reporting --

    pub fn list_used(&self) -> Result<Vec<RedemptionRow>, StoreError> {
        self.with_conn(query_redemptions)
    }
}

fn query_token(conn: &Connection, token: &str) -> Result<Option<TokenRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT token, requester_id, created_at, used, used_at, source_addr
         FROM verify_tokens WHERE token = ?1",
    )?;

    let row = stmt
        .query_row([token], |row| {
            Ok(TokenRow {
                token: row.get(0)?,
                requester_id: row.get(1)?,
                created_at: row.get(2)?,
                used: row.get(3)?,
                used_at: row.get(4)?,
                source_addr: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_redemptions(conn: &Connection) -> Result<Vec<RedemptionRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT requester_id, source_addr, used_at
         FROM verify_tokens WHERE used = 1 ORDER BY used_at",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(RedemptionRow {
                requester_id: row.get(0)?,
                source_addr: row.get(1)?,
                used_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn open_store() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("tokens.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn create_and_get_roundtrip() {
        let (_dir, db) = open_store();
        let created = Utc::now();

        db.create_token("tok-a", "1001", created).unwrap();

        let row = db.get_token("tok-a").unwrap().unwrap();
        assert_eq!(row.token, "tok-a");
        assert_eq!(row.requester_id, "1001");
        assert_eq!(row.created_at, created);
        assert!(!row.used);
        assert_eq!(row.used_at, None);
        assert_eq!(row.source_addr, None);
    }

    #[test]
    fn get_unknown_token_is_none() {
        let (_dir, db) = open_store();
        assert!(db.get_token("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_create_rejected() {
        let (_dir, db) = open_store();
        db.create_token("tok-a", "1001", Utc::now()).unwrap();

        let err = db.create_token("tok-a", "2002", Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateToken));

        // Original row is untouched.
        let row = db.get_token("tok-a").unwrap().unwrap();
        assert_eq!(row.requester_id, "1001");
    }

    #[test]
    fn mark_used_sets_redemption_fields() {
        let (_dir, db) = open_store();
        db.create_token("tok-a", "1001", Utc::now()).unwrap();

        let used_at = Utc::now();
        let row = db.mark_used("tok-a", used_at, "1.2.3.4").unwrap();
        assert!(row.used);
        assert_eq!(row.used_at, Some(used_at));
        assert_eq!(row.source_addr, Some("1.2.3.4".into()));
        assert_eq!(row.requester_id, "1001");
    }

    #[test]
    fn mark_used_twice_reports_already_used() {
        let (_dir, db) = open_store();
        db.create_token("tok-a", "1001", Utc::now()).unwrap();

        let first_used_at = Utc::now();
        db.mark_used("tok-a", first_used_at, "1.2.3.4").unwrap();

        let err = db.mark_used("tok-a", Utc::now(), "5.6.7.8").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyUsed));

        // The loser must not clobber the winner's redemption record.
        let row = db.get_token("tok-a").unwrap().unwrap();
        assert_eq!(row.used_at, Some(first_used_at));
        assert_eq!(row.source_addr, Some("1.2.3.4".into()));
    }

    #[test]
    fn mark_used_unknown_token_not_found() {
        let (_dir, db) = open_store();
        let err = db.mark_used("missing", Utc::now(), "1.2.3.4").unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn concurrent_mark_used_single_winner() {
        let (_dir, db) = open_store();
        db.create_token("tok-a", "1001", Utc::now()).unwrap();

        let db = Arc::new(db);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                std::thread::spawn(move || {
                    db.mark_used("tok-a", Utc::now(), &format!("10.0.0.{i}"))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for r in results.iter().filter(|r| r.is_err()) {
            assert!(matches!(r.as_ref().unwrap_err(), StoreError::AlreadyUsed));
        }
    }

    #[test]
    fn list_used_projects_only_redeemed() {
        let (_dir, db) = open_store();
        db.create_token("tok-a", "1001", Utc::now()).unwrap();
        db.create_token("tok-b", "2002", Utc::now()).unwrap();
        db.create_token("tok-c", "3003", Utc::now()).unwrap();

        db.mark_used("tok-b", Utc::now(), "1.2.3.4").unwrap();

        let rows = db.list_used().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].requester_id, "2002");
        assert_eq!(rows[0].source_addr, "1.2.3.4");
    }
}
