use std::sync::Arc;

use thiserror::Error;

use rolegate_db::{Database, RedemptionRow, StoreError};

#[derive(Debug, Error)]
pub enum ReportError {
    /// Caller is not the configured admin. No further detail is leaked.
    #[error("not authorized")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read-only projection of completed redemptions, gated on a single
/// privileged identity.
pub struct AdminReport {
    db: Arc<Database>,
    admin_id: String,
}

impl AdminReport {
    pub fn new(db: Arc<Database>, admin_id: impl Into<String>) -> Self {
        Self {
            db,
            admin_id: admin_id.into(),
        }
    }

    pub fn report(&self, caller_id: &str) -> Result<Vec<RedemptionRow>, ReportError> {
        if caller_id != self.admin_id {
            return Err(ReportError::Unauthorized);
        }
        Ok(self.db.list_used()?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn open_store() -> (tempfile::TempDir, Arc<Database>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("tokens.db")).unwrap();
        (dir, Arc::new(db))
    }

    #[test]
    fn admin_sees_redeemed_tokens() {
        let (_dir, db) = open_store();
        db.create_token("tok-a", "1001", Utc::now()).unwrap();
        db.mark_used("tok-a", Utc::now(), "1.2.3.4").unwrap();

        let report = AdminReport::new(db, "42");
        let rows = report.report("42").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].requester_id, "1001");
    }

    #[test]
    fn other_callers_are_denied() {
        let (_dir, db) = open_store();
        db.create_token("tok-a", "1001", Utc::now()).unwrap();
        db.mark_used("tok-a", Utc::now(), "1.2.3.4").unwrap();

        let report = AdminReport::new(db.clone(), "42");
        let err = report.report("43").unwrap_err();
        assert!(matches!(err, ReportError::Unauthorized));

        // Denial reads nothing and changes nothing.
        assert_eq!(db.list_used().unwrap().len(), 1);
    }
}
