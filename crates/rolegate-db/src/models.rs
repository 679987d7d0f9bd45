/// Database row types — these map directly to SQLite rows.

use chrono::{DateTime, Utc};

/// A verification token row. `used_at` and `source_addr` are populated
/// exactly when `used` is true; the conditional update in
/// [`crate::Database::mark_used`] is the only writer of all three.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRow {
    pub token: String,
    pub requester_id: String,
    pub created_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub source_addr: Option<String>,
}

/// Projection of a redeemed token for the admin report.
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionRow {
    pub requester_id: String,
    pub source_addr: String,
    pub used_at: DateTime<Utc>,
}
