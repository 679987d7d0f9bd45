use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Token store: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE verify_tokens (
                token        TEXT PRIMARY KEY,
                requester_id TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                used         INTEGER NOT NULL DEFAULT 0,
                used_at      TEXT,
                source_addr  TEXT
            );

            CREATE INDEX idx_verify_tokens_used
                ON verify_tokens(used_at) WHERE used = 1;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
