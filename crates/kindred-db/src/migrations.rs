use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS submissions (
            id              TEXT PRIMARY KEY,
            content_type    TEXT NOT NULL,
            content         TEXT NOT NULL,
            emotional_tags  TEXT NOT NULL DEFAULT '[]',
            status          TEXT NOT NULL DEFAULT 'unmatched',
            matched_with    TEXT REFERENCES submissions(id),
            identity_token  TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_submissions_identity
            ON submissions(identity_token, created_at);

        CREATE INDEX IF NOT EXISTS idx_submissions_status
            ON submissions(status, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
