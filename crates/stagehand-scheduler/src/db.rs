use rusqlite::Connection;

use crate::error::Result;

/// Initialise the schedule store schema in `conn`.
///
/// One row per schedule key; `body` holds the encoded coordinator snapshot.
/// Idempotent, so every worker process can call it on startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schedules (
            key         TEXT    NOT NULL PRIMARY KEY,
            body        BLOB    NOT NULL,   -- encoded TaskCoordinator
            updated_at  TEXT    NOT NULL    -- ISO-8601
        ) STRICT;
        ",
    )?;
    Ok(())
}
