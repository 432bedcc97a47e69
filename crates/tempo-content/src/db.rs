use rusqlite::Connection;

use crate::error::Result;

/// Initialise the content schema in `conn`.
///
/// One row per distinct source blob, keyed by tenant, subject kind and the
/// SHA-256 of the uncompressed text. The index supports the orphan sweep.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS content (
            account_id      TEXT    NOT NULL,
            kind            TEXT    NOT NULL,   -- 'function' | 'job'
            hash            TEXT    NOT NULL,   -- SHA-256 hex of uncompressed text
            payload         BLOB    NOT NULL,   -- gzip-compressed source
            size_bytes      INTEGER NOT NULL,   -- uncompressed length
            reference_count INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT    NOT NULL,
            PRIMARY KEY (account_id, kind, hash)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_content_refcount
            ON content (account_id, reference_count);
        ",
    )?;
    Ok(())
}
