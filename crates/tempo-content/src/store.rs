use std::sync::Mutex;

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use tempo_core::{AccountId, SubjectKind};

use crate::db::init_db;
use crate::error::{ContentError, Result};
use crate::types::ContentStats;

/// Largest accepted source text (8 MB).
pub const MAX_SOURCE_BYTES: usize = 8 * 1024 * 1024;

/// Bound on decompressed output. A stored row can never legitimately exceed
/// `MAX_SOURCE_BYTES`, so anything larger is a corrupt or hostile payload.
pub const MAX_DECOMPRESSED_BYTES: usize = MAX_SOURCE_BYTES;

/// Thread-safe manager for the content table.
///
/// Wraps its own SQLite connection in a `Mutex`; callers that need content
/// operations inside a larger transaction use the `*_in` functions on their
/// own connection instead.
pub struct ContentStore {
    db: Mutex<Connection>,
}

impl ContentStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Store `source`, deduplicating by content hash. Returns the hash.
    #[instrument(skip(self, source), fields(account = %account, kind = %kind))]
    pub fn put(&self, account: &AccountId, kind: SubjectKind, source: &str) -> Result<String> {
        let db = self.db.lock().unwrap();
        put_in(&db, account, kind, source)
    }

    /// Load and decompress the source for `hash`.
    #[instrument(skip(self), fields(account = %account, kind = %kind, hash))]
    pub fn get(&self, account: &AccountId, kind: SubjectKind, hash: &str) -> Result<String> {
        let db = self.db.lock().unwrap();
        get_in(&db, account, kind, hash)
    }

    /// Drop one reference to `hash`. The row itself stays until purged.
    #[instrument(skip(self), fields(account = %account, kind = %kind, hash))]
    pub fn release(&self, account: &AccountId, kind: SubjectKind, hash: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        release_in(&db, account, kind, hash)
    }

    /// Current reference count for `hash`, or `None` if the row is unknown.
    pub fn reference_count(
        &self,
        account: &AccountId,
        kind: SubjectKind,
        hash: &str,
    ) -> Result<Option<i64>> {
        let db = self.db.lock().unwrap();
        reference_count_in(&db, account, kind, hash)
    }

    /// Delete rows whose reference count reached zero.
    ///
    /// Maintenance-only: never called implicitly, so a release racing a
    /// fresh `put` of the same hash cannot lose the new reference.
    #[instrument(skip(self), fields(account = %account))]
    pub fn purge_orphans(&self, account: &AccountId) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let purged = db.execute(
            "DELETE FROM content WHERE account_id = ?1 AND reference_count <= 0",
            rusqlite::params![account.as_str()],
        )?;
        if purged > 0 {
            info!(count = purged, "purged orphaned content rows");
        }
        Ok(purged)
    }

    /// Aggregate counters for one tenant's blobs.
    pub fn stats(&self, account: &AccountId) -> Result<ContentStats> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(LENGTH(payload)), 0),
                    COALESCE(SUM(size_bytes), 0),
                    COALESCE(SUM(reference_count <= 0), 0)
             FROM content WHERE account_id = ?1",
            rusqlite::params![account.as_str()],
            |row| {
                Ok(ContentStats {
                    entries: row.get::<_, i64>(0)? as usize,
                    stored_bytes: row.get::<_, i64>(1)? as u64,
                    logical_bytes: row.get::<_, i64>(2)? as u64,
                    orphans: row.get::<_, i64>(3)? as usize,
                })
            },
        )
        .map_err(ContentError::Database)
    }
}

// ── transaction-composable operations ────────────────────────────────────────
//
// The version ledger runs content writes inside its own transactions; these
// functions take the caller's connection so everything commits or rolls back
// together.

/// SHA-256 hex digest of `source`.
pub fn hash_of(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

/// Dedup-or-insert `source` on `conn`. Returns the content hash.
///
/// The increment and the insert-on-conflict are each single statements, so
/// two writers storing the same body concurrently both land on one row with
/// `reference_count = 2` — no read-modify-write window.
pub fn put_in(
    conn: &Connection,
    account: &AccountId,
    kind: SubjectKind,
    source: &str,
) -> Result<String> {
    if source.len() > MAX_SOURCE_BYTES {
        return Err(ContentError::TooLarge {
            size: source.len(),
            max: MAX_SOURCE_BYTES,
        });
    }

    let hash = hash_of(source);

    // Fast path: the blob already exists, bump its count in place.
    let bumped = conn.execute(
        "UPDATE content SET reference_count = reference_count + 1
         WHERE account_id = ?1 AND kind = ?2 AND hash = ?3",
        rusqlite::params![account.as_str(), kind.to_string(), hash],
    )?;
    if bumped > 0 {
        debug!(%hash, "content deduplicated");
        return Ok(hash);
    }

    let payload = compress(source.as_bytes())?;
    let now = chrono::Utc::now().to_rfc3339();
    // A concurrent writer may have inserted between the UPDATE and here;
    // the upsert folds that race into a count bump.
    conn.execute(
        "INSERT INTO content (account_id, kind, hash, payload, size_bytes, reference_count, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
         ON CONFLICT (account_id, kind, hash)
         DO UPDATE SET reference_count = reference_count + 1",
        rusqlite::params![
            account.as_str(),
            kind.to_string(),
            hash,
            payload,
            source.len() as i64,
            now
        ],
    )?;
    debug!(%hash, size = source.len(), "content stored");
    Ok(hash)
}

/// Load and decompress the source for `hash` on `conn`.
pub fn get_in(
    conn: &Connection,
    account: &AccountId,
    kind: SubjectKind,
    hash: &str,
) -> Result<String> {
    let payload: Vec<u8> = conn
        .query_row(
            "SELECT payload FROM content
             WHERE account_id = ?1 AND kind = ?2 AND hash = ?3",
            rusqlite::params![account.as_str(), kind.to_string(), hash],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => ContentError::NotFound {
                hash: hash.to_string(),
            },
            other => ContentError::Database(other),
        })?;

    let bytes = decompress(&payload)?;
    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8 {
        hash: hash.to_string(),
    })
}

/// Atomically decrement the reference count for `hash` on `conn`.
pub fn release_in(
    conn: &Connection,
    account: &AccountId,
    kind: SubjectKind,
    hash: &str,
) -> Result<()> {
    let n = conn.execute(
        "UPDATE content SET reference_count = reference_count - 1
         WHERE account_id = ?1 AND kind = ?2 AND hash = ?3",
        rusqlite::params![account.as_str(), kind.to_string(), hash],
    )?;
    if n == 0 {
        return Err(ContentError::NotFound {
            hash: hash.to_string(),
        });
    }
    Ok(())
}

/// Reference count for `hash` on `conn`, or `None` for an unknown row.
pub fn reference_count_in(
    conn: &Connection,
    account: &AccountId,
    kind: SubjectKind,
    hash: &str,
) -> Result<Option<i64>> {
    match conn.query_row(
        "SELECT reference_count FROM content
         WHERE account_id = ?1 AND kind = ?2 AND hash = ?3",
        rusqlite::params![account.as_str(), kind.to_string(), hash],
        |row| row.get(0),
    ) {
        Ok(count) => Ok(Some(count)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(ContentError::Database(e)),
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress with a hard output bound so a malformed row cannot balloon.
fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;

    use flate2::read::GzDecoder;

    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    let mut buffer = [0u8; 8192];
    let mut total = 0usize;

    loop {
        let n = decoder.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        total = total.saturating_add(n);
        if total > MAX_DECOMPRESSED_BYTES {
            return Err(ContentError::DecompressionTooLarge {
                max: MAX_DECOMPRESSED_BYTES,
            });
        }
        out.extend_from_slice(&buffer[..n]);
    }

    Ok(out)
}
