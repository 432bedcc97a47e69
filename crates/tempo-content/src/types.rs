/// Aggregate view over one tenant's content rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStats {
    /// Number of distinct stored blobs.
    pub entries: usize,
    /// Compressed bytes on disk.
    pub stored_bytes: u64,
    /// Uncompressed bytes the blobs represent.
    pub logical_bytes: u64,
    /// Rows with no remaining references (purge candidates).
    pub orphans: usize,
}
