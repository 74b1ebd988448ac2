/// Blob-store key holding the latest full database image
pub const DEFAULT_DB_KEY: &str = "dbFile";

/// Prefix of exported database file names (`resume_analyzer_<date>.db`)
pub const EXPORT_FILE_PREFIX: &str = "resume_analyzer_";

/// Extension of exported database files
pub const EXPORT_FILE_EXTENSION: &str = "db";

/// Length in hex characters of a content fingerprint (SHA-1, 160 bits)
pub const CONTENT_HASH_HEX_LEN: usize = 40;
