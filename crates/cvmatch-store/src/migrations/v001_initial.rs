//! v001 -- Initial schema creation.
//!
//! Creates `jobs` and `analysisResults`. Column names are camelCase because
//! the same schema is found in images exported by earlier releases, and
//! those have to open unchanged.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Jobs
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS jobs (
    id          INTEGER PRIMARY KEY,
    title       TEXT NOT NULL,
    description TEXT NOT NULL,
    createdAt   TEXT NOT NULL              -- RFC-3339, millisecond precision
);

-- ----------------------------------------------------------------
-- Analysis results
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS analysisResults (
    id             INTEGER PRIMARY KEY,
    jobId          INTEGER NOT NULL,       -- FK -> jobs(id)
    jobTitle       TEXT NOT NULL,          -- snapshot at analysis time
    fileName       TEXT NOT NULL,
    resumeHash     TEXT NOT NULL,          -- SHA-1 hex of normalized content
    jobDescHash    TEXT NOT NULL,
    jobDescription TEXT NOT NULL,          -- snapshot at analysis time
    resumeData     TEXT NOT NULL,          -- JSON {fileName, text, image}
    analysis       TEXT NOT NULL,          -- JSON result or {error}
    createdAt      TEXT NOT NULL,
    resumeFile     BLOB,                   -- original upload
    resumeMimeType TEXT,

    FOREIGN KEY (jobId) REFERENCES jobs(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_analysis_jobId ON analysisResults (jobId);
CREATE INDEX IF NOT EXISTS idx_analysis_hashes ON analysisResults (resumeHash, jobDescHash);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
