//! SQLite engine binding.
//!
//! The engine is linked statically, but it is still checked once per process
//! before first use: the linked library must be recent enough and must
//! actually enforce foreign keys, since cascading deletes depend on it.
//!
//! Databases live purely in memory. A database *image* is the byte content
//! of an ordinary SQLite database file; images are produced and consumed
//! through the online backup API using a scratch directory, so no database
//! file outlives the call.

use std::path::Path;

use rusqlite::backup::Progress;
use rusqlite::{Connection, DatabaseName, OpenFlags};
use tokio::sync::OnceCell;

use crate::error::{Result, StoreError};

/// Oldest SQLite release with foreign-key enforcement.
const MIN_SQLITE_VERSION: i32 = 3_006_019;

/// File name used inside scratch directories.
const SCRATCH_FILE: &str = "image.db";

static ENGINE: OnceCell<Engine> = OnceCell::const_new();

/// Handle to the loaded SQLite engine.
#[derive(Debug)]
pub struct Engine {
    version: &'static str,
}

impl Engine {
    /// Load the engine, or return the already loaded instance.
    pub async fn load() -> Result<&'static Engine> {
        ENGINE
            .get_or_try_init(|| async {
                let engine = Self::detect()?;
                tracing::info!(version = engine.version, "sqlite engine loaded");
                Ok(engine)
            })
            .await
    }

    fn detect() -> Result<Engine> {
        let number = rusqlite::version_number();
        if number < MIN_SQLITE_VERSION {
            return Err(StoreError::EngineUnavailable(format!(
                "sqlite {} is older than the required 3.6.19",
                rusqlite::version()
            )));
        }

        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::EngineUnavailable(e.to_string()))?;
        enable_foreign_keys(&conn).map_err(|e| match e {
            StoreError::Sqlite(inner) => StoreError::EngineUnavailable(inner.to_string()),
            other => other,
        })?;

        Ok(Engine {
            version: rusqlite::version(),
        })
    }

    /// Version string of the linked SQLite library.
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Open a new, empty in-memory database.
    pub fn open_empty(&self) -> Result<Connection> {
        let conn = Connection::open_in_memory()?;
        enable_foreign_keys(&conn)?;
        Ok(conn)
    }

    /// Deserialize an image into a new in-memory database.
    ///
    /// The bytes are first opened through a read-only connection that
    /// is closed again before anything is restored, so a bad image never
    /// reaches a live handle.
    pub fn load_image(&self, image: &[u8]) -> Result<Connection> {
        let scratch = tempfile::tempdir()?;
        let path = scratch.path().join(SCRATCH_FILE);
        std::fs::write(&path, image)?;

        verify_image(&path)?;

        let mut conn = Connection::open_in_memory()?;
        conn.restore(DatabaseName::Main, &path, None::<fn(Progress)>)
            .map_err(|e| StoreError::InvalidImport(e.to_string()))?;
        enable_foreign_keys(&conn)?;

        tracing::debug!(bytes = image.len(), "database image loaded");
        Ok(conn)
    }

    /// Serialize the whole database behind `conn` into an image.
    pub fn export_image(&self, conn: &Connection) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        let path = scratch.path().join(SCRATCH_FILE);

        conn.backup(DatabaseName::Main, &path, None)?;
        let image = std::fs::read(&path)?;

        tracing::debug!(bytes = image.len(), "database image exported");
        Ok(image)
    }
}

fn enable_foreign_keys(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    let enabled: i64 = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
    if enabled != 1 {
        return Err(StoreError::EngineUnavailable(
            "foreign key enforcement is not available".to_string(),
        ));
    }
    Ok(())
}

// SQLite only notices a non-database file on first read, so the check has
// to run a query, not just open the file.
fn verify_image(path: &Path) -> Result<()> {
    let invalid = |e: rusqlite::Error| StoreError::InvalidImport(e.to_string());

    let reader = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(invalid)?;

    let verdict: String = reader
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(invalid)?;
    if verdict != "ok" {
        return Err(StoreError::InvalidImport(format!("integrity check failed: {verdict}")));
    }

    reader
        .close()
        .map_err(|(_, e)| StoreError::InvalidImport(e.to_string()))
}
