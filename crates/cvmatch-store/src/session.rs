//! Session management for one in-memory database image.
//!
//! A [`Session`] owns the active [`rusqlite::Connection`] and the
//! [`BlobStore`] the image is persisted to. Every mutation made through the
//! repository is followed by [`Session::checkpoint`], which writes the full
//! image back under the session's key; there is no incremental journal.
//!
//! ```text
//! Uninitialized -> Initializing -> NeedsChoice --create_new/import--> Ready
//!                               \-> Ready <--import (Importing)--> Ready
//! ```

use std::fmt;
use std::sync::Arc;

use rusqlite::{Connection, Params, Row};
use tracing::{debug, error, info, warn};

use cvmatch_shared::constants::DEFAULT_DB_KEY;

use crate::engine::Engine;
use crate::error::{Result, StoreError};
use crate::kv::BlobStore;
use crate::migrations;
use crate::models::ImportSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    /// Engine loaded but nothing stored yet; the caller must either create
    /// a new database or import one.
    NeedsChoice,
    Ready,
    /// An import is being validated. The previous database stays active.
    Importing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::NeedsChoice => "needs-choice",
            SessionState::Ready => "ready",
            SessionState::Importing => "importing",
        };
        f.write_str(name)
    }
}

pub struct Session {
    blobs: Arc<dyn BlobStore>,
    key: String,
    engine: Option<&'static Engine>,
    conn: Option<Connection>,
    state: SessionState,
}

impl Session {
    /// Session persisting under the default key.
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_key(blobs, DEFAULT_DB_KEY)
    }

    pub fn with_key(blobs: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            blobs,
            key: key.into(),
            engine: None,
            conn: None,
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the engine and the stored image, if any.
    ///
    /// Returns [`SessionState::Ready`] when an image was found and
    /// [`SessionState::NeedsChoice`] when the store is empty. Any failure is
    /// fatal for the session and leaves it uninitialized.
    pub async fn initialize(&mut self) -> Result<SessionState> {
        if self.state == SessionState::Ready {
            return Ok(self.state);
        }

        self.state = SessionState::Initializing;
        match self.load_stored().await {
            Ok(state) => {
                self.state = state;
                Ok(state)
            }
            Err(e) => {
                error!(error = %e, "database initialization failed");
                self.state = SessionState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn load_stored(&mut self) -> Result<SessionState> {
        let engine = Engine::load().await?;
        self.engine = Some(engine);

        let Some(image) = self.blobs.get(&self.key).await? else {
            info!(key = %self.key, "no stored database image");
            return Ok(SessionState::NeedsChoice);
        };

        let conn = engine.load_image(&image).map_err(|e| match e {
            StoreError::InvalidImport(msg) => StoreError::CorruptStoredImage(msg),
            other => other,
        })?;
        // An image that opens but cannot be migrated is still unusable.
        migrations::run_migrations(&conn)
            .map_err(|e| StoreError::CorruptStoredImage(e.to_string()))?;
        self.conn = Some(conn);

        info!(key = %self.key, bytes = image.len(), "loaded stored database image");
        Ok(SessionState::Ready)
    }

    /// Load the engine but skip the stored image, so that an image
    /// [`Session::initialize`] rejected can be replaced. Nothing is written
    /// until the next `create_new` or import.
    pub async fn initialize_without_stored(&mut self) -> Result<SessionState> {
        self.engine = Some(Engine::load().await?);
        self.conn = None;
        self.state = SessionState::NeedsChoice;

        warn!(key = %self.key, "ignoring stored database image");
        Ok(self.state)
    }

    /// Replace whatever is active with a new, empty database and persist it.
    pub async fn create_new(&mut self) -> Result<()> {
        let engine = self.require_engine()?;

        let conn = engine.open_empty()?;
        migrations::run_migrations(&conn)?;

        let previous = self.conn.replace(conn);
        if let Err(e) = self.checkpoint().await {
            self.conn = previous;
            return Err(e);
        }

        self.state = SessionState::Ready;
        info!(key = %self.key, "created new database");
        Ok(())
    }

    /// Make `image` the active database.
    ///
    /// The image must open, pass a quick integrity check and contain the
    /// application tables. If anything fails, including the checkpoint of the
    /// new image, the previous database and state are kept.
    pub async fn import_file(&mut self, image: &[u8]) -> Result<ImportSummary> {
        let engine = self.require_engine()?;

        let previous_state = self.state;
        self.state = SessionState::Importing;

        match self.swap_in(engine, image).await {
            Ok(summary) => {
                self.state = SessionState::Ready;
                info!(
                    bytes = image.len(),
                    jobs = summary.jobs,
                    analyses = summary.analyses,
                    "database imported"
                );
                Ok(summary)
            }
            Err(e) => {
                self.state = previous_state;
                warn!(error = %e, "database import rejected");
                Err(e)
            }
        }
    }

    async fn swap_in(&mut self, engine: &'static Engine, image: &[u8]) -> Result<ImportSummary> {
        let conn = engine.load_image(image)?;

        let missing = migrations::missing_tables(&conn)?;
        if !missing.is_empty() {
            return Err(StoreError::InvalidImport(format!(
                "missing tables: {}",
                missing.join(", ")
            )));
        }
        migrations::run_migrations(&conn).map_err(|e| StoreError::InvalidImport(e.to_string()))?;

        let summary = ImportSummary {
            jobs: count_rows(&conn, "jobs")?,
            analyses: count_rows(&conn, "analysisResults")?,
        };

        let previous = self.conn.replace(conn);
        if let Err(e) = self.checkpoint().await {
            self.conn = previous;
            return Err(e);
        }
        Ok(summary)
    }

    /// The active database as an image, for download or backup.
    pub fn export_file(&self) -> Result<Vec<u8>> {
        let conn = self.conn()?;
        self.require_engine()?.export_image(conn)
    }

    /// Write the full image of the active database to the blob store.
    pub async fn checkpoint(&self) -> Result<()> {
        let engine = self.engine.ok_or(StoreError::NotReady(self.state))?;
        let conn = self.conn.as_ref().ok_or(StoreError::NotReady(self.state))?;

        let image = engine.export_image(conn)?;
        self.blobs.put(&self.key, &image).await?;

        debug!(key = %self.key, bytes = image.len(), "checkpoint written");
        Ok(())
    }

    /// The active connection. Only available once the session is ready.
    pub fn conn(&self) -> Result<&Connection> {
        match (&self.conn, self.state) {
            (Some(conn), SessionState::Ready) => Ok(conn),
            _ => Err(StoreError::NotReady(self.state)),
        }
    }

    /// Execute a statement that returns no rows. Does not checkpoint.
    pub fn run<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.conn()?
            .execute(sql, params)
            .map_err(StoreError::from_write)
    }

    /// Run a query and map every row.
    pub fn query<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn()?.prepare(sql)?;
        let rows = stmt.query_map(params, f)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Run a query expected to return exactly one row.
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.conn()?
            .query_row(sql, params, f)
            .map_err(StoreError::not_found_or)
    }

    pub fn last_insert_rowid(&self) -> Result<i64> {
        Ok(self.conn()?.last_insert_rowid())
    }

    // create_new and import_file need the engine but not a ready database.
    fn require_engine(&self) -> Result<&'static Engine> {
        match (self.engine, self.state) {
            (Some(engine), SessionState::NeedsChoice | SessionState::Ready) => Ok(engine),
            _ => Err(StoreError::NotReady(self.state)),
        }
    }
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .map_err(|e| StoreError::InvalidImport(e.to_string()))?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use crate::kv::MemoryBlobStore;
    use crate::migrations::CURRENT_VERSION;

    /// Memory store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyBlobStore {
        inner: MemoryBlobStore,
        reject_puts: AtomicBool,
    }

    impl FlakyBlobStore {
        fn reject_puts(&self, reject: bool) {
            self.reject_puts.store(reject, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BlobStore for FlakyBlobStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
            if self.reject_puts.load(Ordering::SeqCst) {
                return Err(StoreError::BlobStoreUnavailable("disk full".to_string()));
            }
            self.inner.put(key, value).await
        }
    }

    async fn flaky_session_with_job(title: &str) -> (Session, Arc<FlakyBlobStore>) {
        let blobs = Arc::new(FlakyBlobStore::default());
        let mut session = Session::new(blobs.clone());
        session.initialize().await.unwrap();
        session.create_new().await.unwrap();
        session
            .run(
                "INSERT INTO jobs (title, description, createdAt) VALUES (?1, 'd', '2024-01-01T00:00:00.000Z')",
                rusqlite::params![title],
            )
            .unwrap();
        session.checkpoint().await.unwrap();
        (session, blobs)
    }

    fn job_titles(session: &Session) -> Vec<String> {
        session
            .query("SELECT title FROM jobs ORDER BY id", [], |row| row.get(0))
            .unwrap()
    }

    async fn initialized(store: &MemoryBlobStore) -> Session {
        let mut session = Session::new(Arc::new(store.clone()));
        session.initialize().await.unwrap();
        session
    }

    async fn ready_session() -> (Session, MemoryBlobStore) {
        let store = MemoryBlobStore::new();
        let mut session = initialized(&store).await;
        session.create_new().await.unwrap();
        (session, store)
    }

    #[tokio::test]
    async fn test_empty_store_needs_choice() {
        let store = MemoryBlobStore::new();
        let mut session = Session::new(Arc::new(store.clone()));
        assert_eq!(session.state(), SessionState::Uninitialized);

        let state = session.initialize().await.unwrap();
        assert_eq!(state, SessionState::NeedsChoice);
        assert!(matches!(
            session.conn(),
            Err(StoreError::NotReady(SessionState::NeedsChoice))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_create_new_persists_image() {
        let (session, store) = ready_session().await;
        assert!(session.is_ready());

        let stored = store.get(DEFAULT_DB_KEY).await.unwrap().unwrap();
        assert!(stored.starts_with(b"SQLite format 3\0"));
    }

    #[tokio::test]
    async fn test_initialize_loads_stored_image() {
        let (session, store) = ready_session().await;
        session
            .run(
                "INSERT INTO jobs (title, description, createdAt) VALUES (?1, ?2, ?3)",
                rusqlite::params!["Backend Engineer", "Rust", "2024-01-01T00:00:00.000Z"],
            )
            .unwrap();
        session.checkpoint().await.unwrap();

        let reopened = initialized(&store).await;
        assert!(reopened.is_ready());
        let title: String = reopened
            .query_row("SELECT title FROM jobs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(title, "Backend Engineer");
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_when_ready() {
        let (mut session, _store) = ready_session().await;
        assert_eq!(session.initialize().await.unwrap(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_custom_key() {
        let store = MemoryBlobStore::new();
        let mut session = Session::with_key(Arc::new(store.clone()), "alt");
        session.initialize().await.unwrap();
        session.create_new().await.unwrap();

        assert!(store.get("alt").await.unwrap().is_some());
        assert!(store.get(DEFAULT_DB_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_before_initialize_fails() {
        let mut session = Session::new(Arc::new(MemoryBlobStore::new()));
        assert!(matches!(
            session.create_new().await,
            Err(StoreError::NotReady(SessionState::Uninitialized))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_stored_image_is_fatal() {
        let store = MemoryBlobStore::new();
        store
            .put(DEFAULT_DB_KEY, &b"not a database image at all".repeat(200))
            .await
            .unwrap();

        let mut session = Session::new(Arc::new(store));
        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptStoredImage(_)));
        assert!(err.is_fatal());
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_corrupt_stored_image_can_be_replaced() {
        let store = MemoryBlobStore::new();
        let garbage = b"garbage".repeat(1000);
        store.put(DEFAULT_DB_KEY, &garbage).await.unwrap();

        let mut session = Session::new(Arc::new(store.clone()));
        assert!(session.initialize().await.is_err());
        assert_eq!(
            session.initialize_without_stored().await.unwrap(),
            SessionState::NeedsChoice
        );
        assert_eq!(store.get(DEFAULT_DB_KEY).await.unwrap().unwrap(), garbage);

        session.create_new().await.unwrap();
        assert!(initialized(&store).await.is_ready());
    }

    #[tokio::test]
    async fn test_newer_stored_schema_is_fatal() {
        let (session, store) = ready_session().await;
        session
            .conn()
            .unwrap()
            .pragma_update(None, "user_version", CURRENT_VERSION + 1)
            .unwrap();
        session.checkpoint().await.unwrap();

        let mut reopened = Session::new(Arc::new(store));
        let err = reopened.initialize().await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptStoredImage(_)));
        assert!(err.is_fatal());
        assert_eq!(reopened.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_failed_import_checkpoint_keeps_previous_database() {
        let (source, _) = ready_session().await;
        source
            .run(
                "INSERT INTO jobs (title, description, createdAt) VALUES ('Imported', 'd', '2024-02-01T00:00:00.000Z')",
                [],
            )
            .unwrap();
        let image = source.export_file().unwrap();

        let (mut session, blobs) = flaky_session_with_job("Original").await;
        let stored_before = blobs.get(DEFAULT_DB_KEY).await.unwrap();
        blobs.reject_puts(true);

        let err = session.import_file(&image).await.unwrap_err();
        assert!(matches!(err, StoreError::BlobStoreUnavailable(_)));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(job_titles(&session), vec!["Original"]);
        assert_eq!(blobs.get(DEFAULT_DB_KEY).await.unwrap(), stored_before);

        blobs.reject_puts(false);
        session.checkpoint().await.unwrap();
        assert_eq!(job_titles(&session), vec!["Original"]);
    }

    #[tokio::test]
    async fn test_failed_create_checkpoint_keeps_previous_database() {
        let (mut session, blobs) = flaky_session_with_job("Original").await;
        blobs.reject_puts(true);

        let err = session.create_new().await.unwrap_err();
        assert!(matches!(err, StoreError::BlobStoreUnavailable(_)));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(job_titles(&session), vec!["Original"]);
    }

    #[tokio::test]
    async fn test_failed_first_create_stays_in_needs_choice() {
        let blobs = Arc::new(FlakyBlobStore::default());
        blobs.reject_puts(true);
        let mut session = Session::new(blobs.clone());
        session.initialize().await.unwrap();

        assert!(session.create_new().await.is_err());
        assert_eq!(session.state(), SessionState::NeedsChoice);
        assert!(matches!(session.conn(), Err(StoreError::NotReady(_))));
        assert!(blobs.get(DEFAULT_DB_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_from_needs_choice() {
        let (source, _) = ready_session().await;
        source
            .run(
                "INSERT INTO jobs (title, description, createdAt) VALUES ('QA', 'tests', '2024-01-01T00:00:00.000Z')",
                [],
            )
            .unwrap();
        let image = source.export_file().unwrap();

        let store = MemoryBlobStore::new();
        let mut session = initialized(&store).await;
        assert_eq!(session.state(), SessionState::NeedsChoice);

        let summary = session.import_file(&image).await.unwrap();
        assert_eq!(summary, ImportSummary { jobs: 1, analyses: 0 });
        assert!(session.is_ready());
        assert!(store.get(DEFAULT_DB_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_import_keeps_state() {
        let store = MemoryBlobStore::new();
        let mut session = initialized(&store).await;

        let err = session.import_file(b"hello").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidImport(_)));
        assert_eq!(session.state(), SessionState::NeedsChoice);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_import_without_tables_rejected() {
        let engine = Engine::load().await.unwrap();
        let foreign = engine.open_empty().unwrap();
        foreign
            .execute_batch("CREATE TABLE unrelated (x INTEGER);")
            .unwrap();
        let image = engine.export_image(&foreign).unwrap();

        let (mut session, _store) = ready_session().await;
        let err = session.import_file(&image).await.unwrap_err();
        match err {
            StoreError::InvalidImport(msg) => assert!(msg.contains("jobs")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_empty_file_rejected() {
        let (mut session, _store) = ready_session().await;
        assert!(matches!(
            session.import_file(&[]).await,
            Err(StoreError::InvalidImport(_))
        ));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::NeedsChoice.to_string(), "needs-choice");
        assert_eq!(SessionState::Importing.to_string(), "importing");
    }
}
