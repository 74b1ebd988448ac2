//! Whole-database export to and import from files on disk.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use tracing::info;

use cvmatch_shared::constants::{EXPORT_FILE_EXTENSION, EXPORT_FILE_PREFIX};

use crate::error::Result;
use crate::models::ImportSummary;
use crate::session::Session;

/// `resume_analyzer_<YYYY-MM-DD>.db`
pub fn export_file_name(date: NaiveDate) -> String {
    format!(
        "{EXPORT_FILE_PREFIX}{}.{EXPORT_FILE_EXTENSION}",
        date.format("%Y-%m-%d")
    )
}

impl Session {
    /// Write the active image into `dir` under today's export name,
    /// replacing an export from earlier the same day.
    pub async fn export_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        let image = self.export_file()?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(export_file_name(Utc::now().date_naive()));
        tokio::fs::write(&path, &image).await?;

        info!(path = %path.display(), bytes = image.len(), "database exported");
        Ok(path)
    }

    /// Read a previously exported file and make it the active database.
    pub async fn import_from_path(&mut self, path: &Path) -> Result<ImportSummary> {
        let image = tokio::fs::read(path).await?;
        info!(path = %path.display(), bytes = image.len(), "importing database file");
        self.import_file(&image).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::repository::test_support::ready_repo;
    use crate::session::SessionState;

    #[test]
    fn test_export_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_file_name(date), "resume_analyzer_2024-03-09.db");
    }

    #[tokio::test]
    async fn test_export_then_import_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (mut source, _) = ready_repo().await;
        source.add_job("Platform Engineer", "Nix, Rust").await.unwrap();

        let path = source.session().export_to_dir(dir.path()).await.unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("resume_analyzer_"));

        let (mut target, _) = ready_repo().await;
        let summary = target.session_mut().import_from_path(&path).await.unwrap();
        assert_eq!(summary.jobs, 1);
        assert_eq!(target.get_all_jobs().unwrap()[0].title, "Platform Engineer");
    }

    #[tokio::test]
    async fn test_import_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let (mut repo, _) = ready_repo().await;

        let err = repo
            .session_mut()
            .import_from_path(&dir.path().join("nope.db"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(repo.session().state(), SessionState::Ready);
    }
}
