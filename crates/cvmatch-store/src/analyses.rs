use chrono::Utc;
use rusqlite::params;
use tracing::{debug, info};

use cvmatch_shared::{AnalysisOutcome, ResumeData};

use crate::error::{Result, StoreError};
use crate::models::{NewAnalysis, StoredAnalysis};
use crate::repository::{conversion_failure, format_timestamp, parse_timestamp, Repository};

const SELECT_ANALYSIS: &str = "SELECT id, jobId, jobTitle, fileName, resumeHash, jobDescHash, \
     jobDescription, resumeData, analysis, createdAt, resumeFile, resumeMimeType \
     FROM analysisResults";

const NEWEST_FIRST: &str = "ORDER BY createdAt DESC, id DESC";

impl Repository {
    /// Store one analysis. The resume's derived fields go into the JSON
    /// column, the original file bytes and MIME type into their own columns.
    ///
    /// Fails with a constraint violation if `data.job_id` does not exist.
    pub async fn add_analysis(&mut self, data: &NewAnalysis) -> Result<StoredAnalysis> {
        let resume_json = serde_json::to_string(&data.resume_data)?;
        let analysis_json = serde_json::to_string(&data.analysis)?;

        self.session().run(
            "INSERT INTO analysisResults (jobId, jobTitle, fileName, resumeHash, jobDescHash,
                 jobDescription, resumeData, analysis, createdAt, resumeFile, resumeMimeType)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                data.job_id,
                data.job_title,
                data.file_name,
                data.resume_hash,
                data.job_desc_hash,
                data.job_description,
                resume_json,
                analysis_json,
                format_timestamp(Utc::now()),
                data.resume_data.file_blob,
                data.resume_data.file_mime_type,
            ],
        )?;
        let stored = self.get_analysis(self.session().last_insert_rowid()?)?;
        self.session().checkpoint().await?;

        info!(
            analysis_id = stored.id,
            job_id = stored.job_id,
            file = %stored.file_name,
            failed = stored.analysis.is_failed(),
            "analysis stored"
        );
        Ok(stored)
    }

    pub fn get_analysis(&self, id: i64) -> Result<StoredAnalysis> {
        self.session().query_row(
            &format!("{SELECT_ANALYSIS} WHERE id = ?1"),
            params![id],
            row_to_analysis,
        )
    }

    /// Every analysis across all jobs, newest first.
    pub fn get_all_analyses(&self) -> Result<Vec<StoredAnalysis>> {
        self.session().query(
            &format!("{SELECT_ANALYSIS} {NEWEST_FIRST}"),
            [],
            row_to_analysis,
        )
    }

    pub fn get_analyses_for_job(&self, job_id: i64) -> Result<Vec<StoredAnalysis>> {
        self.session().query(
            &format!("{SELECT_ANALYSIS} WHERE jobId = ?1 {NEWEST_FIRST}"),
            params![job_id],
            row_to_analysis,
        )
    }

    /// Resume fingerprints already analyzed for `job_id`. Uniqueness is not
    /// enforced by the schema; callers check this set before inserting.
    pub fn get_analysis_hashes_for_job(&self, job_id: i64) -> Result<Vec<String>> {
        self.session().query(
            "SELECT resumeHash FROM analysisResults WHERE jobId = ?1",
            params![job_id],
            |row| row.get(0),
        )
    }

    pub async fn delete_analysis(&mut self, id: i64) -> Result<bool> {
        let affected = self
            .session()
            .run("DELETE FROM analysisResults WHERE id = ?1", params![id])?;
        self.session().checkpoint().await?;

        debug!(analysis_id = id, deleted = affected > 0, "analysis deleted");
        Ok(affected > 0)
    }

    /// Delete every analysis of one job, returning how many went.
    pub async fn clear_all_analyses(&mut self, job_id: i64) -> Result<usize> {
        let affected = self
            .session()
            .run("DELETE FROM analysisResults WHERE jobId = ?1", params![job_id])?;
        self.session().checkpoint().await?;

        info!(job_id, deleted = affected, "analyses cleared");
        Ok(affected)
    }

    /// Overwrite the outcome and description snapshot of an existing row
    /// after a re-run. `id`, `createdAt` and the resume are kept.
    pub async fn update_analysis(
        &mut self,
        id: i64,
        analysis: &AnalysisOutcome,
        job_desc_hash: &str,
        job_description: &str,
    ) -> Result<StoredAnalysis> {
        let analysis_json = serde_json::to_string(analysis)?;

        let affected = self.session().run(
            "UPDATE analysisResults SET analysis = ?1, jobDescHash = ?2, jobDescription = ?3
             WHERE id = ?4",
            params![analysis_json, job_desc_hash, job_description, id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.session().checkpoint().await?;

        info!(analysis_id = id, "analysis updated");
        self.get_analysis(id)
    }
}

fn row_to_analysis(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredAnalysis> {
    let file_name: String = row.get(3)?;
    let resume_json: String = row.get(7)?;
    let analysis_json: String = row.get(8)?;
    let created_str: String = row.get(9)?;
    let resume_file: Option<Vec<u8>> = row.get(10)?;
    let resume_mime: Option<String> = row.get(11)?;

    let mut resume_data: ResumeData =
        serde_json::from_str(&resume_json).map_err(|e| conversion_failure(7, e))?;
    if resume_data.file_name.is_empty() {
        resume_data.file_name = file_name.clone();
    }
    resume_data.file_blob = resume_file.unwrap_or_default();
    resume_data.file_mime_type = resume_mime.unwrap_or_default();

    let analysis: AnalysisOutcome =
        serde_json::from_str(&analysis_json).map_err(|e| conversion_failure(8, e))?;

    Ok(StoredAnalysis {
        id: row.get(0)?,
        job_id: row.get(1)?,
        job_title: row.get(2)?,
        file_name,
        resume_hash: row.get(4)?,
        job_desc_hash: row.get(5)?,
        job_description: row.get(6)?,
        resume_data,
        analysis,
        created_at: parse_timestamp(9, &created_str)?,
    })
}
