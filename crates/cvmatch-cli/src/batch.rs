//! Resume batch analysis against one job.
//!
//! Resumes are processed one at a time in input order. Each result is
//! checkpointed as soon as it is stored, so a batch that stops early keeps
//! everything before the stopping point.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use cvmatch_shared::{content_hash, AnalysisOutcome, AnalysisResult, ResumeData};
use cvmatch_store::{NewAnalysis, Repository, StoreError, StoredAnalysis};

/// Evaluates a resume against a job description.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        resume: &ResumeData,
        job_description: &str,
    ) -> Result<AnalysisResult, AnalyzeError>;
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// The analysis service rejected the caller's credential. Retrying the
    /// next resume would fail the same way.
    #[error("API key not valid")]
    InvalidCredential,

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("analysis service rejected the API key; stopped after storing {stored} result(s)")]
    InvalidCredential { stored: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to each resume of a batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub stored: Vec<StoredAnalysis>,
    /// File names skipped because the same content was already analyzed
    /// for this job.
    pub duplicates: Vec<String>,
    /// File names skipped because they had no usable content.
    pub empty: Vec<String>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.stored.iter().filter(|a| a.analysis.is_failed()).count()
    }
}

pub async fn analyze_batch(
    repo: &mut Repository,
    analyzer: &dyn Analyzer,
    job_id: i64,
    resumes: Vec<ResumeData>,
) -> Result<BatchReport, BatchError> {
    let job = repo.get_job(job_id)?;
    let mut seen: HashSet<String> = repo
        .get_analysis_hashes_for_job(job.id)?
        .into_iter()
        .collect();
    let mut report = BatchReport::default();

    info!(job_id, count = resumes.len(), "starting batch");

    for resume in resumes {
        let Some(resume_hash) = resume.content_hash() else {
            warn!(file = %resume.file_name, "resume has no content, skipping");
            report.empty.push(resume.file_name);
            continue;
        };

        if seen.contains(&resume_hash) {
            info!(file = %resume.file_name, "skipping duplicate resume for this job");
            report.duplicates.push(resume.file_name);
            continue;
        }

        let outcome = match analyzer.analyze(&resume, &job.description).await {
            Ok(result) => AnalysisOutcome::from(result),
            Err(AnalyzeError::InvalidCredential) => {
                warn!(file = %resume.file_name, "API key rejected, aborting batch");
                return Err(BatchError::InvalidCredential {
                    stored: report.stored.len(),
                });
            }
            Err(AnalyzeError::Failed(message)) => {
                warn!(file = %resume.file_name, error = %message, "analysis failed");
                AnalysisOutcome::failed(message)
            }
        };

        let payload = NewAnalysis::snapshot(&job, resume, resume_hash.clone(), outcome);
        report.stored.push(repo.add_analysis(&payload).await?);
        seen.insert(resume_hash);
    }

    info!(
        job_id,
        stored = report.stored.len(),
        failed = report.failed(),
        duplicates = report.duplicates.len(),
        empty = report.empty.len(),
        "batch finished"
    );
    Ok(report)
}

/// Run an existing analysis again against its job's current description.
pub async fn reanalyze(
    repo: &mut Repository,
    analyzer: &dyn Analyzer,
    analysis_id: i64,
) -> Result<StoredAnalysis, BatchError> {
    let existing = repo.get_analysis(analysis_id)?;
    let job = repo.get_job(existing.job_id)?;

    let outcome = match analyzer.analyze(&existing.resume_data, &job.description).await {
        Ok(result) => AnalysisOutcome::from(result),
        Err(AnalyzeError::InvalidCredential) => {
            return Err(BatchError::InvalidCredential { stored: 0 });
        }
        Err(AnalyzeError::Failed(message)) => AnalysisOutcome::failed(message),
    };

    let updated = repo
        .update_analysis(
            analysis_id,
            &outcome,
            &content_hash(&job.description),
            &job.description,
        )
        .await?;
    Ok(updated)
}
