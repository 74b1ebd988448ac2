//! Domain model structs persisted in the local database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a front end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cvmatch_shared::{content_hash, AnalysisOutcome, ResumeData};

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A job description that resumes are matched against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Row id assigned by SQLite.
    pub id: i64,
    /// Display title. Unique per store, compared case-insensitively after
    /// trimming; the schema itself does not enforce it.
    pub title: String,
    /// Requirements text used for matching.
    pub description: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// One resume evaluated against one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnalysis {
    pub id: i64,
    /// Parent job. Deleting the job deletes this row.
    pub job_id: i64,
    /// Job title when the analysis ran. Not updated by job edits.
    pub job_title: String,
    pub file_name: String,
    /// Fingerprint of the resume content, used for duplicate detection.
    pub resume_hash: String,
    /// Fingerprint of `job_description`.
    pub job_desc_hash: String,
    /// Job description the resume was evaluated against.
    pub job_description: String,
    pub resume_data: ResumeData,
    pub analysis: AnalysisOutcome,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`crate::Repository::add_analysis`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalysis {
    pub job_id: i64,
    pub job_title: String,
    pub file_name: String,
    pub resume_hash: String,
    pub job_desc_hash: String,
    pub job_description: String,
    pub resume_data: ResumeData,
    pub analysis: AnalysisOutcome,
}

impl NewAnalysis {
    /// Build a payload that snapshots `job` as it is right now.
    pub fn snapshot(
        job: &Job,
        resume: ResumeData,
        resume_hash: String,
        analysis: AnalysisOutcome,
    ) -> Self {
        Self {
            job_id: job.id,
            job_title: job.title.clone(),
            file_name: resume.file_name.clone(),
            resume_hash,
            job_desc_hash: content_hash(&job.description),
            job_description: job.description.clone(),
            resume_data: resume,
            analysis,
        }
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Row counts of a freshly imported image.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub jobs: usize,
    pub analyses: usize,
}
