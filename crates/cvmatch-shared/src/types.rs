use serde::{Deserialize, Serialize};

use crate::hash::content_hash;

// ---------------------------------------------------------------------------
// Resume payload
// ---------------------------------------------------------------------------

/// An image resume, kept as base64 so it can be handed to the analyzer as is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeImage {
    pub base64: String,
    pub mime_type: String,
}

/// A resume after content extraction.
///
/// `text` and `image` are the derived fields and are serialized into the
/// `resumeData` JSON column. The original file bytes and their MIME type are
/// stored in separate columns, so they are skipped by serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeData {
    /// Original file name. Older images omit it from the JSON column.
    #[serde(default)]
    pub file_name: String,
    /// Extracted plain text, if the file had a text layer.
    #[serde(default)]
    pub text: Option<String>,
    /// Image payload for scanned or photographed resumes.
    #[serde(default)]
    pub image: Option<ResumeImage>,
    /// Raw bytes of the uploaded file.
    #[serde(skip)]
    pub file_blob: Vec<u8>,
    /// MIME type of `file_blob`.
    #[serde(skip)]
    pub file_mime_type: String,
}

impl ResumeData {
    /// The payload that identifies this resume: non-empty text first, then
    /// the image's base64 data.
    pub fn content(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| {
                self.image
                    .as_ref()
                    .map(|i| i.base64.as_str())
                    .filter(|b| !b.is_empty())
            })
    }

    /// Fingerprint of [`ResumeData::content`], `None` when there is nothing
    /// to fingerprint.
    pub fn content_hash(&self) -> Option<String> {
        self.content().map(content_hash)
    }
}

// ---------------------------------------------------------------------------
// Analysis outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeywordAnalysis {
    pub matching_keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
}

/// Structured result returned by the analysis service for one resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub candidate_name: String,
    /// Match score, 0-100.
    pub match_score: f64,
    pub summary: String,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub keyword_analysis: KeywordAnalysis,
}

/// What was stored for one analysis attempt: a result or the error message.
///
/// On disk this is either the bare result object or `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Failed { error: String },
    Completed(AnalysisResult),
}

impl AnalysisOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        AnalysisOutcome::Failed {
            error: message.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AnalysisOutcome::Failed { .. })
    }

    pub fn match_score(&self) -> Option<f64> {
        match self {
            AnalysisOutcome::Completed(result) => Some(result.match_score),
            AnalysisOutcome::Failed { .. } => None,
        }
    }
}

impl From<AnalysisResult> for AnalysisOutcome {
    fn from(result: AnalysisResult) -> Self {
        AnalysisOutcome::Completed(result)
    }
}
