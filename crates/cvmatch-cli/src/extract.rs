//! Loading resume files from disk and reading pre-computed analysis results.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use cvmatch_shared::{AnalysisOutcome, AnalysisResult, ResumeData, ResumeImage};

use crate::batch::{AnalyzeError, Analyzer};

/// Suffix of the file holding the analysis result for `<resume>`.
pub const SIDECAR_SUFFIX: &str = ".analysis.json";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported resume format '{0}'; extract the text to a .txt or .md file first")]
    Unsupported(String),

    #[error("'{0}' is not valid UTF-8 text")]
    NotUtf8(PathBuf),

    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

enum Kind {
    Text(&'static str),
    Image(&'static str),
}

fn kind_for(path: &Path) -> Result<Kind, ExtractError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "txt" => Ok(Kind::Text("text/plain")),
        "md" => Ok(Kind::Text("text/markdown")),
        "png" => Ok(Kind::Image("image/png")),
        "jpg" | "jpeg" => Ok(Kind::Image("image/jpeg")),
        "webp" => Ok(Kind::Image("image/webp")),
        "gif" => Ok(Kind::Image("image/gif")),
        _ => Err(ExtractError::Unsupported(path.display().to_string())),
    }
}

/// Read a resume file. Text formats become `text`, images become a base64
/// `image`; the raw bytes are kept either way.
pub async fn load_resume(path: &Path) -> Result<ResumeData, ExtractError> {
    let kind = kind_for(path)?;
    let bytes = fs::read(path).await.map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (text, image, mime) = match kind {
        Kind::Text(mime) => {
            let text = String::from_utf8(bytes.clone())
                .map_err(|_| ExtractError::NotUtf8(path.to_path_buf()))?;
            (Some(text), None, mime)
        }
        Kind::Image(mime) => {
            let image = ResumeImage {
                base64: STANDARD.encode(&bytes),
                mime_type: mime.to_string(),
            };
            (None, Some(image), mime)
        }
    };

    debug!(file = %file_name, size = bytes.len(), mime, "loaded resume");
    Ok(ResumeData {
        file_name,
        text,
        image,
        file_blob: bytes,
        file_mime_type: mime.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Sidecar analyzer
// ---------------------------------------------------------------------------

/// Analyzer that reads results an external run wrote next to each resume,
/// as `<resume>.analysis.json`.
///
/// The file holds either an analysis result or `{"error": "..."}`. An error
/// mentioning an invalid API key is reported as a rejected credential.
#[derive(Debug, Clone)]
pub struct SidecarAnalyzer {
    // Keyed by content fingerprint: file names alone collide across
    // directories.
    known: HashMap<String, PathBuf>,
    fallback_dir: PathBuf,
}

impl SidecarAnalyzer {
    /// Look for each resume's sidecar next to the file it was loaded from,
    /// then in `fallback_dir` by file name.
    ///
    /// When several inputs share content, the first one's sidecar wins; the
    /// batch loop only analyzes the first of them.
    pub fn new<'a>(
        resumes: impl IntoIterator<Item = (&'a Path, &'a ResumeData)>,
        fallback_dir: impl Into<PathBuf>,
    ) -> Self {
        let mut known = HashMap::new();
        for (path, resume) in resumes {
            if let Some(hash) = resume.content_hash() {
                known.entry(hash).or_insert_with(|| sidecar_path(path));
            }
        }
        Self {
            known,
            fallback_dir: fallback_dir.into(),
        }
    }

    fn locate(&self, resume: &ResumeData) -> PathBuf {
        resume
            .content_hash()
            .and_then(|hash| self.known.get(&hash).cloned())
            .unwrap_or_else(|| {
                self.fallback_dir
                    .join(format!("{}{SIDECAR_SUFFIX}", resume.file_name))
            })
    }
}

pub fn sidecar_path(resume: &Path) -> PathBuf {
    let mut name = resume.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl Analyzer for SidecarAnalyzer {
    async fn analyze(
        &self,
        resume: &ResumeData,
        _job_description: &str,
    ) -> Result<AnalysisResult, AnalyzeError> {
        let path = self.locate(resume);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AnalyzeError::Failed(format!(
                    "no analysis result found at '{}'",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(AnalyzeError::Failed(format!(
                    "failed to read '{}': {e}",
                    path.display()
                )));
            }
        };

        match serde_json::from_slice::<AnalysisOutcome>(&raw) {
            Ok(AnalysisOutcome::Completed(result)) => Ok(result),
            Ok(AnalysisOutcome::Failed { error }) => {
                if error.to_lowercase().contains("api key not valid") {
                    Err(AnalyzeError::InvalidCredential)
                } else {
                    Err(AnalyzeError::Failed(error))
                }
            }
            Err(e) => Err(AnalyzeError::Failed(format!(
                "malformed analysis result '{}': {e}",
                path.display()
            ))),
        }
    }
}
