//! CLI commands implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use cvmatch_store::{
    FsBlobStore, Job, Repository, Session, SessionState, StoreError, StoredAnalysis,
};

use crate::batch::{analyze_batch, reanalyze, BatchError};
use crate::config::CliConfig;
use crate::extract::{load_resume, SidecarAnalyzer};

#[derive(Parser)]
#[command(name = "cvmatch")]
#[command(about = "Resume screening against job descriptions, stored locally")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides CVMATCH_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Open the stored database and report its state
    Init,

    /// Start with a fresh, empty database
    NewDb {
        /// Replace an existing database
        #[arg(long)]
        force: bool,
    },

    /// Replace the active database with a previously exported file
    Import {
        file: PathBuf,
    },

    /// Write the active database to a dated file
    Export {
        /// Output directory (defaults to CVMATCH_EXPORT_DIR or the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Manage jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Inspect and manage stored analyses
    Analysis {
        #[command(subcommand)]
        command: AnalysisCommands,
    },

    /// Analyze resume files against a job using `<file>.analysis.json` results
    Ingest {
        /// Job ID
        #[arg(short, long)]
        job: i64,
        /// Resume files (.txt, .md, .png, .jpg, .jpeg, .webp, .gif)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Where to look for results not found next to their resume
        #[arg(long, default_value = ".")]
        results_dir: PathBuf,
    },

    /// Run a stored analysis again against its job's current description
    Reanalyze {
        /// Analysis ID
        id: i64,
        /// Directory holding `<fileName>.analysis.json`
        #[arg(long, default_value = ".")]
        results_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Create a job
    Add {
        #[arg(short, long)]
        title: String,
        /// Job description text
        #[arg(short, long, conflicts_with = "description_file")]
        description: Option<String>,
        /// Read the description from a file
        #[arg(long)]
        description_file: Option<PathBuf>,
    },
    /// List jobs, newest first
    List,
    /// Change a job's title or description
    Edit {
        id: i64,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long, conflicts_with = "description_file")]
        description: Option<String>,
        #[arg(long)]
        description_file: Option<PathBuf>,
    },
    /// Delete a job and all of its analyses
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum AnalysisCommands {
    /// List analyses, newest first
    List {
        /// Only analyses for this job
        #[arg(short, long)]
        job: Option<i64>,
    },
    /// Print one analysis as JSON
    Show {
        id: i64,
    },
    /// Delete one analysis
    Delete {
        id: i64,
    },
    /// Delete every analysis of a job
    Clear {
        #[arg(short, long)]
        job: i64,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::from_env().with_data_dir(cli.data_dir);
    info!(?config, "loaded configuration");

    match cli.command {
        Commands::Init => cmd_init(&config).await,
        Commands::NewDb { force } => cmd_new_db(&config, force).await,
        Commands::Import { file } => cmd_import(&config, &file).await,
        Commands::Export { out } => cmd_export(&config, out).await,
        Commands::Job { command } => match command {
            JobCommands::Add {
                title,
                description,
                description_file,
            } => {
                let description = read_description(description, description_file)
                    .await?
                    .context("a description is required (--description or --description-file)")?;
                cmd_job_add(&config, &title, &description).await
            }
            JobCommands::List => cmd_job_list(&config).await,
            JobCommands::Edit {
                id,
                title,
                description,
                description_file,
            } => {
                let description = read_description(description, description_file).await?;
                cmd_job_edit(&config, id, title, description).await
            }
            JobCommands::Delete { id } => cmd_job_delete(&config, id).await,
        },
        Commands::Analysis { command } => match command {
            AnalysisCommands::List { job } => cmd_analysis_list(&config, job).await,
            AnalysisCommands::Show { id } => cmd_analysis_show(&config, id).await,
            AnalysisCommands::Delete { id } => cmd_analysis_delete(&config, id).await,
            AnalysisCommands::Clear { job } => cmd_analysis_clear(&config, job).await,
        },
        Commands::Ingest {
            job,
            files,
            results_dir,
        } => cmd_ingest(&config, job, &files, &results_dir).await,
        Commands::Reanalyze { id, results_dir } => cmd_reanalyze(&config, id, &results_dir).await,
    }
}

// ---------------------------------------------------------------------------
// Session helpers
// ---------------------------------------------------------------------------

/// Open the stored database. With `replace_corrupt`, an unreadable image is
/// skipped so the command can overwrite it.
async fn open_session(config: &CliConfig, replace_corrupt: bool) -> anyhow::Result<Session> {
    let blobs = FsBlobStore::open(&config.data_dir).await?;
    let mut session = Session::with_key(Arc::new(blobs), config.db_key.clone());

    match session.initialize().await {
        Ok(_) => {}
        Err(StoreError::CorruptStoredImage(msg)) if replace_corrupt => {
            warn!(error = %msg, "stored database is unreadable, replacing it");
            session.initialize_without_stored().await?;
        }
        Err(e @ StoreError::CorruptStoredImage(_)) => {
            return Err(anyhow::Error::new(e).context(
                "the stored database cannot be read; replace it with \
                 `cvmatch new-db --force` or `cvmatch import <file>`",
            ));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(session)
}

/// Session that already has a database loaded.
async fn open_repository(config: &CliConfig) -> anyhow::Result<Repository> {
    let session = open_session(config, false).await?;
    if session.state() == SessionState::NeedsChoice {
        bail!("no database yet; run `cvmatch new-db` or `cvmatch import <file>` first");
    }
    Ok(Repository::new(session))
}

async fn read_description(
    inline: Option<String>,
    file: Option<PathBuf>,
) -> anyhow::Result<Option<String>> {
    match (inline, file) {
        (Some(text), _) => Ok(Some(text)),
        (None, Some(path)) => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(Some(text))
        }
        (None, None) => Ok(None),
    }
}

fn ensure_unique_title(repo: &Repository, title: &str, except: Option<i64>) -> anyhow::Result<()> {
    if let Some(existing) = repo.find_job_by_title(title)? {
        if Some(existing.id) != except {
            bail!(
                "a job titled '{}' already exists (id {})",
                existing.title,
                existing.id
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Database lifecycle
// ---------------------------------------------------------------------------

async fn cmd_init(config: &CliConfig) -> anyhow::Result<()> {
    let session = open_session(config, false).await?;
    println!("Data directory: {}", config.data_dir.display());

    match session.state() {
        SessionState::Ready => {
            let repo = Repository::new(session);
            let jobs = repo.get_all_jobs()?.len();
            let analyses = repo.get_all_analyses()?.len();
            println!("Database loaded: {jobs} job(s), {analyses} analysis result(s)");
        }
        _ => {
            println!("No database found.");
            println!("  Start fresh:      cvmatch new-db");
            println!("  Restore a backup: cvmatch import <file>");
        }
    }
    Ok(())
}

async fn cmd_new_db(config: &CliConfig, force: bool) -> anyhow::Result<()> {
    let mut session = open_session(config, force).await?;
    if session.is_ready() && !force {
        bail!("a database already exists; pass --force to replace it with an empty one");
    }

    session.create_new().await?;
    println!("Created a new empty database in {}", config.data_dir.display());
    Ok(())
}

async fn cmd_import(config: &CliConfig, file: &Path) -> anyhow::Result<()> {
    let mut session = open_session(config, true).await?;

    // On an invalid file the previous database stays active.
    let summary = session.import_from_path(file).await?;
    println!(
        "Imported {}: {} job(s), {} analysis result(s)",
        file.display(),
        summary.jobs,
        summary.analyses
    );
    Ok(())
}

async fn cmd_export(config: &CliConfig, out: Option<PathBuf>) -> anyhow::Result<()> {
    let repo = open_repository(config).await?;
    let dir = out.unwrap_or_else(|| config.export_dir.clone());

    let path = repo.session().export_to_dir(&dir).await?;
    println!("Exported database to {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

async fn cmd_job_add(config: &CliConfig, title: &str, description: &str) -> anyhow::Result<()> {
    let mut repo = open_repository(config).await?;
    ensure_unique_title(&repo, title, None)?;

    let job = repo.add_job(title, description).await?;
    println!("Created job {}: {}", job.id, job.title);
    Ok(())
}

async fn cmd_job_list(config: &CliConfig) -> anyhow::Result<()> {
    let repo = open_repository(config).await?;
    let jobs = repo.get_all_jobs()?;

    if jobs.is_empty() {
        println!("No jobs yet. Add one with `cvmatch job add`.");
        return Ok(());
    }

    println!("{:<6} {:<20} TITLE", "ID", "CREATED");
    for job in &jobs {
        print_job_row(job);
    }
    Ok(())
}

fn print_job_row(job: &Job) {
    println!(
        "{:<6} {:<20} {}",
        job.id,
        job.created_at.format("%Y-%m-%d %H:%M"),
        job.title
    );
}

async fn cmd_job_edit(
    config: &CliConfig,
    id: i64,
    title: Option<String>,
    description: Option<String>,
) -> anyhow::Result<()> {
    let mut repo = open_repository(config).await?;
    let current = repo.get_job(id).map_err(|e| missing(e, "job", id))?;

    let title = title.unwrap_or(current.title);
    let description = description.unwrap_or(current.description);
    ensure_unique_title(&repo, &title, Some(id))?;

    let job = repo.update_job(id, &title, &description).await?;
    println!("Updated job {}: {}", job.id, job.title);
    Ok(())
}

async fn cmd_job_delete(config: &CliConfig, id: i64) -> anyhow::Result<()> {
    let mut repo = open_repository(config).await?;
    if !repo.delete_job_and_analyses(id).await? {
        bail!("job {id} not found");
    }
    println!("Deleted job {id} and its analyses");
    Ok(())
}

// ---------------------------------------------------------------------------
// Analyses
// ---------------------------------------------------------------------------

async fn cmd_analysis_list(config: &CliConfig, job: Option<i64>) -> anyhow::Result<()> {
    let repo = open_repository(config).await?;
    let analyses = match job {
        Some(job_id) => repo.get_analyses_for_job(job_id)?,
        None => repo.get_all_analyses()?,
    };

    if analyses.is_empty() {
        println!("No analyses found.");
        return Ok(());
    }

    println!("{:<6} {:<6} {:>6}  {:<30} JOB", "ID", "JOB", "SCORE", "FILE");
    for analysis in &analyses {
        print_analysis_row(analysis);
    }
    Ok(())
}

fn print_analysis_row(analysis: &StoredAnalysis) {
    let score = match analysis.analysis.match_score() {
        Some(score) => format!("{score:.0}"),
        None => "error".to_string(),
    };
    println!(
        "{:<6} {:<6} {:>6}  {:<30} {}",
        analysis.id, analysis.job_id, score, analysis.file_name, analysis.job_title
    );
}

async fn cmd_analysis_show(config: &CliConfig, id: i64) -> anyhow::Result<()> {
    let repo = open_repository(config).await?;
    let analysis = repo.get_analysis(id).map_err(|e| missing(e, "analysis", id))?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

async fn cmd_analysis_delete(config: &CliConfig, id: i64) -> anyhow::Result<()> {
    let mut repo = open_repository(config).await?;
    if !repo.delete_analysis(id).await? {
        bail!("analysis {id} not found");
    }
    println!("Deleted analysis {id}");
    Ok(())
}

async fn cmd_analysis_clear(config: &CliConfig, job_id: i64) -> anyhow::Result<()> {
    let mut repo = open_repository(config).await?;
    let removed = repo.clear_all_analyses(job_id).await?;
    println!("Removed {removed} analysis result(s) from job {job_id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Analysis runs
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    config: &CliConfig,
    job_id: i64,
    files: &[PathBuf],
    results_dir: &Path,
) -> anyhow::Result<()> {
    let mut repo = open_repository(config).await?;
    repo.get_job(job_id).map_err(|e| missing(e, "job", job_id))?;

    let mut resumes = Vec::with_capacity(files.len());
    for path in files {
        resumes.push(load_resume(path).await?);
    }

    let analyzer = SidecarAnalyzer::new(
        files.iter().map(PathBuf::as_path).zip(&resumes),
        results_dir,
    );
    let report = match analyze_batch(&mut repo, &analyzer, job_id, resumes).await {
        Ok(report) => report,
        Err(BatchError::InvalidCredential { stored }) => {
            bail!(
                "Your API key is invalid. Stopped after storing {stored} result(s); \
                 provide a valid key and run again to continue"
            )
        }
        Err(e) => return Err(e.into()),
    };

    for analysis in &report.stored {
        print_analysis_row(analysis);
    }
    for name in &report.duplicates {
        println!("  skipped duplicate: {name}");
    }
    for name in &report.empty {
        println!("  skipped empty: {name}");
    }
    println!(
        "Stored {} result(s), {} failed, {} duplicate(s) skipped",
        report.stored.len(),
        report.failed(),
        report.duplicates.len()
    );
    Ok(())
}

async fn cmd_reanalyze(config: &CliConfig, id: i64, results_dir: &Path) -> anyhow::Result<()> {
    let mut repo = open_repository(config).await?;
    let analyzer = SidecarAnalyzer::new(std::iter::empty(), results_dir);

    match reanalyze(&mut repo, &analyzer, id).await {
        Ok(updated) => {
            print_analysis_row(&updated);
            Ok(())
        }
        Err(BatchError::Store(StoreError::NotFound)) => bail!("analysis {id} not found"),
        Err(BatchError::InvalidCredential { .. }) => bail!("Your API key is invalid"),
        Err(e) => Err(e.into()),
    }
}

fn missing(err: StoreError, what: &str, id: i64) -> anyhow::Error {
    match err {
        StoreError::NotFound => anyhow::anyhow!("{what} {id} not found"),
        other => other.into(),
    }
}
