use chrono::Utc;
use rusqlite::params;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::models::Job;
use crate::repository::{format_timestamp, parse_timestamp, Repository};

const SELECT_JOB: &str = "SELECT id, title, description, createdAt FROM jobs";

impl Repository {
    pub async fn add_job(&mut self, title: &str, description: &str) -> Result<Job> {
        validate_title(title)?;

        self.session().run(
            "INSERT INTO jobs (title, description, createdAt) VALUES (?1, ?2, ?3)",
            params![title, description, format_timestamp(Utc::now())],
        )?;
        let job = self.get_job(self.session().last_insert_rowid()?)?;
        self.session().checkpoint().await?;

        info!(job_id = job.id, title = %job.title, "job created");
        Ok(job)
    }

    pub fn get_job(&self, id: i64) -> Result<Job> {
        self.session()
            .query_row(&format!("{SELECT_JOB} WHERE id = ?1"), params![id], row_to_job)
    }

    /// Newest first.
    pub fn get_all_jobs(&self) -> Result<Vec<Job>> {
        self.session().query(
            &format!("{SELECT_JOB} ORDER BY createdAt DESC, id DESC"),
            [],
            row_to_job,
        )
    }

    /// Job whose title matches `title` ignoring case and surrounding
    /// whitespace. Callers use this to keep titles unique.
    pub fn find_job_by_title(&self, title: &str) -> Result<Option<Job>> {
        let wanted = title.trim().to_lowercase();
        Ok(self
            .get_all_jobs()?
            .into_iter()
            .find(|job| job.title.trim().to_lowercase() == wanted))
    }

    /// Edit a job in place. Analyses keep the title and description they
    /// were run against.
    pub async fn update_job(&mut self, id: i64, title: &str, description: &str) -> Result<Job> {
        validate_title(title)?;

        let affected = self.session().run(
            "UPDATE jobs SET title = ?1, description = ?2 WHERE id = ?3",
            params![title, description, id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.session().checkpoint().await?;

        info!(job_id = id, "job updated");
        self.get_job(id)
    }

    // ON DELETE CASCADE: analyses go with it
    pub async fn delete_job_and_analyses(&mut self, job_id: i64) -> Result<bool> {
        let affected = self
            .session()
            .run("DELETE FROM jobs WHERE id = ?1", params![job_id])?;
        self.session().checkpoint().await?;

        info!(job_id, deleted = affected > 0, "job deleted");
        Ok(affected > 0)
    }
}

// Titles are stored as given; only a blank one is refused.
fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(StoreError::InvalidInput("job title must not be empty".to_string()));
    }
    Ok(())
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let created_str: String = row.get(3)?;

    Ok(Job {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_timestamp(3, &created_str)?,
    })
}
