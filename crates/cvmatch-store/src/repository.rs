//! Typed access to jobs and analyses.
//!
//! [`Repository`] owns the [`Session`] it talks to, so several independent
//! stores can coexist in one process. The CRUD helpers live next to their
//! tables in `jobs.rs` and `analyses.rs`.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;

use crate::session::Session;

pub struct Repository {
    session: Session,
}

impl Repository {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Import, export and re-initialization go through the session directly.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

/// RFC-3339 UTC with millisecond precision and a `Z` suffix. Fixed width,
/// so `ORDER BY createdAt` sorts chronologically.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(col: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(col, e))
}

pub(crate) fn conversion_failure<E>(col: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(err))
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(format_timestamp(at), "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn test_timestamp_round_trip() {
        let raw = "2023-11-20T08:15:30.123Z";
        let parsed = parse_timestamp(0, raw).unwrap();
        assert_eq!(format_timestamp(parsed), raw);
    }

    #[test]
    fn test_bad_timestamp() {
        assert!(matches!(
            parse_timestamp(3, "yesterday"),
            Err(rusqlite::Error::FromSqlConversionFailure(3, Type::Text, _))
        ));
    }
}
