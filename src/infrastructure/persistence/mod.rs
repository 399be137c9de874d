use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    any::{AnyConnectOptions, AnyPoolOptions},
    AnyPool, ConnectOptions,
};
use std::str::FromStr;
use tracing::log::LevelFilter;

use crate::domain::errors::DomainError;

mod accounts;
mod archive;

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: AnyPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        // Ensure drivers are installed for AnyPool
        sqlx::any::install_default_drivers();

        let connect_options = AnyConnectOptions::from_str(database_url)?
            .log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, std::time::Duration::from_secs(1));

        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .connect_with(connect_options)
            .await?;

        if database_url.starts_with("sqlite") {
            for pragma in [
                "PRAGMA journal_mode = WAL",
                "PRAGMA busy_timeout = 5000",
                "PRAGMA synchronous = NORMAL",
                "PRAGMA foreign_keys = ON",
            ] {
                sqlx::query(pragma).execute(&pool).await?;
            }
        }

        tracing::info!("Database pool ready");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DomainError::Conflict(db_err.message().to_string())
            }
            other => DomainError::Storage(other.to_string()),
        }
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DomainError::Storage(format!("Bad timestamp {:?}: {}", value, e)))
}

pub(crate) fn parse_optional_timestamp(
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, DomainError> {
    value.as_deref().map(parse_timestamp).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_as_text() {
        let epoch = format_timestamp(DateTime::<Utc>::default());
        let later = format_timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(epoch, "1970-01-01T00:00:00.000000Z");
        assert_eq!(later.len(), epoch.len());
        assert!(epoch < later);
    }

    #[test]
    fn test_timestamp_round_trip_keeps_micros() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(at)).unwrap(), at);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DomainError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DomainError::NotFound(_)));
        let err: DomainError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_account_level());
    }
}
