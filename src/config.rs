use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub otel_exporter_endpoint: Option<String>,
    pub service_name: String,
    pub metrics_port: u16,
    pub engine: EngineSettings,
}

/// Knobs handed to the sync, restore and import engine
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub sync_interval: Duration,
    pub max_concurrent_syncs: usize,
    pub max_concurrent_imports: usize,
    /// Restore selections larger than this run as background jobs
    pub restore_async_threshold: usize,
    /// Hard ceiling on a single restore selection
    pub restore_max_async_emails: usize,
    pub restore_workers: usize,
    pub restore_queue_capacity: usize,
    /// Deadline applied to every individual mail transport operation
    pub imap_timeout: Duration,
    /// How long finished jobs stay pollable
    pub job_retention: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(15 * 60),
            max_concurrent_syncs: 4,
            max_concurrent_imports: 2,
            restore_async_threshold: 50,
            restore_max_async_emails: 5000,
            restore_workers: 2,
            restore_queue_capacity: 64,
            imap_timeout: Duration::from_secs(60),
            job_retention: Duration::from_secs(60 * 60),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let minutes = self.sync_interval.as_secs() / 60;
        if !(1..=1440).contains(&minutes) {
            return Err(ConfigError::InvalidValue(
                "SYNC_INTERVAL_MINUTES",
                format!("must be 1-1440 minutes, got {}", minutes),
            ));
        }
        for (name, value) in [
            ("MAX_CONCURRENT_SYNCS", self.max_concurrent_syncs),
            ("MAX_CONCURRENT_IMPORTS", self.max_concurrent_imports),
            ("RESTORE_MAX_ASYNC_EMAILS", self.restore_max_async_emails),
            ("RESTORE_WORKERS", self.restore_workers),
            ("RESTORE_QUEUE_CAPACITY", self.restore_queue_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(name, "must be at least 1".to_string()));
            }
        }
        if self.restore_async_threshold > self.restore_max_async_emails {
            return Err(ConfigError::InvalidValue(
                "RESTORE_ASYNC_THRESHOLD",
                format!(
                    "{} exceeds RESTORE_MAX_ASYNC_EMAILS ({})",
                    self.restore_async_threshold, self.restore_max_async_emails
                ),
            ));
        }
        if self.imap_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "IMAP_TIMEOUT_SECONDS",
                "must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let settings = Self {
            sync_interval: Duration::from_secs(
                parse_var("SYNC_INTERVAL_MINUTES", defaults.sync_interval.as_secs() / 60)? * 60,
            ),
            max_concurrent_syncs: parse_var("MAX_CONCURRENT_SYNCS", defaults.max_concurrent_syncs)?,
            max_concurrent_imports: parse_var(
                "MAX_CONCURRENT_IMPORTS",
                defaults.max_concurrent_imports,
            )?,
            restore_async_threshold: parse_var(
                "RESTORE_ASYNC_THRESHOLD",
                defaults.restore_async_threshold,
            )?,
            restore_max_async_emails: parse_var(
                "RESTORE_MAX_ASYNC_EMAILS",
                defaults.restore_max_async_emails,
            )?,
            restore_workers: parse_var("RESTORE_WORKERS", defaults.restore_workers)?,
            restore_queue_capacity: parse_var(
                "RESTORE_QUEUE_CAPACITY",
                defaults.restore_queue_capacity,
            )?,
            imap_timeout: Duration::from_secs(parse_var(
                "IMAP_TIMEOUT_SECONDS",
                defaults.imap_timeout.as_secs(),
            )?),
            job_retention: Duration::from_secs(
                parse_var("JOB_RETENTION_MINUTES", defaults.job_retention.as_secs() / 60)? * 60,
            ),
        };
        settings.validate()?;
        Ok(settings)
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, format!("cannot parse '{}'", raw))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://mailvault.db?mode=rwc".to_string());

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let otel_exporter_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

        let service_name = env::var("SERVICE_NAME").unwrap_or_else(|_| "mailvault".to_string());

        let metrics_port = env::var("METRICS_PORT")
            .unwrap_or_else(|_| "9000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        Ok(Config {
            database_url,
            server_host,
            server_port,
            otel_exporter_endpoint,
            service_name,
            metrics_port,
            engine: EngineSettings::from_env()?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
