//! Configuration module
//!
//! Settings for the HTTP server, persistence, storage, the validation gate, the
//! worker pool and the reconciliation sweep. Everything is read from the
//! environment (with `.env` support) and falls back to development defaults.

use std::env;
use std::str::FromStr;

use crate::models::ImageFormatKind;
use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 4000;
const DB_MAX_CONNECTIONS: u32 = 10;
const MAX_FILE_SIZE_MB: usize = 10;
const MAX_IMAGE_DIMENSION: u32 = 10_000;
const MAX_IMAGE_PIXELS: u64 = 40_000_000;
const CLAMAV_PORT: u16 = 3310;
const CLAMAV_TIMEOUT_SECS: u64 = 30;
const WORKER_MAX_WORKERS: usize = 4;
const WORKER_POLL_INTERVAL_MS: u64 = 1000;
const WORKER_TRANSFORM_TIMEOUT_SECS: u64 = 300;
const WORKER_JOB_TIMEOUT_SECS: u64 = 600;
const WORKER_MAX_ATTEMPTS: u32 = 5;
const WORKER_RETRY_BASE_MS: u64 = 1000;
const QUEUE_VISIBILITY_TIMEOUT_SECS: u64 = 900;
const RECONCILE_INTERVAL_SECS: u64 = 60;
const RECONCILE_STALE_AFTER_SECS: i64 = 600;
const RECONCILE_MAX_AGE_SECS: i64 = 86_400;
const RECONCILE_FAILED_JOB_RETENTION_SECS: i64 = 7 * 86_400;

const QUALITY_PRESETS: [&str; 5] = ["normal", "better", "best", "lighter", "lightest"];

/// Limits enforced by the upload validation gate.
#[derive(Clone, Debug)]
pub struct ValidationSettings {
    pub max_file_size_bytes: usize,
    /// Ceiling applied to both width and height.
    pub max_dimension: u32,
    pub max_pixels: u64,
    pub allowed_formats: Vec<ImageFormatKind>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_file_size_bytes: MAX_FILE_SIZE_MB * 1024 * 1024,
            max_dimension: MAX_IMAGE_DIMENSION,
            max_pixels: MAX_IMAGE_PIXELS,
            allowed_formats: ImageFormatKind::ALL.to_vec(),
        }
    }
}

/// Worker pool sizing, timeouts and retry budget.
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    /// Hard limit on the CPU-bound variant generation of one job.
    pub transform_timeout_secs: u64,
    /// Outer limit on one whole delivery (fetch, transform, store, save).
    pub job_timeout_secs: u64,
    /// Total deliveries allowed before an image is failed.
    pub max_attempts: u32,
    pub retry_base_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_workers: WORKER_MAX_WORKERS,
            poll_interval_ms: WORKER_POLL_INTERVAL_MS,
            transform_timeout_secs: WORKER_TRANSFORM_TIMEOUT_SECS,
            job_timeout_secs: WORKER_JOB_TIMEOUT_SECS,
            max_attempts: WORKER_MAX_ATTEMPTS,
            retry_base_ms: WORKER_RETRY_BASE_MS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueSettings {
    /// How long a delivery stays leased before it becomes visible again.
    pub visibility_timeout_secs: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: QUEUE_VISIBILITY_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReconcileSettings {
    /// Interval between sweeps. 0 = disabled.
    pub interval_secs: u64,
    /// A `processing` image untouched for this long gets a fresh job.
    pub stale_after_secs: i64,
    /// A `processing` image older than this is failed outright.
    pub max_age_secs: i64,
    /// Parked jobs are purged from the queue after this long.
    pub failed_job_retention_secs: i64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            interval_secs: RECONCILE_INTERVAL_SECS,
            stale_after_secs: RECONCILE_STALE_AFTER_SECS,
            max_age_secs: RECONCILE_MAX_AGE_SECS,
            failed_job_retention_secs: RECONCILE_FAILED_JOB_RETENTION_SECS,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    /// Unset means the in-memory repository and queue are used (not durable).
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub validation: ValidationSettings,
    // ClamAV configuration
    pub clamav_enabled: bool,
    pub clamav_host: String,
    pub clamav_port: u16,
    pub clamav_timeout_secs: u64,
    // Variant encoding
    pub variant_format: ImageFormatKind,
    pub variant_quality: String,
    pub worker: WorkerSettings,
    pub queue: QueueSettings,
    pub reconcile: ReconcileSettings,
    /// `json` for structured log lines, anything else for compact console output.
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            environment: "development".to_string(),
            database_url: None,
            db_max_connections: DB_MAX_CONNECTIONS,
            storage_backend: StorageBackend::Local,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            local_storage_path: Some("./data/media".to_string()),
            local_storage_base_url: Some("http://localhost:4000/media".to_string()),
            validation: ValidationSettings::default(),
            clamav_enabled: false,
            clamav_host: "localhost".to_string(),
            clamav_port: CLAMAV_PORT,
            clamav_timeout_secs: CLAMAV_TIMEOUT_SECS,
            variant_format: ImageFormatKind::Jpeg,
            variant_quality: "normal".to_string(),
            worker: WorkerSettings::default(),
            queue: QueueSettings::default(),
            reconcile: ReconcileSettings::default(),
            log_format: "compact".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let storage_backend = match optional_env("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => defaults.storage_backend,
        };

        let allowed_formats = match optional_env("ALLOWED_IMAGE_FORMATS") {
            Some(value) => value
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(ImageFormatKind::from_str)
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.validation.allowed_formats.clone(),
        };

        let variant_format = match optional_env("VARIANT_FORMAT") {
            Some(value) => value.parse::<ImageFormatKind>()?,
            None => defaults.variant_format,
        };

        let max_file_size_mb = parse_env("MAX_FILE_SIZE_MB", MAX_FILE_SIZE_MB);

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            database_url: optional_env("DATABASE_URL"),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS),
            storage_backend,
            s3_bucket: optional_env("S3_BUCKET"),
            s3_region: optional_env("S3_REGION").or_else(|| optional_env("AWS_REGION")),
            s3_endpoint: optional_env("S3_ENDPOINT"),
            local_storage_path: optional_env("LOCAL_STORAGE_PATH")
                .or(defaults.local_storage_path),
            local_storage_base_url: optional_env("LOCAL_STORAGE_BASE_URL")
                .or(defaults.local_storage_base_url),
            validation: ValidationSettings {
                max_file_size_bytes: max_file_size_mb * 1024 * 1024,
                max_dimension: parse_env("MAX_IMAGE_DIMENSION", MAX_IMAGE_DIMENSION),
                max_pixels: parse_env("MAX_IMAGE_PIXELS", MAX_IMAGE_PIXELS),
                allowed_formats,
            },
            clamav_enabled: parse_env("CLAMAV_ENABLED", false),
            clamav_host: env::var("CLAMAV_HOST").unwrap_or_else(|_| "localhost".to_string()),
            clamav_port: parse_env("CLAMAV_PORT", CLAMAV_PORT),
            clamav_timeout_secs: parse_env("CLAMAV_TIMEOUT_SECS", CLAMAV_TIMEOUT_SECS),
            variant_format,
            variant_quality: env::var("VARIANT_QUALITY")
                .map(|v| v.trim().to_lowercase())
                .unwrap_or(defaults.variant_quality),
            worker: WorkerSettings {
                max_workers: parse_env("WORKER_MAX_WORKERS", WORKER_MAX_WORKERS),
                poll_interval_ms: parse_env("WORKER_POLL_INTERVAL_MS", WORKER_POLL_INTERVAL_MS),
                transform_timeout_secs: parse_env(
                    "WORKER_TRANSFORM_TIMEOUT_SECS",
                    WORKER_TRANSFORM_TIMEOUT_SECS,
                ),
                job_timeout_secs: parse_env("WORKER_JOB_TIMEOUT_SECS", WORKER_JOB_TIMEOUT_SECS),
                max_attempts: parse_env("WORKER_MAX_ATTEMPTS", WORKER_MAX_ATTEMPTS),
                retry_base_ms: parse_env("WORKER_RETRY_BASE_MS", WORKER_RETRY_BASE_MS),
            },
            queue: QueueSettings {
                visibility_timeout_secs: parse_env(
                    "QUEUE_VISIBILITY_TIMEOUT_SECS",
                    QUEUE_VISIBILITY_TIMEOUT_SECS,
                ),
            },
            reconcile: ReconcileSettings {
                interval_secs: parse_env("RECONCILE_INTERVAL_SECS", RECONCILE_INTERVAL_SECS),
                stale_after_secs: parse_env(
                    "RECONCILE_STALE_AFTER_SECS",
                    RECONCILE_STALE_AFTER_SECS,
                ),
                max_age_secs: parse_env("RECONCILE_MAX_AGE_SECS", RECONCILE_MAX_AGE_SECS),
                failed_job_retention_secs: parse_env(
                    "RECONCILE_FAILED_JOB_RETENTION_SECS",
                    RECONCILE_FAILED_JOB_RETENTION_SECS,
                ),
            },
            log_format: env::var("LOG_FORMAT")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.log_format),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match &self.database_url {
            Some(url) => {
                if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ));
                }
            }
            None if self.is_production() => {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be set in production; the in-memory queue is not durable"
                ));
            }
            None => {}
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.validation.allowed_formats.is_empty() {
            return Err(anyhow::anyhow!(
                "ALLOWED_IMAGE_FORMATS must name at least one format"
            ));
        }
        if self.validation.max_file_size_bytes == 0
            || self.validation.max_dimension == 0
            || self.validation.max_pixels == 0
        {
            return Err(anyhow::anyhow!("Validation limits must be greater than zero"));
        }

        if self.variant_format == ImageFormatKind::Gif {
            return Err(anyhow::anyhow!(
                "VARIANT_FORMAT must be one of jpeg, png or webp"
            ));
        }
        if !QUALITY_PRESETS.contains(&self.variant_quality.as_str()) {
            return Err(anyhow::anyhow!(
                "VARIANT_QUALITY must be one of {}",
                QUALITY_PRESETS.join(", ")
            ));
        }

        if self.clamav_enabled && self.clamav_host.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "CLAMAV_HOST must be set when CLAMAV_ENABLED=true"
            ));
        }

        if self.worker.max_workers == 0 {
            return Err(anyhow::anyhow!("WORKER_MAX_WORKERS must be at least 1"));
        }
        if self.worker.max_attempts == 0 {
            return Err(anyhow::anyhow!("WORKER_MAX_ATTEMPTS must be at least 1"));
        }
        if self.worker.job_timeout_secs < self.worker.transform_timeout_secs {
            return Err(anyhow::anyhow!(
                "WORKER_JOB_TIMEOUT_SECS must not be shorter than WORKER_TRANSFORM_TIMEOUT_SECS"
            ));
        }
        if self.reconcile.max_age_secs <= self.reconcile.stale_after_secs {
            return Err(anyhow::anyhow!(
                "RECONCILE_MAX_AGE_SECS must exceed RECONCILE_STALE_AFTER_SECS"
            ));
        }
        if self.reconcile.failed_job_retention_secs <= 0 {
            return Err(anyhow::anyhow!(
                "RECONCILE_FAILED_JOB_RETENTION_SECS must be greater than zero"
            ));
        }

        Ok(())
    }
}
