//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size (uploads are video files)
    pub max_body_size: usize,
    /// Directory holding uploads and produced artifacts
    pub work_dir: PathBuf,
    /// Directory holding the Python engine scripts
    pub scripts_dir: PathBuf,
    /// Retention window for job artifacts after a terminal event
    pub retention: Duration,
    /// Retention window re-armed after a successful download
    pub download_retention: Duration,
    /// TTL of the capability snapshot cache
    pub capability_ttl: Duration,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_body_size: 500 * 1024 * 1024, // 500MB
            work_dir: std::env::temp_dir().join("unmark"),
            scripts_dir: PathBuf::from("scripts"),
            retention: Duration::from_secs(600),
            download_retention: Duration::from_secs(3600),
            capability_ttl: Duration::from_secs(300),
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            scripts_dir: std::env::var("SCRIPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scripts_dir),
            retention: env_parse("RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention),
            download_retention: env_parse("DOWNLOAD_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_retention),
            capability_ttl: env_parse("CAPABILITY_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.capability_ttl),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
