//! Runtime configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file. Every variable is optional.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `INTENTFORGE_HOME` | root of the data directory | current directory |
//! | `INTENTFORGE_DATABASE_URL` | SQLite URL | `<home>/data/db/intentforge.sqlite` |
//! | `INTENTFORGE_LOG_FORMAT` | `json` or `pretty` | `pretty` |
//! | `INTENTFORGE_LOG_LEVEL` | default `EnvFilter` directive | `info` |
//! | `INTENTFORGE_MIN_CONFIDENCE` | detection threshold | `0.7` |
//! | `INTENTFORGE_DETECTION_SEED` | fixed RNG seed for detection | unset |
//! | `INTENTFORGE_USER_ID` | authenticated user for the CLI | unset |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;
use crate::fs_manager::PortablePathManager;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "bunyan" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(AppError::Config(format!("Unknown log format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub home: PathBuf,
    pub database_url: String,
    pub log_format: LogFormat,
    pub log_level: String,
    pub min_confidence: f64,
    pub detection_seed: Option<u64>,
    pub user_id: Option<String>,
}

impl AppConfig {
    /// Loads `.env` (if present) and then reads the environment.
    pub fn load() -> Result<Self, AppError> {
        // A missing .env file is the normal case.
        let _ = dotenv::dotenv();
        Self::from_env()
    }

    /// Reads configuration from the environment only.
    pub fn from_env() -> Result<Self, AppError> {
        let home = match non_empty_var("INTENTFORGE_HOME") {
            Some(home) => PathBuf::from(home),
            None => env::current_dir()?,
        };
        let paths = PortablePathManager::new(&home);

        let database_url = non_empty_var("INTENTFORGE_DATABASE_URL").unwrap_or_else(|| {
            format!("sqlite://{}", paths.db_file().to_string_lossy())
        });

        let log_format = match non_empty_var("INTENTFORGE_LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::Pretty,
        };

        let log_level =
            non_empty_var("INTENTFORGE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let min_confidence = match non_empty_var("INTENTFORGE_MIN_CONFIDENCE") {
            Some(raw) => {
                let value: f64 = raw.parse().map_err(|_| {
                    AppError::Config(format!("INTENTFORGE_MIN_CONFIDENCE is not a number: {}", raw))
                })?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(AppError::Config(format!(
                        "INTENTFORGE_MIN_CONFIDENCE must be within 0..=1, got {}",
                        value
                    )));
                }
                value
            }
            None => DEFAULT_MIN_CONFIDENCE,
        };

        let detection_seed = match non_empty_var("INTENTFORGE_DETECTION_SEED") {
            Some(raw) => Some(raw.parse().map_err(|_| {
                AppError::Config(format!("INTENTFORGE_DETECTION_SEED is not a u64: {}", raw))
            })?),
            None => None,
        };

        Ok(Self {
            home,
            database_url,
            log_format,
            log_level,
            min_confidence,
            detection_seed,
            user_id: non_empty_var("INTENTFORGE_USER_ID"),
        })
    }

    pub fn paths(&self) -> PortablePathManager {
        PortablePathManager::new(&self.home)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
