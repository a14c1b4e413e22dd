//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use secrecy::SecretString;

use crate::delivery::email::EmailConfig;
use crate::error::ConfigError;
use crate::llm::LlmConfig;

/// Default remote folder holding health documents.
pub const DEFAULT_ROOT_PATH: &str = "me/health";

/// Default Oura collection endpoint.
pub const DEFAULT_OURA_BASE_URL: &str = "https://api.ouraring.com/v2/usercollection";

/// Wearable API configuration.
#[derive(Debug, Clone)]
pub struct OuraConfig {
    pub access_token: SecretString,
    pub base_url: String,
}

impl OuraConfig {
    /// Returns `None` if `OURA_ACCESS_TOKEN` is not set (biometric sync disabled).
    pub fn from_env() -> Option<Self> {
        let token = non_empty_var("OURA_ACCESS_TOKEN")?;
        let base_url =
            std::env::var("OURA_BASE_URL").unwrap_or_else(|_| DEFAULT_OURA_BASE_URL.to_string());
        Some(Self {
            access_token: SecretString::from(token),
            base_url,
        })
    }
}

/// Remote document store configuration.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub access_token: SecretString,
    /// Slash-separated folder path under the store root.
    pub root_path: String,
}

impl DriveConfig {
    /// Returns `None` if `GDRIVE_ACCESS_TOKEN` is not set (remote scan disabled).
    pub fn from_env() -> Option<Self> {
        let token = non_empty_var("GDRIVE_ACCESS_TOKEN")?;
        let root_path =
            std::env::var("GDRIVE_ROOT_PATH").unwrap_or_else(|_| DEFAULT_ROOT_PATH.to_string());
        Some(Self {
            access_token: SecretString::from(token),
            root_path,
        })
    }
}

/// Retry policy for one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of tries (at least 1).
    pub attempts: u32,
    /// Base delay; the wait after attempt `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn once() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    pub const fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
        }
    }

    /// Delay to sleep after the given 0-indexed failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

/// Top-level configuration for a daily run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding JSON artifacts and the sync ledger.
    pub data_dir: PathBuf,
    pub timezone: Tz,
    /// When set, the libSQL store is used instead of JSON files.
    pub db_path: Option<PathBuf>,
    pub oura: Option<OuraConfig>,
    pub drive: Option<DriveConfig>,
    pub llm: Option<LlmConfig>,
    pub email: Option<EmailConfig>,
    /// Retry policy for the biometric sync step.
    pub biometric_retry: RetryPolicy,
    /// Cron expression for daemon mode.
    pub schedule: Option<String>,
    /// Explicit run date; defaults to today in `timezone`.
    pub run_date: Option<NaiveDate>,
}

impl SyncConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = std::env::var("HEALTH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/ingested"));

        let tz_name = std::env::var("HEALTH_TIMEZONE").unwrap_or_else(|_| "Europe/Paris".into());
        let timezone: Tz = tz_name.parse().map_err(|e| ConfigError::InvalidValue {
            key: "HEALTH_TIMEZONE".into(),
            message: format!("{e}"),
        })?;

        let run_date = match non_empty_var("HEALTH_RUN_DATE") {
            Some(s) => Some(NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| {
                ConfigError::InvalidValue {
                    key: "HEALTH_RUN_DATE".into(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            data_dir,
            timezone,
            db_path: non_empty_var("HEALTH_DB_PATH").map(PathBuf::from),
            oura: OuraConfig::from_env(),
            drive: DriveConfig::from_env(),
            llm: LlmConfig::from_env(),
            email: EmailConfig::from_env()?,
            biometric_retry: RetryPolicy::new(3, Duration::from_secs(1)),
            schedule: non_empty_var("HEALTH_SCHEDULE"),
            run_date,
        })
    }

    /// A config with every collaborator disabled (for tests and local runs).
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            timezone: chrono_tz::Europe::Paris,
            db_path: None,
            oura: None,
            drive: None,
            llm: None,
            email: None,
            biometric_retry: RetryPolicy::new(3, Duration::from_secs(1)),
            schedule: None,
            run_date: None,
        }
    }

    /// The date a run should cover.
    pub fn today(&self) -> NaiveDate {
        self.run_date
            .unwrap_or_else(|| chrono::Utc::now().with_timezone(&self.timezone).date_naive())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_double() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.delay_after(0), Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
    }

    #[test]
    fn default_policy_is_single_attempt() {
        assert_eq!(RetryPolicy::default().attempts, 1);
    }

    #[test]
    fn local_config_disables_collaborators() {
        let config = SyncConfig::local("/tmp/health");
        assert!(config.oura.is_none());
        assert!(config.drive.is_none());
        assert!(config.llm.is_none());
        assert!(config.email.is_none());
        assert!(config.db_path.is_none());
    }

    #[test]
    fn explicit_run_date_wins() {
        let mut config = SyncConfig::local("/tmp/health");
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        config.run_date = Some(day);
        assert_eq!(config.today(), day);
    }
}
