//! Wearable biometrics: raw API summaries and the normalized daily record.

pub mod oura;

pub use oura::OuraClient;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::BiometricError;

/// `daily_sleep` record fields we read. Everything is optional upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepRecord {
    pub score: Option<f64>,
    pub total_sleep_duration: Option<f64>,
    pub lowest_heart_rate: Option<f64>,
    pub average_hrv: Option<f64>,
}

/// `daily_activity` record fields we read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityRecord {
    pub score: Option<f64>,
    pub steps: Option<f64>,
    pub active_calories: Option<f64>,
}

/// `daily_readiness` record fields we read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessRecord {
    pub score: Option<f64>,
}

/// One day of raw wearable data. Missing collections are empty records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDailySummary {
    pub sleep: SleepRecord,
    pub activity: ActivityRecord,
    pub readiness: ReadinessRecord,
}

/// Normalized daily biometric record, keyed by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    #[serde(default)]
    pub sleep_hours: f64,
    #[serde(default)]
    pub sleep_quality: u32,
    #[serde(default)]
    pub steps: u32,
    #[serde(default)]
    pub active_minutes: u32,
    #[serde(default)]
    pub resting_hr: u32,
    #[serde(default)]
    pub hrv: f64,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "unknown".into()
}

impl DailySummary {
    /// Normalize an Oura payload.
    ///
    /// Sleep quality falls back to the readiness score when the sleep score
    /// is absent or zero. Active minutes are taken from active calories.
    pub fn from_oura(date: NaiveDate, raw: &RawDailySummary) -> Self {
        let sleep_seconds = raw.sleep.total_sleep_duration.unwrap_or(0.0);
        let sleep_score = raw.sleep.score.filter(|s| *s > 0.0);
        Self {
            date,
            sleep_hours: round2(sleep_seconds / 3600.0),
            sleep_quality: to_u32(sleep_score.or(raw.readiness.score)),
            steps: to_u32(raw.activity.steps),
            active_minutes: to_u32(raw.activity.active_calories),
            resting_hr: to_u32(raw.sleep.lowest_heart_rate),
            hrv: raw.sleep.average_hrv.unwrap_or(0.0),
            source: "oura".into(),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn to_u32(v: Option<f64>) -> u32 {
    // `as` saturates and maps NaN to 0.
    v.unwrap_or(0.0).max(0.0) as u32
}

/// A wearable data source.
#[async_trait]
pub trait BiometricSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the raw summary for one day.
    async fn fetch_summary(&self, date: NaiveDate) -> Result<RawDailySummary, BiometricError>;
}
