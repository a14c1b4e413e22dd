//! Threshold-based assessments of one day of wearable data.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::biometrics::DailySummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SleepAssessment {
    Excellent,
    Adequate,
    Poor,
}

impl SleepAssessment {
    pub fn assess(hours: f64, quality: u32) -> Self {
        if hours >= 7.5 && quality >= 7 {
            Self::Excellent
        } else if hours >= 6.5 || quality >= 6 {
            Self::Adequate
        } else {
            Self::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Adequate => "Adequate",
            Self::Poor => "Poor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryAssessment {
    FullyRecovered,
    Moderate,
    Strained,
}

impl RecoveryAssessment {
    pub fn assess(hrv: f64, resting_hr: u32) -> Self {
        if hrv >= 65.0 && resting_hr <= 62 {
            Self::FullyRecovered
        } else if hrv < 45.0 || resting_hr >= 72 {
            Self::Strained
        } else {
            Self::Moderate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullyRecovered => "Fully recovered",
            Self::Moderate => "Moderate",
            Self::Strained => "Strained",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityAssessment {
    VeryActive,
    Active,
    LowActivity,
}

impl ActivityAssessment {
    pub fn assess(steps: u32, active_minutes: u32) -> Self {
        if steps >= 10_000 && active_minutes >= 45 {
            Self::VeryActive
        } else if steps >= 7_000 {
            Self::Active
        } else {
            Self::LowActivity
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryActive => "Very active",
            Self::Active => "Active",
            Self::LowActivity => "Low activity",
        }
    }
}

macro_rules! impl_display {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

impl_display!(SleepAssessment, RecoveryAssessment, ActivityAssessment);

/// Metrics plus assessments for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAnalytics {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub metrics: DailySummary,
    pub sleep: SleepAssessment,
    pub recovery: RecoveryAssessment,
    pub activity: ActivityAssessment,
}

impl DailyAnalytics {
    pub fn from_summary(summary: &DailySummary) -> Self {
        Self {
            date: summary.date,
            generated_at: Utc::now(),
            metrics: summary.clone(),
            sleep: SleepAssessment::assess(summary.sleep_hours, summary.sleep_quality),
            recovery: RecoveryAssessment::assess(summary.hrv, summary.resting_hr),
            activity: ActivityAssessment::assess(summary.steps, summary.active_minutes),
        }
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        let m = &self.metrics;
        format!(
            "Sleep: {}h (score {}/10), {}. Recovery: HRV {}ms, RHR {}bpm, {}. \
             Activity: {} steps, {} active min, {}.",
            m.sleep_hours,
            m.sleep_quality,
            self.sleep,
            m.hrv,
            m.resting_hr,
            self.recovery,
            m.steps,
            m.active_minutes,
            self.activity,
        )
    }

    /// Name of the uploaded text artifact.
    pub fn artifact_name(&self) -> String {
        format!("oura_{}.txt", self.date)
    }

    /// Plain-text report for remote upload.
    pub fn to_text(&self) -> String {
        let m = &self.metrics;
        format!(
            "Oura Ring: {date}\n{rule}\n\n\
             Sleep:    {hours}h  (score {quality}/10), {sleep}\n\
             HRV:      {hrv} ms\n\
             RHR:      {rhr} bpm\n\
             Steps:    {steps}\n\
             Active:   {active} min\n\n\
             Recovery: {recovery}\n\
             Activity: {activity}\n",
            date = self.date,
            rule = "=".repeat(40),
            hours = m.sleep_hours,
            quality = m.sleep_quality,
            sleep = self.sleep,
            hrv = m.hrv,
            rhr = m.resting_hr,
            steps = m.steps,
            active = m.active_minutes,
            recovery = self.recovery,
            activity = self.activity,
        )
    }
}
