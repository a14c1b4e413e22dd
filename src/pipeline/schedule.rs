//! Daemon mode: an external cron loop around the stateless daily run.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use super::daily::DailyPipeline;
use crate::error::PipelineError;

/// Parse a cron expression and compute the next fire time after `now`,
/// evaluated in `tz`.
pub fn next_fire_after(
    expression: &str,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, PipelineError> {
    let schedule = cron::Schedule::from_str(expression)
        .map_err(|e| PipelineError::Schedule(format!("invalid cron '{expression}': {e}")))?;
    schedule
        .after(&now.with_timezone(&tz))
        .next()
        .map(|fire| fire.with_timezone(&Utc))
        .ok_or_else(|| PipelineError::Schedule(format!("'{expression}' never fires")))
}

/// Time left until `fire`, zero when it is already past.
pub fn wait_until(fire: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (fire - now).to_std().unwrap_or(Duration::ZERO)
}

/// Run the pipeline at every fire of `expression`, forever.
///
/// Each run covers the current date in `tz`. A failed run is logged and the
/// loop waits for the next fire.
pub async fn run_scheduled(
    pipeline: &DailyPipeline,
    expression: &str,
    tz: Tz,
) -> Result<(), PipelineError> {
    loop {
        let now = Utc::now();
        let fire = next_fire_after(expression, tz, now)?;
        info!(next = %fire.with_timezone(&tz), "Waiting for next scheduled run");
        tokio::time::sleep(wait_until(fire, now)).await;

        let date = Utc::now().with_timezone(&tz).date_naive();
        let result = pipeline.run(date).await;
        if !result.success {
            warn!(date = %date, aborted_at = ?result.aborted_at, "Scheduled run did not deliver");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_fire_uses_timezone() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let fire = next_fire_after("0 0 7 * * *", chrono_tz::Europe::Paris, now).unwrap();
        // 07:00 in Paris (CEST) is 05:00 UTC, on the following day.
        assert_eq!(fire, Utc.with_ymd_and_hms(2024, 5, 2, 5, 0, 0).unwrap());
    }

    #[test]
    fn invalid_expression_is_error() {
        let err = next_fire_after("not a cron", chrono_tz::UTC, Utc::now()).unwrap_err();
        assert!(matches!(err, PipelineError::Schedule(_)));
    }

    #[test]
    fn past_fire_waits_zero() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(wait_until(now - chrono::Duration::seconds(5), now), Duration::ZERO);
        assert_eq!(
            wait_until(now + chrono::Duration::seconds(90), now),
            Duration::from_secs(90)
        );
    }
}
