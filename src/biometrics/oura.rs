//! Oura v2 usercollection client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ActivityRecord, BiometricSource, RawDailySummary, ReadinessRecord, SleepRecord};
use crate::config::OuraConfig;
use crate::error::BiometricError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

pub struct OuraClient {
    client: Client,
    access_token: SecretString,
    base_url: String,
}

impl OuraClient {
    pub fn new(config: &OuraConfig) -> Result<Self, BiometricError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BiometricError::Http(e.to_string()))?;
        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// First record of a collection for a single day, if any.
    async fn fetch_first<T: DeserializeOwned + Default>(
        &self,
        collection: &str,
        date: NaiveDate,
    ) -> Result<T, BiometricError> {
        let day = date.to_string();
        let response = self
            .client
            .get(format!("{}/{collection}", self.base_url))
            .bearer_auth(self.access_token.expose_secret())
            .query(&[("start_date", day.as_str()), ("end_date", day.as_str())])
            .send()
            .await
            .map_err(|e| BiometricError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BiometricError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Collection<T> = response
            .json()
            .await
            .map_err(|e| BiometricError::InvalidPayload(format!("{collection}: {e}")))?;
        debug!(collection, records = payload.data.len(), "Fetched biometric collection");
        Ok(payload.data.into_iter().next().unwrap_or_default())
    }
}

#[async_trait]
impl BiometricSource for OuraClient {
    fn name(&self) -> &str {
        "oura"
    }

    async fn fetch_summary(&self, date: NaiveDate) -> Result<RawDailySummary, BiometricError> {
        let sleep: SleepRecord = self.fetch_first("daily_sleep", date).await?;
        let activity: ActivityRecord = self.fetch_first("daily_activity", date).await?;
        let readiness: ReadinessRecord = self.fetch_first("daily_readiness", date).await?;
        Ok(RawDailySummary {
            sleep,
            activity,
            readiness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_parses_first_record() {
        let raw = r#"{"data": [{"score": 80, "day": "2024-05-01"}], "next_token": null}"#;
        let c: Collection<SleepRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(c.data[0].score, Some(80.0));
    }

    #[test]
    fn empty_collection_defaults() {
        let c: Collection<ActivityRecord> = serde_json::from_str("{}").unwrap();
        assert!(c.data.is_empty());
    }

    #[test]
    fn base_url_is_normalized() {
        let config = OuraConfig {
            access_token: SecretString::from("t".to_string()),
            base_url: "https://api.example.com/v2/usercollection/".into(),
        };
        let client = OuraClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://api.example.com/v2/usercollection");
    }
}
