use crate::models::{TallySnapshot, VoteRecord};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The remote tally service, seen from here as an opaque counting oracle:
/// one best-effort write, one periodically polled read.
#[async_trait]
pub trait TallyService: Send + Sync {
    async fn record(
        &self,
        record: &VoteRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn metrics(&self) -> Result<TallySnapshot, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Serialize)]
struct RecordRequest<'a> {
    candidato: &'a str,
    #[serde(rename = "deviceId")]
    device_id: &'a str,
}

/// Wire shape of the metrics read. A response missing `candidates` or
/// carrying a negative total fails deserialization, which the poller treats
/// as "keep the previous snapshot".
#[derive(Deserialize)]
pub(crate) struct MetricsResponse {
    total: u64,
    candidates: HashMap<String, u64>,
}

impl From<MetricsResponse> for TallySnapshot {
    fn from(body: MetricsResponse) -> Self {
        TallySnapshot {
            total: body.total,
            candidates: body.candidates,
        }
    }
}

pub struct HttpTallyClient {
    client: Client,
    api_url: String,
}

impl HttpTallyClient {
    pub fn new(api_url: String) -> Self {
        Self {
            client: Client::new(),
            api_url,
        }
    }
}

#[async_trait]
impl TallyService for HttpTallyClient {
    async fn record(
        &self,
        record: &VoteRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // The service gives no meaningful response to a write; the status is
        // not inspected.
        self.client
            .post(&self.api_url)
            .json(&RecordRequest {
                candidato: &record.value,
                device_id: &record.device_id,
            })
            .send()
            .await?;
        Ok(())
    }

    async fn metrics(&self) -> Result<TallySnapshot, Box<dyn std::error::Error + Send + Sync>> {
        let res = self
            .client
            .get(format!("{}?metrics=1", self.api_url))
            .send()
            .await?;
        let body: MetricsResponse = res.json().await?;
        Ok(body.into())
    }
}

/// Fire-and-forget delivery of the vote record. Failures are swallowed and
/// never retried; the single-vote guard lives in local state, so the remote
/// write is allowed to be lossy. At most one attempt is made per device id
/// per process lifetime.
pub struct SubmissionChannel {
    service: Arc<dyn TallyService>,
    last_sent_device_id: Mutex<Option<String>>,
}

impl SubmissionChannel {
    pub fn new(service: Arc<dyn TallyService>) -> Self {
        Self {
            service,
            last_sent_device_id: Mutex::new(None),
        }
    }

    pub async fn submit(&self, record: VoteRecord) {
        {
            let mut last = self.last_sent_device_id.lock().unwrap();
            if last.as_deref() == Some(record.device_id.as_str()) {
                debug!(
                    "skipping duplicate submission for device {}",
                    record.device_id
                );
                return;
            }
            // Deduplicate the attempt, not the outcome: a failed send is
            // not retried either.
            *last = Some(record.device_id.clone());
        }

        match self.service.record(&record).await {
            Ok(()) => debug!("vote record delivered for device {}", record.device_id),
            Err(e) => warn!("vote submission failed, not retried: {}", e),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MockTallyService;
    use super::*;

    #[tokio::test]
    async fn submit_sends_once_per_device_id() {
        let service = Arc::new(MockTallyService::new());
        let channel = SubmissionChannel::new(service.clone());

        let record = VoteRecord::new("Ana".to_string(), "dev-1".to_string());
        channel.submit(record.clone()).await;
        channel.submit(record.clone()).await;
        channel.submit(record).await;

        assert_eq!(service.record_count(), 1);
        assert_eq!(service.records.lock().unwrap()[0].value, "Ana");
    }

    #[tokio::test]
    async fn failed_submission_is_swallowed_and_not_retried() {
        let service = Arc::new(MockTallyService::failing_record());
        let channel = SubmissionChannel::new(service.clone());

        let record = VoteRecord::new("Ana".to_string(), "dev-1".to_string());
        channel.submit(record.clone()).await;
        channel.submit(record).await;

        // One attempt was made, the failure did not surface, and the same
        // device id was not attempted again.
        assert_eq!(service.record_count(), 1);
    }

    #[tokio::test]
    async fn a_different_device_id_is_its_own_attempt() {
        let service = Arc::new(MockTallyService::new());
        let channel = SubmissionChannel::new(service.clone());

        channel
            .submit(VoteRecord::new("Ana".to_string(), "dev-1".to_string()))
            .await;
        channel
            .submit(VoteRecord::new("Berta".to_string(), "dev-2".to_string()))
            .await;

        assert_eq!(service.record_count(), 2);
    }

    #[test]
    fn metrics_shape_requires_total_and_candidates() {
        let valid: MetricsResponse =
            serde_json::from_str(r#"{"total": 10, "candidates": {"Ana": 4}}"#).unwrap();
        let snapshot: TallySnapshot = valid.into();
        assert_eq!(snapshot.total, 10);
        assert_eq!(snapshot.count_for("Ana"), 4);

        // Missing mapping and negative totals are shape mismatches.
        assert!(serde_json::from_str::<MetricsResponse>(r#"{"total": 10}"#).is_err());
        assert!(
            serde_json::from_str::<MetricsResponse>(r#"{"total": -1, "candidates": {}}"#).is_err()
        );
    }

    #[test]
    fn record_request_matches_the_service_wire_format() {
        let body = serde_json::to_value(RecordRequest {
            candidato: "Ana",
            device_id: "dev-1",
        })
        .unwrap();
        assert_eq!(body["candidato"], "Ana");
        assert_eq!(body["deviceId"], "dev-1");
    }
}
