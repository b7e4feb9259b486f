//! Kafka producer over the Confluent/Redpanda REST proxy

use crate::core::{EventBus, IndexerError, IndexerResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const RECORDS_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

/// Producer that posts JSON records to a list of REST proxy endpoints.
///
/// The endpoint that last succeeded is tried first; on a transport error or
/// a 5xx the next endpoint is attempted.
pub struct RestProxyBus {
    client: Client,
    endpoints: Vec<String>,
    preferred: AtomicUsize,
    closed: AtomicBool,
}

impl RestProxyBus {
    /// `bootstrap` is a comma-separated list of proxy base URLs.
    pub fn new(bootstrap: &str, timeout: Duration) -> IndexerResult<Self> {
        let endpoints: Vec<String> = bootstrap
            .split(',')
            .map(|s| s.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with("http://") || s.starts_with("https://") {
                    s.to_string()
                } else {
                    format!("http://{}", s)
                }
            })
            .collect();
        if endpoints.is_empty() {
            return Err(IndexerError::Configuration(
                "KAFKA_BOOTSTRAP_SERVERS cannot be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexerError::Configuration(format!("failed to create REST proxy client: {}", e)))?;

        Ok(Self {
            client,
            endpoints,
            preferred: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn endpoint_order(&self) -> impl Iterator<Item = (usize, &String)> + '_ {
        let start = self.preferred.load(Ordering::Relaxed) % self.endpoints.len();
        self.endpoints
            .iter()
            .enumerate()
            .cycle()
            .skip(start)
            .take(self.endpoints.len())
    }

    async fn cluster_id(&self, base: &str) -> IndexerResult<String> {
        let body: Value = self
            .client
            .get(format!("{}/v3/clusters", base))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body["data"][0]["cluster_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| IndexerError::Bus("REST proxy reported no cluster".to_string()))
    }

    async fn create_topic(&self, base: &str, cluster_id: &str, topic: &str) -> IndexerResult<bool> {
        let response = self
            .client
            .post(format!("{}/v3/clusters/{}/topics", base, cluster_id))
            .json(&json!({
                "topic_name": topic,
                "partitions_count": 1,
                "replication_factor": 1,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unable to read response body>"));
        if status == StatusCode::CONFLICT || body.contains("already exists") {
            return Ok(false);
        }
        Err(IndexerError::Bus(format!(
            "create topic {} failed with status {}: {}",
            topic, status, body
        )))
    }
}

#[async_trait]
impl EventBus for RestProxyBus {
    async fn ensure_topics(&self, topics: &[String]) -> IndexerResult<()> {
        let mut last_error = None;

        for (_, base) in self.endpoint_order() {
            let cluster_id = match self.cluster_id(base).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(endpoint = %base, error = %e, "Cluster lookup failed");
                    last_error = Some(e);
                    continue;
                }
            };

            let mut created = 0;
            for topic in topics {
                match self.create_topic(base, &cluster_id, topic).await {
                    Ok(true) => created += 1,
                    Ok(false) => debug!(topic = %topic, "Topic already exists"),
                    Err(e) => warn!(topic = %topic, error = %e, "Could not create topic"),
                }
            }
            info!(created, total = topics.len(), "Topics ready");
            return Ok(());
        }

        Err(last_error.unwrap_or_else(|| IndexerError::Bus("no REST proxy endpoint reachable".to_string())))
    }

    async fn send(&self, topic: &str, payload: &Value) -> IndexerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IndexerError::Bus("producer closed".to_string()));
        }

        let body = json!({ "records": [{ "key": topic, "value": payload }] });
        let mut last_error = None;

        for (index, base) in self.endpoint_order() {
            let result = self
                .client
                .post(format!("{}/topics/{}", base, topic))
                .header("Content-Type", RECORDS_CONTENT_TYPE)
                .json(&body)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(endpoint = %base, error = %e, "REST proxy unreachable");
                    last_error = Some(IndexerError::from(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                self.preferred.store(index, Ordering::Relaxed);
                return Ok(());
            }

            let text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unable to read response body>"));
            let err = IndexerError::Bus(format!("publish to {} failed with status {}: {}", topic, status, text));
            // a 4xx is about the request itself; another endpoint will answer the same
            if !status.is_server_error() {
                return Err(err);
            }
            warn!(endpoint = %base, status = %status, "REST proxy rejected publish");
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| IndexerError::Bus("no REST proxy endpoint reachable".to_string())))
    }

    async fn close(&self) {
        // records are posted synchronously, so there is nothing buffered to flush
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Bus producer closed");
        }
    }
}
