//! Broker connection used by the delivery worker
//!
//! The worker owns all retry and timeout policy; a sink only knows how to
//! connect, publish one payload, and answer a health probe.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder};
use rskafka::record::Record;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Destination for encoded telemetry events
#[async_trait]
pub trait BrokerSink: Send + Sync + 'static {
    /// (Re)establish the broker connection
    async fn connect(&self) -> Result<()>;

    /// Publish one payload; returns once the broker acknowledged it
    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<()>;

    /// Cheap round-trip to confirm the connection is usable
    async fn health_check(&self) -> Result<()>;

    /// Release the connection
    async fn disconnect(&self);

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Kafka producer for one partition per topic
///
/// Produce requests wait for all in-sync replicas to acknowledge.
pub struct KafkaSink {
    bootstrap_servers: Vec<String>,
    partition: i32,
    client: RwLock<Option<Arc<Client>>>,

    /// Partition clients by topic, built lazily on first send
    partitions: Mutex<HashMap<String, Arc<PartitionClient>>>,
}

impl KafkaSink {
    pub fn new(bootstrap_servers: Vec<String>, partition: i32) -> Self {
        Self {
            bootstrap_servers,
            partition,
            client: RwLock::new(None),
            partitions: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self) -> Result<Arc<Client>> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| CoreError::NotConnected("kafka".to_string()))
    }

    async fn partition_client(&self, topic: &str) -> Result<Arc<PartitionClient>> {
        let mut partitions = self.partitions.lock().await;
        if let Some(existing) = partitions.get(topic) {
            return Ok(existing.clone());
        }

        let client = self.client().await?;
        let partition_client = client
            .partition_client(topic.to_string(), self.partition, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| {
                CoreError::BrokerError(format!("Failed to open partition for {}: {}", topic, e))
            })?;

        let partition_client = Arc::new(partition_client);
        partitions.insert(topic.to_string(), partition_client.clone());
        debug!("Opened Kafka partition client for topic: {}", topic);
        Ok(partition_client)
    }
}

#[async_trait]
impl BrokerSink for KafkaSink {
    async fn connect(&self) -> Result<()> {
        let client = ClientBuilder::new(self.bootstrap_servers.clone())
            .build()
            .await
            .map_err(|e| CoreError::ConnectionError(format!("Kafka connection failed: {}", e)))?;

        *self.client.write().await = Some(Arc::new(client));
        self.partitions.lock().await.clear();
        info!("Kafka producer connected to {:?}", self.bootstrap_servers);
        Ok(())
    }

    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<()> {
        let partition_client = self.partition_client(topic).await?;

        let record = Record {
            key: key.map(|k| k.as_bytes().to_vec()),
            value: Some(payload.to_vec()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        if let Err(e) = partition_client
            .produce(vec![record], Compression::NoCompression)
            .await
        {
            // force a fresh partition lookup after a leader change
            self.partitions.lock().await.remove(topic);
            return Err(CoreError::BrokerError(format!(
                "Failed to produce to {}: {}",
                topic, e
            )));
        }

        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .list_topics()
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("Kafka health check failed: {}", e);
                CoreError::BrokerError(format!("Kafka metadata request failed: {}", e))
            })
    }

    async fn disconnect(&self) {
        self.partitions.lock().await.clear();
        if self.client.write().await.take().is_some() {
            info!("Kafka producer closed");
        }
    }

    fn name(&self) -> &str {
        "kafka"
    }
}

impl std::fmt::Debug for KafkaSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSink")
            .field("bootstrap_servers", &self.bootstrap_servers)
            .field("partition", &self.partition)
            .finish()
    }
}
