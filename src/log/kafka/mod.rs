//! Kafka log backend.
//!
//! The registry log is a single-partition topic with `cleanup.policy=compact`.
//! Record key: the registry key (drives compaction). Each reader gets its own
//! consumer with a throwaway group id, manually assigned to partition 0 so
//! no group offsets are ever committed and every open is a full replay.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    KafkaConfig, LogClient, LogError, LogReader, LogRecord, ReaderOptions, Result, StartPosition,
};

/// Partition holding the registry; ordering only holds within one partition.
const REGISTRY_PARTITION: i32 = 0;

fn apply_security_config(kafka: &KafkaConfig, config: &mut ClientConfig) {
    if let Some(ref protocol) = kafka.security_protocol {
        config.set("security.protocol", protocol);
    }
    if let Some(ref mechanism) = kafka.sasl_mechanism {
        config.set("sasl.mechanism", mechanism);
    }
    if let Some(ref username) = kafka.sasl_username {
        config.set("sasl.username", username);
    }
    if let Some(ref password) = kafka.sasl_password {
        config.set("sasl.password", password);
    }
    if let Some(ref ca_location) = kafka.ssl_ca_location {
        config.set("ssl.ca.location", ca_location);
    }
}

fn producer_config(kafka: &KafkaConfig) -> ClientConfig {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", &kafka.bootstrap_servers);
    config.set("message.timeout.ms", kafka.append_timeout_ms.to_string());
    config.set("acks", "all");
    config.set("enable.idempotence", "true");
    apply_security_config(kafka, &mut config);
    config
}

fn consumer_config(kafka: &KafkaConfig) -> ClientConfig {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", &kafka.bootstrap_servers);
    config.set("group.id", format!("hookdb-replay-{}", Uuid::new_v4()));
    config.set("enable.auto.commit", "false");
    config.set("auto.offset.reset", "earliest");
    apply_security_config(kafka, &mut config);
    config
}

/// Compacted Kafka topic as a registry log.
pub struct KafkaLogClient {
    producer: FutureProducer,
    config: KafkaConfig,
}

impl KafkaLogClient {
    pub fn new(config: KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = producer_config(&config).create().map_err(|e| {
            LogError::Unavailable(format!("Failed to create Kafka producer: {}", e))
        })?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            "Connected to Kafka"
        );

        Ok(Self { producer, config })
    }
}

#[async_trait]
impl LogClient for KafkaLogClient {
    async fn append(&self, log: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        let record = FutureRecord::to(log).key(key).payload(&payload);

        self.producer
            .send(record, Duration::from_millis(self.config.append_timeout_ms))
            .await
            .map_err(|(e, _)| LogError::Unavailable(format!("Failed to append: {}", e)))?;

        debug!(topic = %log, key = %key, "Appended record to Kafka");
        Ok(())
    }

    async fn open_reader(&self, log: &str, options: ReaderOptions) -> Result<Box<dyn LogReader>> {
        let consumer: StreamConsumer = consumer_config(&self.config).create().map_err(|e| {
            LogError::Unavailable(format!("Failed to create Kafka consumer: {}", e))
        })?;

        let offset = match options.start {
            StartPosition::Earliest => Offset::Beginning,
            StartPosition::Latest => Offset::End,
        };
        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(log, REGISTRY_PARTITION, offset)
            .map_err(|e| LogError::Unavailable(format!("Invalid partition offset: {}", e)))?;
        consumer
            .assign(&assignment)
            .map_err(|e| LogError::Unavailable(format!("Failed to assign {}: {}", log, e)))?;

        info!(topic = %log, start = ?options.start, "Opened Kafka reader");

        Ok(Box::new(KafkaLogReader {
            topic: log.to_string(),
            consumer: Some(consumer),
        }))
    }

    async fn close(&self) -> Result<()> {
        let timeout = Duration::from_millis(self.config.append_timeout_ms);
        self.producer
            .flush(timeout)
            .map_err(|e| LogError::Unavailable(format!("Failed to flush producer: {}", e)))?;
        info!("Kafka producer flushed");
        Ok(())
    }
}

/// Reader over the registry partition.
pub struct KafkaLogReader {
    topic: String,
    consumer: Option<StreamConsumer>,
}

#[async_trait]
impl LogReader for KafkaLogReader {
    async fn next(&mut self) -> Result<LogRecord> {
        let consumer = self.consumer.as_ref().ok_or(LogError::Closed)?;
        let message = consumer
            .recv()
            .await
            .map_err(|e| LogError::Disconnected(format!("{}: {}", self.topic, e)))?;

        let key = message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default();
        if key.is_empty() {
            warn!(topic = %self.topic, offset = message.offset(), "Received record without key");
        }

        Ok(LogRecord {
            key,
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.unassign().ok();
            debug!(topic = %self.topic, "Closed Kafka reader");
        }
    }
}
