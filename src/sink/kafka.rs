//! Publishes records to a Kafka topic.
//!
//! Constructs a producer per record, sends, and waits up to 10s for the
//! broker's acknowledgement before closing the producer again. A long-lived
//! producer with batched, callback-driven sends would perform far better;
//! this mirrors the simpler per-record lifecycle the collector side is
//! specified against.

use std::time::Duration;

use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};

use crate::record::Record;
use crate::sink::Sink;

const ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum KafkaSinkError {
    #[error("building Kafka producer: {0}")]
    Configure(#[from] rdkafka::error::KafkaError),
    #[error("publish to {topic} failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: rdkafka::error::KafkaError,
    },
}

pub struct KafkaSink {
    servers: String,
    topic: String,
    runtime: Runtime,
}

impl KafkaSink {
    pub fn new(servers: impl Into<String>, topic: impl Into<String>) -> Result<Self> {
        // Only ever used to block_on a single send at a time from this sink's
        // own thread, so a full multi-thread pool would be wasted work.
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("starting Kafka sink's async runtime")?;
        Ok(Self {
            servers: servers.into(),
            topic: topic.into(),
            runtime,
        })
    }

    fn build_producer(&self) -> Result<FutureProducer, KafkaSinkError> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.servers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(KafkaSinkError::from)
    }
}

impl Sink for KafkaSink {
    fn process(&mut self, record: &Record) -> Result<()> {
        let producer = self.build_producer()?;
        let payload = record.formatted();
        let topic = self.topic.clone();

        let result = self.runtime.block_on(async {
            let send_future = producer.send(
                FutureRecord::<(), [u8]>::to(&topic).payload(&payload),
                Timeout::After(ACK_TIMEOUT),
            );
            match send_future.await {
                Ok((partition, offset)) => {
                    tracing::debug!(topic = %topic, partition, offset, "published to kafka");
                    Ok(())
                }
                Err((err, _)) => Err(KafkaSinkError::Publish {
                    topic: topic.clone(),
                    source: err,
                }),
            }
        });

        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(anyhow::Error::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_broker_surfaces_as_error_not_panic() {
        // "localhost:1" refuses connections immediately in any sandboxed
        // test environment, so message.timeout.ms fires promptly.
        let mut sink = KafkaSink::new("localhost:1", "test-topic").unwrap();
        let record = Record::new(
            "kafka",
            std::path::PathBuf::from("/a.log"),
            b"hello\n".to_vec(),
        );
        assert!(sink.process(&record).is_err());
    }
}
