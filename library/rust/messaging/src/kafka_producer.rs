//! KafkaEventProducer: rdkafka を使用した EventProducer 実装。
//! feature = "kafka" で有効化される。

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use crate::config::MessagingConfig;
use crate::error::MessagingError;
use crate::event::EventEnvelope;
use crate::producer::EventProducer;

/// KafkaEventProducer は rdkafka の FutureProducer を使った実装。
///
/// 送信はローカルキューへの投入で完了とし、配送結果はバックグラウンドタスクで
/// ログに記録する。呼び出し元は配送完了を待たない。
pub struct KafkaEventProducer {
    producer: FutureProducer,
}

impl KafkaEventProducer {
    /// MessagingConfig から KafkaEventProducer を生成する。
    pub fn new(config: &MessagingConfig) -> Result<Self, MessagingError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers_string())
            .set("security.protocol", &config.security_protocol)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .map_err(|e| MessagingError::ConnectionError(e.to_string()))?;
        Ok(Self { producer })
    }
}

#[async_trait]
impl EventProducer for KafkaEventProducer {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), MessagingError> {
        let mut record = FutureRecord::<[u8], [u8]>::to(&envelope.topic)
            .payload(envelope.payload.as_slice());
        if let Some(ref key) = envelope.key {
            record = record.key(key.as_slice());
        }

        if !envelope.headers.is_empty() {
            let mut headers = OwnedHeaders::new();
            for (name, value) in &envelope.headers {
                headers = headers.insert(Header {
                    key: name,
                    value: Some(value.as_slice()),
                });
            }
            record = record.headers(headers);
        }

        let delivery = match self.producer.send_result(record) {
            Ok(delivery) => delivery,
            Err((err, _)) => {
                return Err(if err.rdkafka_error_code() == Some(RDKafkaErrorCode::QueueFull) {
                    MessagingError::QueueFull(err.to_string())
                } else {
                    MessagingError::ProducerError(err.to_string())
                });
            }
        };

        let topic = envelope.topic;
        tokio::spawn(async move {
            match delivery.await {
                Ok(Ok(_)) => {
                    tracing::debug!(topic = %topic, "kafka message delivered");
                }
                Ok(Err((err, _))) => {
                    tracing::error!(topic = %topic, error = %err, "kafka message delivery failed");
                }
                Err(_) => {
                    tracing::warn!(topic = %topic, "kafka delivery report canceled");
                }
            }
        });

        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> Result<(), MessagingError> {
        self.producer
            .flush(timeout)
            .map_err(|e| MessagingError::ProducerError(e.to_string()))
    }
}
