use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pageview_messaging::{EventEnvelope, EventProducer};

use crate::domain::entity::{EventKey, EventPayload};
use crate::error::PageViewError;

/// PageViewEventPublisher はページビューイベントをキー付きで固定トピックへ送るためのトレイト。
///
/// 送信キューへの投入で戻り、ブローカーでの永続化は待たない。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageViewEventPublisher: Send + Sync {
    async fn send_event(&self, key: &EventKey, payload: &EventPayload)
        -> Result<(), PageViewError>;
    async fn close(&self) -> Result<(), PageViewError>;
}

/// NoopPageViewEventPublisher はイベントを発行しない実装（フォールバック用）。
pub struct NoopPageViewEventPublisher;

#[async_trait]
impl PageViewEventPublisher for NoopPageViewEventPublisher {
    async fn send_event(
        &self,
        key: &EventKey,
        _payload: &EventPayload,
    ) -> Result<(), PageViewError> {
        tracing::debug!(event_id = %key.id, "noop: page view event skipped");
        Ok(())
    }

    async fn close(&self) -> Result<(), PageViewError> {
        Ok(())
    }
}

/// KafkaPageViewProducer はキーとペイロードを JSON にシリアライズして EventProducer へ渡す。
pub struct KafkaPageViewProducer {
    producer: Arc<dyn EventProducer>,
    topic: String,
    metrics: Option<Arc<pageview_telemetry::Metrics>>,
}

impl KafkaPageViewProducer {
    pub fn new(producer: Arc<dyn EventProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
            metrics: None,
        }
    }

    /// メトリクスを設定する。
    pub fn with_metrics(mut self, metrics: Arc<pageview_telemetry::Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl PageViewEventPublisher for KafkaPageViewProducer {
    async fn send_event(
        &self,
        key: &EventKey,
        payload: &EventPayload,
    ) -> Result<(), PageViewError> {
        let envelope = EventEnvelope::json(&self.topic, key, payload)
            .map_err(|e| PageViewError::Serialization(e.to_string()))?;

        if let Err(e) = self.producer.publish(envelope).await {
            if let Some(ref m) = self.metrics {
                m.record_kafka_message_failed(&self.topic, "publish");
            }
            return Err(PageViewError::Publish(e.to_string()));
        }

        if let Some(ref m) = self.metrics {
            m.record_kafka_message_produced(&self.topic);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), PageViewError> {
        self.producer
            .flush(Duration::from_secs(5))
            .await
            .map_err(|e| PageViewError::Publish(e.to_string()))
    }
}
