use std::sync::Arc;

use async_trait::async_trait;
use pageview_messaging::{
    ConsumedMessage, EventProducer, KafkaEventConsumer, MessageHandler, MessagingError,
    Subscription, SubscriptionHandle,
};

use crate::domain::entity::{EventKey, EventPayload};
use crate::error::PageViewError;
use crate::infrastructure::config::KafkaConfig;
use crate::usecase::ReceivePageViewUseCase;

/// Kafka 設定に従ってページビュートピックの購読を開始する。
///
/// コンシューマーを生成できない場合は購読を開始せずにエラーを返す。
/// デッドレタートピックが設定されていれば dead_letter_producer で転送する。
pub fn spawn_subscription(
    kafka: &KafkaConfig,
    dead_letter_producer: Arc<dyn EventProducer>,
    metrics: Arc<pageview_telemetry::Metrics>,
) -> Result<SubscriptionHandle, MessagingError> {
    let consumer = KafkaEventConsumer::new(&kafka.messaging_config(), &kafka.consumer_config())?;
    let handler = PageViewMessageHandler::new(
        Arc::new(ReceivePageViewUseCase::new()),
        &kafka.consumer_group,
    )
    .with_metrics(metrics);

    let mut subscription = Subscription::new(Arc::new(consumer), Arc::new(handler));
    if let Some(ref dlq_topic) = kafka.dead_letter_topic {
        tracing::info!(topic = %dlq_topic, "dead letter topic configured");
        subscription = subscription.with_dead_letter(dead_letter_producer, dlq_topic);
    }
    Ok(subscription.spawn())
}

/// PageViewMessageHandler はページビュートピックの受信メッセージをデコードして処理する。
pub struct PageViewMessageHandler {
    use_case: Arc<ReceivePageViewUseCase>,
    consumer_group: String,
    metrics: Option<Arc<pageview_telemetry::Metrics>>,
}

impl PageViewMessageHandler {
    pub fn new(use_case: Arc<ReceivePageViewUseCase>, consumer_group: impl Into<String>) -> Self {
        Self {
            use_case,
            consumer_group: consumer_group.into(),
            metrics: None,
        }
    }

    /// メトリクスを設定する。
    pub fn with_metrics(mut self, metrics: Arc<pageview_telemetry::Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// メッセージキーを EventKey、本体を EventPayload にデコードする。
    /// id が空、またはキーとペイロードの id が一致しない場合もデコード失敗とする。
    pub fn decode(msg: &ConsumedMessage) -> Result<(EventKey, EventPayload), PageViewError> {
        let key: EventKey = msg
            .deserialize_key_json()
            .map_err(|e| PageViewError::Decode(e.to_string()))?;
        let payload: EventPayload = msg
            .deserialize_json()
            .map_err(|e| PageViewError::Decode(e.to_string()))?;

        key.validate()
            .and_then(|()| payload.ensure_paired(&key))
            .map_err(|e| PageViewError::Decode(e.to_string()))?;

        Ok((key, payload))
    }
}

#[async_trait]
impl MessageHandler for PageViewMessageHandler {
    async fn handle(&self, msg: &ConsumedMessage) -> Result<(), MessagingError> {
        if let Some(ref m) = self.metrics {
            m.record_kafka_message_consumed(&msg.topic, &self.consumer_group);
        }

        let (key, payload) = match Self::decode(msg) {
            Ok(pair) => pair,
            Err(e) => {
                if let Some(ref m) = self.metrics {
                    m.record_kafka_message_failed(&msg.topic, "decode");
                }
                return Err(MessagingError::DeserializationError(e.to_string()));
            }
        };

        self.use_case.execute(&key, &payload);
        Ok(())
    }
}
