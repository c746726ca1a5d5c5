//! KafkaEventConsumer: rdkafka を使用した EventConsumer 実装。
//! feature = "kafka" で有効化される。

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::ClientContext;
use tokio::sync::watch;

use crate::config::{ConsumerConfig, MessagingConfig};
use crate::consumer::{ConsumedMessage, EventConsumer};
use crate::error::MessagingError;
use crate::subscription::SubscriberState;

/// GroupMembershipContext はリバランスの結果をグループ参加状態として通知する。
///
/// rdkafka の subscribe は遅延実行で、グループへの参加と割り当ては受信時の
/// ポーリング中に行われる。
pub struct GroupMembershipContext {
    state: watch::Sender<SubscriberState>,
}

impl ClientContext for GroupMembershipContext {}

impl ConsumerContext for GroupMembershipContext {
    fn post_rebalance(&self, _: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(partitions) => {
                tracing::info!(partitions = partitions.count(), "kafka partitions assigned");
                self.state.send_replace(SubscriberState::Active);
            }
            Rebalance::Revoke(partitions) => {
                tracing::info!(partitions = partitions.count(), "kafka partitions revoked");
                self.state.send_replace(SubscriberState::Disconnected);
            }
            Rebalance::Error(e) => {
                tracing::error!(error = %e, "kafka rebalance failed");
                self.state.send_replace(SubscriberState::Disconnected);
            }
        }
    }
}

/// KafkaEventConsumer は rdkafka の StreamConsumer を使った実装。
pub struct KafkaEventConsumer {
    consumer: StreamConsumer<GroupMembershipContext>,
}

impl KafkaEventConsumer {
    /// 新しい KafkaEventConsumer を生成し、設定されたトピックを購読する。
    pub fn new(
        connection: &MessagingConfig,
        config: &ConsumerConfig,
    ) -> Result<Self, MessagingError> {
        let context = GroupMembershipContext {
            state: watch::Sender::new(SubscriberState::Disconnected),
        };
        let consumer: StreamConsumer<GroupMembershipContext> = ClientConfig::new()
            .set("bootstrap.servers", connection.brokers_string())
            .set("security.protocol", &connection.security_protocol)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", config.auto_commit.to_string())
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("auto.offset.reset", config.offset_reset.as_str())
            .create_with_context(context)
            .map_err(|e| MessagingError::ConnectionError(e.to_string()))?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| MessagingError::ConnectionError(e.to_string()))?;

        tracing::info!(
            topics = ?config.topics,
            group = %config.group_id,
            offset_reset = config.offset_reset.as_str(),
            "kafka consumer subscribed"
        );

        Ok(Self { consumer })
    }
}

#[async_trait]
impl EventConsumer for KafkaEventConsumer {
    async fn receive(&self) -> Result<ConsumedMessage, MessagingError> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| MessagingError::ConsumerError(e.to_string()))?;

        let headers = msg
            .headers()
            .map(|h| {
                (0..h.count())
                    .map(|i| {
                        let header = h.get(i);
                        (
                            header.key.to_string(),
                            header.value.unwrap_or_default().to_vec(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ConsumedMessage {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(<[u8]>::to_vec),
            payload: msg.payload().unwrap_or_default().to_vec(),
            headers,
        })
    }

    fn membership(&self) -> watch::Receiver<SubscriberState> {
        self.consumer.context().state.subscribe()
    }

    fn close(&self) {
        self.consumer.unsubscribe();
        self.consumer
            .context()
            .state
            .send_replace(SubscriberState::Disconnected);
        tracing::info!("kafka consumer unsubscribed");
    }
}
