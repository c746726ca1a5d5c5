//! Subscription: EventConsumer の受信ループを専用タスクで駆動し、
//! 受信メッセージごとに MessageHandler を呼び出す。
//!
//! 1 件の受信エラー・ハンドラエラーでループは停止しない。ハンドラは
//! 受信ループをブロックするため、短時間で完了させること。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::consumer::{ConsumedMessage, EventConsumer};
use crate::error::MessagingError;
use crate::event::EventEnvelope;
use crate::producer::EventProducer;

/// SubscriberState は購読の状態を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Disconnected,
    Active,
}

impl SubscriberState {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriberState::Disconnected => "disconnected",
            SubscriberState::Active => "active",
        }
    }
}

/// MessageHandler は受信メッセージ 1 件ごとに呼び出されるハンドラ。
///
/// `MessagingError::DeserializationError` を返したメッセージはデコード不能とみなし、
/// デッドレタートピックが設定されていればそこへ転送、なければログに記録して破棄する。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &ConsumedMessage) -> Result<(), MessagingError>;
}

struct DeadLetter {
    producer: Arc<dyn EventProducer>,
    topic: String,
}

/// Subscription は受信ループの構成を保持する。`spawn` で開始する。
pub struct Subscription {
    consumer: Arc<dyn EventConsumer>,
    handler: Arc<dyn MessageHandler>,
    dead_letter: Option<DeadLetter>,
}

impl Subscription {
    pub fn new(consumer: Arc<dyn EventConsumer>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            consumer,
            handler,
            dead_letter: None,
        }
    }

    /// デコード不能メッセージの転送先を設定する。
    pub fn with_dead_letter(
        mut self,
        producer: Arc<dyn EventProducer>,
        topic: impl Into<String>,
    ) -> Self {
        self.dead_letter = Some(DeadLetter {
            producer,
            topic: topic.into(),
        });
        self
    }

    /// バックグラウンドタスクで受信ループを開始する。
    pub fn spawn(self) -> SubscriptionHandle {
        let (state_tx, state_rx) = watch::channel(SubscriberState::Disconnected);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(state_tx, token).await });
        SubscriptionHandle {
            state: state_rx,
            cancel,
            task,
        }
    }

    async fn run(self, state: watch::Sender<SubscriberState>, cancel: CancellationToken) {
        let mut membership = self.consumer.membership();
        let mut watching = true;

        loop {
            let current = *membership.borrow_and_update();
            if state.send_replace(current) != current {
                tracing::info!(state = current.as_str(), "subscriber state changed");
            }

            // 割り当て・取り消しは受信中のポーリングで通知される
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = membership.changed(), if watching => {
                    watching = changed.is_ok();
                    continue;
                }
                received = self.consumer.receive() => received,
            };

            match received {
                Err(e) => {
                    tracing::error!(error = %e, "failed to receive message");
                }
                Ok(msg) => self.dispatch(&msg).await,
            }
        }

        self.consumer.close();
        state.send_replace(SubscriberState::Disconnected);
        tracing::info!("subscription stopped");
    }

    async fn dispatch(&self, msg: &ConsumedMessage) {
        match self.handler.handle(msg).await {
            Ok(()) => {}
            Err(MessagingError::DeserializationError(reason)) => {
                self.dead_letter(msg, &reason).await;
            }
            Err(e) => {
                tracing::error!(
                    topic = %msg.topic,
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "message handler failed"
                );
            }
        }
    }

    async fn dead_letter(&self, msg: &ConsumedMessage, reason: &str) {
        let Some(ref dlq) = self.dead_letter else {
            tracing::warn!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                error = %reason,
                "undecodable message skipped"
            );
            return;
        };

        let envelope =
            EventEnvelope::raw(dlq.topic.clone(), msg.key.clone(), msg.payload.clone())
                .with_header("error", reason.as_bytes())
                .with_header("original_topic", msg.topic.as_bytes())
                .with_header("original_offset", msg.offset.to_string());

        match dlq.producer.publish(envelope).await {
            Ok(()) => {
                tracing::warn!(
                    topic = %msg.topic,
                    offset = msg.offset,
                    dead_letter_topic = %dlq.topic,
                    error = %reason,
                    "undecodable message routed to dead letter topic"
                );
            }
            Err(e) => {
                tracing::error!(
                    topic = %msg.topic,
                    offset = msg.offset,
                    error = %e,
                    "failed to route undecodable message to dead letter topic"
                );
            }
        }
    }
}

/// SubscriptionHandle は実行中の受信ループを操作するハンドル。
pub struct SubscriptionHandle {
    state: watch::Receiver<SubscriberState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// 現在の状態を返す。
    pub fn state(&self) -> SubscriberState {
        *self.state.borrow()
    }

    /// 状態変化を監視するレシーバーを返す。
    pub fn state_receiver(&self) -> watch::Receiver<SubscriberState> {
        self.state.clone()
    }

    /// 受信ループを停止し、コンシューマーグループから離脱するまで待つ。
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "subscription task terminated abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsumerConfig, OffsetReset};
    use crate::testing::InMemoryBroker;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, message: &ConsumedMessage) -> Result<(), MessagingError> {
            if message.payload == b"bad" {
                return Err(MessagingError::DeserializationError("bad payload".to_string()));
            }
            if message.payload == b"boom" {
                return Err(MessagingError::ConsumerError("handler exploded".to_string()));
            }
            self.seen.lock().unwrap().push(message.payload.clone());
            Ok(())
        }
    }

    fn consumer_config(topic: &str) -> ConsumerConfig {
        ConsumerConfig {
            group_id: "test-group".to_string(),
            topics: vec![topic.to_string()],
            auto_commit: true,
            session_timeout_ms: 30000,
            offset_reset: OffsetReset::Latest,
        }
    }

    async fn publish(broker: &InMemoryBroker, topic: &str, payload: &[u8]) {
        broker
            .producer()
            .publish(EventEnvelope::raw(topic, Some(b"k".to_vec()), payload.to_vec()))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let broker = InMemoryBroker::new();
        let consumer = broker.consumer(&consumer_config("t")).await;
        let handle = Subscription::new(Arc::new(consumer), Arc::new(RecordingHandler::default()))
            .spawn();

        let mut rx = handle.state_receiver();
        rx.wait_for(|s| *s == SubscriberState::Active).await.unwrap();
        assert_eq!(handle.state(), SubscriberState::Active);

        handle.shutdown().await;
        assert_eq!(*rx.borrow(), SubscriberState::Disconnected);
    }

    /// グループ参加状態をテストから操作できるコンシューマー。メッセージは届かない。
    struct RebalancingConsumer {
        membership: watch::Sender<SubscriberState>,
    }

    #[async_trait]
    impl EventConsumer for RebalancingConsumer {
        async fn receive(&self) -> Result<ConsumedMessage, MessagingError> {
            std::future::pending().await
        }

        fn membership(&self) -> watch::Receiver<SubscriberState> {
            self.membership.subscribe()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_follows_partition_assignment() {
        let (membership, _) = watch::channel(SubscriberState::Disconnected);
        let consumer = Arc::new(RebalancingConsumer { membership });
        let handle =
            Subscription::new(consumer.clone(), Arc::new(RecordingHandler::default())).spawn();
        let mut rx = handle.state_receiver();

        // 割り当て前は Active にならない
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state(), SubscriberState::Disconnected);

        consumer.membership.send_replace(SubscriberState::Active);
        rx.wait_for(|s| *s == SubscriberState::Active).await.unwrap();

        // リバランスで取り消されると Disconnected に戻り、再割り当てで復帰する
        consumer.membership.send_replace(SubscriberState::Disconnected);
        rx.wait_for(|s| *s == SubscriberState::Disconnected).await.unwrap();
        consumer.membership.send_replace(SubscriberState::Active);
        rx.wait_for(|s| *s == SubscriberState::Active).await.unwrap();

        handle.shutdown().await;
        assert_eq!(*rx.borrow(), SubscriberState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_keeps_missing_key() {
        let broker = InMemoryBroker::new();
        let consumer = broker.consumer(&consumer_config("t")).await;
        let handle = Subscription::new(Arc::new(consumer), Arc::new(RecordingHandler::default()))
            .with_dead_letter(Arc::new(broker.producer()), "t.dlq")
            .spawn();

        broker
            .producer()
            .publish(EventEnvelope::raw("t", None, b"bad".to_vec()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let dead = broker.messages("t.dlq").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].key, None);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_errors_do_not_stop_loop() {
        let broker = InMemoryBroker::new();
        let consumer = broker.consumer(&consumer_config("t")).await;
        let handler = Arc::new(RecordingHandler::default());
        let handle = Subscription::new(Arc::new(consumer), handler.clone()).spawn();

        publish(&broker, "t", b"boom").await;
        publish(&broker, "t", b"bad").await;
        publish(&broker, "t", b"ok").await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*handler.seen.lock().unwrap(), vec![b"ok".to_vec()]);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_message_routed_to_dead_letter() {
        let broker = InMemoryBroker::new();
        let consumer = broker.consumer(&consumer_config("t")).await;
        let handle = Subscription::new(Arc::new(consumer), Arc::new(RecordingHandler::default()))
            .with_dead_letter(Arc::new(broker.producer()), "t.dlq")
            .spawn();

        publish(&broker, "t", b"bad").await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let dead = broker.messages("t.dlq").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload, b"bad".to_vec());
        assert_eq!(dead[0].header("error"), Some(&b"bad payload"[..]));
        assert_eq!(dead[0].header("original_topic"), Some(&b"t"[..]));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_failure_is_logged_only() {
        let broker = InMemoryBroker::new();
        let consumer = broker.consumer(&consumer_config("t")).await;
        let handler = Arc::new(RecordingHandler::default());
        let mut dlq = crate::producer::MockEventProducer::new();
        dlq.expect_publish()
            .times(1)
            .returning(|_| Err(MessagingError::ConnectionError("refused".to_string())));
        let handle = Subscription::new(Arc::new(consumer), handler.clone())
            .with_dead_letter(Arc::new(dlq), "t.dlq")
            .spawn();

        publish(&broker, "t", b"bad").await;
        publish(&broker, "t", b"ok").await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(handler.seen.lock().unwrap().len(), 1);
        handle.shutdown().await;
    }
}
