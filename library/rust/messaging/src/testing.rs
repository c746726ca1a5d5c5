//! InMemoryBroker: テスト用のインメモリブローカー。
//! feature = "testing" で有効化される。
//!
//! トピックごとに単一パーティションの追記ログを持ち、コンシューマーグループ単位で
//! 読み出し位置を管理する。受信と同時にオフセットを進める（オートコミット相当）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, Notify};

use crate::config::{ConsumerConfig, OffsetReset};
use crate::consumer::{ConsumedMessage, EventConsumer};
use crate::error::MessagingError;
use crate::event::EventEnvelope;
use crate::producer::EventProducer;
use crate::subscription::SubscriberState;

#[derive(Default)]
struct BrokerState {
    logs: HashMap<String, Vec<EventEnvelope>>,
    /// (group_id, topic) -> 次に読み出すオフセット
    offsets: HashMap<(String, String), usize>,
    unavailable: bool,
}

#[derive(Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    notify: Notify,
}

/// InMemoryBroker は複数のプロデューサー・コンシューマーで共有するブローカー。
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// このブローカーへ書き込むプロデューサーを返す。
    pub fn producer(&self) -> InMemoryEventProducer {
        InMemoryEventProducer {
            broker: self.clone(),
        }
    }

    /// コンシューマーグループに参加し、設定されたトピックを購読するコンシューマーを返す。
    /// グループにコミット済みオフセットが無いトピックは offset_reset に従って開始位置を決める。
    /// 開始位置はこの呼び出しで確定するため、返されたコンシューマーは割り当て済み（Active）となる。
    pub async fn consumer(&self, config: &ConsumerConfig) -> InMemoryEventConsumer {
        let mut state = self.inner.state.lock().await;
        for topic in &config.topics {
            let len = state.logs.get(topic).map_or(0, Vec::len);
            state
                .offsets
                .entry((config.group_id.clone(), topic.clone()))
                .or_insert(match config.offset_reset {
                    OffsetReset::Earliest => 0,
                    OffsetReset::Latest => len,
                });
        }
        InMemoryEventConsumer {
            broker: self.clone(),
            group_id: config.group_id.clone(),
            topics: config.topics.clone(),
            membership: watch::Sender::new(SubscriberState::Active),
        }
    }

    /// true の間、publish は ConnectionError を返す。
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.state.lock().await.unavailable = unavailable;
    }

    /// トピックに書き込まれた全メッセージを返す。
    pub async fn messages(&self, topic: &str) -> Vec<ConsumedMessage> {
        let state = self.inner.state.lock().await;
        state
            .logs
            .get(topic)
            .map(|log| {
                log.iter()
                    .enumerate()
                    .map(|(offset, envelope)| to_consumed(envelope, offset))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn append(&self, envelope: EventEnvelope) -> Result<(), MessagingError> {
        {
            let mut state = self.inner.state.lock().await;
            if state.unavailable {
                return Err(MessagingError::ConnectionError(
                    "broker unreachable".to_string(),
                ));
            }
            state
                .logs
                .entry(envelope.topic.clone())
                .or_default()
                .push(envelope);
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn poll(&self, group_id: &str, topics: &[String]) -> Option<ConsumedMessage> {
        let mut state = self.inner.state.lock().await;
        let BrokerState { logs, offsets, .. } = &mut *state;
        for topic in topics {
            let Some(log) = logs.get(topic) else {
                continue;
            };
            let offset = offsets
                .entry((group_id.to_string(), topic.clone()))
                .or_insert(0);
            if let Some(envelope) = log.get(*offset) {
                let msg = to_consumed(envelope, *offset);
                *offset += 1;
                return Some(msg);
            }
        }
        None
    }
}

fn to_consumed(envelope: &EventEnvelope, offset: usize) -> ConsumedMessage {
    ConsumedMessage {
        topic: envelope.topic.clone(),
        partition: 0,
        offset: i64::try_from(offset).unwrap_or(i64::MAX),
        key: envelope.key.clone(),
        payload: envelope.payload.clone(),
        headers: envelope.headers.clone(),
    }
}

/// InMemoryEventProducer は InMemoryBroker へ書き込む EventProducer 実装。
#[derive(Clone)]
pub struct InMemoryEventProducer {
    broker: InMemoryBroker,
}

#[async_trait]
impl EventProducer for InMemoryEventProducer {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), MessagingError> {
        self.broker.append(envelope).await
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), MessagingError> {
        Ok(())
    }
}

/// InMemoryEventConsumer は InMemoryBroker から読み出す EventConsumer 実装。
pub struct InMemoryEventConsumer {
    broker: InMemoryBroker,
    group_id: String,
    topics: Vec<String>,
    membership: watch::Sender<SubscriberState>,
}

#[async_trait]
impl EventConsumer for InMemoryEventConsumer {
    async fn receive(&self) -> Result<ConsumedMessage, MessagingError> {
        loop {
            // 状態確認より前に待機を登録し、その間の通知を取りこぼさない
            let notified = self.broker.inner.notify.notified();
            if let Some(msg) = self.broker.poll(&self.group_id, &self.topics).await {
                return Ok(msg);
            }
            notified.await;
        }
    }

    fn membership(&self) -> watch::Receiver<SubscriberState> {
        self.membership.subscribe()
    }

    fn close(&self) {
        self.membership.send_replace(SubscriberState::Disconnected);
    }
}
