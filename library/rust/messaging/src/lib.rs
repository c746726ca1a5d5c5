//! pageview-messaging: Kafka メッセージングの抽象化ライブラリ。
//!
//! キー付きイベントの発行（`EventProducer`）と、コンシューマーグループ単位の
//! 購読ループ（`Subscription`）を提供する。rdkafka 実装は feature = "kafka"、
//! テスト用のインメモリブローカーは feature = "testing" で有効化される。

pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod producer;
pub mod subscription;

#[cfg(feature = "kafka")]
pub mod kafka_consumer;
#[cfg(feature = "kafka")]
pub mod kafka_producer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{ConsumerConfig, MessagingConfig, OffsetReset};
pub use consumer::{ConsumedMessage, EventConsumer};
pub use error::MessagingError;
pub use event::EventEnvelope;
pub use producer::{EventProducer, NoOpEventProducer};
pub use subscription::{MessageHandler, SubscriberState, Subscription, SubscriptionHandle};

#[cfg(feature = "kafka")]
pub use kafka_consumer::KafkaEventConsumer;
#[cfg(feature = "kafka")]
pub use kafka_producer::KafkaEventProducer;

#[cfg(any(test, feature = "testing"))]
pub use testing::{InMemoryBroker, InMemoryEventConsumer, InMemoryEventProducer};

#[cfg(feature = "mock")]
pub use producer::MockEventProducer;
