use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics は Kafka パイプラインの Prometheus メトリクスを保持する。
pub struct Metrics {
    pub kafka_messages_produced_total: IntCounterVec,
    pub kafka_messages_consumed_total: IntCounterVec,
    pub kafka_messages_failed_total: IntCounterVec,
    registry: Registry,
}

impl Metrics {
    /// new は Prometheus メトリクスを初期化して返す。
    /// service_name はメトリクスの service ラベルに使用される。
    pub fn new(service_name: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let kafka_messages_produced_total = IntCounterVec::new(
            Opts::new(
                "kafka_messages_produced_total",
                "Total number of Kafka messages produced",
            )
            .const_label("service", service_name),
            &["topic"],
        )?;

        let kafka_messages_consumed_total = IntCounterVec::new(
            Opts::new(
                "kafka_messages_consumed_total",
                "Total number of Kafka messages consumed",
            )
            .const_label("service", service_name),
            &["topic", "consumer_group"],
        )?;

        // stage: "publish" | "decode"
        let kafka_messages_failed_total = IntCounterVec::new(
            Opts::new(
                "kafka_messages_failed_total",
                "Total number of Kafka messages that failed to publish or decode",
            )
            .const_label("service", service_name),
            &["topic", "stage"],
        )?;

        registry.register(Box::new(kafka_messages_produced_total.clone()))?;
        registry.register(Box::new(kafka_messages_consumed_total.clone()))?;
        registry.register(Box::new(kafka_messages_failed_total.clone()))?;

        Ok(Self {
            kafka_messages_produced_total,
            kafka_messages_consumed_total,
            kafka_messages_failed_total,
            registry,
        })
    }

    /// record_kafka_message_produced は Kafka メッセージ送信カウンタをインクリメントする。
    pub fn record_kafka_message_produced(&self, topic: &str) {
        self.kafka_messages_produced_total
            .with_label_values(&[topic])
            .inc();
    }

    /// record_kafka_message_consumed は Kafka メッセージ受信カウンタをインクリメントする。
    pub fn record_kafka_message_consumed(&self, topic: &str, consumer_group: &str) {
        self.kafka_messages_consumed_total
            .with_label_values(&[topic, consumer_group])
            .inc();
    }

    pub fn record_kafka_message_failed(&self, topic: &str, stage: &str) {
        self.kafka_messages_failed_total
            .with_label_values(&[topic, stage])
            .inc();
    }

    /// gather_metrics は Prometheus テキストフォーマットでメトリクスを返す。
    /// /metrics エンドポイントのハンドラで使用する。
    pub fn gather_metrics(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
