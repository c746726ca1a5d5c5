use serde::{Deserialize, Serialize};

/// MessagingConfig は Kafka プロデューサーの接続設定を表す。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Kafka ブローカーアドレスのリスト（例: ["kafka:9092"]）
    pub brokers: Vec<String>,
    /// セキュリティプロトコル（PLAINTEXT / SSL / SASL_PLAINTEXT / SASL_SSL）
    #[serde(default = "default_security_protocol")]
    pub security_protocol: String,
    /// 送信キューに積まれたメッセージの配送期限（ミリ秒）
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
}

fn default_security_protocol() -> String {
    "PLAINTEXT".to_string()
}

fn default_message_timeout_ms() -> u64 {
    30000
}

impl MessagingConfig {
    /// ブローカーアドレスをカンマ区切り文字列で返す（rdkafka 用）。
    pub fn brokers_string(&self) -> String {
        self.brokers.join(",")
    }
}

/// OffsetReset はコンシューマーグループ初回参加時の読み出し開始位置を表す。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// トピックの先頭から読み出す。
    Earliest,
    /// 参加以降に追加されたメッセージのみ読み出す。
    #[default]
    Latest,
}

impl OffsetReset {
    /// rdkafka の auto.offset.reset に渡す値を返す。
    pub fn as_str(self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// ConsumerConfig は Kafka コンシューマーの設定を表す。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// コンシューマーグループ ID
    pub group_id: String,
    /// サブスクライブするトピックのリスト
    pub topics: Vec<String>,
    /// オートコミット有効フラグ。オフセット管理はクライアント既定のコミットに委ねる。
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,
    /// セッションタイムアウト（ミリ秒）
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    /// 初回参加時のオフセットリセットポリシー
    #[serde(default)]
    pub offset_reset: OffsetReset,
}

fn default_auto_commit() -> bool {
    true
}

fn default_session_timeout_ms() -> u64 {
    30000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brokers_string_single() {
        let cfg = MessagingConfig {
            brokers: vec!["kafka:9092".to_string()],
            security_protocol: "PLAINTEXT".to_string(),
            message_timeout_ms: 30000,
        };
        assert_eq!(cfg.brokers_string(), "kafka:9092");
    }

    #[test]
    fn test_brokers_string_multiple() {
        let cfg = MessagingConfig {
            brokers: vec!["kafka-0:9092".to_string(), "kafka-1:9092".to_string()],
            security_protocol: "PLAINTEXT".to_string(),
            message_timeout_ms: 30000,
        };
        assert_eq!(cfg.brokers_string(), "kafka-0:9092,kafka-1:9092");
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{"brokers": ["kafka:9092"]}"#;
        let cfg: MessagingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.security_protocol, "PLAINTEXT");
        assert_eq!(cfg.message_timeout_ms, 30000);
    }

    #[test]
    fn test_consumer_config_defaults() {
        let json = r#"{"group_id": "pageview-consumer", "topics": ["pageviews"]}"#;
        let cfg: ConsumerConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.auto_commit);
        assert_eq!(cfg.session_timeout_ms, 30000);
        assert_eq!(cfg.offset_reset, OffsetReset::Latest);
    }

    #[test]
    fn test_offset_reset_deserialize() {
        let json = r#"{"group_id": "g", "topics": ["t"], "offset_reset": "earliest"}"#;
        let cfg: ConsumerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.offset_reset, OffsetReset::Earliest);
        assert_eq!(cfg.offset_reset.as_str(), "earliest");
        assert_eq!(OffsetReset::Latest.as_str(), "latest");
    }
}
