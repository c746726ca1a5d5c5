/// MessagingError はメッセージング操作に関するエラーを表す。
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("producer error: {0}")]
    ProducerError(String),

    #[error("consumer error: {0}")]
    ConsumerError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    /// ローカル送信キューが満杯でメッセージを受け付けられない。
    #[error("producer queue full: {0}")]
    QueueFull(String),
}

impl From<serde_json::Error> for MessagingError {
    fn from(e: serde_json::Error) -> Self {
        MessagingError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_error_display() {
        let err = MessagingError::ProducerError("kafka broker unreachable".to_string());
        assert!(err.to_string().contains("kafka broker unreachable"));
    }

    #[test]
    fn test_deserialization_error_display() {
        let err = MessagingError::DeserializationError("missing field `id`".to_string());
        assert_eq!(err.to_string(), "deserialization error: missing field `id`");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MessagingError = json_err.into();
        assert!(matches!(err, MessagingError::SerializationError(_)));
    }
}
