use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageViewError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("publish error: {0}")]
    Publish(String),
}
