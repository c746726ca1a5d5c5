use serde::Serialize;

use crate::error::MessagingError;

/// EventEnvelope はトピック・キー・ペイロードをラップするメッセージエンベロープ。
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    /// 送信先トピック名（例: "pageviews"）
    pub topic: String,
    /// シリアライズ済みのメッセージキー。None の場合はキー無しで送信する
    pub key: Option<Vec<u8>>,
    /// シリアライズ済みのペイロード
    pub payload: Vec<u8>,
    /// メッセージのヘッダー
    pub headers: Vec<(String, Vec<u8>)>,
}

impl EventEnvelope {
    /// キーとペイロードをそれぞれ JSON にシリアライズして EventEnvelope を生成する。
    pub fn json<K: Serialize, T: Serialize>(
        topic: impl Into<String>,
        key: &K,
        payload: &T,
    ) -> Result<Self, MessagingError> {
        Ok(Self {
            topic: topic.into(),
            key: Some(serde_json::to_vec(key)?),
            payload: serde_json::to_vec(payload)?,
            headers: Vec::new(),
        })
    }

    /// シリアライズ済みのバイト列から EventEnvelope を生成する。
    pub fn raw(topic: impl Into<String>, key: Option<Vec<u8>>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key,
            payload,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
