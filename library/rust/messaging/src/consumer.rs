use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::watch;

use crate::error::MessagingError;
use crate::subscription::SubscriberState;

/// ConsumedMessage は Kafka から受信したメッセージを表す。
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedMessage {
    /// トピック名
    pub topic: String,
    /// パーティション番号
    pub partition: i32,
    /// オフセット
    pub offset: i64,
    /// メッセージキー
    pub key: Option<Vec<u8>>,
    /// メッセージペイロード
    pub payload: Vec<u8>,
    /// メッセージのヘッダー
    pub headers: Vec<(String, Vec<u8>)>,
}

impl ConsumedMessage {
    /// ペイロードを JSON としてデシリアライズする。
    pub fn deserialize_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, MessagingError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| MessagingError::DeserializationError(format!("payload: {e}")))
    }

    /// キーを JSON としてデシリアライズする。キーが無い場合はエラーを返す。
    pub fn deserialize_key_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, MessagingError> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| MessagingError::DeserializationError("key: missing".to_string()))?;
        serde_json::from_slice(key)
            .map_err(|e| MessagingError::DeserializationError(format!("key: {e}")))
    }

    /// 指定名のヘッダー値を返す。
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }
}

/// EventConsumer は Kafka からのメッセージ受信インターフェース。
///
/// 実装は生成時点でトピックを購読済みであること。オフセットのコミットは
/// クライアントの既定ポリシーに委ねる。
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// 次のメッセージを受信する。メッセージが届くまで待機する。
    async fn receive(&self) -> Result<ConsumedMessage, MessagingError>;

    /// グループへの参加状態を返す。パーティションが割り当てられている間だけ Active になる。
    fn membership(&self) -> watch::Receiver<SubscriberState>;

    /// 購読を解除してコンシューマーグループから離脱する。
    fn close(&self) {}
}
