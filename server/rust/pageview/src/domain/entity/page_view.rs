use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PageViewError;

/// EventKey はページビューイベントのメッセージキー。
/// id はキーとペイロードで共有する相関 ID。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKey {
    pub id: String,
}

impl EventKey {
    /// UUID v4 を id とする新しいキーを生成する。
    pub fn generate() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), PageViewError> {
        if self.id.is_empty() {
            return Err(PageViewError::InvalidEvent(
                "event key id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// EventPayload はページビューイベントのメッセージ本体。
/// ip_address と referrer は形式を検証しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub id: String,
    pub device: String,
    pub ip_address: String,
    pub referrer: String,
    pub timestamp: DateTime<Utc>,
}

impl EventPayload {
    /// キーと同じ id を持つペイロードを生成する。
    pub fn for_key(key: &EventKey, template: &PageViewTemplate, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: key.id.clone(),
            device: template.device.clone(),
            ip_address: template.ip_address.clone(),
            referrer: template.referrer.clone(),
            timestamp,
        }
    }

    /// キーとペイロードの id が一致することを確認する。
    pub fn ensure_paired(&self, key: &EventKey) -> Result<(), PageViewError> {
        if self.id != key.id {
            return Err(PageViewError::InvalidEvent(format!(
                "payload id {} does not match key id {}",
                self.id, key.id
            )));
        }
        Ok(())
    }
}

/// PageViewTemplate は生成イベントに設定する固定値。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageViewTemplate {
    pub device: String,
    pub ip_address: String,
    pub referrer: String,
}

impl Default for PageViewTemplate {
    fn default() -> Self {
        Self {
            device: "web".to_string(),
            ip_address: "192.168.0.1".to_string(),
            referrer: "https://www.google.com".to_string(),
        }
    }
}
