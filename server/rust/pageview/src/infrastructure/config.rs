use std::time::Duration;

use pageview_messaging::{ConsumerConfig, MessagingConfig, OffsetReset};
use serde::Deserialize;

use crate::domain::entity::PageViewTemplate;

/// Application configuration for pageview server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&content)?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// LogConfig はログ出力の設定を表す。
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" または "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// KafkaConfig は Kafka ブローカー接続とページビュートピックの設定を表す。
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_security_protocol")]
    pub security_protocol: String,
    /// ページビューイベントのトピック
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// 初回参加時の読み出し開始位置（earliest / latest）
    #[serde(default)]
    pub offset_reset: OffsetReset,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    /// デコードできないメッセージの転送先。未設定ならログに記録して破棄する。
    #[serde(default)]
    pub dead_letter_topic: Option<String>,
}

fn default_security_protocol() -> String {
    "PLAINTEXT".to_string()
}

fn default_topic() -> String {
    "pageviews".to_string()
}

fn default_consumer_group() -> String {
    "pageview-consumer".to_string()
}

fn default_message_timeout_ms() -> u64 {
    30000
}

fn default_session_timeout_ms() -> u64 {
    30000
}

impl KafkaConfig {
    pub fn messaging_config(&self) -> MessagingConfig {
        MessagingConfig {
            brokers: self.brokers.clone(),
            security_protocol: self.security_protocol.clone(),
            message_timeout_ms: self.message_timeout_ms,
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            group_id: self.consumer_group.clone(),
            topics: vec![self.topic.clone()],
            auto_commit: true,
            session_timeout_ms: self.session_timeout_ms,
            offset_reset: self.offset_reset,
        }
    }
}

/// GeneratorConfig は合成ページビュー生成の設定を表す。
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 前回の生成完了から次回開始までの間隔（秒）
    #[serde(default = "default_fixed_delay_secs")]
    pub fixed_delay_secs: u64,
    /// 起動から初回生成までの待ち時間（秒）
    #[serde(default)]
    pub initial_delay_secs: u64,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_ip_address")]
    pub ip_address: String,
    #[serde(default = "default_referrer")]
    pub referrer: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            fixed_delay_secs: default_fixed_delay_secs(),
            initial_delay_secs: 0,
            device: default_device(),
            ip_address: default_ip_address(),
            referrer: default_referrer(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_fixed_delay_secs() -> u64 {
    10
}

fn default_device() -> String {
    PageViewTemplate::default().device
}

fn default_ip_address() -> String {
    PageViewTemplate::default().ip_address
}

fn default_referrer() -> String {
    PageViewTemplate::default().referrer
}

impl GeneratorConfig {
    pub fn fixed_delay(&self) -> Duration {
        Duration::from_secs(self.fixed_delay_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn template(&self) -> PageViewTemplate {
        PageViewTemplate {
            device: self.device.clone(),
            ip_address: self.ip_address.clone(),
            referrer: self.referrer.clone(),
        }
    }
}
