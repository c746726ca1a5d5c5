pub mod metrics;

pub use metrics::Metrics;

use tracing_subscriber::{
    fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// TelemetryConfig は telemetry ライブラリの初期化設定を保持する。
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub version: String,
    pub environment: String,
    pub log_level: String,
    /// ログ出力フォーマット。"text" の場合はプレーンテキスト、それ以外は JSON。
    pub log_format: String,
}

/// init_telemetry は tracing-subscriber を初期化する。
/// RUST_LOG が設定されている場合は log_level より優先する。
pub fn init_telemetry(cfg: &TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cfg.log_format == "text" {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    tracing::info!(
        service = %cfg.service_name,
        version = %cfg.version,
        environment = %cfg.environment,
        "telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_telemetry_twice_fails() {
        let cfg = TelemetryConfig {
            service_name: "pageview-test".to_string(),
            version: "0.1.0".to_string(),
            environment: "dev".to_string(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        };
        assert!(init_telemetry(&cfg).is_ok());
        // グローバルサブスクライバーは一度しか設定できない
        assert!(init_telemetry(&cfg).is_err());
    }
}
