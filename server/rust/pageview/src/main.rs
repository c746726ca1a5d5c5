use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use pageview_messaging::{EventProducer, KafkaEventProducer, SubscriberState, SubscriptionHandle};
use pageview_server::adapter::handler::{self, AppState};
use pageview_server::infrastructure::config::Config;
use pageview_server::infrastructure::kafka_consumer::spawn_subscription;
use pageview_server::infrastructure::kafka_producer::{
    KafkaPageViewProducer, NoopPageViewEventPublisher, PageViewEventPublisher,
};
use pageview_server::infrastructure::scheduler::PageViewScheduler;
use pageview_server::usecase::GeneratePageViewUseCase;

/// 生成開始前にパーティション割り当てを待つ上限
const ASSIGNMENT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let cfg = Config::load(&config_path)?;

    // Telemetry
    let telemetry_cfg = pageview_telemetry::TelemetryConfig {
        service_name: cfg.app.name.clone(),
        version: cfg.app.version.clone(),
        environment: cfg.app.environment.clone(),
        log_level: cfg.log.level.clone(),
        log_format: cfg.log.format.clone(),
    };
    pageview_telemetry::init_telemetry(&telemetry_cfg)
        .map_err(|e| anyhow::anyhow!("failed to init telemetry: {}", e))?;

    let metrics = Arc::new(
        pageview_telemetry::Metrics::new(&cfg.app.name)
            .map_err(|e| anyhow::anyhow!("failed to init metrics: {}", e))?,
    );

    info!(port = cfg.server.port, "starting pageview server");

    // --- Event Publisher: Kafka or Noop fallback ---
    let kafka_producer: Option<Arc<dyn EventProducer>> = match cfg.kafka {
        Some(ref kafka_cfg) => {
            info!(brokers = ?kafka_cfg.brokers, "connecting to Kafka");
            let producer = KafkaEventProducer::new(&kafka_cfg.messaging_config())?;
            info!("Kafka producer initialized");
            Some(Arc::new(producer))
        }
        None => None,
    };

    let publisher: Arc<dyn PageViewEventPublisher> =
        if let (Some(kafka_cfg), Some(producer)) = (&cfg.kafka, &kafka_producer) {
            Arc::new(
                KafkaPageViewProducer::new(producer.clone(), &kafka_cfg.topic)
                    .with_metrics(metrics.clone()),
            )
        } else {
            info!("Kafka not configured, using Noop event publisher");
            Arc::new(NoopPageViewEventPublisher)
        };

    // --- Kafka consumer (optional, background task) ---
    let subscription: Option<SubscriptionHandle> =
        if let (Some(kafka_cfg), Some(producer)) = (&cfg.kafka, &kafka_producer) {
            let handle = spawn_subscription(kafka_cfg, producer.clone(), metrics.clone())?;
            info!("kafka consumer initialized, starting background ingestion");
            Some(handle)
        } else {
            None
        };

    // latest の開始位置が確定する前に発行したイベントは購読側に届かない
    if let Some(ref subscription) = subscription {
        let mut state = subscription.state_receiver();
        let assigned = tokio::time::timeout(
            ASSIGNMENT_TIMEOUT,
            state.wait_for(|s| *s == SubscriberState::Active),
        )
        .await;
        if matches!(assigned, Ok(Ok(_))) {
            info!("kafka partitions assigned");
        } else {
            tracing::warn!("kafka partitions not assigned yet, starting generator anyway");
        }
    }

    // --- Page view generator ---
    let generate_uc = Arc::new(GeneratePageViewUseCase::new(
        publisher.clone(),
        cfg.generator.template(),
    ));
    let scheduler = PageViewScheduler::new(
        generate_uc,
        cfg.generator.initial_delay(),
        cfg.generator.fixed_delay(),
    );
    let scheduler_handle = if cfg.generator.enabled {
        Some(scheduler.start())
    } else {
        info!("page view generator disabled");
        None
    };

    let state = AppState {
        metrics,
        subscriber_state: subscription
            .as_ref()
            .map(SubscriptionHandle::state_receiver),
    };
    let app = handler::router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!("REST server starting on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // タイマーを止めてからグループを離脱し、送信キューを掃き出す
    scheduler.stop();
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "scheduler task failed");
        }
    }
    if let Some(subscription) = subscription {
        subscription.shutdown().await;
    }
    if let Err(e) = publisher.close().await {
        tracing::warn!(error = %e, "failed to flush page view producer");
    }

    info!("pageview server stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
