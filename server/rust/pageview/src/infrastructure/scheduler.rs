//! 固定遅延スケジューラ。
//!
//! ティッカータスクが待機後に Tick をチャネルへ送り、専用ワーカーが生成処理を実行する。
//! ティッカーはワーカーの完了通知を受けてから次の待機を始めるため、
//! 間隔は前回の実行終了から計測され、実行が重なることはない。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::usecase::GeneratePageViewUseCase;

struct Tick {
    done: oneshot::Sender<()>,
}

pub struct PageViewScheduler {
    use_case: Arc<GeneratePageViewUseCase>,
    initial_delay: Duration,
    fixed_delay: Duration,
    cancel_token: CancellationToken,
}

impl PageViewScheduler {
    pub fn new(
        use_case: Arc<GeneratePageViewUseCase>,
        initial_delay: Duration,
        fixed_delay: Duration,
    ) -> Self {
        Self {
            use_case,
            initial_delay,
            fixed_delay,
            cancel_token: CancellationToken::new(),
        }
    }

    /// ティッカーとワーカーを起動する。返り値のハンドルは両タスクの終了で完了する。
    pub fn start(&self) -> JoinHandle<()> {
        let (tx, rx) = mpsc::channel::<Tick>(1);

        let worker = tokio::spawn(Self::work(self.use_case.clone(), rx));
        let ticker = tokio::spawn(Self::tick_loop(
            tx,
            self.initial_delay,
            self.fixed_delay,
            self.cancel_token.clone(),
        ));

        tracing::info!(
            initial_delay_secs = self.initial_delay.as_secs(),
            fixed_delay_secs = self.fixed_delay.as_secs(),
            "page view scheduler started"
        );

        tokio::spawn(async move {
            if let Err(e) = ticker.await {
                tracing::error!(error = %e, "scheduler ticker terminated abnormally");
            }
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "scheduler worker terminated abnormally");
            }
            tracing::info!("page view scheduler stopped");
        })
    }

    async fn tick_loop(
        tx: mpsc::Sender<Tick>,
        initial_delay: Duration,
        fixed_delay: Duration,
        token: CancellationToken,
    ) {
        let mut delay = initial_delay;
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }

            let (done_tx, done_rx) = oneshot::channel();
            if tx.send(Tick { done: done_tx }).await.is_err() {
                break;
            }
            if done_rx.await.is_err() {
                break;
            }
            delay = fixed_delay;
        }
    }

    async fn work(use_case: Arc<GeneratePageViewUseCase>, mut rx: mpsc::Receiver<Tick>) {
        while let Some(tick) = rx.recv().await {
            if let Err(e) = use_case.execute().await {
                tracing::error!(error = %e, "failed to generate page view");
            }
            let _ = tick.done.send(());
        }
    }

    pub fn stop(&self) {
        self.cancel_token.cancel();
    }
}
