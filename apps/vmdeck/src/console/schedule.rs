use std::ops::ControlFlow;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Source of render ticks for the surface binder.
#[async_trait]
pub trait FrameClock: Send + Sync {
    async fn next_frame(&self);
}

/// Ticks on a fixed timer.
#[derive(Debug, Clone)]
pub struct IntervalClock {
    period: Duration,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }
}

impl Default for IntervalClock {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

#[async_trait]
impl FrameClock for IntervalClock {
    async fn next_frame(&self) {
        tokio::time::sleep(self.period).await;
    }
}

/// Clock that only ticks when its [`FrameTrigger`] fires.
pub struct ManualClock {
    ticks: AsyncMutex<mpsc::UnboundedReceiver<()>>,
}

#[derive(Clone)]
pub struct FrameTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualClock {
    pub fn new() -> (Self, FrameTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                ticks: AsyncMutex::new(rx),
            },
            FrameTrigger { tx },
        )
    }
}

impl FrameTrigger {
    pub fn frame(&self) {
        let _ = self.tx.send(());
    }
}

#[async_trait]
impl FrameClock for ManualClock {
    async fn next_frame(&self) {
        let mut ticks = self.ticks.lock().await;
        if ticks.recv().await.is_none() {
            // Trigger dropped: no more frames will ever come.
            std::future::pending::<()>().await;
        }
    }
}

/// Runs `step` once per frame until it breaks or `token` is cancelled.
/// Returns `None` when cancelled; `step` never runs after cancellation.
pub async fn repeat_until<T, F>(
    clock: &dyn FrameClock,
    token: &CancellationToken,
    mut step: F,
) -> Option<T>
where
    F: FnMut() -> ControlFlow<T>,
{
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            _ = clock.next_frame() => {}
        }
        if token.is_cancelled() {
            return None;
        }
        if let ControlFlow::Break(value) = step() {
            return Some(value);
        }
    }
}
