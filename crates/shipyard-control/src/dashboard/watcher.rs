//! Periodic dashboard refresh for long-lived observers.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{DashboardAggregator, ServiceDashboard};
use crate::error::ControlResult;

/// One published refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DashboardFrame {
    /// A fresh snapshot.
    Ready(ServiceDashboard),
    /// The snapshot failed.
    Unavailable {
        /// Error kind.
        kind: &'static str,
        /// Error message.
        message: String,
    },
}

impl From<ControlResult<ServiceDashboard>> for DashboardFrame {
    fn from(result: ControlResult<ServiceDashboard>) -> Self {
        match result {
            Ok(dashboard) => Self::Ready(dashboard),
            Err(e) => Self::Unavailable {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

/// A cancellable task that snapshots one service on a fixed interval.
///
/// The task stops on [`DashboardWatcher::stop`], on
/// [`DashboardWatcher::shutdown`], or when the watcher is dropped.
#[derive(Debug)]
pub struct DashboardWatcher {
    service: String,
    frames: watch::Receiver<DashboardFrame>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DashboardWatcher {
    /// Take a snapshot now and start refreshing every `period`.
    pub fn spawn(
        aggregator: Arc<DashboardAggregator>,
        service: impl Into<String>,
        period: Duration,
    ) -> Self {
        let service = service.into();
        let period = period.max(Duration::from_millis(1));
        let (tx, frames) = watch::channel(DashboardFrame::from(aggregator.snapshot(&service)));
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            let service = service.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately.
                ticker.tick().await;

                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let frame = DashboardFrame::from(aggregator.snapshot(&service));
                            if let DashboardFrame::Unavailable { message, .. } = &frame {
                                warn!(
                                    service = %service,
                                    error = %message,
                                    "dashboard refresh failed"
                                );
                            }
                            if tx.send(frame).is_err() {
                                break;
                            }
                        }
                    }
                }
                debug!(service = %service, "dashboard watcher stopped");
            })
        };

        debug!(service = %service, period_ms = period.as_millis(), "dashboard watcher started");
        Self {
            service,
            frames,
            cancel,
            task: Some(task),
        }
    }

    /// The watched service.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// A receiver that is notified on every refresh.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DashboardFrame> {
        self.frames.clone()
    }

    /// The most recent frame.
    #[must_use]
    pub fn latest(&self) -> DashboardFrame {
        self.frames.borrow().clone()
    }

    /// Stop refreshing. Subscribers see the channel close.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop refreshing and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(service = %self.service, error = %e, "dashboard watcher task failed");
            }
        }
    }
}

impl Drop for DashboardWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
