//! Alert queue and worker
//!
//! Kill transitions enqueue alerts without waiting on any transport; a single
//! worker task drains the queue through the dispatcher and logs outcomes.
//! The pending counter makes every enqueued alert trackable until its
//! channels have all been attempted.

use super::{AlertDispatcher, AlertEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Producer side of the alert queue
#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::UnboundedSender<AlertEvent>,
    pending: Arc<Pending>,
}

/// Consumer side, run with [`AlertWorker::spawn`]
pub struct AlertWorker {
    rx: mpsc::UnboundedReceiver<AlertEvent>,
    dispatcher: Arc<AlertDispatcher>,
    pending: Arc<Pending>,
}

/// Create a connected queue/worker pair
pub fn alert_queue(dispatcher: AlertDispatcher) -> (AlertQueue, AlertWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(Pending::default());
    (
        AlertQueue {
            tx,
            pending: Arc::clone(&pending),
        },
        AlertWorker {
            rx,
            dispatcher: Arc::new(dispatcher),
            pending,
        },
    )
}

impl AlertQueue {
    /// Hand `event` to the worker without blocking; false if the worker is gone
    pub fn enqueue(&self, event: AlertEvent) -> bool {
        self.pending.count.fetch_add(1, Ordering::AcqRel);
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                self.pending.done();
                error!(kind = %event.kind, "Alert worker stopped, alert dropped");
                false
            }
        }
    }

    /// Alerts enqueued but not yet fully attempted
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::Acquire)
    }

    /// Wait until every enqueued alert has been attempted on every channel.
    ///
    /// Returns early if the [`AlertWorker`] is dropped; its backlog is lost.
    /// A worker that is alive but never spawned keeps this waiting.
    pub async fn flush(&self) {
        loop {
            let idle = self.pending.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            if self.tx.is_closed() {
                warn!(pending = self.pending(), "Alert worker gone, pending alerts dropped");
                return;
            }
            tokio::select! {
                () = idle.as_mut() => {}
                () = self.tx.closed() => {}
            }
        }
    }
}

impl AlertWorker {
    /// Run until every queue handle is dropped and the backlog is drained
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!(channels = ?self.dispatcher.channel_names(), "Alert worker started");
        while let Some(event) = self.rx.recv().await {
            debug!(kind = %event.kind, "Dispatching alert");
            let report = self.dispatcher.dispatch(&event).await;
            if report.failed.is_empty() {
                info!(
                    kind = %event.kind,
                    delivered = report.delivered.len(),
                    "Alert dispatched"
                );
            } else {
                error!(
                    kind = %event.kind,
                    delivered = report.delivered.len(),
                    failed = ?report.failed,
                    "Alert dispatched with channel failures"
                );
            }
            self.pending.done();
        }
        info!("Alert worker stopped");
    }
}
