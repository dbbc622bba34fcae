//! Process lifecycle: shared cancellation and tracked background workers.
//!
//! One root [`CancellationToken`] fans out to every worker; one atomic
//! counter tracks them. Workers register before they start (RAII
//! [`WorkerGuard`]) and deregister on return, even across panics, so the
//! coordinator can refuse to exit until the counter reaches zero.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A counted group of in-flight tasks that can be awaited to drain.
///
/// The same primitive backs the process-wide worker counter and the
/// per-adapter cycle/file groups in the file inbound.
#[derive(Debug, Default)]
pub struct WorkerTracker {
    active: AtomicUsize,
    drained: Notify,
}

impl WorkerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one worker. Must be called before the work is spawned; the
    /// returned guard deregisters on drop.
    pub fn enter(self: &Arc<Self>) -> WorkerGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        WorkerGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until every registered worker has deregistered.
    pub async fn wait(&self) {
        loop {
            let notified = self.drained.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII registration of one worker in a [`WorkerTracker`].
#[derive(Debug)]
pub struct WorkerGuard {
    tracker: Arc<WorkerTracker>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.drained.notify_waiters();
        }
    }
}

/// Shared handle to the process lifecycle: root cancellation plus the
/// process-wide worker counter. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    token: CancellationToken,
    workers: Arc<WorkerTracker>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the root cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Begin shutdown: cancels the root token. Workers observe the token and
    /// wind down; the coordinator then waits for the counter to drain.
    pub fn shutdown(&self) {
        info!(active_workers = self.workers.active(), "shutdown initiated");
        self.token.cancel();
    }

    /// Register a process-wide tracked worker.
    pub fn track_worker(&self) -> WorkerGuard {
        self.workers.enter()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.active()
    }

    /// Wait until every tracked worker has finished.
    pub async fn wait_for_workers(&self) {
        self.workers.wait().await;
    }
}

/// Install SIGINT/SIGTERM handlers that trigger graceful shutdown.
pub fn install_signal_handlers(lifecycle: Lifecycle) {
    let sigint_lifecycle = lifecycle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received SIGINT, initiating graceful shutdown");
                sigint_lifecycle.shutdown();
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("received SIGTERM, initiating graceful shutdown");
                    lifecycle.shutdown();
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to listen for SIGTERM");
                }
            }
        });
    }
}
