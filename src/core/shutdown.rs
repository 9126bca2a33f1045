//! Shutdown coordination for consumer tasks
//!
//! A single coordinator fans a shutdown notification out to every polling task.
//! Signal handlers are opt-in so tests can drive shutdown explicitly.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown across consumer tasks
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(8);
        Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Wait until shutdown has been requested
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.is_shutdown_requested() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Install process signal handlers that trigger this coordinator
    ///
    /// The first signal requests a graceful stop; a second one exits immediately.
    pub fn install_signal_handlers(&self) {
        let signal_count = Arc::new(AtomicUsize::new(0));

        #[cfg(unix)]
        {
            // Restore default SIGPIPE so piping CLI output into `head` terminates quietly
            unsafe {
                libc::signal(libc::SIGPIPE, libc::SIG_DFL);
            }

            use tokio::signal::unix::{signal, SignalKind};
            for kind in [SignalKind::terminate(), SignalKind::hangup()] {
                let coordinator = self.clone();
                let counter = signal_count.clone();
                tokio::spawn(async move {
                    if let Ok(mut sig) = signal(kind) {
                        if sig.recv().await.is_some() {
                            coordinator.on_signal(&counter);
                        }
                    }
                });
            }
        }

        let coordinator = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                coordinator.on_signal(&signal_count);
            }
        });
    }

    fn on_signal(&self, counter: &AtomicUsize) {
        let previous = counter.fetch_add(1, Ordering::AcqRel);
        if previous >= 1 {
            log::warn!("Second shutdown signal received; exiting");
            std::process::exit(130);
        }
        log::info!("Shutdown requested; draining consumers");
        self.trigger_shutdown();
    }
}
