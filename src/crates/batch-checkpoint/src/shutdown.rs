//! Cooperative interrupt handling
//!
//! A signal only sets a flag. The executor polls the flag between items,
//! stops issuing new work, and performs the final flush itself, so a second
//! signal can never start a second flush.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Shutdown coordinator shared by the signal task and the executor
#[derive(Clone)]
pub struct ShutdownCoordinator {
    /// Flag indicating shutdown has been requested
    shutdown_requested: Arc<AtomicBool>,
    /// Notifier for shutdown signal
    shutdown_notify: Arc<Notify>,
    /// Signals received so far
    signals: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("shutdown_requested", &self.is_shutdown_requested())
            .field("signals", &self.signal_count())
            .finish()
    }
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            signals: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Request shutdown. Returns true only for the first request.
    pub fn request_shutdown(&self) -> bool {
        let first = !self.shutdown_requested.swap(true, Ordering::SeqCst);
        if first {
            info!("Shutdown requested");
            self.shutdown_notify.notify_waiters();
        }
        first
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Number of OS signals observed by the installed handlers
    pub fn signal_count(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }

    /// Wait for shutdown. Returns immediately if already requested.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.shutdown_notify.notified();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    /// Record one received signal: the first requests shutdown, the rest
    /// are logged and otherwise ignored.
    pub fn on_signal(&self, name: &str) {
        let count = self.signals.fetch_add(1, Ordering::SeqCst) + 1;
        if self.request_shutdown() {
            warn!(
                signal = name,
                "Received {}, finishing in-flight work and saving progress...", name
            );
        } else {
            warn!(
                signal = name,
                count = count,
                "Received {} again, shutdown already in progress", name
            );
        }
    }

    /// Install signal handlers for SIGINT and SIGTERM (Ctrl+C elsewhere)
    ///
    /// This spawns a background task that keeps listening for signals for
    /// the life of the process.
    pub fn install_signal_handlers(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();

        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};

                let (mut sigint, mut sigterm) =
                    match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                        (Err(e), _) | (_, Err(e)) => {
                            error!(error = %e, "Failed to install signal handlers");
                            return;
                        }
                    };

                loop {
                    tokio::select! {
                        received = sigint.recv() => match received {
                            Some(()) => coordinator.on_signal("SIGINT"),
                            None => break,
                        },
                        received = sigterm.recv() => match received {
                            Some(()) => coordinator.on_signal("SIGTERM"),
                            None => break,
                        },
                    }
                }
            }

            #[cfg(not(unix))]
            {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "Failed to install Ctrl+C handler");
                        return;
                    }
                    coordinator.on_signal("Ctrl+C");
                }
            }
        })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
