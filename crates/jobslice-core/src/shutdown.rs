//! Cooperative shutdown, exposed as an explicit handle rather than global
//! process state: a `watch` channel gives every driver loop and worker a
//! cheap, clonable, non-blocking way to poll "are we stopping yet?".

use tokio::sync::watch;

/// The read side of the shutdown signal: cloned into the driver loop and the
/// worker pool. `is_stopping()` is a non-blocking poll a driver loop checks
/// between ticks.
#[derive(Clone)]
pub struct ShutdownHandle(watch::Receiver<bool>);

impl ShutdownHandle {
    pub fn is_stopping(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown has been triggered or the channel closes,
    /// letting a driver loop select between this and its refresh-interval
    /// sleep instead of waiting out the full sleep before noticing a signal.
    pub async fn wait(&mut self) {
        if self.is_stopping() {
            return;
        }
        let _ = self.0.changed().await;
    }
}

/// The write side, held by whatever installs the signal handlers.
pub struct Shutdown(watch::Sender<bool>);

impl Shutdown {
    pub fn new() -> (Self, ShutdownHandle) {
        let (tx, rx) = watch::channel(false);
        (Shutdown(tx), ShutdownHandle(rx))
    }

    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }

    /// Waits for SIGINT, and on unix also SIGTERM, then triggers shutdown.
    /// Consumes `self` since there is exactly one shutdown to trigger.
    pub async fn on_signals(self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to install SIGTERM handler, watching SIGINT only");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        tracing::info!("shutdown signal received");
        self.trigger();
    }
}
