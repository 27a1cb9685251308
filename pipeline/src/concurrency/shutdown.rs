//! Broadcast shutdown signal.
//!
//! A [`ShutdownTx`] is owned by whoever may interrupt a run (the pipeline itself, a Ctrl+C
//! handler, a test) and every interested task holds a [`ShutdownRx`]. Receivers observe a
//! shutdown as a change on the underlying watch channel.

use std::sync::Arc;

use tokio::sync::watch;

/// Receiver side of the shutdown signal.
pub type ShutdownRx = watch::Receiver<()>;

/// Transmitter side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(Arc<watch::Sender<()>>);

impl ShutdownTx {
    /// Notifies every subscribed receiver.
    ///
    /// Fails when no receiver is alive anymore, meaning nothing is left to shut down.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver which only observes shutdowns sent after this call.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a new shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(Arc::new(tx)), rx)
}
