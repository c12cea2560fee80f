//! Cooperative cancellation for stream workers.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owner side of a stream worker: signals cancellation and joins the task.
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Worker side of the cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

/// Creates a linked sender/signal pair; the sender goes into [`WorkerHandle::new`].
pub fn cancel_pair() -> (watch::Sender<bool>, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (tx, CancelSignal(rx))
}

impl CancelSignal {
    /// Resolves once cancellation is requested or the owning handle is gone.
    pub async fn cancelled(&mut self) {
        let _ = self.0.wait_for(|cancelled| *cancelled).await;
    }

    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

impl WorkerHandle {
    pub fn new(cancel: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { cancel, task }
    }

    /// Asks the worker to stop at its next await point and waits for it to exit.
    pub async fn cancel_and_join(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!("session worker panicked: {}", e);
            }
        }
    }
}
