//! Confinement thread for encode sessions
//!
//! EGL contexts and hardware encoders are bound to the thread that created
//! them, so every session operation is shipped to one dedicated thread and
//! executed there in submission order.

use std::future::Future;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::engine::SessionCore;
use super::SharedState;
use crate::backend::Backend;
use crate::error::{EncodeError, Result};

/// Work item executed on the confinement thread
type Job = Box<dyn FnOnce(&mut SessionCore) + Send>;

/// Handle to a running confinement thread
pub(crate) struct Worker {
    tx: Option<mpsc::UnboundedSender<Job>>,
    thread: Option<JoinHandle<()>>,
    exited: Option<oneshot::Receiver<()>>,
}

/// A confinement thread whose queue has been closed
pub(crate) struct Exiting {
    thread: JoinHandle<()>,
    exited: oneshot::Receiver<()>,
}

impl Exiting {
    /// Wait for the thread to finish without blocking the caller's executor
    ///
    /// Returns false if the thread panicked.
    pub(crate) async fn join(self) -> bool {
        // the signal is the thread's last action; a panic drops it unsent
        let signalled = self.exited.await.is_ok();
        match self.thread.join() {
            Ok(()) => signalled,
            Err(_) => false,
        }
    }
}

impl Worker {
    /// Spawn the thread; `backend` moves onto it and never leaves
    pub(crate) fn spawn(backend: Box<dyn Backend>, shared: Arc<SharedState>) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let (exit_tx, exit_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("texenc-encoder".to_string())
            .spawn(move || {
                let mut core = SessionCore::new(backend, shared);
                debug!("Encoder thread started");

                while let Some(job) = rx.blocking_recv() {
                    job(&mut core);
                }

                // Sender gone: release whatever is still open
                core.teardown();
                drop(core);
                debug!("Encoder thread exiting");
                let _ = exit_tx.send(());
            })
            .map_err(|e| EncodeError::init(format!("Failed to spawn encoder thread: {}", e)))?;

        info!("Encoder thread spawned");
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
            exited: Some(exit_rx),
        })
    }

    fn sender(&self) -> Result<mpsc::UnboundedSender<Job>> {
        self.tx.clone().ok_or(EncodeError::SessionClosed)
    }

    /// Queue `job`; the returned future resolves to its result
    ///
    /// The future does not borrow the worker, so callers can drop their lock
    /// before awaiting. It fails with `SessionClosed` if the thread has exited
    /// or panicked.
    pub(crate) fn run<R, F>(
        &self,
        job: F,
    ) -> Result<impl Future<Output = Result<R>> + Send + use<R, F>>
    where
        R: Send + 'static,
        F: FnOnce(&mut SessionCore) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender()?
            .send(Box::new(move |core| {
                // Caller may have given up waiting
                let _ = reply_tx.send(job(core));
            }))
            .map_err(|_| EncodeError::SessionClosed)?;

        Ok(async move { reply_rx.await.map_err(|_| EncodeError::SessionClosed) })
    }

    /// Close the queue and hand back the thread for joining
    ///
    /// Jobs already queued still run before the thread exits.
    pub(crate) fn shutdown(&mut self) -> Option<Exiting> {
        self.tx = None;
        let thread = self.thread.take()?;
        let exited = self.exited.take()?;
        Some(Exiting { thread, exited })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the queue lets the thread tear down and exit on its own
        self.tx = None;
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                if thread.join().is_err() {
                    error!("Encoder thread panicked");
                }
            } else {
                debug!("Detaching encoder thread; it exits once its queue drains");
            }
        }
    }
}
