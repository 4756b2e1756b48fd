//! # Process Owner
//!
//! Serialized access to the traced process from one fixed OS thread.
//!
//! ptrace-style process control requires every control call to come from the
//! thread that attached, for the whole session. The owner is an actor: it
//! owns a dedicated thread (`ferros-owner`), builds the target *on* that
//! thread, and then runs submitted operations against it one at a time, in
//! submission order. Nothing else ever gets a reference to the target.
//!
//! ## Submitting work
//!
//! ```rust
//! use ferros_core::owner::ProcessOwner;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ferros_core::error::FerrosResult<()> {
//! let owner = ProcessOwner::spawn(|| Ok(Vec::<u32>::new())).await?;
//! owner.execute(|values| { values.push(7); Ok(()) }).await?;
//! let len = owner.execute(|values| Ok(values.len())).await?;
//! assert_eq!(len, 1);
//! owner.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure
//!
//! An operation's error (or panic) goes back to its submitter only; the loop
//! keeps serving the next operation.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};

use crate::error::{FerrosError, FerrosResult};

type Job<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

enum Request<T>
{
    Run(Job<T>),
    Stop,
}

/// Single-threaded gateway to a target of type `T`.
///
/// `T` never crosses threads, so it does not need to be `Send`.
pub struct ProcessOwner<T: 'static>
{
    sender: mpsc::UnboundedSender<Request<T>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stopping: AtomicBool,
}

impl<T: 'static> ProcessOwner<T>
{
    /// Start the owner thread and build the target on it.
    ///
    /// Resolves once `factory` has run. A factory error (failed attach or
    /// launch) is returned here and the thread exits.
    pub async fn spawn<F>(factory: F) -> FerrosResult<Self>
    where
        F: FnOnce() -> FerrosResult<T> + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Request<T>>();
        let (ready_tx, ready_rx) = oneshot::channel::<FerrosResult<()>>();

        let thread = std::thread::Builder::new()
            .name("ferros-owner".to_string())
            .spawn(move || {
                let mut target = match factory() {
                    Ok(target) => {
                        let _ = ready_tx.send(Ok(()));
                        target
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                tracing::debug!("Process owner started");

                while let Some(request) = receiver.blocking_recv() {
                    match request {
                        Request::Run(job) => job(&mut target),
                        Request::Stop => break,
                    }
                }

                tracing::info!("Process owner stopped");
            })?;

        ready_rx.await.map_err(|_| FerrosError::OwnerStopped)??;

        Ok(Self {
            sender,
            thread: Mutex::new(Some(thread)),
            stopping: AtomicBool::new(false),
        })
    }

    fn submit<R, F>(&self, operation: F) -> FerrosResult<oneshot::Receiver<FerrosResult<R>>>
    where
        F: FnOnce(&mut T) -> FerrosResult<R> + Send + 'static,
        R: Send + 'static,
    {
        if self.stopping.load(Ordering::Acquire) {
            return Err(FerrosError::OwnerStopped);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<T> = Box::new(move |target| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| operation(target)))
                .unwrap_or_else(|payload| Err(FerrosError::OperationPanicked(panic_message(payload.as_ref()))));
            // The submitter may have given up waiting.
            let _ = reply_tx.send(result);
        });

        self.sender
            .send(Request::Run(job))
            .map_err(|_| FerrosError::OwnerStopped)?;
        Ok(reply_rx)
    }

    /// Run `operation` on the owner thread and await its result.
    pub async fn execute<R, F>(&self, operation: F) -> FerrosResult<R>
    where
        F: FnOnce(&mut T) -> FerrosResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let reply = self.submit(operation)?;
        reply.await.map_err(|_| FerrosError::OwnerStopped)?
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool
    {
        self.stopping.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// Stop accepting operations, let already-submitted ones finish, then
    /// join the owner thread.
    ///
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self)
    {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.sender.send(Request::Stop);

        let thread = self.thread.lock().ok().and_then(|mut guard| guard.take());
        if let Some(thread) = thread {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => tracing::error!("Process owner thread panicked"),
                Err(err) => tracing::error!("Failed to join process owner thread: {err}"),
            }
        }
    }
}

impl<T: 'static> Drop for ProcessOwner<T>
{
    fn drop(&mut self)
    {
        // Let the thread drain and exit on its own.
        if !self.stopping.swap(true, Ordering::AcqRel) {
            let _ = self.sender.send(Request::Stop);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String
{
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
