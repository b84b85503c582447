//! Completion handles for asynchronous commands.
//!
//! Every session operation either returns a [`PendingReply`] right after the
//! command is queued, or takes a callback and returns a [`CommandToken`].
//! Callbacks run on the session's listener thread, interleaved with events
//! in the order the connection task produced them.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::SdkError;

/// Work run on the listener thread.
pub(crate) type Job = Box<dyn FnOnce() + Send>;

type Callback<T> = Box<dyn FnOnce(Result<T, SdkError>) + Send>;

/// Handle for posting callbacks onto the listener thread.
#[derive(Clone)]
pub(crate) struct CallbackQueue {
    post: Arc<dyn Fn(Job) + Send + Sync>,
}

impl CallbackQueue {
    pub(crate) fn new(post: impl Fn(Job) + Send + Sync + 'static) -> Self {
        Self {
            post: Arc::new(post),
        }
    }

    fn post(&self, job: Job) {
        (self.post)(job);
    }
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackQueue")
    }
}

enum Target<T> {
    Channel(oneshot::Sender<Result<T, SdkError>>),
    Callback(Callback<T>),
}

/// Sender half held by the session until the reply is known.
///
/// Dropping it undelivered resolves the reply to
/// [`SdkError::Disconnected`].
pub(crate) struct ReplySender<T> {
    target: Option<Target<T>>,
}

impl<T> ReplySender<T> {
    fn send(mut self, result: Result<T, SdkError>) {
        match self.target.take() {
            Some(Target::Channel(tx)) => {
                let _ = tx.send(result);
            }
            Some(Target::Callback(callback)) => callback(result),
            None => {}
        }
    }
}

impl<T> Drop for ReplySender<T> {
    fn drop(&mut self) {
        if let Some(Target::Callback(callback)) = self.target.take() {
            callback(Err(SdkError::Disconnected));
        }
    }
}

impl<T> fmt::Debug for ReplySender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.target {
            Some(Target::Channel(_)) => "channel",
            Some(Target::Callback(_)) => "callback",
            None => "delivered",
        };
        f.debug_tuple("ReplySender").field(&kind).finish()
    }
}

/// Create a linked sender/reply pair.
pub(crate) fn channel<T>() -> (ReplySender<T>, PendingReply<T>) {
    let (tx, rx) = oneshot::channel();
    let sender = ReplySender {
        target: Some(Target::Channel(tx)),
    };
    (sender, PendingReply { rx })
}

/// Create a sender whose result is handed to `callback` on `queue`.
///
/// The callback runs exactly once: with the reply, with
/// [`SdkError::Disconnected`] if the session drops the command, or with
/// [`SdkError::Cancelled`] if the token is cancelled first.
pub(crate) fn callback<T, F>(queue: &CallbackQueue, callback: F) -> (ReplySender<T>, CommandToken)
where
    T: Send + 'static,
    F: FnOnce(Result<T, SdkError>) + Send + 'static,
{
    let slot: Arc<Mutex<Option<Callback<T>>>> = Arc::new(Mutex::new(Some(Box::new(callback))));

    let fire = {
        let slot = slot.clone();
        let queue = queue.clone();
        move |result: Result<T, SdkError>| {
            if let Some(callback) = take(&slot) {
                queue.post(Box::new(move || callback(result)));
            }
        }
    };
    let cancel = {
        let queue = queue.clone();
        move || {
            if let Some(callback) = take(&slot) {
                queue.post(Box::new(move || callback(Err(SdkError::Cancelled))));
            }
        }
    };

    let sender = ReplySender {
        target: Some(Target::Callback(Box::new(fire))),
    };
    let token = CommandToken {
        cancel: Some(Box::new(cancel)),
    };
    (sender, token)
}

fn take<T>(slot: &Mutex<Option<Callback<T>>>) -> Option<Callback<T>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Deliver a result, ignoring a caller that stopped listening.
pub(crate) fn deliver<T>(sender: ReplySender<T>, result: Result<T, SdkError>) {
    sender.send(result);
}

/// The eventual result of a command.
///
/// If the session goes away before answering, the reply resolves to
/// [`SdkError::Disconnected`].
#[derive(Debug)]
pub struct PendingReply<T> {
    rx: oneshot::Receiver<Result<T, SdkError>>,
}

impl<T> PendingReply<T> {
    /// Block the current thread until the reply arrives.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async runtime. Use `.await` there.
    pub fn wait(self) -> Result<T, SdkError> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(SdkError::Disconnected))
    }
}

impl<T> Future for PendingReply<T> {
    type Output = Result<T, SdkError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|reply| reply.unwrap_or(Err(SdkError::Disconnected)))
    }
}

/// Cancels a callback-style command.
///
/// Dropping the token does not cancel.
pub struct CommandToken {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl CommandToken {
    /// Fail the callback with [`SdkError::Cancelled`] unless it already ran.
    ///
    /// The command itself may still execute on the VM; its reply is
    /// discarded.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for CommandToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandToken").finish_non_exhaustive()
    }
}
