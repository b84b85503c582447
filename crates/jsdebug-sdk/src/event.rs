//! Session events delivered to the attached listener.
//!
//! Events are produced on the session's dispatch sequence and handed to the
//! listener on a dedicated blocking thread, in wire order. Command callbacks
//! run on the same thread, so a callback and the events around its reply
//! are observed in the order they happened. The listener may therefore call
//! the `*_blocking` session APIs without deadlocking the session.

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::dialect::Dialect;
use crate::error::SdkError;
use crate::frame::StackFrame;
use crate::mirror::ValueMirror;
use crate::reply::{CallbackQueue, Job};
use crate::script::{Script, ScriptId};

/// Why the VM stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuspendReason {
    /// One or more breakpoints were hit.
    Breakpoint,
    /// An exception was thrown.
    Exception { uncaught: bool },
    /// A step command finished.
    Step,
    /// The client asked the VM to pause.
    Requested,
    /// Anything else, with the VM's own reason when it gave one.
    Other(String),
}

/// Everything known about one suspend.
#[derive(Debug, Clone)]
pub struct SuspendContext<D: Dialect> {
    pub reason: SuspendReason,
    /// Frames, top of the stack first.
    pub frames: Vec<StackFrame<D::Handle>>,
    /// Total stack depth, which may exceed `frames.len()` for a partial
    /// backtrace.
    pub total_frames: u32,
    pub breakpoints_hit: Vec<D::BreakpointId>,
    pub exception: Option<ValueMirror<D::Handle>>,
}

impl<D: Dialect> SuspendContext<D> {
    /// The frame the VM stopped in.
    pub fn top_frame(&self) -> Option<&StackFrame<D::Handle>> {
        self.frames.first()
    }
}

/// A message written to the page console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEntry {
    pub level: String,
    pub text: String,
    pub url: Option<String>,
    pub line: Option<u32>,
}

/// A session event.
#[derive(Debug, Clone)]
pub enum DebugEvent<D: Dialect> {
    Suspended(SuspendContext<D>),
    /// The VM suspended but the call stack could not be built.
    SuspendFailed(SdkError),
    Resumed,
    ScriptLoaded(Script),
    ScriptCollected(ScriptId),
    ConsoleMessage(ConsoleEntry),
    /// The inspected page navigated to a new URL.
    Navigated { url: String },
    /// The session is gone. Delivered once.
    Disconnected(String),
}

/// Receives session events.
///
/// Every method has a no-op default so implementors pick what they need.
pub trait DebugEventListener<D: Dialect>: Send + 'static {
    fn suspended(&mut self, _context: &SuspendContext<D>) {}

    fn suspend_failed(&mut self, _error: &SdkError) {}

    fn resumed(&mut self) {}

    fn script_loaded(&mut self, _script: &Script) {}

    fn script_collected(&mut self, _id: &ScriptId) {}

    fn console_message(&mut self, _message: &ConsoleEntry) {}

    fn navigated(&mut self, _url: &str) {}

    fn disconnected(&mut self, _reason: &str) {}

    /// Route one event to the matching method.
    fn handle(&mut self, event: DebugEvent<D>) {
        match &event {
            DebugEvent::Suspended(context) => self.suspended(context),
            DebugEvent::SuspendFailed(error) => self.suspend_failed(error),
            DebugEvent::Resumed => self.resumed(),
            DebugEvent::ScriptLoaded(script) => self.script_loaded(script),
            DebugEvent::ScriptCollected(id) => self.script_collected(id),
            DebugEvent::ConsoleMessage(message) => self.console_message(message),
            DebugEvent::Navigated { url } => self.navigated(url),
            DebugEvent::Disconnected(reason) => self.disconnected(reason),
        }
    }
}

/// Forward every event into a channel.
impl<D: Dialect> DebugEventListener<D> for mpsc::UnboundedSender<DebugEvent<D>> {
    fn handle(&mut self, event: DebugEvent<D>) {
        let _ = self.send(event);
    }
}

/// Ignore every event.
impl<D: Dialect> DebugEventListener<D> for () {}

/// One unit of work for the listener thread.
enum Dispatch<D: Dialect> {
    Event(DebugEvent<D>),
    Call(Job),
}

/// Producer side used by the session's dispatch sequence.
pub(crate) struct EventSink<D: Dialect> {
    tx: mpsc::UnboundedSender<Dispatch<D>>,
    disconnected: bool,
}

impl<D: Dialect> EventSink<D> {
    /// Start the listener thread.
    pub(crate) fn spawn<L: DebugEventListener<D>>(runtime: &Handle, mut listener: L) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch<D>>();
        runtime.spawn_blocking(move || {
            while let Some(work) = rx.blocking_recv() {
                match work {
                    Dispatch::Event(event) => listener.handle(event),
                    Dispatch::Call(job) => job(),
                }
            }
        });
        Self {
            tx,
            disconnected: false,
        }
    }

    /// Queue that runs command callbacks between events.
    ///
    /// Jobs posted after the listener thread has gone run inline.
    pub(crate) fn callbacks(&self) -> CallbackQueue {
        let tx = self.tx.clone();
        CallbackQueue::new(move |job| {
            let unsent = tx.send(Dispatch::Call(job));
            if let Err(mpsc::error::SendError(Dispatch::Call(job))) = unsent {
                job();
            }
        })
    }

    pub(crate) fn emit(&self, event: DebugEvent<D>) {
        if self.tx.send(Dispatch::Event(event)).is_err() {
            tracing::debug!(dialect = D::NAME, "event listener is gone");
        }
    }

    /// Emit `Disconnected` the first time only.
    pub(crate) fn disconnected(&mut self, reason: &str) {
        if !self.disconnected {
            self.disconnected = true;
            self.emit(DebugEvent::Disconnected(reason.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::V8;
    use crate::reply::{callback, deliver};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl DebugEventListener<V8> for Recorder {
        fn resumed(&mut self) {
            self.seen.lock().unwrap().push("resumed".into());
        }

        fn script_collected(&mut self, id: &ScriptId) {
            self.seen.lock().unwrap().push(format!("collected {id}"));
        }

        fn disconnected(&mut self, reason: &str) {
            self.seen.lock().unwrap().push(format!("disconnected: {reason}"));
        }
    }

    #[test]
    fn default_dispatch_reaches_overridden_methods() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = Recorder { seen: seen.clone() };
        recorder.handle(DebugEvent::Resumed);
        recorder.handle(DebugEvent::ScriptCollected(ScriptId::from(3)));
        recorder.handle(DebugEvent::Navigated { url: "x".into() });
        assert_eq!(*seen.lock().unwrap(), vec!["resumed", "collected 3"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sink_delivers_in_order_and_disconnects_once() {
        let (tx, mut rx) = mpsc::unbounded_channel::<DebugEvent<V8>>();
        let mut sink = EventSink::spawn(&Handle::current(), tx);
        sink.emit(DebugEvent::Resumed);
        sink.emit(DebugEvent::ScriptCollected(ScriptId::from(1)));
        sink.disconnected("closed by peer");
        sink.disconnected("again");
        drop(sink);

        assert!(matches!(rx.recv().await, Some(DebugEvent::Resumed)));
        assert!(matches!(rx.recv().await, Some(DebugEvent::ScriptCollected(_))));
        match rx.recv().await {
            Some(DebugEvent::Disconnected(reason)) => assert_eq!(reason, "closed by peer"),
            other => panic!("expected disconnect, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn callbacks_interleave_with_events() {
        let (tx, mut rx) = mpsc::unbounded_channel::<DebugEvent<V8>>();
        let sink = EventSink::spawn(&Handle::current(), tx.clone());
        let queue = sink.callbacks();

        let (reply, _token) = callback(&queue, move |result: Result<u32, SdkError>| {
            let _ = tx.send(DebugEvent::Navigated {
                url: format!("callback {}", result.unwrap()),
            });
        });
        sink.emit(DebugEvent::Resumed);
        deliver(reply, Ok(1));
        sink.emit(DebugEvent::ScriptCollected(ScriptId::from(2)));

        assert!(matches!(rx.recv().await, Some(DebugEvent::Resumed)));
        match rx.recv().await {
            Some(DebugEvent::Navigated { url }) => assert_eq!(url, "callback 1"),
            other => panic!("expected callback, got {other:?}"),
        }
        assert!(matches!(rx.recv().await, Some(DebugEvent::ScriptCollected(_))));
    }
}
