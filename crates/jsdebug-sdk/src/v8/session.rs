//! Public handle of a native debugger session.

use std::collections::HashMap;

use futures::future::try_join_all;
use jsdebug_protocol::v8::{DebuggerCommand, SourceBody, StepAction, SuccessResponse};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::breakpoint::{Breakpoint, BreakpointChange, BreakpointSpec};
use crate::dialect::V8;
use crate::error::SdkError;
use crate::event::{DebugEventListener, EventSink, SuspendContext};
use crate::frame::StackFrame;
use crate::mirror::{MappingId, ValueMirror};
use crate::options::SessionOptions;
use crate::reply::{self, CallbackQueue, CommandToken, PendingReply, ReplySender};
use crate::script::{Script, ScriptId};
use crate::state::SessionState;
use crate::transport::Wire;
use crate::v8::actor::{Actor, Op};

/// A session on the native V8 debugger protocol.
///
/// Cheap to clone; every clone talks to the same connection task. All
/// operations return immediately, either with a [`PendingReply`] or, for the
/// `*_with` forms, with a [`CommandToken`] while the callback waits for its
/// turn on the listener thread.
#[derive(Debug, Clone)]
pub struct DebugSession {
    ops: mpsc::UnboundedSender<Op>,
    callbacks: CallbackQueue,
    state: watch::Receiver<SessionState>,
    version: String,
}

impl DebugSession {
    /// Start a session over `wire` and perform the `version` handshake.
    ///
    /// Events go to `listener` on a dedicated thread, in wire order.
    pub async fn attach<L>(
        wire: Wire,
        options: SessionOptions,
        listener: L,
    ) -> Result<Self, SdkError>
    where
        L: DebugEventListener<V8>,
    {
        let runtime = Handle::current();
        let Wire { outgoing, incoming } = wire;
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Running);
        let events = EventSink::spawn(&runtime, listener);
        let callbacks = events.callbacks();
        let actor = Actor::new(outgoing, options, events, state_tx);
        runtime.spawn(actor.run(incoming, ops_rx));

        let mut session = Self {
            ops: ops_tx,
            callbacks,
            state: state_rx,
            version: String::new(),
        };
        session.version = session.request(|reply| Op::Version { reply }).await?;
        tracing::info!(version = %session.version, "attached to V8 debugger");
        Ok(session)
    }

    fn request<T>(&self, op: impl FnOnce(ReplySender<T>) -> Op) -> PendingReply<T> {
        let (tx, reply) = reply::channel();
        // A closed channel drops the sender, which resolves the reply
        // to `Disconnected`.
        let _ = self.ops.send(op(tx));
        reply
    }

    fn request_with<T, F>(
        &self,
        op: impl FnOnce(ReplySender<T>) -> Op,
        callback: F,
    ) -> CommandToken
    where
        T: Send + 'static,
        F: FnOnce(Result<T, SdkError>) + Send + 'static,
    {
        let (tx, token) = reply::callback(&self.callbacks, callback);
        let _ = self.ops.send(op(tx));
        token
    }

    /// VM version reported at attach.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Last published session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `target`.
    ///
    /// Fails with [`SdkError::Disconnected`] if the session ends first.
    pub async fn wait_for_state(&self, target: SessionState) -> Result<(), SdkError> {
        let mut state = self.state.clone();
        let result = state.wait_for(|s| *s == target || *s == SessionState::Detached).await;
        match result {
            Ok(reached) if *reached == target => Ok(()),
            _ => Err(SdkError::Disconnected),
        }
    }

    /// Send a raw command and get the VM's reply.
    pub fn command(&self, command: DebuggerCommand) -> PendingReply<SuccessResponse> {
        self.request(|reply| Op::Command { command, reply })
    }

    /// Send a raw command and run `callback` with the reply.
    ///
    /// The callback runs on the listener thread, after every event that
    /// arrived before the reply and before every event that arrived after.
    pub fn send_command<F>(&self, command: DebuggerCommand, callback: F) -> CommandToken
    where
        F: FnOnce(Result<SuccessResponse, SdkError>) + Send + 'static,
    {
        self.request_with(|reply| Op::Command { command, reply }, callback)
    }

    /// Evaluate `expression` in `frame`, in the top frame when suspended,
    /// or globally when running.
    pub fn evaluate(
        &self,
        expression: impl Into<String>,
        frame: Option<u32>,
    ) -> PendingReply<ValueMirror<i64>> {
        let expression = expression.into();
        self.request(|reply| Op::Evaluate {
            expression,
            frame,
            reply,
        })
    }

    /// Callback form of [`evaluate`](Self::evaluate).
    pub fn evaluate_with<F>(
        &self,
        expression: impl Into<String>,
        frame: Option<u32>,
        callback: F,
    ) -> CommandToken
    where
        F: FnOnce(Result<ValueMirror<i64>, SdkError>) + Send + 'static,
    {
        let expression = expression.into();
        self.request_with(
            |reply| Op::Evaluate {
                expression,
                frame,
                reply,
            },
            callback,
        )
    }

    pub fn evaluate_blocking(
        &self,
        expression: impl Into<String>,
        frame: Option<u32>,
    ) -> Result<ValueMirror<i64>, SdkError> {
        self.evaluate(expression, frame).wait()
    }

    /// Resume, optionally stepping `count` times.
    pub fn continue_vm(&self, step: Option<StepAction>, count: Option<u32>) -> PendingReply<()> {
        self.request(|reply| Op::Continue { step, count, reply })
    }

    /// Callback form of [`continue_vm`](Self::continue_vm). The callback
    /// runs before the listener sees [`DebugEvent::Resumed`](crate::DebugEvent).
    pub fn continue_with<F>(
        &self,
        step: Option<StepAction>,
        count: Option<u32>,
        callback: F,
    ) -> CommandToken
    where
        F: FnOnce(Result<(), SdkError>) + Send + 'static,
    {
        self.request_with(|reply| Op::Continue { step, count, reply }, callback)
    }

    pub fn continue_blocking(
        &self,
        step: Option<StepAction>,
        count: Option<u32>,
    ) -> Result<(), SdkError> {
        self.continue_vm(step, count).wait()
    }

    /// Ask a running VM to pause.
    pub fn suspend(&self) -> PendingReply<()> {
        self.request(|reply| Op::Suspend { reply })
    }

    /// Call stack of the current suspend.
    ///
    /// Resolves once the automatic backtrace is in. Fails with
    /// [`SdkError::InvalidState`] while running.
    pub fn backtrace(&self) -> PendingReply<SuspendContext<V8>> {
        self.request(|reply| Op::Backtrace { reply })
    }

    pub fn backtrace_blocking(&self) -> Result<SuspendContext<V8>, SdkError> {
        self.backtrace().wait()
    }

    pub fn set_breakpoint(&self, spec: BreakpointSpec) -> PendingReply<Breakpoint<i64>> {
        self.request(|reply| Op::SetBreakpoint { spec, reply })
    }

    /// Apply a partial update. Unset fields are not sent.
    pub fn change_breakpoint(&self, id: i64, change: BreakpointChange) -> PendingReply<()> {
        self.request(|reply| Op::ChangeBreakpoint { id, change, reply })
    }

    /// Remove a breakpoint.
    ///
    /// Clearing an id the session does not know, for example one already
    /// cleared, succeeds without contacting the VM.
    pub fn clear_breakpoint(&self, id: i64) -> PendingReply<()> {
        self.request(|reply| Op::ClearBreakpoint { id, reply })
    }

    /// Breakpoints the VM has accepted, by id.
    pub fn breakpoints(&self) -> PendingReply<Vec<Breakpoint<i64>>> {
        self.request(|reply| Op::Breakpoints { reply })
    }

    /// Every loaded script. Fetched from the VM on first use.
    pub fn scripts(&self) -> PendingReply<Vec<Script>> {
        self.request(|reply| Op::Scripts { reply })
    }

    pub fn scripts_blocking(&self) -> Result<Vec<Script>, SdkError> {
        self.scripts().wait()
    }

    pub fn script_source(&self, id: ScriptId) -> PendingReply<String> {
        self.request(|reply| Op::ScriptSource { id, reply })
    }

    /// Source lines around `frame` (the top frame when `None`).
    pub fn source(
        &self,
        frame: Option<u32>,
        from_line: Option<u32>,
        to_line: Option<u32>,
    ) -> PendingReply<SourceBody> {
        self.request(|reply| Op::Source {
            frame,
            from_line,
            to_line,
            reply,
        })
    }

    /// Select frame `number` on the VM and describe it.
    pub fn frame(&self, number: u32) -> PendingReply<StackFrame<i64>> {
        self.request(|reply| Op::Frame { number, reply })
    }

    /// Variable object of scope `scope` in frame `frame`.
    pub fn scope(&self, frame: u32, scope: u32) -> PendingReply<ValueMirror<i64>> {
        self.request(|reply| Op::Scope {
            frame,
            scope,
            reply,
        })
    }

    /// The per-suspend value mapping.
    pub fn value_mapping(&self) -> ValueMapping {
        ValueMapping {
            ops: self.ops.clone(),
        }
    }

    /// Close the session. Pending commands fail with
    /// [`SdkError::Disconnected`].
    pub fn detach(&self) -> PendingReply<()> {
        self.request(|reply| Op::Detach { reply })
    }
}

/// Value cache bound to the current suspend.
///
/// Native handles die when the VM resumes, so this mapping is cleared on
/// every resume and there is no permanent variant.
#[derive(Debug, Clone)]
pub struct ValueMapping {
    ops: mpsc::UnboundedSender<Op>,
}

impl ValueMapping {
    pub fn id(&self) -> MappingId {
        MappingId::SUSPEND
    }

    /// A complete mirror of `handle`, from the cache or the VM.
    ///
    /// Concurrent calls for the same handle share one `lookup`.
    pub fn get_or_load(&self, handle: i64) -> PendingReply<ValueMirror<i64>> {
        let (tx, reply) = reply::channel();
        let _ = self.ops.send(Op::Load {
            waiters: vec![(handle, tx)],
        });
        reply
    }

    /// Complete mirrors of several handles, with one `lookup` for all the
    /// handles not already cached.
    pub async fn get_or_load_properties(
        &self,
        handles: &[i64],
    ) -> Result<HashMap<i64, ValueMirror<i64>>, SdkError> {
        let mut distinct = handles.to_vec();
        distinct.sort_unstable();
        distinct.dedup();

        let mut waiters = Vec::with_capacity(distinct.len());
        let mut replies = Vec::with_capacity(distinct.len());
        for handle in distinct {
            let (tx, reply) = reply::channel();
            waiters.push((handle, tx));
            replies.push(reply);
        }
        let _ = self.ops.send(Op::Load { waiters });

        let mirrors = try_join_all(replies).await?;
        Ok(mirrors.into_iter().map(|m| (m.handle, m)).collect())
    }

    /// Drop every cached mirror. In-flight fetches are discarded.
    pub fn clear_caches(&self) {
        let _ = self.ops.send(Op::ClearCaches);
    }

    /// Fetch more of a truncated string and update the cache.
    ///
    /// Re-read the returned mirror; `value` itself is not updated.
    pub fn reload_truncated(&self, value: &ValueMirror<i64>) -> PendingReply<ValueMirror<i64>> {
        let (tx, reply) = reply::channel();
        let _ = self.ops.send(Op::ReloadTruncated {
            handle: value.handle,
            reply: tx,
        });
        reply
    }
}
