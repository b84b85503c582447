//! Public handle of an inspector session.

use std::collections::HashMap;

use futures::future::try_join_all;
use jsdebug_protocol::decode_fields;
use jsdebug_protocol::v8::StepAction;
use jsdebug_protocol::wip::{RawCommand, WipCommand};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::breakpoint::{Breakpoint, BreakpointChange, BreakpointSpec};
use crate::dialect::Wip;
use crate::error::SdkError;
use crate::event::{DebugEventListener, EventSink, SuspendContext};
use crate::mirror::{MappingId, ValueMirror};
use crate::reply::{self, CallbackQueue, CommandToken, PendingReply, ReplySender};
use crate::script::{Script, ScriptId};
use crate::state::SessionState;
use crate::transport::Wire;
use crate::wip::actor::{Actor, Op};

/// A session on the WebSocket Inspector protocol.
///
/// Cheap to clone; every clone talks to the same connection task.
#[derive(Debug, Clone)]
pub struct WipSession {
    ops: mpsc::UnboundedSender<Op>,
    callbacks: CallbackQueue,
    state: watch::Receiver<SessionState>,
}

impl WipSession {
    /// Start a session over `wire` and enable the debugger domain.
    ///
    /// Scripts the page already has are reported while enabling, so
    /// [`scripts`](Self::scripts) is complete once this returns.
    pub async fn attach<L>(wire: Wire, listener: L) -> Result<Self, SdkError>
    where
        L: DebugEventListener<Wip>,
    {
        let runtime = Handle::current();
        let Wire { outgoing, incoming } = wire;
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Running);
        let events = EventSink::spawn(&runtime, listener);
        let callbacks = events.callbacks();
        runtime.spawn(Actor::new(outgoing, events, state_tx).run(incoming, ops_rx));

        let session = Self {
            ops: ops_tx,
            callbacks,
            state: state_rx,
        };
        session.request(|reply| Op::Enable { reply }).await?;
        tracing::info!("attached to inspector");
        Ok(session)
    }

    fn request<T>(&self, op: impl FnOnce(ReplySender<T>) -> Op) -> PendingReply<T> {
        let (tx, reply) = reply::channel();
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

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `target`.
    pub async fn wait_for_state(&self, target: SessionState) -> Result<(), SdkError> {
        let mut state = self.state.clone();
        let result = state
            .wait_for(|s| *s == target || *s == SessionState::Detached)
            .await;
        match result {
            Ok(reached) if *reached == target => Ok(()),
            _ => Err(SdkError::Disconnected),
        }
    }

    /// Send a typed command and decode its result.
    pub async fn command<C: WipCommand>(&self, command: &C) -> Result<C::Response, SdkError> {
        let command = RawCommand::new(command)?;
        let result = self.raw_command(command).await?;
        Ok(decode_fields(C::METHOD, &result)?)
    }

    /// Send a pre-serialized command; resolves to its raw `result`.
    pub fn raw_command(&self, command: RawCommand) -> PendingReply<Value> {
        self.request(|reply| Op::Command { command, reply })
    }

    /// Send a pre-serialized command and run `callback` with the result
    /// on the listener thread, in order with events.
    pub fn send_command<F>(&self, command: RawCommand, callback: F) -> CommandToken
    where
        F: FnOnce(Result<Value, SdkError>) + Send + 'static,
    {
        self.request_with(|reply| Op::Command { command, reply }, callback)
    }

    /// Evaluate in `frame`, the top frame when suspended, or globally.
    ///
    /// The result belongs to the suspend mapping.
    pub fn evaluate(
        &self,
        expression: impl Into<String>,
        frame: Option<u32>,
    ) -> PendingReply<ValueMirror<String>> {
        self.value_mapping().evaluate(expression, frame)
    }

    /// Callback form of [`evaluate`](Self::evaluate).
    pub fn evaluate_with<F>(
        &self,
        expression: impl Into<String>,
        frame: Option<u32>,
        callback: F,
    ) -> CommandToken
    where
        F: FnOnce(Result<ValueMirror<String>, SdkError>) + Send + 'static,
    {
        let expression = expression.into();
        self.request_with(
            |reply| Op::Evaluate {
                expression,
                frame,
                mapping: MappingId::SUSPEND,
                reply,
            },
            callback,
        )
    }

    pub fn evaluate_blocking(
        &self,
        expression: impl Into<String>,
        frame: Option<u32>,
    ) -> Result<ValueMirror<String>, SdkError> {
        self.evaluate(expression, frame).wait()
    }

    /// Resume or step. Resolves when the VM accepts the command; the
    /// session turns `Running` on `Debugger.resumed`.
    pub fn continue_vm(&self, step: Option<StepAction>) -> PendingReply<()> {
        self.request(|reply| Op::Continue { step, reply })
    }

    /// Callback form of [`continue_vm`](Self::continue_vm).
    pub fn continue_with<F>(&self, step: Option<StepAction>, callback: F) -> CommandToken
    where
        F: FnOnce(Result<(), SdkError>) + Send + 'static,
    {
        self.request_with(|reply| Op::Continue { step, reply }, callback)
    }

    pub fn continue_blocking(&self, step: Option<StepAction>) -> Result<(), SdkError> {
        self.continue_vm(step).wait()
    }

    pub fn suspend(&self) -> PendingReply<()> {
        self.request(|reply| Op::Suspend { reply })
    }

    /// Call stack of the current suspend, as reported by `Debugger.paused`.
    pub fn backtrace(&self) -> PendingReply<SuspendContext<Wip>> {
        self.request(|reply| Op::Backtrace { reply })
    }

    pub fn backtrace_blocking(&self) -> Result<SuspendContext<Wip>, SdkError> {
        self.backtrace().wait()
    }

    /// Only script-name (URL) and script-regexp targets are supported.
    pub fn set_breakpoint(&self, spec: BreakpointSpec) -> PendingReply<Breakpoint<String>> {
        self.request(|reply| Op::SetBreakpoint { spec, reply })
    }

    /// Apply a partial update and return the breakpoint as now known.
    ///
    /// The inspector cannot edit a breakpoint in place: a new condition or
    /// enabled flag re-creates it, and the returned id replaces `id`.
    pub fn change_breakpoint(
        &self,
        id: impl Into<String>,
        change: BreakpointChange,
    ) -> PendingReply<Breakpoint<String>> {
        let id = id.into();
        self.request(|reply| Op::ChangeBreakpoint { id, change, reply })
    }

    pub fn clear_breakpoint(&self, id: impl Into<String>) -> PendingReply<()> {
        let id = id.into();
        self.request(|reply| Op::ClearBreakpoint { id, reply })
    }

    /// Turn every breakpoint on or off at once.
    pub fn set_breakpoints_active(&self, active: bool) -> PendingReply<()> {
        self.request(|reply| Op::SetBreakpointsActive { active, reply })
    }

    pub fn breakpoints(&self) -> PendingReply<Vec<Breakpoint<String>>> {
        self.request(|reply| Op::Breakpoints { reply })
    }

    pub fn scripts(&self) -> PendingReply<Vec<Script>> {
        self.request(|reply| Op::Scripts { reply })
    }

    pub fn scripts_blocking(&self) -> Result<Vec<Script>, SdkError> {
        self.scripts().wait()
    }

    pub fn script_source(&self, id: ScriptId) -> PendingReply<String> {
        self.request(|reply| Op::ScriptSource { id, reply })
    }

    /// Reload the inspected page.
    pub fn reload_page(&self, ignore_cache: bool) -> PendingReply<()> {
        self.request(|reply| Op::ReloadPage {
            ignore_cache,
            reply,
        })
    }

    /// The per-suspend value mapping. Cleared on every resume.
    pub fn value_mapping(&self) -> WipValueMapping {
        WipValueMapping {
            id: MappingId::SUSPEND,
            ops: self.ops.clone(),
        }
    }

    /// A mapping whose values survive resumes until it is released.
    ///
    /// `name` becomes the object group of its values. It must be non-empty
    /// and differ from every live mapping's group, including
    /// [`SUSPEND_GROUP`](crate::wip::SUSPEND_GROUP); otherwise this fails
    /// with [`SdkError::InvalidArgument`].
    pub async fn create_permanent_mapping(
        &self,
        name: impl Into<String>,
    ) -> Result<WipValueMapping, SdkError> {
        let name = name.into();
        let id = self.request(|reply| Op::CreateMapping { name, reply }).await?;
        Ok(WipValueMapping {
            id,
            ops: self.ops.clone(),
        })
    }

    pub fn detach(&self) -> PendingReply<()> {
        self.request(|reply| Op::Detach { reply })
    }
}

/// A value cache backed by one inspector object group.
#[derive(Debug, Clone)]
pub struct WipValueMapping {
    id: MappingId,
    ops: mpsc::UnboundedSender<Op>,
}

impl WipValueMapping {
    pub fn id(&self) -> MappingId {
        self.id
    }

    /// Evaluate with results held by this mapping's object group.
    pub fn evaluate(
        &self,
        expression: impl Into<String>,
        frame: Option<u32>,
    ) -> PendingReply<ValueMirror<String>> {
        let (tx, reply) = reply::channel();
        let _ = self.ops.send(Op::Evaluate {
            expression: expression.into(),
            frame,
            mapping: self.id,
            reply: tx,
        });
        reply
    }

    /// A complete mirror of `handle`, with its own properties.
    pub fn get_or_load(&self, handle: impl Into<String>) -> PendingReply<ValueMirror<String>> {
        let (tx, reply) = reply::channel();
        let _ = self.ops.send(Op::Load {
            mapping: self.id,
            waiters: vec![(handle.into(), tx)],
        });
        reply
    }

    /// Complete mirrors of several handles; each is fetched at most once.
    pub async fn get_or_load_properties(
        &self,
        handles: &[String],
    ) -> Result<HashMap<String, ValueMirror<String>>, SdkError> {
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
        let _ = self.ops.send(Op::Load {
            mapping: self.id,
            waiters,
        });

        let mirrors = try_join_all(replies).await?;
        Ok(mirrors
            .into_iter()
            .map(|m| (m.handle.clone(), m))
            .collect())
    }

    /// Drop every cached mirror; remote objects stay alive.
    pub fn clear_caches(&self) {
        let _ = self.ops.send(Op::ClearCaches { mapping: self.id });
    }

    /// Release the object group and forget the mapping. The suspend
    /// mapping cannot be released.
    pub fn release(&self) -> PendingReply<()> {
        let (tx, reply) = reply::channel();
        let _ = self.ops.send(Op::ReleaseMapping {
            mapping: self.id,
            reply: tx,
        });
        reply
    }
}
