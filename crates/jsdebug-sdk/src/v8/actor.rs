//! Connection task of a native session.
//!
//! One task owns the session: the state machine, the pending-command table,
//! the breakpoint table, the script registry and the suspend mapping. It
//! drains wire messages before queued operations so a reply is always
//! applied before anything issued after it was read.

use std::collections::HashMap;

use jsdebug_protocol::binding::parse;
use jsdebug_protocol::v8::{
    AfterCompileBody, BacktraceArgs, BacktraceBody, BreakEventBody, BreakpointBody,
    BreakpointTargetType, ChangeBreakpointArgs, ClearBreakpointArgs, CommandResponse,
    ContinueArgs, DebuggerCommand, EvaluateArgs, EventKind, EventNotification, FrameArgs,
    FrameObject, IncomingMessage, LookupArgs, ScopeArgs, ScopeBody, ScriptCollectedBody,
    ScriptHandle, ScriptsArgs, SetBreakpointArgs, SourceArgs, SourceBody, StepAction,
    SuccessResponse, ValueHandle, VersionBody, SCRIPT_TYPE_NORMAL,
};
use jsdebug_protocol::decode;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use crate::breakpoint::{
    Breakpoint, BreakpointChange, BreakpointSpec, BreakpointTable, BreakpointTarget,
};
use crate::dialect::V8;
use crate::dispatcher::{PendingTable, SeqAllocator};
use crate::error::SdkError;
use crate::event::{DebugEvent, EventSink, SuspendContext, SuspendReason};
use crate::frame::StackFrame;
use crate::mirror::{FetchPlan, MirrorCache, MirrorData, ValueMirror, Waiter};
use crate::options::SessionOptions;
use crate::reply::{deliver, ReplySender};
use crate::script::{Script, ScriptId, ScriptRegistry};
use crate::state::{SessionMachine, SessionState};
use crate::transport::WireEvent;
use crate::v8::backtrace::{build_frame, build_frames};
use crate::v8::values::{
    mirror_from_handle, mirror_from_ref, script_from_handle, script_from_ref, RefTable,
};

/// Requests from session handles to the connection task.
#[derive(Debug)]
pub(crate) enum Op {
    Version {
        reply: ReplySender<String>,
    },
    Command {
        command: DebuggerCommand,
        reply: ReplySender<SuccessResponse>,
    },
    Evaluate {
        expression: String,
        frame: Option<u32>,
        reply: ReplySender<ValueMirror<i64>>,
    },
    Continue {
        step: Option<StepAction>,
        count: Option<u32>,
        reply: ReplySender<()>,
    },
    Suspend {
        reply: ReplySender<()>,
    },
    Backtrace {
        reply: ReplySender<SuspendContext<V8>>,
    },
    SetBreakpoint {
        spec: BreakpointSpec,
        reply: ReplySender<Breakpoint<i64>>,
    },
    ChangeBreakpoint {
        id: i64,
        change: BreakpointChange,
        reply: ReplySender<()>,
    },
    ClearBreakpoint {
        id: i64,
        reply: ReplySender<()>,
    },
    Breakpoints {
        reply: ReplySender<Vec<Breakpoint<i64>>>,
    },
    Scripts {
        reply: ReplySender<Vec<Script>>,
    },
    ScriptSource {
        id: ScriptId,
        reply: ReplySender<String>,
    },
    Source {
        frame: Option<u32>,
        from_line: Option<u32>,
        to_line: Option<u32>,
        reply: ReplySender<SourceBody>,
    },
    Frame {
        number: u32,
        reply: ReplySender<StackFrame<i64>>,
    },
    Scope {
        frame: u32,
        scope: u32,
        reply: ReplySender<ValueMirror<i64>>,
    },
    Load {
        waiters: Vec<(i64, Waiter<i64>)>,
    },
    ReloadTruncated {
        handle: i64,
        reply: ReplySender<ValueMirror<i64>>,
    },
    ClearCaches,
    Detach {
        reply: ReplySender<()>,
    },
}

/// What the automatic backtrace reports once it completes.
struct SuspendDetails {
    reason: SuspendReason,
    breakpoints_hit: Vec<i64>,
    exception: Option<ValueMirror<i64>>,
}

/// Bookkeeping for a command on the wire.
enum Pending {
    Version(ReplySender<String>),
    Command(ReplySender<SuccessResponse>),
    Evaluate {
        generation: u64,
        reply: ReplySender<ValueMirror<i64>>,
    },
    Continue {
        epoch: u64,
        reply: ReplySender<()>,
    },
    Suspend(ReplySender<()>),
    Backtrace {
        epoch: u64,
        details: SuspendDetails,
    },
    SetBreakpoint {
        spec: BreakpointSpec,
        reply: ReplySender<Breakpoint<i64>>,
    },
    ChangeBreakpoint {
        id: i64,
        change: BreakpointChange,
        reply: ReplySender<()>,
    },
    ClearBreakpoint {
        id: i64,
        reply: ReplySender<()>,
    },
    Scripts,
    ScriptSource {
        id: ScriptId,
        reply: ReplySender<String>,
    },
    Source(ReplySender<SourceBody>),
    Frame(ReplySender<StackFrame<i64>>),
    Scope {
        generation: u64,
        reply: ReplySender<ValueMirror<i64>>,
    },
    /// Shared fetch; waiters live in the cache.
    Lookup {
        generation: u64,
        handles: Vec<i64>,
    },
    /// Fetch of an uncacheable handle for one caller.
    LookupDirect {
        handle: i64,
        reply: ReplySender<ValueMirror<i64>>,
    },
    Reload {
        generation: u64,
        handle: i64,
        reply: ReplySender<ValueMirror<i64>>,
    },
}

/// A command on the wire with the cache generation it was issued under.
struct InFlight {
    generation: u64,
    pending: Pending,
}

/// The current suspend's call stack: `None` while the backtrace is in flight.
type ContextSlot = Option<Result<SuspendContext<V8>, SdkError>>;

pub(crate) struct Actor {
    wire: mpsc::UnboundedSender<String>,
    seq: SeqAllocator,
    pending: PendingTable<InFlight>,
    machine: SessionMachine,
    state_tx: watch::Sender<SessionState>,
    events: EventSink<V8>,
    options: SessionOptions,
    cache: MirrorCache<i64>,
    breakpoints: BreakpointTable<i64>,
    scripts: ScriptRegistry,
    script_waiters: Vec<ReplySender<Vec<Script>>>,
    context: ContextSlot,
    context_waiters: Vec<ReplySender<SuspendContext<V8>>>,
    /// Set while a step command is outstanding, so the next break reads as a
    /// step completion.
    stepping: bool,
}

impl Actor {
    pub(crate) fn new(
        wire: mpsc::UnboundedSender<String>,
        options: SessionOptions,
        events: EventSink<V8>,
        state_tx: watch::Sender<SessionState>,
    ) -> Self {
        Self {
            wire,
            seq: SeqAllocator::new(),
            pending: PendingTable::new(),
            machine: SessionMachine::new(),
            state_tx,
            events,
            options,
            cache: MirrorCache::new(),
            breakpoints: BreakpointTable::new(),
            scripts: ScriptRegistry::new(),
            script_waiters: Vec::new(),
            context: None,
            context_waiters: Vec::new(),
            stepping: false,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut incoming: mpsc::UnboundedReceiver<WireEvent>,
        mut ops: mpsc::UnboundedReceiver<Op>,
    ) {
        loop {
            tokio::select! {
                biased;
                event = incoming.recv() => match event {
                    Some(WireEvent::Message(text)) => self.handle_message(&text),
                    Some(WireEvent::Closed(reason)) => {
                        self.shutdown(&reason);
                        break;
                    }
                    None => {
                        self.shutdown("connection closed");
                        break;
                    }
                },
                op = ops.recv() => match op {
                    Some(Op::Detach { reply }) => {
                        self.shutdown("detached by client");
                        deliver(reply, Ok(()));
                        break;
                    }
                    Some(op) => self.handle_op(op),
                    None => {
                        self.shutdown("session dropped");
                        break;
                    }
                },
            }
        }
        tracing::debug!(dialect = "v8", "session task finished");
    }

    // -----------------------------------------------------------------------
    // Outgoing
    // -----------------------------------------------------------------------

    fn send(&mut self, command: DebuggerCommand, pending: Pending) {
        let seq = self.seq.next();
        let text = match command.to_text(seq) {
            Ok(text) => text,
            Err(e) => {
                self.fail(pending, e.into());
                return;
            }
        };
        if self.wire.send(text).is_err() {
            self.fail(pending, SdkError::Disconnected);
            return;
        }
        let generation = self.cache.generation();
        self.pending
            .register(seq, command.name(), InFlight { generation, pending });
    }

    fn handle_op(&mut self, op: Op) {
        match op {
            Op::Version { reply } => self.send(DebuggerCommand::Version, Pending::Version(reply)),
            Op::Command { command, reply } => self.send(command, Pending::Command(reply)),
            Op::Evaluate {
                expression,
                frame,
                reply,
            } => self.evaluate(expression, frame, reply),
            Op::Continue { step, count, reply } => {
                if let Err(e) = self.machine.require_suspended("continue") {
                    deliver(reply, Err(e));
                    return;
                }
                self.stepping = step.is_some();
                let epoch = self.machine.suspend_epoch();
                let args = ContinueArgs {
                    stepaction: step,
                    stepcount: step.and(count),
                };
                self.send(DebuggerCommand::Continue(args), Pending::Continue { epoch, reply });
            }
            Op::Suspend { reply } => {
                if let Err(e) = self.machine.require_running("suspend") {
                    deliver(reply, Err(e));
                    return;
                }
                self.send(DebuggerCommand::Suspend, Pending::Suspend(reply));
            }
            Op::Backtrace { reply } => {
                if let Err(e) = self.machine.require_suspended("get backtrace") {
                    deliver(reply, Err(e));
                    return;
                }
                match &self.context {
                    Some(result) => deliver(reply, result.clone()),
                    None => self.context_waiters.push(reply),
                }
            }
            Op::SetBreakpoint { spec, reply } => self.set_breakpoint(spec, reply),
            Op::ChangeBreakpoint { id, change, reply } => {
                if !self.breakpoints.contains(&id) {
                    deliver(reply, Err(SdkError::UnknownBreakpoint(id.to_string())));
                    return;
                }
                let args = ChangeBreakpointArgs {
                    breakpoint: id,
                    enabled: change.enabled,
                    condition: change.condition.clone(),
                    ignore_count: change.effective_ignore_count(),
                };
                self.send(
                    DebuggerCommand::ChangeBreakpoint(args),
                    Pending::ChangeBreakpoint { id, change, reply },
                );
            }
            Op::ClearBreakpoint { id, reply } => {
                if !self.breakpoints.contains(&id) {
                    tracing::debug!(id, "breakpoint already cleared");
                    deliver(reply, Ok(()));
                    return;
                }
                self.send(
                    DebuggerCommand::ClearBreakpoint(ClearBreakpointArgs { breakpoint: id }),
                    Pending::ClearBreakpoint { id, reply },
                );
            }
            Op::Breakpoints { reply } => {
                let mut all: Vec<_> = self.breakpoints.all().cloned().collect();
                all.sort_by_key(|bp| bp.id);
                deliver(reply, Ok(all));
            }
            Op::Scripts { reply } => {
                if self.scripts.is_loaded() {
                    deliver(reply, Ok(self.scripts.all()));
                    return;
                }
                self.script_waiters.push(reply);
                if self.script_waiters.len() == 1 {
                    let args = ScriptsArgs {
                        types: Some(SCRIPT_TYPE_NORMAL),
                        include_source: Some(false),
                        ..Default::default()
                    };
                    self.send(DebuggerCommand::Scripts(args), Pending::Scripts);
                }
            }
            Op::ScriptSource { id, reply } => {
                if let Some(source) = self.scripts.get(&id).and_then(|s| s.source.clone()) {
                    deliver(reply, Ok(source));
                    return;
                }
                let Some(numeric) = id.as_i64() else {
                    deliver(
                        reply,
                        Err(SdkError::ProtocolLogic(format!("script id {id} is not numeric"))),
                    );
                    return;
                };
                let args = ScriptsArgs {
                    ids: Some(vec![numeric]),
                    include_source: Some(true),
                    ..Default::default()
                };
                self.send(
                    DebuggerCommand::Scripts(args),
                    Pending::ScriptSource { id, reply },
                );
            }
            Op::Source {
                frame,
                from_line,
                to_line,
                reply,
            } => {
                if let Err(e) = self.machine.require_suspended("get source") {
                    deliver(reply, Err(e));
                    return;
                }
                let args = SourceArgs {
                    frame,
                    from_line,
                    to_line,
                };
                self.send(DebuggerCommand::Source(args), Pending::Source(reply));
            }
            Op::Frame { number, reply } => {
                if let Err(e) = self.machine.require_suspended("select frame") {
                    deliver(reply, Err(e));
                    return;
                }
                self.send(
                    DebuggerCommand::Frame(FrameArgs { number }),
                    Pending::Frame(reply),
                );
            }
            Op::Scope {
                frame,
                scope,
                reply,
            } => {
                if let Err(e) = self.machine.require_suspended("load scope") {
                    deliver(reply, Err(e));
                    return;
                }
                let args = ScopeArgs {
                    number: scope,
                    frame_number: Some(frame),
                    inline_refs: Some(true),
                    ..Default::default()
                };
                let generation = self.cache.generation();
                self.send(
                    DebuggerCommand::Scope(args),
                    Pending::Scope { generation, reply },
                );
            }
            Op::Load { waiters } => self.load(waiters),
            Op::ReloadTruncated { handle, reply } => self.reload_truncated(handle, reply),
            Op::ClearCaches => self.cache.clear(),
            // Handled by the run loop.
            Op::Detach { reply } => deliver(reply, Ok(())),
        }
    }

    fn evaluate(
        &mut self,
        expression: String,
        frame: Option<u32>,
        reply: ReplySender<ValueMirror<i64>>,
    ) {
        let check = match frame {
            Some(_) => self.machine.require_suspended("evaluate in frame"),
            None => self.machine.require_attached("evaluate"),
        };
        if let Err(e) = check {
            deliver(reply, Err(e));
            return;
        }
        let running = self.machine.state() == SessionState::Running;
        let args = EvaluateArgs {
            expression,
            frame,
            global: running.then_some(true),
            disable_break: Some(true),
            inline_refs: Some(true),
            ..Default::default()
        };
        let generation = self.cache.generation();
        self.send(
            DebuggerCommand::Evaluate(args),
            Pending::Evaluate { generation, reply },
        );
    }

    fn set_breakpoint(&mut self, spec: BreakpointSpec, reply: ReplySender<Breakpoint<i64>>) {
        let (target_type, target) = match &spec.target {
            BreakpointTarget::ScriptName(name) => (BreakpointTargetType::ScriptName, json!(name)),
            BreakpointTarget::ScriptId(id) => match id.as_i64() {
                Some(numeric) => (BreakpointTargetType::ScriptId, json!(numeric)),
                None => {
                    deliver(
                        reply,
                        Err(SdkError::ProtocolLogic(format!("script id {id} is not numeric"))),
                    );
                    return;
                }
            },
            BreakpointTarget::ScriptRegExp(pattern) => {
                (BreakpointTargetType::ScriptRegExp, json!(pattern))
            }
            BreakpointTarget::Function(expression) => {
                (BreakpointTargetType::Function, json!(expression))
            }
        };
        let args = SetBreakpointArgs {
            target_type,
            target,
            line: spec.line,
            column: spec.column,
            enabled: spec.enabled,
            condition: spec.condition.clone(),
            ignore_count: spec.ignore_count.effective(),
        };
        self.send(
            DebuggerCommand::SetBreakpoint(args),
            Pending::SetBreakpoint { spec, reply },
        );
    }

    fn load(&mut self, waiters: Vec<(i64, Waiter<i64>)>) {
        let mut fetch = Vec::new();
        for (handle, waiter) in waiters {
            match self.cache.request(&handle, waiter) {
                FetchPlan::Served | FetchPlan::Joined => {}
                FetchPlan::Fetch => fetch.push(handle),
                FetchPlan::Uncacheable(reply) => {
                    let args = self.lookup_args(vec![handle], self.options.max_string_length);
                    self.send(
                        DebuggerCommand::Lookup(args),
                        Pending::LookupDirect { handle, reply },
                    );
                }
            }
        }
        if fetch.is_empty() {
            return;
        }
        let generation = self.cache.generation();
        let args = self.lookup_args(fetch.clone(), self.options.max_string_length);
        self.send(
            DebuggerCommand::Lookup(args),
            Pending::Lookup {
                generation,
                handles: fetch,
            },
        );
    }

    fn reload_truncated(&mut self, handle: i64, reply: ReplySender<ValueMirror<i64>>) {
        let loaded = match self.cache.get(&handle) {
            Some(mirror) => match mirror.truncation() {
                Some(truncation) => truncation.loaded,
                None if mirror.is_complete() => {
                    deliver(reply, Ok(mirror.clone()));
                    return;
                }
                None => 0,
            },
            None => 0,
        };
        let limit = self.options.reload_limit(loaded);
        let generation = self.cache.generation();
        let args = self.lookup_args(vec![handle], Some(limit));
        self.send(
            DebuggerCommand::Lookup(args),
            Pending::Reload {
                generation,
                handle,
                reply,
            },
        );
    }

    fn lookup_args(&self, handles: Vec<i64>, max_string_length: Option<u64>) -> LookupArgs {
        LookupArgs {
            handles,
            include_source: None,
            inline_refs: Some(true),
            max_string_length,
        }
    }

    fn request_backtrace(&mut self, epoch: u64, details: SuspendDetails) {
        let args = BacktraceArgs {
            from_frame: self.options.backtrace_from,
            to_frame: self.options.backtrace_to,
            compact_format: self.options.compact_backtrace.then_some(true),
            inline_refs: Some(true),
        };
        self.send(
            DebuggerCommand::Backtrace(args),
            Pending::Backtrace { epoch, details },
        );
    }

    // -----------------------------------------------------------------------
    // Incoming
    // -----------------------------------------------------------------------

    fn handle_message(&mut self, text: &str) {
        let raw = match parse(text) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unparseable message");
                return;
            }
        };
        match decode::<IncomingMessage>(&raw) {
            Ok(IncomingMessage::Response(response)) => self.handle_response(response),
            Ok(IncomingMessage::Event(event)) => self.handle_event(event),
            Err(e) => match raw.get("request_seq").and_then(Value::as_u64) {
                Some(seq) => {
                    if let Some(in_flight) = self.pending.resolve(seq) {
                        self.fail(in_flight.pending, e.into());
                    }
                }
                None => tracing::warn!(error = %e, "dropping undecodable message"),
            },
        }
    }

    fn handle_response(&mut self, response: CommandResponse) {
        let Some(InFlight {
            generation,
            pending,
        }) = self.pending.resolve(response.request_seq())
        else {
            return;
        };
        match response {
            CommandResponse::Success(ok) => self.complete(generation, pending, ok),
            CommandResponse::Failure(failed) => {
                let err = SdkError::Remote {
                    command: failed
                        .command
                        .unwrap_or_else(|| pending.command().to_string()),
                    message: failed.message,
                };
                self.fail(pending, err);
            }
        }
    }

    fn complete(&mut self, generation: u64, pending: Pending, ok: SuccessResponse) {
        let refs = RefTable::from_refs(&ok.refs);
        // Handles in a reply to a command from before the last clear are
        // no longer valid.
        if generation == self.cache.generation() {
            self.merge_refs(&refs);
        } else {
            tracing::debug!(
                command = pending.command(),
                generation,
                "ignoring references of a stale reply"
            );
        }

        match pending {
            Pending::Version(reply) => {
                let result = ok
                    .body_as::<VersionBody>("VersionBody")
                    .map(|body| body.v8_version)
                    .map_err(SdkError::from);
                if result.is_ok()
                    && ok.running == Some(false)
                    && self.machine.state() == SessionState::Running
                {
                    tracing::info!("VM is already suspended");
                    self.enter_suspend(SuspendDetails {
                        reason: SuspendReason::Other("attached while suspended".into()),
                        breakpoints_hit: Vec::new(),
                        exception: None,
                    });
                }
                deliver(reply, result);
            }
            Pending::Command(reply) => deliver(reply, Ok(ok)),
            Pending::Evaluate { generation, reply } => {
                let result = ok
                    .body_as::<ValueHandle>("ValueHandle")
                    .map_err(SdkError::from)
                    .map(|value| self.store(generation, mirror_from_handle(&value)));
                deliver(reply, result);
            }
            Pending::Continue { epoch, reply } => {
                let resumed = self.machine.confirm_continue(epoch, ok.running);
                if resumed {
                    self.invalidate_context(SdkError::ContextDismissed);
                    self.publish();
                }
                deliver(reply, Ok(()));
                if resumed {
                    self.events.emit(DebugEvent::Resumed);
                }
            }
            Pending::Suspend(reply) => {
                if self.machine.state() == SessionState::Running {
                    self.enter_suspend(SuspendDetails {
                        reason: SuspendReason::Requested,
                        breakpoints_hit: Vec::new(),
                        exception: None,
                    });
                }
                deliver(reply, Ok(()));
            }
            Pending::Backtrace { epoch, details } => {
                self.finish_backtrace(epoch, details, &ok, &refs)
            }
            Pending::SetBreakpoint { spec, reply } => {
                let result = ok
                    .body_as::<BreakpointBody>("BreakpointBody")
                    .map_err(SdkError::from)
                    .map(|body| {
                        let mut breakpoint = Breakpoint::new(body.breakpoint, spec);
                        breakpoint.actual_line = body.line;
                        breakpoint.actual_column = body.column;
                        self.breakpoints.insert(breakpoint.clone());
                        tracing::debug!(
                            id = breakpoint.id,
                            target = %breakpoint.spec.target,
                            "breakpoint set"
                        );
                        breakpoint
                    });
                deliver(reply, result);
            }
            Pending::ChangeBreakpoint { id, change, reply } => {
                deliver(reply, self.breakpoints.apply(&id, &change));
            }
            Pending::ClearBreakpoint { id, reply } => {
                self.breakpoints.remove(&id);
                deliver(reply, Ok(()));
            }
            Pending::Scripts => {
                let result = ok
                    .body_as::<Vec<ScriptHandle>>("ScriptHandle")
                    .map_err(SdkError::from)
                    .map(|handles| {
                        for handle in &handles {
                            self.scripts.add(script_from_handle(handle));
                        }
                        self.scripts.mark_loaded();
                        self.scripts.all()
                    });
                for waiter in std::mem::take(&mut self.script_waiters) {
                    deliver(waiter, result.clone());
                }
            }
            Pending::ScriptSource { id, reply } => {
                let result = ok
                    .body_as::<Vec<ScriptHandle>>("ScriptHandle")
                    .map_err(SdkError::from)
                    .and_then(|handles| {
                        let script = handles
                            .iter()
                            .find(|h| ScriptId::from(h.id) == id)
                            .ok_or_else(|| {
                                SdkError::ProtocolLogic(format!("no script with id {id}"))
                            })?;
                        let source = script.source.clone().ok_or_else(|| {
                            SdkError::ProtocolLogic(format!("no source for script {id}"))
                        })?;
                        self.scripts.add(script_from_handle(script));
                        Ok(source)
                    });
                deliver(reply, result);
            }
            Pending::Source(reply) => {
                deliver(reply, ok.body_as("SourceBody").map_err(SdkError::from));
            }
            Pending::Frame(reply) => {
                let result = ok
                    .body_as::<FrameObject>("FrameObject")
                    .map_err(SdkError::from)
                    .and_then(|frame| build_frame(&frame, &refs, &self.scripts));
                deliver(reply, result);
            }
            Pending::Scope { generation, reply } => {
                let result = ok
                    .body_as::<ScopeBody>("ScopeBody")
                    .map_err(SdkError::from)
                    .map(|body| self.store(generation, mirror_from_handle(&body.object)));
                deliver(reply, result);
            }
            Pending::Lookup {
                generation,
                handles,
            } => match lookup_body(&ok) {
                Ok(body) => {
                    for handle in handles {
                        let result = lookup_value(&body, handle).map(loaded);
                        self.cache.complete(generation, &handle, result);
                    }
                }
                Err(e) => {
                    for handle in handles {
                        self.cache.complete(generation, &handle, Err(e.clone()));
                    }
                }
            },
            Pending::LookupDirect { handle, reply } => {
                let result = lookup_body(&ok).and_then(|body| lookup_value(&body, handle));
                deliver(reply, result.map(loaded));
            }
            Pending::Reload {
                generation,
                handle,
                reply,
            } => {
                let result = lookup_body(&ok)
                    .and_then(|body| lookup_value(&body, handle))
                    .and_then(|mirror| {
                        if generation == self.cache.generation() {
                            Ok(self.cache.insert(mirror))
                        } else {
                            Err(SdkError::ContextDismissed)
                        }
                    });
                deliver(reply, result);
            }
        }
    }

    fn fail(&mut self, pending: Pending, err: SdkError) {
        match pending {
            Pending::Version(reply) => deliver(reply, Err(err)),
            Pending::Command(reply) => deliver(reply, Err(err)),
            Pending::Evaluate { reply, .. }
            | Pending::Scope { reply, .. }
            | Pending::LookupDirect { reply, .. }
            | Pending::Reload { reply, .. } => deliver(reply, Err(err)),
            Pending::Continue { reply, .. } => {
                self.stepping = false;
                deliver(reply, Err(err));
            }
            Pending::Suspend(reply) => deliver(reply, Err(err)),
            Pending::Backtrace { epoch, .. } => self.fail_backtrace(epoch, err),
            Pending::SetBreakpoint { reply, .. } => deliver(reply, Err(err)),
            Pending::ChangeBreakpoint { reply, .. } => deliver(reply, Err(err)),
            Pending::ClearBreakpoint { id, reply } => {
                // The VM no longer knows the id either way.
                self.breakpoints.remove(&id);
                deliver(reply, Err(err));
            }
            Pending::Scripts => {
                for waiter in std::mem::take(&mut self.script_waiters) {
                    deliver(waiter, Err(err.clone()));
                }
            }
            Pending::ScriptSource { reply, .. } => deliver(reply, Err(err)),
            Pending::Source(reply) => deliver(reply, Err(err)),
            Pending::Frame(reply) => deliver(reply, Err(err)),
            Pending::Lookup {
                generation,
                handles,
            } => {
                for handle in handles {
                    self.cache.complete(generation, &handle, Err(err.clone()));
                }
            }
        }
    }

    fn handle_event(&mut self, event: EventNotification) {
        let Some(kind) = event.kind() else {
            tracing::debug!(event = %event.event, "ignoring unknown event");
            return;
        };
        match kind {
            EventKind::Break => self.on_break(&event, false),
            EventKind::Exception => self.on_break(&event, true),
            EventKind::AfterCompile => match event.body_as::<AfterCompileBody>("AfterCompileBody") {
                Ok(body) => {
                    let script = script_from_handle(&body.script);
                    self.scripts.add(script.clone());
                    self.events.emit(DebugEvent::ScriptLoaded(script));
                }
                Err(e) => tracing::warn!(error = %e, "dropping undecodable afterCompile event"),
            },
            EventKind::ScriptCollected => {
                match event.body_as::<ScriptCollectedBody>("ScriptCollectedBody") {
                    Ok(body) => {
                        let id = ScriptId::from(body.script.id);
                        self.scripts.remove(&id);
                        self.events.emit(DebugEvent::ScriptCollected(id));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping undecodable scriptCollected event")
                    }
                }
            }
        }
    }

    fn on_break(&mut self, event: &EventNotification, exception: bool) {
        let body = match event.body_as::<BreakEventBody>("BreakEventBody") {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, event = %event.event, "dropping undecodable event");
                return;
            }
        };
        if let Some(script) = &body.script {
            let id = ScriptId::from(script.id);
            if self.scripts.get(&id).is_none() {
                self.scripts.add(script_from_ref(script));
            }
        }

        let breakpoints_hit = body.breakpoints.clone().unwrap_or_default();
        for id in &breakpoints_hit {
            self.breakpoints.on_hit(id);
        }
        let stepping = std::mem::take(&mut self.stepping);
        let reason = if exception {
            SuspendReason::Exception {
                uncaught: body.uncaught.unwrap_or(false),
            }
        } else if !breakpoints_hit.is_empty() {
            SuspendReason::Breakpoint
        } else if stepping {
            SuspendReason::Step
        } else {
            SuspendReason::Other(event.event.clone())
        };

        let refs = RefTable::from_refs(&event.refs);
        let exception = body.exception.as_ref().and_then(|reference| {
            match refs.value(reference.reference()) {
                Some(value) => Some(mirror_from_handle(value)),
                None => mirror_from_ref(reference),
            }
        });

        if !self.enter_suspend(SuspendDetails {
            reason,
            breakpoints_hit,
            exception,
        }) {
            return;
        }
        // Handles in the event belong to the new suspend.
        self.merge_refs(&refs);
    }

    /// Move to `Suspended`, drop the previous context and ask for frames.
    fn enter_suspend(&mut self, mut details: SuspendDetails) -> bool {
        let epoch = match self.machine.handle_suspended() {
            Ok(epoch) => epoch,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring suspend");
                return false;
            }
        };
        self.invalidate_context(SdkError::ContextDismissed);
        if let Some(exception) = details.exception.take() {
            details.exception = Some(self.cache.insert(exception));
        }
        self.publish();
        self.request_backtrace(epoch, details);
        true
    }

    fn finish_backtrace(
        &mut self,
        epoch: u64,
        details: SuspendDetails,
        ok: &SuccessResponse,
        refs: &RefTable,
    ) {
        if !self.is_current(epoch) {
            tracing::debug!(epoch, "discarding stale backtrace");
            return;
        }
        let built = ok
            .body_as::<BacktraceBody>("BacktraceBody")
            .map_err(SdkError::from)
            .and_then(|body| {
                build_frames(&body, refs, &self.scripts).map(|frames| (frames, body.total_frames))
            });
        match built {
            Ok((frames, total_frames)) => {
                let context = SuspendContext {
                    reason: details.reason,
                    frames,
                    total_frames,
                    breakpoints_hit: details.breakpoints_hit,
                    exception: details.exception,
                };
                for waiter in std::mem::take(&mut self.context_waiters) {
                    deliver(waiter, Ok(context.clone()));
                }
                self.context = Some(Ok(context.clone()));
                self.events.emit(DebugEvent::Suspended(context));
            }
            Err(e) => self.fail_backtrace(epoch, e),
        }
    }

    fn fail_backtrace(&mut self, epoch: u64, err: SdkError) {
        if !self.is_current(epoch) {
            return;
        }
        tracing::warn!(error = %err, "failed to build backtrace");
        for waiter in std::mem::take(&mut self.context_waiters) {
            deliver(waiter, Err(err.clone()));
        }
        self.context = Some(Err(err.clone()));
        self.events.emit(DebugEvent::SuspendFailed(err));
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.machine.state() == SessionState::Suspended && self.machine.suspend_epoch() == epoch
    }

    /// Forget the suspend context and everything cached under it.
    fn invalidate_context(&mut self, err: SdkError) {
        self.cache.clear();
        self.context = None;
        for waiter in std::mem::take(&mut self.context_waiters) {
            deliver(waiter, Err(err.clone()));
        }
    }

    fn merge_refs(&mut self, refs: &RefTable) {
        for value in refs.values() {
            self.cache.insert(mirror_from_handle(value));
        }
    }

    /// Cache a mirror fetched under `generation`, if that is still current.
    fn store(&mut self, generation: u64, mirror: ValueMirror<i64>) -> ValueMirror<i64> {
        if generation == self.cache.generation() {
            self.cache.insert(mirror)
        } else {
            mirror
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.machine.state());
    }

    fn shutdown(&mut self, reason: &str) {
        if !self.machine.detach() {
            return;
        }
        tracing::info!(%reason, pending = self.pending.len(), "session detached");
        for (_, in_flight) in self.pending.drain() {
            self.fail(in_flight.pending, SdkError::Disconnected);
        }
        self.invalidate_context(SdkError::Disconnected);
        for waiter in std::mem::take(&mut self.script_waiters) {
            deliver(waiter, Err(SdkError::Disconnected));
        }
        self.breakpoints.clear();
        self.publish();
        self.events.disconnected(reason);
    }
}

impl Pending {
    fn command(&self) -> &'static str {
        match self {
            Pending::Version(_) => "version",
            Pending::Command(_) => "command",
            Pending::Evaluate { .. } => "evaluate",
            Pending::Continue { .. } => "continue",
            Pending::Suspend(_) => "suspend",
            Pending::Backtrace { .. } => "backtrace",
            Pending::SetBreakpoint { .. } => "setbreakpoint",
            Pending::ChangeBreakpoint { .. } => "changebreakpoint",
            Pending::ClearBreakpoint { .. } => "clearbreakpoint",
            Pending::Scripts | Pending::ScriptSource { .. } => "scripts",
            Pending::Source(_) => "source",
            Pending::Frame(_) => "frame",
            Pending::Scope { .. } => "scope",
            Pending::Lookup { .. } | Pending::LookupDirect { .. } | Pending::Reload { .. } => {
                "lookup"
            }
        }
    }
}

/// A `lookup` body maps stringified handles to value handles.
fn lookup_body(ok: &SuccessResponse) -> Result<HashMap<String, Value>, SdkError> {
    ok.body_as("LookupBody").map_err(SdkError::from)
}

fn lookup_value(body: &HashMap<String, Value>, handle: i64) -> Result<ValueMirror<i64>, SdkError> {
    let raw = body
        .get(&handle.to_string())
        .ok_or_else(|| SdkError::ProtocolLogic(format!("failed to find value for ref {handle}")))?;
    let value: ValueHandle = decode(raw)?;
    if value.handle() != handle {
        return Err(SdkError::ProtocolLogic("inconsistent ref".into()));
    }
    Ok(mirror_from_handle(&value))
}

/// A looked-up object is complete even when it reports no properties.
fn loaded(mut mirror: ValueMirror<i64>) -> ValueMirror<i64> {
    if matches!(mirror.data, MirrorData::ReferenceOnly) {
        mirror.data = MirrorData::Loaded {
            properties: Vec::new(),
        };
    }
    mirror
}
