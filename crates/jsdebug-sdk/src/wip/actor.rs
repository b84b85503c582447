//! Connection task of an inspector session.
//!
//! Shaped like the native task. Call frames arrive with `Debugger.paused`,
//! and only `Debugger.resumed` moves the session back to running. Values
//! live in object groups, one per mapping; the suspend group is released
//! on every resume, permanent groups when their mapping is released.

use std::collections::HashMap;

use jsdebug_protocol::binding::parse;
use jsdebug_protocol::decode;
use jsdebug_protocol::v8::StepAction;
use jsdebug_protocol::wip::debugger::{
    self, BreakpointResolvedEvent, EvaluateOnCallFrame, GetScriptSource, GetScriptSourceResponse,
    PauseReason, PausedEvent, RemoveBreakpoint, ScriptParsedEvent, SetBreakpointByUrl,
    SetBreakpointByUrlResponse, SetBreakpointsActive,
};
use jsdebug_protocol::wip::page::{
    ConsoleEnable, ConsoleLevel, DetachedEvent, FrameNavigatedEvent, MessageAddedEvent,
    PageEnable, Reload,
};
use jsdebug_protocol::wip::runtime::{
    self, EvaluateResponse, GetProperties, GetPropertiesResponse, ReleaseObjectGroup,
};
use jsdebug_protocol::wip::{
    Domain, RawCommand, RemoteObject, WipCommand, WipEvent, WipIncoming, WipResponse,
};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::breakpoint::{
    Breakpoint, BreakpointChange, BreakpointSpec, BreakpointTable, BreakpointTarget,
};
use crate::dialect::Wip;
use crate::dispatcher::{PendingTable, SeqAllocator};
use crate::error::SdkError;
use crate::event::{ConsoleEntry, DebugEvent, EventSink, SuspendContext, SuspendReason};
use crate::frame::FrameId;
use crate::mirror::{FetchPlan, MappingId, MirrorCache, MirrorData, ValueKind, ValueMirror, Waiter};
use crate::reply::{deliver, ReplySender};
use crate::script::{Script, ScriptId, ScriptRegistry};
use crate::state::{SessionMachine, SessionState};
use crate::transport::WireEvent;
use crate::wip::values::{build_frames, mirror_from_remote, property_mirror, script_from_parsed};

/// Object group of the per-suspend mapping.
pub const SUSPEND_GROUP: &str = "jsdebug-suspend";

/// Requests from session handles to the connection task.
#[derive(Debug)]
pub(crate) enum Op {
    Enable {
        reply: ReplySender<()>,
    },
    Command {
        command: RawCommand,
        reply: ReplySender<Value>,
    },
    Evaluate {
        expression: String,
        frame: Option<u32>,
        mapping: MappingId,
        reply: ReplySender<ValueMirror<String>>,
    },
    Continue {
        step: Option<StepAction>,
        reply: ReplySender<()>,
    },
    Suspend {
        reply: ReplySender<()>,
    },
    Backtrace {
        reply: ReplySender<SuspendContext<Wip>>,
    },
    SetBreakpoint {
        spec: BreakpointSpec,
        reply: ReplySender<Breakpoint<String>>,
    },
    ChangeBreakpoint {
        id: String,
        change: BreakpointChange,
        reply: ReplySender<Breakpoint<String>>,
    },
    ClearBreakpoint {
        id: String,
        reply: ReplySender<()>,
    },
    SetBreakpointsActive {
        active: bool,
        reply: ReplySender<()>,
    },
    Breakpoints {
        reply: ReplySender<Vec<Breakpoint<String>>>,
    },
    Scripts {
        reply: ReplySender<Vec<Script>>,
    },
    ScriptSource {
        id: ScriptId,
        reply: ReplySender<String>,
    },
    ReloadPage {
        ignore_cache: bool,
        reply: ReplySender<()>,
    },
    Load {
        mapping: MappingId,
        waiters: Vec<(String, Waiter<String>)>,
    },
    ClearCaches {
        mapping: MappingId,
    },
    CreateMapping {
        name: String,
        reply: ReplySender<MappingId>,
    },
    ReleaseMapping {
        mapping: MappingId,
        reply: ReplySender<()>,
    },
    Detach {
        reply: ReplySender<()>,
    },
}

/// Bookkeeping for a command on the wire.
enum Pending {
    Enable(ReplySender<()>),
    /// Auxiliary domain enable; failures are only logged.
    Optional,
    Command(ReplySender<Value>),
    /// Replies on acceptance; state changes come with events.
    Accepted(ReplySender<()>),
    Continue(ReplySender<()>),
    Evaluate {
        mapping: MappingId,
        generation: u64,
        reply: ReplySender<ValueMirror<String>>,
    },
    /// Shared fetch; waiters live in the mapping's cache.
    Properties {
        mapping: MappingId,
        generation: u64,
        handle: String,
    },
    SetBreakpoint {
        spec: BreakpointSpec,
        reply: ReplySender<Breakpoint<String>>,
    },
    /// Old breakpoint removed from the VM; set it again with `spec`.
    Rearm {
        old: String,
        spec: BreakpointSpec,
        reply: ReplySender<Breakpoint<String>>,
    },
    ClearBreakpoint {
        id: String,
        reply: ReplySender<()>,
    },
    ScriptSource {
        id: ScriptId,
        reply: ReplySender<String>,
    },
    Release(Option<ReplySender<()>>),
}

/// One value mapping: a cache plus the object group its handles live in.
struct Mapping {
    group: String,
    cache: MirrorCache<String>,
}

impl Mapping {
    fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            cache: MirrorCache::new(),
        }
    }
}

pub(crate) struct Actor {
    wire: mpsc::UnboundedSender<String>,
    seq: SeqAllocator,
    pending: PendingTable<(&'static str, Pending)>,
    machine: SessionMachine,
    state_tx: watch::Sender<SessionState>,
    events: EventSink<Wip>,
    mappings: HashMap<MappingId, Mapping>,
    next_mapping: u64,
    breakpoints: BreakpointTable<String>,
    /// Ids for breakpoints created disabled, which the VM never saw.
    next_local_breakpoint: u64,
    scripts: ScriptRegistry,
    context: Option<Result<SuspendContext<Wip>, SdkError>>,
    stepping: bool,
    pause_requested: bool,
}

impl Actor {
    pub(crate) fn new(
        wire: mpsc::UnboundedSender<String>,
        events: EventSink<Wip>,
        state_tx: watch::Sender<SessionState>,
    ) -> Self {
        let mut mappings = HashMap::new();
        mappings.insert(MappingId::SUSPEND, Mapping::new(SUSPEND_GROUP));
        Self {
            wire,
            seq: SeqAllocator::new(),
            pending: PendingTable::new(),
            machine: SessionMachine::new(),
            state_tx,
            events,
            mappings,
            next_mapping: 1,
            breakpoints: BreakpointTable::new(),
            next_local_breakpoint: 1,
            scripts: ScriptRegistry::new(),
            context: None,
            stepping: false,
            pause_requested: false,
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
            // `Inspector.detached` ends the session from the wire side.
            if self.machine.state() == SessionState::Detached {
                break;
            }
        }
        tracing::debug!(dialect = "wip", "session task finished");
    }

    // -----------------------------------------------------------------------
    // Outgoing
    // -----------------------------------------------------------------------

    fn send<C: WipCommand>(&mut self, command: &C, pending: Pending) {
        match RawCommand::new(command) {
            Ok(raw) => self.send_raw(raw, pending),
            Err(e) => self.fail(C::METHOD, pending, e.into()),
        }
    }

    fn send_raw(&mut self, command: RawCommand, pending: Pending) {
        let id = self.seq.next();
        let text = match command.to_text(id) {
            Ok(text) => text,
            Err(e) => {
                self.fail(command.method, pending, e.into());
                return;
            }
        };
        if self.wire.send(text).is_err() {
            self.fail(command.method, pending, SdkError::Disconnected);
            return;
        }
        self.pending
            .register(id, command.method, (command.method, pending));
    }

    fn handle_op(&mut self, op: Op) {
        match op {
            Op::Enable { reply } => {
                self.send(&debugger::Enable {}, Pending::Enable(reply));
                self.send(&runtime::Enable {}, Pending::Optional);
                self.send(&ConsoleEnable {}, Pending::Optional);
                self.send(&PageEnable {}, Pending::Optional);
            }
            Op::Command { command, reply } => self.send_raw(command, Pending::Command(reply)),
            Op::Evaluate {
                expression,
                frame,
                mapping,
                reply,
            } => self.evaluate(expression, frame, mapping, reply),
            Op::Continue { step, reply } => {
                if let Err(e) = self.machine.require_suspended("continue") {
                    deliver(reply, Err(e));
                    return;
                }
                self.stepping = step.is_some();
                let pending = Pending::Continue(reply);
                match step {
                    None => self.send(&debugger::Resume {}, pending),
                    Some(StepAction::In) => self.send(&debugger::StepInto {}, pending),
                    Some(StepAction::Next) => self.send(&debugger::StepOver {}, pending),
                    Some(StepAction::Out) => self.send(&debugger::StepOut {}, pending),
                }
            }
            Op::Suspend { reply } => {
                if let Err(e) = self.machine.require_running("suspend") {
                    deliver(reply, Err(e));
                    return;
                }
                self.pause_requested = true;
                self.send(&debugger::Pause {}, Pending::Accepted(reply));
            }
            Op::Backtrace { reply } => {
                if let Err(e) = self.machine.require_suspended("get backtrace") {
                    deliver(reply, Err(e));
                    return;
                }
                match &self.context {
                    Some(result) => deliver(reply, result.clone()),
                    None => deliver(reply, Err(SdkError::ContextDismissed)),
                }
            }
            Op::SetBreakpoint { spec, reply } => self.set_breakpoint(spec, reply),
            Op::ChangeBreakpoint { id, change, reply } => self.change_breakpoint(id, change, reply),
            Op::ClearBreakpoint { id, reply } => {
                let Some(breakpoint) = self.breakpoints.get(&id) else {
                    tracing::debug!(%id, "breakpoint already cleared");
                    deliver(reply, Ok(()));
                    return;
                };
                if breakpoint.spec.enabled {
                    let command = RemoveBreakpoint {
                        breakpoint_id: id.clone(),
                    };
                    self.send(&command, Pending::ClearBreakpoint { id, reply });
                } else {
                    self.breakpoints.remove(&id);
                    deliver(reply, Ok(()));
                }
            }
            Op::SetBreakpointsActive { active, reply } => {
                self.send(&SetBreakpointsActive { active }, Pending::Accepted(reply));
            }
            Op::Breakpoints { reply } => {
                let mut all: Vec<_> = self.breakpoints.all().cloned().collect();
                all.sort_by(|a, b| a.id.cmp(&b.id));
                deliver(reply, Ok(all));
            }
            Op::Scripts { reply } => deliver(reply, Ok(self.scripts.all())),
            Op::ScriptSource { id, reply } => {
                if let Some(source) = self.scripts.get(&id).and_then(|s| s.source.clone()) {
                    deliver(reply, Ok(source));
                    return;
                }
                let command = GetScriptSource {
                    script_id: id.to_string(),
                };
                self.send(&command, Pending::ScriptSource { id, reply });
            }
            Op::ReloadPage {
                ignore_cache,
                reply,
            } => {
                let command = Reload {
                    ignore_cache: ignore_cache.then_some(true),
                };
                self.send(&command, Pending::Accepted(reply));
            }
            Op::Load { mapping, waiters } => self.load(mapping, waiters),
            Op::ClearCaches { mapping } => {
                if let Some(mapping) = self.mappings.get_mut(&mapping) {
                    mapping.cache.clear();
                }
            }
            Op::CreateMapping { name, reply } => {
                let taken = self.mappings.values().any(|m| m.group == name);
                if name.is_empty() || taken {
                    let message = if taken {
                        format!("object group {name:?} is already in use")
                    } else {
                        "object group name is empty".to_string()
                    };
                    deliver(reply, Err(SdkError::InvalidArgument(message)));
                    return;
                }
                let id = MappingId(self.next_mapping);
                self.next_mapping += 1;
                tracing::debug!(mapping = %id, group = %name, "permanent mapping created");
                self.mappings.insert(id, Mapping::new(name));
                deliver(reply, Ok(id));
            }
            Op::ReleaseMapping { mapping, reply } => {
                if mapping.is_suspend() {
                    let message = "the suspend mapping cannot be released".to_string();
                    deliver(reply, Err(SdkError::ProtocolLogic(message)));
                    return;
                }
                match self.mappings.remove(&mapping) {
                    Some(mut released) => {
                        released.cache.clear();
                        self.release_group(released.group, Some(reply));
                    }
                    // Already released.
                    None => deliver(reply, Ok(())),
                }
            }
            // Handled by the run loop.
            Op::Detach { reply } => deliver(reply, Ok(())),
        }
    }

    fn evaluate(
        &mut self,
        expression: String,
        frame: Option<u32>,
        mapping: MappingId,
        reply: ReplySender<ValueMirror<String>>,
    ) {
        let Some((group, generation)) = self
            .mappings
            .get(&mapping)
            .map(|m| (m.group.clone(), m.cache.generation()))
        else {
            deliver(reply, Err(SdkError::ContextDismissed));
            return;
        };
        let suspended = self.machine.state() == SessionState::Suspended;
        let call_frame = match frame {
            Some(index) => {
                if let Err(e) = self.machine.require_suspended("evaluate in frame") {
                    deliver(reply, Err(e));
                    return;
                }
                match self.call_frame_id(index) {
                    Some(id) => Some(id),
                    None => {
                        deliver(reply, Err(SdkError::ProtocolLogic(format!("no frame {index}"))));
                        return;
                    }
                }
            }
            None if suspended => self.call_frame_id(0),
            None => {
                if let Err(e) = self.machine.require_attached("evaluate") {
                    deliver(reply, Err(e));
                    return;
                }
                None
            }
        };
        let pending = Pending::Evaluate {
            mapping,
            generation,
            reply,
        };
        match call_frame {
            Some(call_frame_id) => {
                let command = EvaluateOnCallFrame {
                    call_frame_id,
                    expression,
                    object_group: Some(group),
                    return_by_value: None,
                };
                self.send(&command, pending);
            }
            None => {
                let command = runtime::Evaluate {
                    expression,
                    object_group: Some(group),
                    return_by_value: None,
                };
                self.send(&command, pending);
            }
        }
    }

    fn call_frame_id(&self, index: u32) -> Option<String> {
        let Some(Ok(context)) = &self.context else {
            return None;
        };
        match &context.frames.get(index as usize)?.id {
            FrameId::CallFrame(id) => Some(id.clone()),
            FrameId::Index(_) => None,
        }
    }

    fn set_breakpoint(&mut self, spec: BreakpointSpec, reply: ReplySender<Breakpoint<String>>) {
        if !spec.enabled {
            let id = format!("local:{}", self.next_local_breakpoint);
            self.next_local_breakpoint += 1;
            let breakpoint = Breakpoint::new(id, spec);
            self.breakpoints.insert(breakpoint.clone());
            deliver(reply, Ok(breakpoint));
            return;
        }
        let (url, url_regex) = match &spec.target {
            BreakpointTarget::ScriptName(name) => (Some(name.clone()), None),
            BreakpointTarget::ScriptRegExp(pattern) => (None, Some(pattern.clone())),
            target => {
                let message = format!("breakpoint target {target} is not supported over WIP");
                deliver(reply, Err(SdkError::ProtocolLogic(message)));
                return;
            }
        };
        let command = SetBreakpointByUrl {
            line_number: spec.line.unwrap_or(0),
            url,
            url_regex,
            column_number: spec.column,
            condition: spec.condition.clone(),
        };
        self.send(&command, Pending::SetBreakpoint { spec, reply });
    }

    /// Ignore counts are tracked locally. Anything else the VM must see is
    /// applied by removing the breakpoint and setting it again, so the id
    /// may change.
    fn change_breakpoint(
        &mut self,
        id: String,
        change: BreakpointChange,
        reply: ReplySender<Breakpoint<String>>,
    ) {
        let Some(current) = self.breakpoints.get(&id) else {
            deliver(reply, Err(SdkError::UnknownBreakpoint(id)));
            return;
        };
        let on_vm = current.spec.enabled;
        let mut spec = current.spec.clone();
        change.apply_to(&mut spec);

        if change.enabled.is_none() && change.condition.is_absent() {
            let result = self.breakpoints.apply(&id, &change).and_then(|()| {
                self.breakpoints
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| SdkError::UnknownBreakpoint(id.clone()))
            });
            deliver(reply, result);
            return;
        }
        if on_vm {
            let command = RemoveBreakpoint {
                breakpoint_id: id.clone(),
            };
            self.send(&command, Pending::Rearm { old: id, spec, reply });
        } else {
            self.rearm(id, spec, reply);
        }
    }

    fn rearm(&mut self, old: String, spec: BreakpointSpec, reply: ReplySender<Breakpoint<String>>) {
        self.breakpoints.remove(&old);
        if spec.enabled {
            self.set_breakpoint(spec, reply);
        } else {
            let breakpoint = Breakpoint::new(old, spec);
            self.breakpoints.insert(breakpoint.clone());
            deliver(reply, Ok(breakpoint));
        }
    }

    fn load(&mut self, mapping_id: MappingId, waiters: Vec<(String, Waiter<String>)>) {
        let Some(mapping) = self.mappings.get_mut(&mapping_id) else {
            for (_, waiter) in waiters {
                deliver(waiter, Err(SdkError::ContextDismissed));
            }
            return;
        };
        let generation = mapping.cache.generation();
        let mut fetch = Vec::new();
        for (handle, waiter) in waiters {
            match mapping.cache.request(&handle, waiter) {
                FetchPlan::Served | FetchPlan::Joined => {}
                FetchPlan::Fetch => fetch.push(handle),
                FetchPlan::Uncacheable(reply) => deliver(
                    reply,
                    Err(SdkError::ProtocolLogic("value has no object id".into())),
                ),
            }
        }
        for handle in fetch {
            let command = GetProperties {
                object_id: handle.clone(),
                own_properties: Some(true),
            };
            self.send(
                &command,
                Pending::Properties {
                    mapping: mapping_id,
                    generation,
                    handle,
                },
            );
        }
    }

    fn release_group(&mut self, group: String, reply: Option<ReplySender<()>>) {
        let command = ReleaseObjectGroup {
            object_group: group,
        };
        self.send(&command, Pending::Release(reply));
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
        match decode::<WipIncoming>(&raw) {
            Ok(WipIncoming::Response(response)) => self.handle_response(response),
            Ok(WipIncoming::Event(event)) => self.handle_event(&event),
            Err(e) => match raw.get("id").and_then(Value::as_u64) {
                Some(id) => {
                    if let Some((method, pending)) = self.pending.resolve(id) {
                        self.fail(method, pending, e.into());
                    }
                }
                None => tracing::warn!(error = %e, "dropping undecodable message"),
            },
        }
    }

    fn handle_response(&mut self, response: WipResponse) {
        let Some((method, pending)) = self.pending.resolve(response.id()) else {
            return;
        };
        match response {
            WipResponse::Success(ok) => self.complete(method, pending, ok.result),
            WipResponse::Failure(failed) => {
                let err = SdkError::Remote {
                    command: method.to_string(),
                    message: failed.error.message,
                };
                self.fail(method, pending, err);
            }
        }
    }

    fn complete(&mut self, method: &'static str, pending: Pending, result: Value) {
        match pending {
            Pending::Enable(reply) => {
                self.scripts.mark_loaded();
                tracing::info!(scripts = self.scripts.len(), "debugger domain enabled");
                deliver(reply, Ok(()));
            }
            Pending::Optional | Pending::Release(None) => {}
            Pending::Command(reply) => deliver(reply, Ok(result)),
            Pending::Accepted(reply) | Pending::Continue(reply) | Pending::Release(Some(reply)) => {
                deliver(reply, Ok(()))
            }
            Pending::Evaluate {
                mapping,
                generation,
                reply,
            } => {
                let result = decode_result::<EvaluateResponse>(&result, "EvaluateResponse")
                    .and_then(|response| evaluation(method, response))
                    .map(|mirror| self.store(mapping, Some(generation), mirror));
                deliver(reply, result);
            }
            Pending::Properties {
                mapping,
                generation,
                handle,
            } => {
                let result =
                    decode_result::<GetPropertiesResponse>(&result, "GetPropertiesResponse")
                        .map(|response| self.loaded(mapping, &handle, &response));
                self.complete_fetch(mapping, generation, &handle, result);
            }
            Pending::SetBreakpoint { spec, reply } => {
                let shape = "SetBreakpointByUrlResponse";
                let result = decode_result::<SetBreakpointByUrlResponse>(&result, shape)
                    .map(|response| {
                        let mut breakpoint = Breakpoint::new(response.breakpoint_id, spec);
                        if let Some(location) = response.locations.first() {
                            breakpoint.actual_line = Some(location.line_number);
                            breakpoint.actual_column = location.column_number;
                        }
                        self.breakpoints.insert(breakpoint.clone());
                        tracing::debug!(
                            id = %breakpoint.id,
                            target = %breakpoint.spec.target,
                            "breakpoint set"
                        );
                        breakpoint
                    });
                deliver(reply, result);
            }
            Pending::Rearm { old, spec, reply } => self.rearm(old, spec, reply),
            Pending::ClearBreakpoint { id, reply } => {
                self.breakpoints.remove(&id);
                deliver(reply, Ok(()));
            }
            Pending::ScriptSource { id, reply } => {
                let result =
                    decode_result::<GetScriptSourceResponse>(&result, "GetScriptSourceResponse")
                        .map(|response| {
                            self.scripts.set_source(&id, response.script_source.clone());
                            response.script_source
                        });
                deliver(reply, result);
            }
        }
    }

    fn fail(&mut self, method: &'static str, pending: Pending, err: SdkError) {
        match pending {
            Pending::Enable(reply) => deliver(reply, Err(err)),
            Pending::Optional => {
                tracing::debug!(method, error = %err, "optional domain unavailable")
            }
            Pending::Command(reply) => deliver(reply, Err(err)),
            Pending::Accepted(reply) => deliver(reply, Err(err)),
            Pending::Continue(reply) => {
                self.stepping = false;
                deliver(reply, Err(err));
            }
            Pending::Evaluate { reply, .. } => deliver(reply, Err(err)),
            Pending::Properties {
                mapping,
                generation,
                handle,
            } => self.complete_fetch(mapping, generation, &handle, Err(err)),
            Pending::SetBreakpoint { reply, .. } => deliver(reply, Err(err)),
            Pending::Rearm { reply, .. } => deliver(reply, Err(err)),
            Pending::ClearBreakpoint { id, reply } => {
                self.breakpoints.remove(&id);
                deliver(reply, Err(err));
            }
            Pending::ScriptSource { reply, .. } => deliver(reply, Err(err)),
            Pending::Release(Some(reply)) => deliver(reply, Err(err)),
            Pending::Release(None) => {
                tracing::debug!(error = %err, "releasing object group failed")
            }
        }
    }

    fn handle_event(&mut self, event: &WipEvent) {
        match event.method.as_str() {
            "Debugger.paused" => self.on_paused(event),
            "Debugger.resumed" => self.on_resumed(),
            "Debugger.scriptParsed" | "Debugger.scriptFailedToParse" => {
                match event.params_as::<ScriptParsedEvent>("ScriptParsedEvent") {
                    Ok(parsed) => {
                        let script = script_from_parsed(&parsed);
                        self.scripts.add(script.clone());
                        self.events.emit(DebugEvent::ScriptLoaded(script));
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping undecodable scriptParsed event"),
                }
            }
            "Debugger.breakpointResolved" => self.on_breakpoint_resolved(event),
            "Page.frameNavigated" => self.on_frame_navigated(event),
            "Console.messageAdded" => self.on_console_message(event),
            "Inspector.detached" => {
                let reason = event
                    .params_as::<DetachedEvent>("DetachedEvent")
                    .map(|detached| detached.reason)
                    .unwrap_or_else(|_| "inspector detached".into());
                self.shutdown(&reason);
            }
            _ => match event.domain() {
                Some(Domain::Network) | Some(Domain::Dom) => {
                    tracing::trace!(method = %event.method, "ignoring event");
                }
                _ => tracing::debug!(method = %event.method, "ignoring unknown event"),
            },
        }
    }

    fn on_breakpoint_resolved(&mut self, event: &WipEvent) {
        let resolved = match event.params_as::<BreakpointResolvedEvent>("BreakpointResolvedEvent") {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable breakpointResolved event");
                return;
            }
        };
        if let Some(mut breakpoint) = self.breakpoints.get(&resolved.breakpoint_id).cloned() {
            breakpoint.actual_line = Some(resolved.location.line_number);
            breakpoint.actual_column = resolved.location.column_number;
            self.breakpoints.insert(breakpoint);
        }
    }

    /// Only a top-level navigation replaces the page's scripts.
    fn on_frame_navigated(&mut self, event: &WipEvent) {
        match event.params_as::<FrameNavigatedEvent>("FrameNavigatedEvent") {
            Ok(navigated) if navigated.frame.parent_id.is_none() => {
                tracing::info!(url = %navigated.frame.url, "page navigated");
                self.scripts.reset();
                self.events.emit(DebugEvent::Navigated {
                    url: navigated.frame.url,
                });
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "dropping undecodable frameNavigated event"),
        }
    }

    fn on_console_message(&mut self, event: &WipEvent) {
        match event.params_as::<MessageAddedEvent>("MessageAddedEvent") {
            Ok(added) => {
                let message = added.message;
                self.events.emit(DebugEvent::ConsoleMessage(ConsoleEntry {
                    level: level_name(message.level).to_string(),
                    text: message.text,
                    url: message.url,
                    line: message.line,
                }));
            }
            Err(e) => tracing::warn!(error = %e, "dropping undecodable console message"),
        }
    }

    fn on_paused(&mut self, event: &WipEvent) {
        if let Err(e) = self.machine.handle_suspended() {
            tracing::debug!(error = %e, "ignoring pause");
            return;
        }
        self.invalidate_context();
        let stepping = std::mem::take(&mut self.stepping);
        let requested = std::mem::take(&mut self.pause_requested);

        let context = event
            .params_as::<PausedEvent>("PausedEvent")
            .map_err(SdkError::from)
            .map(|paused| self.suspend_context(paused, stepping, requested));
        self.publish();
        match context {
            Ok(context) => {
                self.context = Some(Ok(context.clone()));
                self.events.emit(DebugEvent::Suspended(context));
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to build call frames");
                self.context = Some(Err(e.clone()));
                self.events.emit(DebugEvent::SuspendFailed(e));
            }
        }
    }

    fn suspend_context(
        &mut self,
        paused: PausedEvent,
        stepping: bool,
        requested: bool,
    ) -> SuspendContext<Wip> {
        for id in &paused.hit_breakpoints {
            self.breakpoints.on_hit(id);
        }
        let exception = matches!(
            paused.reason,
            PauseReason::Exception | PauseReason::PromiseRejection
        );
        let reason = if exception {
            let uncaught = paused
                .data
                .as_ref()
                .and_then(|data| data.get("uncaught"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            SuspendReason::Exception { uncaught }
        } else if !paused.hit_breakpoints.is_empty() {
            SuspendReason::Breakpoint
        } else if stepping || paused.reason == PauseReason::Step {
            SuspendReason::Step
        } else if requested {
            SuspendReason::Requested
        } else {
            SuspendReason::Other(format!("{:?}", paused.reason))
        };

        let exception = if exception {
            paused
                .data
                .as_ref()
                .and_then(|data| decode::<RemoteObject>(data).ok())
                .map(|object| self.store(MappingId::SUSPEND, None, mirror_from_remote(&object)))
        } else {
            None
        };

        // Scope objects and receivers belong to the suspend group.
        for frame in &paused.call_frames {
            let objects = frame.scope_chain.iter().map(|s| &s.object).chain(frame.this.as_ref());
            for object in objects {
                self.store(MappingId::SUSPEND, None, mirror_from_remote(object));
            }
        }

        let frames = build_frames(&paused.call_frames, &self.scripts);
        SuspendContext {
            reason,
            total_frames: frames.len() as u32,
            frames,
            breakpoints_hit: paused.hit_breakpoints,
            exception,
        }
    }

    fn on_resumed(&mut self) {
        match self.machine.handle_resumed() {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring resume");
                return;
            }
        }
        self.invalidate_context();
        self.release_group(SUSPEND_GROUP.to_string(), None);
        self.publish();
        self.events.emit(DebugEvent::Resumed);
    }

    /// Forget the suspend context and the suspend mapping's mirrors.
    fn invalidate_context(&mut self) {
        if let Some(mapping) = self.mappings.get_mut(&MappingId::SUSPEND) {
            mapping.cache.clear();
        }
        self.context = None;
    }

    /// Cache a mirror in `mapping` if it was fetched under the current
    /// generation. `None` stores unconditionally.
    fn store(
        &mut self,
        mapping: MappingId,
        generation: Option<u64>,
        mirror: ValueMirror<String>,
    ) -> ValueMirror<String> {
        match self.mappings.get_mut(&mapping) {
            Some(m) if generation.map_or(true, |g| g == m.cache.generation()) => {
                m.cache.insert(mirror)
            }
            _ => mirror,
        }
    }

    /// Complete mirror of `handle` from its own properties.
    fn loaded(
        &self,
        mapping: MappingId,
        handle: &str,
        response: &GetPropertiesResponse,
    ) -> ValueMirror<String> {
        let handle = handle.to_string();
        let mut mirror = self
            .mappings
            .get(&mapping)
            .and_then(|m| m.cache.get(&handle))
            .cloned()
            .unwrap_or_else(|| ValueMirror::reference(handle, ValueKind::Object));
        mirror.data = MirrorData::Loaded {
            properties: response.result.iter().map(property_mirror).collect(),
        };
        mirror
    }

    fn complete_fetch(
        &mut self,
        mapping: MappingId,
        generation: u64,
        handle: &str,
        result: Result<ValueMirror<String>, SdkError>,
    ) {
        match self.mappings.get_mut(&mapping) {
            Some(m) => m.cache.complete(generation, &handle.to_string(), result),
            None => tracing::debug!(%mapping, "discarding fetch for released mapping"),
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
        for (_, (method, pending)) in self.pending.drain() {
            self.fail(method, pending, SdkError::Disconnected);
        }
        for mapping in self.mappings.values_mut() {
            mapping.cache.clear();
        }
        self.context = None;
        self.breakpoints.clear();
        self.publish();
        self.events.disconnected(reason);
    }
}

fn decode_result<T: serde::de::DeserializeOwned>(
    result: &Value,
    shape: &'static str,
) -> Result<T, SdkError> {
    jsdebug_protocol::decode_fields(shape, result).map_err(SdkError::from)
}

/// A thrown exception fails the evaluation with the VM's message.
fn evaluation(
    method: &'static str,
    response: EvaluateResponse,
) -> Result<ValueMirror<String>, SdkError> {
    if !response.threw() {
        return Ok(mirror_from_remote(&response.result));
    }
    let message = response
        .exception_details
        .as_ref()
        .map(|details| {
            details
                .exception
                .as_ref()
                .and_then(RemoteObject::description)
                .unwrap_or(&details.text)
        })
        .or_else(|| response.result.description())
        .unwrap_or("exception thrown")
        .to_string();
    Err(SdkError::Remote {
        command: method.to_string(),
        message,
    })
}

fn level_name(level: ConsoleLevel) -> &'static str {
    match level {
        ConsoleLevel::Log => "log",
        ConsoleLevel::Warning => "warning",
        ConsoleLevel::Error => "error",
        ConsoleLevel::Debug => "debug",
        ConsoleLevel::Info => "info",
    }
}
