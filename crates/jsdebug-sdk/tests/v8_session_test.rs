use std::time::Duration;

use jsdebug_protocol::v8::DebuggerCommand;
use jsdebug_sdk::transport::memory::{self, RemoteEnd};
use jsdebug_sdk::{
    BreakpointChange, BreakpointSpec, BreakpointTarget, DebugEvent, DebugEventListener,
    DebugSession, ScriptId, SdkError, SessionOptions, SessionState, SuspendContext, SuspendReason,
    ValueKind, V8,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

// ── Scripted VM ─────────────────────────────────────────────────

struct FakeVm {
    remote: RemoteEnd,
    seq: u64,
}

impl FakeVm {
    /// Next request; panics unless it is `command`.
    async fn expect(&mut self, command: &str) -> Value {
        let request = timeout(Duration::from_secs(5), self.remote.recv_json())
            .await
            .expect("timed out waiting for a request")
            .expect("client went away");
        assert_eq!(request["type"], "request");
        assert_eq!(request["command"], command, "unexpected request {request}");
        request
    }

    /// Assert the client sends nothing for a short while.
    async fn expect_silence(&mut self) {
        let next = timeout(Duration::from_millis(100), self.remote.recv()).await;
        assert!(next.is_err(), "unexpected request {next:?}");
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn respond(&mut self, request: &Value, body: Value, refs: Value, running: bool) {
        let seq = self.next_seq();
        self.remote.send_json(&json!({
            "seq": seq,
            "type": "response",
            "request_seq": request["seq"],
            "command": request["command"],
            "success": true,
            "running": running,
            "body": body,
            "refs": refs,
        }));
    }

    fn respond_error(&mut self, request: &Value, message: &str) {
        let seq = self.next_seq();
        self.remote.send_json(&json!({
            "seq": seq,
            "type": "response",
            "request_seq": request["seq"],
            "command": request["command"],
            "success": false,
            "message": message,
        }));
    }

    fn event(&mut self, event: &str, body: Value) {
        let seq = self.next_seq();
        self.remote.send_json(&json!({
            "seq": seq,
            "type": "event",
            "event": event,
            "body": body,
        }));
    }
}

type Events = mpsc::UnboundedReceiver<DebugEvent<V8>>;

/// Attach to a VM that answers `version` with the given `running` flag.
async fn attach_with<L: DebugEventListener<V8>>(
    listener: L,
    running: bool,
) -> (DebugSession, FakeVm) {
    let (wire, remote) = memory::pair();
    let mut vm = FakeVm { remote, seq: 0 };
    let (session, ()) = tokio::join!(
        DebugSession::attach(wire, SessionOptions::default(), listener),
        async {
            let request = vm.expect("version").await;
            vm.respond(&request, json!({"V8Version": "3.14.5.9"}), json!([]), running);
        }
    );
    (session.unwrap(), vm)
}

async fn attach() -> (DebugSession, FakeVm, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (session, vm) = attach_with(tx, true).await;
    (session, vm, rx)
}

async fn next_event(events: &mut Events) -> DebugEvent<V8> {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

/// The one frame of `run` stopped at `a.js:10:3`.
fn run_frame() -> Value {
    json!({
        "index": 0, "receiver": {"ref": 1},
        "func": {"ref": 2, "type": "function", "name": "run", "scriptId": 17},
        "script": {"ref": 3},
        "line": 9, "column": 2, "sourceLineText": "  debugger;",
        "scopes": [{"type": 1, "index": 0}, {"type": 0, "index": 1}]
    })
}

fn script_refs() -> Value {
    json!([{"handle": 3, "type": "script", "id": 17, "name": "a.js"}])
}

/// Answer an automatic backtrace with [`run_frame`].
async fn answer_backtrace(vm: &mut FakeVm) {
    let request = vm.expect("backtrace").await;
    assert_eq!(request["arguments"]["inlineRefs"], true);
    vm.respond(
        &request,
        json!({"fromFrame": 0, "toFrame": 1, "totalFrames": 1, "frames": [run_frame()]}),
        script_refs(),
        false,
    );
}

/// Report a stop at `a.js:10:3` on breakpoint 1.
fn hit_breakpoint(vm: &mut FakeVm) {
    vm.event(
        "break",
        json!({
            "sourceLine": 9, "sourceColumn": 2, "sourceLineText": "  debugger;",
            "script": {"id": 17, "name": "a.js", "lineOffset": 0, "columnOffset": 0, "lineCount": 20},
            "breakpoints": [1]
        }),
    );
}

/// Break at `a.js:10:3` on breakpoint 1 and answer the automatic backtrace.
async fn break_in_run(vm: &mut FakeVm, events: &mut Events) {
    hit_breakpoint(vm);
    answer_backtrace(vm).await;
    match next_event(events).await {
        DebugEvent::Suspended(_) => {}
        other => panic!("expected suspend, got {other:?}"),
    }
}

// ── Attach and breakpoints ──────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn attach_reports_version_and_running() {
    let (session, _vm, _events) = attach().await;
    assert_eq!(session.version(), "3.14.5.9");
    assert_eq!(session.state(), SessionState::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn attach_to_suspended_vm_builds_backtrace() {
    let (tx, mut events) = mpsc::unbounded_channel();
    let (session, mut vm) = attach_with(tx, false).await;
    assert_eq!(session.state(), SessionState::Suspended);

    answer_backtrace(&mut vm).await;
    let context = match next_event(&mut events).await {
        DebugEvent::Suspended(context) => context,
        other => panic!("expected suspend, got {other:?}"),
    };
    assert_eq!(
        context.reason,
        SuspendReason::Other("attached while suspended".into())
    );
    assert_eq!(context.top_frame().unwrap().to_string(), "run (a.js:10:3)");
    assert_eq!(session.backtrace().await.unwrap().frames.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn breakpoint_hit_builds_suspend_context() {
    let (session, mut vm, mut events) = attach().await;

    let pending = session.set_breakpoint(
        BreakpointSpec::new(BreakpointTarget::ScriptName("a.js".into())).at(9, None),
    );
    let request = vm.expect("setbreakpoint").await;
    assert_eq!(request["arguments"]["target"], "a.js");
    assert_eq!(request["arguments"]["line"], 9);
    vm.respond(
        &request,
        json!({"type": "scriptName", "breakpoint": 1, "line": 9, "column": 0}),
        json!([]),
        true,
    );
    let breakpoint = pending.await.unwrap();
    assert_eq!(breakpoint.id, 1);
    assert_eq!(breakpoint.actual_line, Some(9));

    vm.event(
        "break",
        json!({
            "sourceLine": 9, "sourceColumn": 2,
            "script": {"id": 17, "name": "a.js", "lineOffset": 0, "columnOffset": 0, "lineCount": 20},
            "breakpoints": [1]
        }),
    );
    let request = vm.expect("backtrace").await;
    vm.respond(
        &request,
        json!({
            "fromFrame": 0, "toFrame": 1, "totalFrames": 1,
            "frames": [{
                "index": 0, "func": {"ref": 2, "type": "function", "name": "run", "scriptId": 17},
                "script": {"ref": 3}, "line": 9, "column": 2
            }]
        }),
        json!([{"handle": 3, "type": "script", "id": 17, "name": "a.js"}]),
        false,
    );

    let context = match next_event(&mut events).await {
        DebugEvent::Suspended(context) => context,
        other => panic!("expected suspend, got {other:?}"),
    };
    assert_eq!(context.reason, SuspendReason::Breakpoint);
    assert_eq!(context.breakpoints_hit, vec![1]);
    assert_eq!(context.top_frame().unwrap().to_string(), "run (a.js:10:3)");
    assert_eq!(session.state(), SessionState::Suspended);

    let again = session.backtrace().await.unwrap();
    assert_eq!(again.frames.len(), 1);
    assert_eq!(again.total_frames, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_backtrace_reports_suspend_failed() {
    let (session, mut vm, mut events) = attach().await;
    vm.event("break", json!({"sourceLine": 1}));
    let request = vm.expect("backtrace").await;
    vm.respond(
        &request,
        json!({
            "fromFrame": 0, "toFrame": 1, "totalFrames": 1,
            "frames": [{"index": 0, "func": {"ref": 2}, "script": {"ref": 3}, "line": 1}]
        }),
        json!([]),
        false,
    );
    match next_event(&mut events).await {
        DebugEvent::SuspendFailed(SdkError::ProtocolLogic(message)) => {
            assert_eq!(message, "missing handle 3 in reference table");
        }
        other => panic!("expected suspend failure, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Suspended);
    assert!(session.backtrace().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clearing_cleared_breakpoint_is_a_local_no_op() {
    let (session, mut vm, _events) = attach().await;
    session.clear_breakpoint(99).await.unwrap();
    vm.expect_silence().await;

    let err = session
        .change_breakpoint(99, BreakpointChange::new().enabled(false))
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::UnknownBreakpoint(ref id) if id == "99"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn change_breakpoint_sends_only_supplied_fields() {
    let (session, mut vm, _events) = attach().await;
    let pending = session.set_breakpoint(
        BreakpointSpec::new(BreakpointTarget::ScriptName("a.js".into()))
            .at(9, None)
            .with_condition("x > 1"),
    );
    let request = vm.expect("setbreakpoint").await;
    assert_eq!(request["arguments"]["condition"], "x > 1");
    vm.respond(
        &request,
        json!({"type": "scriptName", "breakpoint": 1, "line": 9, "column": 0}),
        json!([]),
        true,
    );
    pending.await.unwrap();

    let pending = session.change_breakpoint(1, BreakpointChange::new().enabled(false));
    let request = vm.expect("changebreakpoint").await;
    assert_eq!(request["arguments"], json!({"breakpoint": 1, "enabled": false}));
    vm.respond(&request, Value::Null, json!([]), true);
    pending.await.unwrap();

    let breakpoints = session.breakpoints().await.unwrap();
    assert!(!breakpoints[0].spec.enabled);
    assert_eq!(breakpoints[0].spec.condition.as_deref(), Some("x > 1"));

    let pending = session.change_breakpoint(1, BreakpointChange::new().condition(None));
    let request = vm.expect("changebreakpoint").await;
    assert_eq!(request["arguments"], json!({"breakpoint": 1, "condition": null}));
    vm.respond(&request, Value::Null, json!([]), true);
    pending.await.unwrap();

    let breakpoints = session.breakpoints().await.unwrap();
    assert!(!breakpoints[0].spec.enabled);
    assert_eq!(breakpoints[0].spec.condition, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_failure_carries_vm_message() {
    let (session, mut vm, _events) = attach().await;
    let pending = session.evaluate("nope(", None);
    let request = vm.expect("evaluate").await;
    assert_eq!(request["arguments"]["global"], true);
    vm.respond_error(&request, "SyntaxError: Unexpected end of input");
    let err = pending.await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "evaluate failed: SyntaxError: Unexpected end of input"
    );
}

// ── Scripts ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scripts_load_once_then_come_from_registry() {
    let (session, mut vm, _events) = attach().await;
    let first = session.scripts();
    let second = session.scripts();
    let request = vm.expect("scripts").await;
    assert_eq!(
        request["arguments"],
        json!({"types": 4, "includeSource": false})
    );
    vm.expect_silence().await;
    vm.respond(
        &request,
        json!([
            {"handle": 1, "type": "script", "id": 17, "name": "a.js", "lineCount": 20},
            {"handle": 2, "type": "script", "id": 18, "lineCount": 1}
        ]),
        json!([]),
        true,
    );
    let first = first.await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first, second.await.unwrap());

    let again = session.scripts().await.unwrap();
    assert_eq!(again, first);
    vm.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn compiled_and_collected_scripts_update_registry() {
    let (session, mut vm, mut events) = attach().await;
    let loading = session.scripts();
    let request = vm.expect("scripts").await;
    vm.respond(
        &request,
        json!([{"handle": 1, "type": "script", "id": 17, "name": "a.js", "lineCount": 20}]),
        json!([]),
        true,
    );
    loading.await.unwrap();

    vm.event(
        "afterCompile",
        json!({"script": {"handle": 4, "type": "script", "id": 18, "name": "b.js", "lineCount": 3}}),
    );
    match next_event(&mut events).await {
        DebugEvent::ScriptLoaded(script) => {
            assert_eq!(script.id, ScriptId::from(18));
            assert_eq!(script.name.as_deref(), Some("b.js"));
            assert_eq!(script.line_count, 3);
        }
        other => panic!("expected script load, got {other:?}"),
    }
    let names: Vec<_> = session
        .scripts()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["a.js", "b.js"]);

    vm.event("scriptCollected", json!({"script": {"id": 17}}));
    match next_event(&mut events).await {
        DebugEvent::ScriptCollected(id) => assert_eq!(id, ScriptId::from(17)),
        other => panic!("expected script collection, got {other:?}"),
    }
    let remaining = session.scripts().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, ScriptId::from(18));
    vm.expect_silence().await;
}

// ── Frames, scopes and source ───────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frame_scope_and_source_while_suspended() {
    let (session, mut vm, mut events) = attach().await;
    break_in_run(&mut vm, &mut events).await;

    let pending = session.frame(0);
    let request = vm.expect("frame").await;
    assert_eq!(request["arguments"], json!({"number": 0}));
    vm.respond(&request, run_frame(), script_refs(), false);
    let frame = pending.await.unwrap();
    assert_eq!(frame.to_string(), "run (a.js:10:3)");
    assert_eq!(frame.scopes.len(), 2);
    assert_eq!(frame.receiver, Some(1));

    let pending = session.scope(0, 0);
    let request = vm.expect("scope").await;
    assert_eq!(
        request["arguments"],
        json!({"number": 0, "frameNumber": 0, "inlineRefs": true})
    );
    vm.respond(
        &request,
        json!({
            "type": 1, "index": 0, "frameIndex": 0,
            "object": {
                "handle": -1, "type": "object", "className": "Object",
                "properties": [{"name": "x", "ref": 6}]
            }
        }),
        json!([{"handle": 6, "type": "number", "value": 3}]),
        false,
    );
    let scope = pending.await.unwrap();
    assert_eq!(scope.properties().unwrap()[0].name, "x");

    // The reference table of a current reply feeds the suspend mapping.
    let x = session.value_mapping().get_or_load(6).await.unwrap();
    assert_eq!(x.primitive(), Some(&json!(3)));
    vm.expect_silence().await;

    let pending = session.source(None, Some(8), Some(10));
    let request = vm.expect("source").await;
    assert_eq!(request["arguments"], json!({"fromLine": 8, "toLine": 10}));
    vm.respond(
        &request,
        json!({
            "source": "function run() {\n  debugger;", "fromLine": 8, "toLine": 10,
            "fromPosition": 120, "toPosition": 148, "totalLines": 20
        }),
        json!([]),
        false,
    );
    let source = pending.await.unwrap();
    assert_eq!(source.from_line, 8);
    assert_eq!(source.total_lines, Some(20));
    assert!(source.source.ends_with("debugger;"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frame_requires_suspended() {
    let (session, mut vm, _events) = attach().await;
    assert!(matches!(
        session.frame(0).await,
        Err(SdkError::InvalidState { .. })
    ));
    assert!(matches!(
        session.source(None, None, None).await,
        Err(SdkError::InvalidState { .. })
    ));
    vm.expect_silence().await;
}

// ── Correlation and state ───────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replies_are_matched_by_request_seq() {
    let (session, mut vm, _events) = attach().await;
    let first = session.evaluate("1", None);
    let second = session.evaluate("'two'", None);
    let first_request = vm.expect("evaluate").await;
    let second_request = vm.expect("evaluate").await;

    vm.respond(
        &second_request,
        json!({"handle": 8, "type": "string", "value": "two"}),
        json!([]),
        true,
    );
    vm.respond(
        &first_request,
        json!({"handle": 7, "type": "number", "value": 1}),
        json!([]),
        true,
    );

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert_eq!(first.kind, ValueKind::Number);
    assert_eq!(second.as_str(), Some("two"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_callback_gets_cancelled_once() {
    let (session, mut vm, _events) = attach().await;

    let (done_tx, done_rx) = oneshot::channel();
    let token = session.send_command(DebuggerCommand::Version, move |result| {
        let _ = done_tx.send(result);
    });
    let request = vm.expect("version").await;
    token.cancel();
    assert!(matches!(done_rx.await.unwrap(), Err(SdkError::Cancelled)));

    // The late reply is dropped and the session keeps working.
    vm.respond(&request, json!({"V8Version": "3.14.5.9"}), json!([]), true);
    let (done_tx, done_rx) = oneshot::channel();
    let _token = session.send_command(DebuggerCommand::Version, move |result| {
        let _ = done_tx.send(result);
    });
    let request = vm.expect("version").await;
    vm.respond(&request, json!({"V8Version": "3.14.5.9"}), json!([]), true);
    let reply = done_rx.await.unwrap().unwrap();
    assert_eq!(reply.request_seq, request["seq"].as_u64().unwrap());
}

/// Records events and callbacks in the order the listener thread runs them.
struct Journal(mpsc::UnboundedSender<String>);

impl DebugEventListener<V8> for Journal {
    fn suspended(&mut self, context: &SuspendContext<V8>) {
        let _ = self.0.send(format!("suspended {:?}", context.reason));
    }

    fn resumed(&mut self) {
        let _ = self.0.send("resumed".into());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn continue_callback_runs_before_resumed_event() {
    let (journal_tx, mut journal) = mpsc::unbounded_channel();
    let (session, mut vm) = attach_with(Journal(journal_tx.clone()), true).await;

    hit_breakpoint(&mut vm);
    answer_backtrace(&mut vm).await;
    assert_eq!(journal.recv().await.unwrap(), "suspended Breakpoint");

    let _token = session.continue_with(None, None, move |result| {
        let _ = journal_tx.send(format!("continued ok={}", result.is_ok()));
    });
    let request = vm.expect("continue").await;
    vm.respond(&request, Value::Null, json!([]), true);

    assert_eq!(journal.recv().await.unwrap(), "continued ok=true");
    assert_eq!(journal.recv().await.unwrap(), "resumed");
    assert_eq!(session.state(), SessionState::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_reply_refs_do_not_reach_next_suspend() {
    let (session, mut vm, mut events) = attach().await;
    break_in_run(&mut vm, &mut events).await;

    let evaluated = session.evaluate("obj", None);
    let evaluate = vm.expect("evaluate").await;

    let resumed = session.continue_vm(None, None);
    let request = vm.expect("continue").await;
    vm.respond(&request, Value::Null, json!([]), true);
    resumed.await.unwrap();
    assert!(matches!(next_event(&mut events).await, DebugEvent::Resumed));
    break_in_run(&mut vm, &mut events).await;

    // Answered only now, with handles from the first suspend.
    vm.respond(
        &evaluate,
        json!({"handle": 41, "type": "object", "className": "Object"}),
        json!([{"handle": 42, "type": "string", "value": "STALE"}]),
        false,
    );
    assert_eq!(evaluated.await.unwrap().handle, 41);

    let mapping = session.value_mapping();
    let fresh = mapping.get_or_load(42);
    let lookup = vm.expect("lookup").await;
    assert_eq!(lookup["arguments"]["handles"], json!([42]));
    vm.respond(
        &lookup,
        json!({"42": {"handle": 42, "type": "string", "value": "fresh"}}),
        json!([]),
        false,
    );
    assert_eq!(fresh.await.unwrap().as_str(), Some("fresh"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn continue_requires_suspended() {
    let (session, mut vm, _events) = attach().await;
    let err = session.continue_vm(None, None).await.unwrap_err();
    assert!(matches!(
        err,
        SdkError::InvalidState {
            state: SessionState::Running,
            ..
        }
    ));
    vm.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn continue_reply_resumes_and_dismisses_values() {
    let (session, mut vm, mut events) = attach().await;
    break_in_run(&mut vm, &mut events).await;

    let mapping = session.value_mapping();
    let value = mapping.get_or_load(5);
    let lookup = vm.expect("lookup").await;
    assert_eq!(lookup["arguments"]["handles"], json!([5]));

    let resumed = session.continue_vm(None, None);
    let request = vm.expect("continue").await;
    assert!(request.get("arguments").is_none());
    vm.respond(&request, Value::Null, json!([]), true);
    resumed.await.unwrap();

    assert!(matches!(value.await, Err(SdkError::ContextDismissed)));
    assert!(matches!(next_event(&mut events).await, DebugEvent::Resumed));
    assert_eq!(session.state(), SessionState::Running);

    // The stale answer is dropped; a new request fetches again.
    vm.respond(
        &lookup,
        json!({"5": {"handle": 5, "type": "object", "className": "Object", "properties": []}}),
        json!([]),
        true,
    );
    let again = mapping.get_or_load(5);
    let lookup = vm.expect("lookup").await;
    vm.respond(
        &lookup,
        json!({"5": {"handle": 5, "type": "object", "className": "Object", "properties": []}}),
        json!([]),
        true,
    );
    assert!(again.await.unwrap().is_complete());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn step_sends_action_and_count() {
    let (session, mut vm, mut events) = attach().await;
    break_in_run(&mut vm, &mut events).await;

    let stepped = session.continue_vm(Some(jsdebug_protocol::v8::StepAction::Next), Some(2));
    let request = vm.expect("continue").await;
    assert_eq!(request["arguments"], json!({"stepaction": "next", "stepcount": 2}));
    vm.respond(&request, Value::Null, json!([]), true);
    stepped.await.unwrap();
    assert!(matches!(next_event(&mut events).await, DebugEvent::Resumed));

    vm.event("break", json!({"sourceLine": 11}));
    let request = vm.expect("backtrace").await;
    vm.respond(
        &request,
        json!({"fromFrame": 0, "toFrame": 0, "totalFrames": 0, "frames": []}),
        json!([]),
        false,
    );
    match next_event(&mut events).await {
        DebugEvent::Suspended(context) => assert_eq!(context.reason, SuspendReason::Step),
        other => panic!("expected suspend, got {other:?}"),
    }
}

// ── Value mapping ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_loads_share_one_lookup() {
    let (session, mut vm, _events) = attach().await;
    let mapping = session.value_mapping();

    let a = mapping.get_or_load(5);
    let b = mapping.get_or_load(5);
    let request = vm.expect("lookup").await;
    assert_eq!(request["arguments"]["handles"], json!([5]));
    vm.expect_silence().await;

    vm.respond(
        &request,
        json!({"5": {
            "handle": 5, "type": "object", "className": "Object",
            "properties": [{"name": "x", "ref": 6}]
        }}),
        json!([{"handle": 6, "type": "number", "value": 3}]),
        true,
    );
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert_eq!(a, b);
    assert_eq!(a.properties().unwrap()[0].name, "x");

    // Served from the cache.
    let c = mapping.get_or_load(5).await.unwrap();
    assert_eq!(c.handle, 5);
    vm.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_load_dedups_handles() {
    let (session, mut vm, _events) = attach().await;
    let mapping = session.value_mapping();

    let loading = tokio::spawn(async move { mapping.get_or_load_properties(&[7, 5, 7]).await });
    let request = vm.expect("lookup").await;
    assert_eq!(request["arguments"]["handles"], json!([5, 7]));
    vm.respond(
        &request,
        json!({
            "5": {"handle": 5, "type": "object", "className": "Object", "properties": []},
            "7": {"handle": 7, "type": "object", "className": "Array", "properties": []}
        }),
        json!([]),
        true,
    );
    let loaded = loading.await.unwrap().unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[&7].class_name.as_deref(), Some("Array"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_lookup_entry_fails_the_waiter() {
    let (session, mut vm, _events) = attach().await;
    let pending = session.value_mapping().get_or_load(9);
    let request = vm.expect("lookup").await;
    vm.respond(&request, json!({}), json!([]), true);
    let err = pending.await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "protocol logic error: failed to find value for ref 9"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn truncated_string_reloads_with_larger_limit() {
    let (session, mut vm, _events) = attach().await;
    let mapping = session.value_mapping();

    let pending = mapping.get_or_load(7);
    let request = vm.expect("lookup").await;
    vm.respond(
        &request,
        json!({"7": {
            "handle": 7, "type": "string", "value": "x".repeat(80),
            "fromIndex": 0, "toIndex": 80, "length": 1000
        }}),
        json!([]),
        true,
    );
    let partial = pending.await.unwrap();
    assert!(partial.is_truncated());

    let reloading = mapping.reload_truncated(&partial);
    let request = vm.expect("lookup").await;
    assert_eq!(request["arguments"]["maxStringLength"], 65_536);
    vm.respond(
        &request,
        json!({"7": {
            "handle": 7, "type": "string", "value": "x".repeat(1000),
            "fromIndex": 0, "toIndex": 1000, "length": 1000
        }}),
        json!([]),
        true,
    );
    let full = reloading.await.unwrap();
    assert!(!full.is_truncated());
    assert_eq!(full.as_str().map(str::len), Some(1000));
}

// ── Shutdown ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_close_fails_pending_and_detaches() {
    let (session, mut vm, mut events) = attach().await;
    let pending = session.evaluate("1", None);
    vm.expect("evaluate").await;
    vm.remote.close("socket reset");

    assert!(matches!(pending.await, Err(SdkError::Disconnected)));
    match next_event(&mut events).await {
        DebugEvent::Disconnected(reason) => assert_eq!(reason, "socket reset"),
        other => panic!("expected disconnect, got {other:?}"),
    }
    assert!(session.wait_for_state(SessionState::Running).await.is_err());
    assert_eq!(session.state(), SessionState::Detached);
    assert!(matches!(session.scripts().await, Err(SdkError::Disconnected)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn detach_fails_outstanding_commands() {
    let (session, mut vm, mut events) = attach().await;
    let pending = session.evaluate("1", None);
    vm.expect("evaluate").await;

    session.detach().await.unwrap();
    assert!(matches!(pending.await, Err(SdkError::Disconnected)));
    assert!(matches!(next_event(&mut events).await, DebugEvent::Disconnected(_)));
}
