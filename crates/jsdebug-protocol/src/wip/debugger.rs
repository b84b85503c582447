//! `Debugger` domain.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::wip::message::{Empty, WipCommand};
use crate::wip::runtime::{EvaluateResponse, RemoteObject};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub script_id: String,
    pub line_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeType {
    Global,
    Local,
    With,
    Closure,
    Catch,
    Block,
    Script,
    Eval,
    Module,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scope {
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    pub object: RemoteObject,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub call_frame_id: String,
    pub function_name: String,
    pub location: Location,
    #[serde(default)]
    pub url: Option<String>,
    pub scope_chain: Vec<Scope>,
    #[serde(default)]
    pub this: Option<RemoteObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PauseReason {
    #[serde(rename = "ambiguous")]
    Ambiguous,
    #[serde(rename = "assert")]
    Assert,
    #[serde(rename = "CSPViolation")]
    CspViolation,
    #[serde(rename = "debugCommand")]
    DebugCommand,
    #[serde(rename = "DOM")]
    Dom,
    #[serde(rename = "EventListener")]
    EventListener,
    #[serde(rename = "exception")]
    Exception,
    #[serde(rename = "instrumentation")]
    Instrumentation,
    #[serde(rename = "OOM")]
    Oom,
    #[serde(rename = "other")]
    Other,
    #[serde(rename = "promiseRejection")]
    PromiseRejection,
    #[serde(rename = "XHR")]
    Xhr,
    #[serde(rename = "step")]
    Step,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
    pub call_frames: Vec<CallFrame>,
    pub reason: PauseReason,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub hit_breakpoints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsedEvent {
    pub script_id: String,
    pub url: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    #[serde(default, rename = "sourceMapURL")]
    pub source_map_url: Option<String>,
    #[serde(default)]
    pub is_content_script: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointResolvedEvent {
    pub breakpoint_id: String,
    pub location: Location,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Enable {}

impl WipCommand for Enable {
    const METHOD: &'static str = "Debugger.enable";
    type Response = Empty;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Resume {}

impl WipCommand for Resume {
    const METHOD: &'static str = "Debugger.resume";
    type Response = Empty;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Pause {}

impl WipCommand for Pause {
    const METHOD: &'static str = "Debugger.pause";
    type Response = Empty;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepOver {}

impl WipCommand for StepOver {
    const METHOD: &'static str = "Debugger.stepOver";
    type Response = Empty;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepInto {}

impl WipCommand for StepInto {
    const METHOD: &'static str = "Debugger.stepInto";
    type Response = Empty;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepOut {}

impl WipCommand for StepOut {
    const METHOD: &'static str = "Debugger.stepOut";
    type Response = Empty;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrl {
    pub line_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlResponse {
    pub breakpoint_id: String,
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl WipCommand for SetBreakpointByUrl {
    const METHOD: &'static str = "Debugger.setBreakpointByUrl";
    type Response = SetBreakpointByUrlResponse;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBreakpoint {
    pub breakpoint_id: String,
}

impl WipCommand for RemoveBreakpoint {
    const METHOD: &'static str = "Debugger.removeBreakpoint";
    type Response = Empty;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SetBreakpointsActive {
    pub active: bool,
}

impl WipCommand for SetBreakpointsActive {
    const METHOD: &'static str = "Debugger.setBreakpointsActive";
    type Response = Empty;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOnCallFrame {
    pub call_frame_id: String,
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
}

impl WipCommand for EvaluateOnCallFrame {
    const METHOD: &'static str = "Debugger.evaluateOnCallFrame";
    type Response = EvaluateResponse;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetScriptSource {
    pub script_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetScriptSourceResponse {
    pub script_source: String,
}

impl WipCommand for GetScriptSource {
    const METHOD: &'static str = "Debugger.getScriptSource";
    type Response = GetScriptSourceResponse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::decode_fields;
    use serde_json::json;

    fn paused_fixture() -> Value {
        json!({
            "callFrames": [{
                "callFrameId": "{\"ordinal\":0,\"injectedScriptId\":1}",
                "functionName": "tick",
                "location": {"scriptId": "31", "lineNumber": 9, "columnNumber": 4},
                "scopeChain": [
                    {"type": "local", "object": {"type": "object", "objectId": "scope:0:0"}},
                    {"type": "global", "object": {"type": "object", "className": "Window", "objectId": "scope:0:1"}}
                ],
                "this": {"type": "object", "className": "Window", "objectId": "this:0"}
            }],
            "reason": "other",
            "hitBreakpoints": ["31:9:0"]
        })
    }

    #[test]
    fn paused_event_decodes_frames_and_scopes() {
        let evt: PausedEvent = decode_fields("PausedEvent", &paused_fixture()).unwrap();
        assert_eq!(evt.reason, PauseReason::Other);
        let frame = &evt.call_frames[0];
        assert_eq!(frame.function_name, "tick");
        assert_eq!(frame.location.line_number, 9);
        assert_eq!(frame.scope_chain.len(), 2);
        assert_eq!(frame.scope_chain[0].scope_type, ScopeType::Local);
        assert_eq!(frame.scope_chain[1].object.object_id(), Some("scope:0:1"));
        assert_eq!(evt.hit_breakpoints, vec!["31:9:0".to_string()]);
    }

    #[test]
    fn unknown_pause_reason_is_an_error() {
        let mut raw = paused_fixture();
        raw["reason"] = json!("lunarEclipse");
        assert!(decode_fields::<PausedEvent>("PausedEvent", &raw).is_err());
    }

    #[test]
    fn script_parsed_event() {
        let evt: ScriptParsedEvent = decode_fields(
            "ScriptParsedEvent",
            &json!({
                "scriptId": "31", "url": "http://localhost/a.js",
                "startLine": 0, "startColumn": 0, "endLine": 40, "endColumn": 1,
                "sourceMapURL": "a.js.map"
            }),
        )
        .unwrap();
        assert_eq!(evt.script_id, "31");
        assert_eq!(evt.source_map_url.as_deref(), Some("a.js.map"));
    }

    #[test]
    fn set_breakpoint_by_url_params() {
        let params = serde_json::to_value(SetBreakpointByUrl {
            line_number: 9,
            url: Some("http://localhost/a.js".into()),
            condition: Some("i > 3".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            params,
            json!({"lineNumber": 9, "url": "http://localhost/a.js", "condition": "i > 3"})
        );
    }

    #[test]
    fn parameterless_commands_send_empty_object() {
        assert_eq!(serde_json::to_value(Resume {}).unwrap(), json!({}));
    }
}
