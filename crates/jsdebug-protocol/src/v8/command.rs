//! Outgoing native debugger commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::Field;

/// Step granularity for `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    /// Step into calls.
    In,
    /// Step over calls.
    Next,
    /// Step out of the current function.
    Out,
}

/// How a breakpoint target is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakpointTargetType {
    /// By script name.
    #[serde(rename = "script", alias = "scriptName")]
    ScriptName,
    /// By numeric script id.
    #[serde(rename = "scriptId")]
    ScriptId,
    /// By regular expression over script names.
    #[serde(rename = "scriptRegExp")]
    ScriptRegExp,
    /// By function expression.
    #[serde(rename = "function")]
    Function,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContinueArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stepaction: Option<StepAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stepcount: Option<u32>,
}

/// A named handle made visible to an evaluated expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBinding {
    pub name: String,
    pub handle: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluateArgs {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_break: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<Vec<ContextBinding>>,
    #[serde(rename = "inlineRefs", skip_serializing_if = "Option::is_none")]
    pub inline_refs: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktraceArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_frame: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_frame: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compact_format: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_refs: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameArgs {
    pub number: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeArgs {
    pub number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_handle: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_refs: Option<bool>,
}

/// Script type bit for ordinary page scripts.
pub const SCRIPT_TYPE_NORMAL: u32 = 4;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptsArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_source: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointArgs {
    #[serde(rename = "type")]
    pub target_type: BreakpointTargetType,
    pub target: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearBreakpointArgs {
    pub breakpoint: i64,
}

/// Partial breakpoint update. Absent fields are omitted from the wire so
/// the VM keeps its current value for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBreakpointArgs {
    pub breakpoint: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Field::is_absent")]
    pub condition: Field<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupArgs {
    pub handles: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_source: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_refs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_string_length: Option<u64>,
}

/// A command the client can send to the VM.
#[derive(Debug, Clone, PartialEq)]
pub enum DebuggerCommand {
    Continue(ContinueArgs),
    Evaluate(EvaluateArgs),
    Backtrace(BacktraceArgs),
    Frame(FrameArgs),
    Scope(ScopeArgs),
    Scripts(ScriptsArgs),
    Source(SourceArgs),
    SetBreakpoint(SetBreakpointArgs),
    ClearBreakpoint(ClearBreakpointArgs),
    ChangeBreakpoint(ChangeBreakpointArgs),
    Lookup(LookupArgs),
    Version,
    Suspend,
}

/// Wire envelope of an outgoing command.
#[derive(Debug, Serialize)]
pub struct Request {
    pub seq: u64,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl DebuggerCommand {
    /// Protocol name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            DebuggerCommand::Continue(_) => "continue",
            DebuggerCommand::Evaluate(_) => "evaluate",
            DebuggerCommand::Backtrace(_) => "backtrace",
            DebuggerCommand::Frame(_) => "frame",
            DebuggerCommand::Scope(_) => "scope",
            DebuggerCommand::Scripts(_) => "scripts",
            DebuggerCommand::Source(_) => "source",
            DebuggerCommand::SetBreakpoint(_) => "setbreakpoint",
            DebuggerCommand::ClearBreakpoint(_) => "clearbreakpoint",
            DebuggerCommand::ChangeBreakpoint(_) => "changebreakpoint",
            DebuggerCommand::Lookup(_) => "lookup",
            DebuggerCommand::Version => "version",
            DebuggerCommand::Suspend => "suspend",
        }
    }

    /// Serialized `arguments` object, if the command takes any.
    pub fn arguments(&self) -> Result<Option<Value>, serde_json::Error> {
        let value = match self {
            DebuggerCommand::Continue(args) => {
                if args == &ContinueArgs::default() {
                    return Ok(None);
                }
                serde_json::to_value(args)?
            }
            DebuggerCommand::Evaluate(args) => serde_json::to_value(args)?,
            DebuggerCommand::Backtrace(args) => serde_json::to_value(args)?,
            DebuggerCommand::Frame(args) => serde_json::to_value(args)?,
            DebuggerCommand::Scope(args) => serde_json::to_value(args)?,
            DebuggerCommand::Scripts(args) => serde_json::to_value(args)?,
            DebuggerCommand::Source(args) => serde_json::to_value(args)?,
            DebuggerCommand::SetBreakpoint(args) => serde_json::to_value(args)?,
            DebuggerCommand::ClearBreakpoint(args) => serde_json::to_value(args)?,
            DebuggerCommand::ChangeBreakpoint(args) => serde_json::to_value(args)?,
            DebuggerCommand::Lookup(args) => serde_json::to_value(args)?,
            DebuggerCommand::Version | DebuggerCommand::Suspend => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Build the request envelope for sequence number `seq`.
    pub fn to_request(&self, seq: u64) -> Result<Request, serde_json::Error> {
        Ok(Request {
            seq,
            message_type: "request",
            command: self.name(),
            arguments: self.arguments()?,
        })
    }

    /// Serialize the request envelope to JSON text.
    pub fn to_text(&self, seq: u64) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_request(seq)?)
    }
}
