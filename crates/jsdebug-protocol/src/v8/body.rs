//! Response and event bodies of the native protocol.

use serde::Deserialize;

use crate::v8::command::BreakpointTargetType;
use crate::v8::handle::{ScriptHandle, SomeRef, ValueHandle};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VersionBody {
    #[serde(rename = "V8Version")]
    pub v8_version: String,
}

/// Kind of a scope in a frame's scope chain. Encoded as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "u8")]
pub enum ScopeType {
    Global,
    Local,
    With,
    Closure,
    Catch,
}

impl TryFrom<u8> for ScopeType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ScopeType::Global),
            1 => Ok(ScopeType::Local),
            2 => Ok(ScopeType::With),
            3 => Ok(ScopeType::Closure),
            4 => Ok(ScopeType::Catch),
            other => Err(format!("unknown scope type {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScopeRef {
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedValue {
    #[serde(default)]
    pub name: Option<String>,
    pub value: SomeRef,
}

/// One frame of a `backtrace` body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameObject {
    pub index: u32,
    #[serde(default)]
    pub receiver: Option<SomeRef>,
    pub func: SomeRef,
    #[serde(default)]
    pub script: Option<SomeRef>,
    #[serde(default)]
    pub construct_call: bool,
    #[serde(default)]
    pub debugger_frame: bool,
    #[serde(default)]
    pub arguments: Vec<NamedValue>,
    #[serde(default)]
    pub locals: Vec<NamedValue>,
    #[serde(default)]
    pub position: Option<i64>,
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    #[serde(default)]
    pub source_line_text: Option<String>,
    #[serde(default)]
    pub scopes: Vec<ScopeRef>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktraceBody {
    #[serde(default)]
    pub from_frame: u32,
    #[serde(default)]
    pub to_frame: u32,
    #[serde(default)]
    pub total_frames: u32,
    #[serde(default)]
    pub frames: Vec<FrameObject>,
}

/// Body of a `scope` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeBody {
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    pub index: u32,
    #[serde(default)]
    pub frame_index: Option<u32>,
    pub object: ValueHandle,
}

/// Body of a `setbreakpoint` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BreakpointBody {
    #[serde(rename = "type")]
    pub target_type: BreakpointTargetType,
    pub breakpoint: i64,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
    #[serde(default)]
    pub script_name: Option<String>,
}

/// Script summary embedded in break events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRef {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub line_offset: i64,
    #[serde(default)]
    pub column_offset: i64,
    #[serde(default)]
    pub line_count: u32,
}

/// Body of `break` and `exception` events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEventBody {
    #[serde(default)]
    pub invocation_text: Option<String>,
    #[serde(default)]
    pub source_line: Option<u32>,
    #[serde(default)]
    pub source_column: Option<u32>,
    #[serde(default)]
    pub source_line_text: Option<String>,
    #[serde(default)]
    pub script: Option<ScriptRef>,
    #[serde(default)]
    pub breakpoints: Option<Vec<i64>>,
    #[serde(default)]
    pub uncaught: Option<bool>,
    #[serde(default)]
    pub exception: Option<SomeRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AfterCompileBody {
    pub script: ScriptHandle,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptIdRef {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptCollectedBody {
    pub script: ScriptIdRef,
}

/// Body of a `source` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBody {
    pub source: String,
    #[serde(default)]
    pub from_line: u32,
    #[serde(default)]
    pub to_line: u32,
    #[serde(default)]
    pub from_position: Option<u64>,
    #[serde(default)]
    pub to_position: Option<u64>,
    #[serde(default)]
    pub total_lines: Option<u32>,
}
