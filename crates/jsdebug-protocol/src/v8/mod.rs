//! Shape catalogue of the native length-framed V8 debugger protocol.

pub mod body;
pub mod command;
pub mod handle;
pub mod message;

pub use body::{
    AfterCompileBody, BacktraceBody, BreakEventBody, BreakpointBody, FrameObject, NamedValue,
    ScopeBody, ScopeRef, ScopeType, ScriptCollectedBody, ScriptRef, SourceBody, VersionBody,
};
pub use command::{
    BacktraceArgs, BreakpointTargetType, ChangeBreakpointArgs, ClearBreakpointArgs,
    ContextBinding, ContinueArgs, DebuggerCommand, EvaluateArgs, FrameArgs, LookupArgs, ScopeArgs,
    ScriptsArgs, SetBreakpointArgs, SourceArgs, StepAction, SCRIPT_TYPE_NORMAL,
};
pub use handle::{
    FunctionValue, ObjectValue, PrimitiveValue, PropertyName, PropertyObject, ScriptHandle,
    SomeHandle, SomeRef, ValueHandle, ValueType,
};
pub use message::{
    CommandResponse, EventKind, EventNotification, FailedResponse, IncomingMessage,
    SuccessResponse,
};
