//! jsdebug-sdk: JavaScript VM debugger sessions.
//!
//! This crate drives a debug session against a V8-based VM, over either the
//! native length-framed protocol ([`v8::DebugSession`]) or the WebSocket
//! Inspector protocol ([`wip::WipSession`]). It handles command
//! correlation, the running/suspended state machine, value mirrors with
//! per-suspend caching, breakpoints and backtraces.
pub mod breakpoint;
pub mod dialect;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod frame;
pub mod mirror;
pub mod options;
pub mod reply;
pub mod script;
pub mod state;
pub mod transport;
pub mod v8;
pub mod wip;

// Re-export key types for convenience.
pub use breakpoint::{
    Breakpoint, BreakpointChange, BreakpointSpec, BreakpointTable, BreakpointTarget, IgnoreCount,
    IgnoreCountState,
};
pub use dialect::{Dialect, RemoteHandle, Wip, V8};
pub use error::SdkError;
pub use event::{ConsoleEntry, DebugEvent, DebugEventListener, SuspendContext, SuspendReason};
pub use frame::{FrameId, ScopeKind, ScopeMirror, StackFrame};
pub use mirror::{
    MappingId, MirrorCache, MirrorData, PropertyMirror, PropertyValue, Truncation, ValueKind,
    ValueMirror,
};
pub use options::SessionOptions;
pub use reply::{CommandToken, PendingReply};
pub use script::{Script, ScriptId, ScriptRegistry};
pub use state::{SessionMachine, SessionState};
pub use transport::{Wire, WireEvent};
pub use v8::{DebugSession, ValueMapping};
pub use wip::{WipSession, WipValueMapping};
