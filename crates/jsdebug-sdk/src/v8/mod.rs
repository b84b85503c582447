//! Session on the native length-framed V8 debugger protocol.

mod actor;
mod backtrace;
mod session;
mod values;

pub use session::{DebugSession, ValueMapping};
