//! Protocol dialect markers.
//!
//! Types shared by both sessions (frames, events, the mirror cache) are
//! generic over a [`Dialect`] so each backend plugs in its own handle and
//! breakpoint-id types.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A protocol-assigned identifier for a VM-side object.
pub trait RemoteHandle: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {
    /// Whether mirrors for this handle may be cached.
    ///
    /// Some auxiliary handles are reused by protocol convention and must
    /// always be fetched afresh.
    fn is_cacheable(&self) -> bool;
}

impl RemoteHandle for i64 {
    fn is_cacheable(&self) -> bool {
        *self >= 0
    }
}

impl RemoteHandle for String {
    fn is_cacheable(&self) -> bool {
        !self.is_empty()
    }
}

/// A debugger wire dialect.
pub trait Dialect: Debug + Clone + Send + Sync + 'static {
    /// Remote object identifier.
    type Handle: RemoteHandle;
    /// VM-assigned breakpoint identifier.
    type BreakpointId: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static;
    /// Short name used in logs.
    const NAME: &'static str;
}

/// The native length-framed V8 protocol.
#[derive(Debug, Clone, Copy)]
pub struct V8;

impl Dialect for V8 {
    type Handle = i64;
    type BreakpointId = i64;
    const NAME: &'static str = "v8";
}

/// The WebSocket Inspector protocol.
#[derive(Debug, Clone, Copy)]
pub struct Wip;

impl Dialect for Wip {
    type Handle = String;
    type BreakpointId = String;
    const NAME: &'static str = "wip";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_native_handles_are_not_cacheable() {
        assert!(0i64.is_cacheable());
        assert!(42i64.is_cacheable());
        assert!(!(-1i64).is_cacheable());
    }

    #[test]
    fn wip_object_ids_are_cacheable() {
        assert!(String::from("{\"injectedScriptId\":1,\"id\":3}").is_cacheable());
        assert!(!String::new().is_cacheable());
    }
}
