//! Call-stack frames built on every suspend.

use std::fmt;

use crate::script::ScriptId;

/// How a frame is addressed in follow-up commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameId {
    /// Native protocol: index from the top of the stack.
    Index(u32),
    /// WIP: opaque call-frame id.
    CallFrame(String),
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameId::Index(i) => write!(f, "#{i}"),
            FrameId::CallFrame(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
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

impl From<jsdebug_protocol::v8::ScopeType> for ScopeKind {
    fn from(kind: jsdebug_protocol::v8::ScopeType) -> Self {
        use jsdebug_protocol::v8::ScopeType;
        match kind {
            ScopeType::Global => ScopeKind::Global,
            ScopeType::Local => ScopeKind::Local,
            ScopeType::With => ScopeKind::With,
            ScopeType::Closure => ScopeKind::Closure,
            ScopeType::Catch => ScopeKind::Catch,
        }
    }
}

impl From<jsdebug_protocol::wip::debugger::ScopeType> for ScopeKind {
    fn from(kind: jsdebug_protocol::wip::debugger::ScopeType) -> Self {
        use jsdebug_protocol::wip::debugger::ScopeType;
        match kind {
            ScopeType::Global => ScopeKind::Global,
            ScopeType::Local => ScopeKind::Local,
            ScopeType::With => ScopeKind::With,
            ScopeType::Closure => ScopeKind::Closure,
            ScopeType::Catch => ScopeKind::Catch,
            ScopeType::Block => ScopeKind::Block,
            ScopeType::Script => ScopeKind::Script,
            ScopeType::Eval => ScopeKind::Eval,
            ScopeType::Module => ScopeKind::Module,
        }
    }
}

/// One entry of a frame's scope chain.
///
/// The variable object is not resolved here; load it through the
/// session's value mapping when the caller inspects the scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeMirror<H> {
    pub kind: ScopeKind,
    /// Position in the chain, innermost first.
    pub index: u32,
    pub name: Option<String>,
    /// Handle of the variable object, when the VM reported one up front.
    pub object: Option<H>,
}

/// A suspended frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame<H> {
    /// Position from the top of the stack.
    pub index: u32,
    pub id: FrameId,
    pub function_name: String,
    pub script_id: Option<ScriptId>,
    pub script_name: Option<String>,
    /// Zero-based line.
    pub line: u32,
    pub column: Option<u32>,
    pub source_line_text: Option<String>,
    /// Handle of `this`.
    pub receiver: Option<H>,
    pub scopes: Vec<ScopeMirror<H>>,
}

impl<H> fmt::Display for StackFrame<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let function = if self.function_name.is_empty() {
            "<anonymous>"
        } else {
            &self.function_name
        };
        let script = self.script_name.as_deref().unwrap_or("<unknown>");
        write!(f, "{function} ({script}:{}", self.line + 1)?;
        if let Some(column) = self.column {
            write!(f, ":{}", column + 1)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(function: &str, column: Option<u32>) -> StackFrame<i64> {
        StackFrame {
            index: 0,
            id: FrameId::Index(0),
            function_name: function.into(),
            script_id: Some(ScriptId::from(4)),
            script_name: Some("a.js".into()),
            line: 9,
            column,
            source_line_text: None,
            receiver: None,
            scopes: Vec::new(),
        }
    }

    #[test]
    fn frame_display_is_one_based() {
        assert_eq!(frame("run", Some(2)).to_string(), "run (a.js:10:3)");
        assert_eq!(frame("", None).to_string(), "<anonymous> (a.js:10)");
    }

    #[test]
    fn scope_kinds_from_both_dialects() {
        assert_eq!(
            ScopeKind::from(jsdebug_protocol::v8::ScopeType::Closure),
            ScopeKind::Closure
        );
        assert_eq!(
            ScopeKind::from(jsdebug_protocol::wip::debugger::ScopeType::Block),
            ScopeKind::Block
        );
    }

    #[test]
    fn frame_id_display() {
        assert_eq!(FrameId::Index(2).to_string(), "#2");
        assert_eq!(FrameId::CallFrame("cf:1".into()).to_string(), "cf:1");
    }
}
