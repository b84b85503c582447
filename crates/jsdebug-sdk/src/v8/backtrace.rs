//! Stack frames from a native `backtrace` body.

use jsdebug_protocol::v8::{BacktraceBody, FrameObject, SomeRef, ValueHandle};

use crate::error::SdkError;
use crate::frame::{FrameId, ScopeMirror, StackFrame};
use crate::script::{ScriptId, ScriptRegistry};
use crate::v8::values::RefTable;

/// Build frames, top of the stack first.
///
/// A frame that points at a script missing from the reference table fails
/// the whole backtrace; a half-built stack is never returned.
pub(crate) fn build_frames(
    body: &BacktraceBody,
    refs: &RefTable,
    scripts: &ScriptRegistry,
) -> Result<Vec<StackFrame<i64>>, SdkError> {
    body.frames
        .iter()
        .map(|frame| build_frame(frame, refs, scripts))
        .collect()
}

pub(crate) fn build_frame(
    frame: &FrameObject,
    refs: &RefTable,
    scripts: &ScriptRegistry,
) -> Result<StackFrame<i64>, SdkError> {
    let (script_id, script_name) = match &frame.script {
        Some(script) => {
            let handle = script.reference();
            let entry = refs.script(handle).ok_or_else(|| {
                SdkError::ProtocolLogic(format!("missing handle {handle} in reference table"))
            })?;
            (Some(ScriptId::from(entry.id)), entry.name.clone())
        }
        None => {
            let id = frame
                .func
                .display()
                .and_then(|f| f.script_id)
                .map(ScriptId::from);
            let name = id
                .as_ref()
                .and_then(|id| scripts.get(id))
                .and_then(|s| s.name.clone());
            (id, name)
        }
    };

    let scopes = frame
        .scopes
        .iter()
        .map(|scope| ScopeMirror {
            kind: scope.scope_type.into(),
            index: scope.index,
            name: None,
            object: None,
        })
        .collect();

    Ok(StackFrame {
        index: frame.index,
        id: FrameId::Index(frame.index),
        function_name: function_name(&frame.func, refs),
        script_id,
        script_name,
        line: frame.line,
        column: Some(frame.column),
        source_line_text: frame.source_line_text.clone(),
        receiver: frame.receiver.as_ref().map(SomeRef::reference),
        scopes,
    })
}

fn function_name(func: &SomeRef, refs: &RefTable) -> String {
    if let Some(display) = func.display() {
        let inline = display
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(display.inferred_name.as_deref());
        if let Some(name) = inline {
            return name.to_string();
        }
    }
    match refs.value(func.reference()) {
        Some(ValueHandle::Function(f)) => f.display_name().unwrap_or_default().to_string(),
        _ => String::new(),
    }
}
