//! Inspector remote objects to local mirrors and frames.

use jsdebug_protocol::wip::debugger::{CallFrame, ScriptParsedEvent};
use jsdebug_protocol::wip::runtime::{ObjectSubtype, PropertyDescriptor, RemoteObjectType};
use jsdebug_protocol::wip::RemoteObject;
use serde_json::Value;

use crate::frame::{FrameId, ScopeMirror, StackFrame};
use crate::mirror::{MirrorData, PropertyMirror, PropertyValue, ValueKind, ValueMirror};
use crate::script::{Script, ScriptId, ScriptRegistry};

pub(crate) fn kind_of(object_type: RemoteObjectType, subtype: Option<ObjectSubtype>) -> ValueKind {
    match object_type {
        RemoteObjectType::Undefined => ValueKind::Undefined,
        RemoteObjectType::String => ValueKind::String,
        RemoteObjectType::Number => ValueKind::Number,
        RemoteObjectType::Boolean => ValueKind::Boolean,
        RemoteObjectType::Symbol => ValueKind::Symbol,
        RemoteObjectType::Bigint => ValueKind::BigInt,
        RemoteObjectType::Function => ValueKind::Function,
        RemoteObjectType::Object => match subtype {
            None => ValueKind::Object,
            Some(ObjectSubtype::Null) => ValueKind::Null,
            Some(ObjectSubtype::Array) | Some(ObjectSubtype::Typedarray) => ValueKind::Array,
            Some(ObjectSubtype::Regexp) => ValueKind::RegExp,
            Some(ObjectSubtype::Date) => ValueKind::Date,
            Some(ObjectSubtype::Error) => ValueKind::Error,
            Some(_) => ValueKind::Other,
        },
    }
}

/// Inline values have no object id; they are mirrored under an empty,
/// uncacheable handle.
pub(crate) fn mirror_from_remote(object: &RemoteObject) -> ValueMirror<String> {
    match object {
        RemoteObject::Reference(r) => ValueMirror {
            handle: r.object_id.clone(),
            kind: kind_of(r.object_type, r.subtype),
            class_name: r.class_name.clone(),
            description: r.description.clone(),
            data: MirrorData::ReferenceOnly,
            generation: 0,
        },
        RemoteObject::Inline(v) => ValueMirror {
            handle: String::new(),
            kind: kind_of(v.object_type, v.subtype),
            class_name: None,
            description: v.description.clone(),
            data: MirrorData::Primitive {
                value: inline_value(v.value.as_option(), v.unserializable_value.as_deref()),
                truncation: None,
            },
            generation: 0,
        },
    }
}

fn inline_value(value: Option<&Value>, unserializable: Option<&str>) -> Value {
    match (value, unserializable) {
        (Some(value), _) => value.clone(),
        (None, Some(text)) => Value::String(text.to_string()),
        (None, None) => Value::Null,
    }
}

pub(crate) fn property_mirror(descriptor: &PropertyDescriptor) -> PropertyMirror<String> {
    let value = match &descriptor.value {
        Some(RemoteObject::Reference(r)) => PropertyValue::Remote {
            handle: r.object_id.clone(),
            kind: Some(kind_of(r.object_type, r.subtype)),
            description: r.description.clone(),
        },
        Some(RemoteObject::Inline(v)) => PropertyValue::Inline {
            kind: kind_of(v.object_type, v.subtype),
            value: inline_value(v.value.as_option(), v.unserializable_value.as_deref()),
            description: v.description.clone(),
        },
        // Accessor without a materialized value.
        None => PropertyValue::Inline {
            kind: ValueKind::Undefined,
            value: Value::Null,
            description: Some("<accessor>".into()),
        },
    };
    PropertyMirror {
        name: descriptor.name.clone(),
        value,
    }
}

pub(crate) fn script_from_parsed(event: &ScriptParsedEvent) -> Script {
    Script {
        id: ScriptId::new(event.script_id.clone()),
        name: Some(event.url.clone()).filter(|url| !url.is_empty()),
        line_offset: i64::from(event.start_line),
        column_offset: i64::from(event.start_column),
        line_count: event.end_line.saturating_sub(event.start_line) + 1,
        source: None,
    }
}

/// Frames of a `Debugger.paused` event, top first.
pub(crate) fn build_frames(
    call_frames: &[CallFrame],
    scripts: &ScriptRegistry,
) -> Vec<StackFrame<String>> {
    call_frames
        .iter()
        .enumerate()
        .map(|(index, frame)| {
            let script_id = ScriptId::new(frame.location.script_id.clone());
            let script_name = frame
                .url
                .clone()
                .filter(|url| !url.is_empty())
                .or_else(|| scripts.get(&script_id).and_then(|s| s.name.clone()));
            let scopes = frame
                .scope_chain
                .iter()
                .enumerate()
                .map(|(i, scope)| ScopeMirror {
                    kind: scope.scope_type.into(),
                    index: i as u32,
                    name: scope.name.clone(),
                    object: scope.object.object_id().map(str::to_string),
                })
                .collect();
            StackFrame {
                index: index as u32,
                id: FrameId::CallFrame(frame.call_frame_id.clone()),
                function_name: frame.function_name.clone(),
                script_id: Some(script_id),
                script_name,
                line: frame.location.line_number,
                column: frame.location.column_number,
                source_line_text: None,
                receiver: frame
                    .this
                    .as_ref()
                    .and_then(RemoteObject::object_id)
                    .map(str::to_string),
                scopes,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ScopeKind;
    use jsdebug_protocol::decode;
    use jsdebug_protocol::decode_fields;
    use serde_json::json;

    #[test]
    fn reference_object_mirror() {
        let object: RemoteObject = decode(&json!({
            "type": "object", "subtype": "array", "objectId": "{\"id\":1}",
            "className": "Array", "description": "Array[2]"
        }))
        .unwrap();
        let mirror = mirror_from_remote(&object);
        assert_eq!(mirror.kind, ValueKind::Array);
        assert_eq!(mirror.handle, "{\"id\":1}");
        assert!(!mirror.is_complete());
        assert_eq!(mirror.to_string(), "Array[2]");
    }

    #[test]
    fn inline_values() {
        let null: RemoteObject = decode(&json!({"type": "object", "subtype": "null", "value": null})).unwrap();
        let mirror = mirror_from_remote(&null);
        assert_eq!(mirror.kind, ValueKind::Null);
        assert_eq!(mirror.handle, "");

        let infinity: RemoteObject =
            decode(&json!({"type": "number", "unserializableValue": "Infinity"})).unwrap();
        assert_eq!(mirror_from_remote(&infinity).primitive(), Some(&json!("Infinity")));

        let text: RemoteObject = decode(&json!({"type": "string", "value": "hi"})).unwrap();
        assert_eq!(mirror_from_remote(&text).as_str(), Some("hi"));
    }

    #[test]
    fn property_descriptors() {
        let inline: PropertyDescriptor = decode_fields(
            "PropertyDescriptor",
            &json!({"name": "x", "value": {"type": "number", "value": 3}, "configurable": true, "enumerable": true}),
        )
        .unwrap();
        assert!(matches!(
            property_mirror(&inline).value,
            PropertyValue::Inline { kind: ValueKind::Number, .. }
        ));

        let remote: PropertyDescriptor = decode_fields(
            "PropertyDescriptor",
            &json!({"name": "o", "value": {"type": "object", "objectId": "7"}}),
        )
        .unwrap();
        assert_eq!(property_mirror(&remote).value.handle().map(String::as_str), Some("7"));

        let accessor: PropertyDescriptor =
            decode_fields("PropertyDescriptor", &json!({"name": "g", "get": {"type": "function", "objectId": "8"}}))
                .unwrap();
        assert_eq!(property_mirror(&accessor).value.handle(), None);
    }

    #[test]
    fn script_parsed_to_script() {
        let event: ScriptParsedEvent = decode_fields(
            "ScriptParsedEvent",
            &json!({"scriptId": "31", "url": "", "startLine": 2, "startColumn": 0, "endLine": 11, "endColumn": 1}),
        )
        .unwrap();
        let script = script_from_parsed(&event);
        assert_eq!(script.id.as_str(), "31");
        assert_eq!(script.name, None);
        assert_eq!(script.line_count, 10);
    }

    #[test]
    fn paused_frames() {
        let frames: Vec<CallFrame> = serde_json::from_value(json!([{
            "callFrameId": "cf0", "functionName": "tick",
            "location": {"scriptId": "5", "lineNumber": 9, "columnNumber": 4},
            "scopeChain": [
                {"type": "local", "object": {"type": "object", "objectId": "s0"}},
                {"type": "global", "object": {"type": "object", "objectId": "s1"}}
            ],
            "this": {"type": "object", "objectId": "this0"}
        }]))
        .unwrap();
        let mut scripts = ScriptRegistry::new();
        scripts.add(Script::new(ScriptId::new("5"), Some("http://x/app.js".into())));

        let built = build_frames(&frames, &scripts);
        let top = &built[0];
        assert_eq!(top.id, FrameId::CallFrame("cf0".into()));
        assert_eq!(top.script_name.as_deref(), Some("http://x/app.js"));
        assert_eq!(top.receiver.as_deref(), Some("this0"));
        assert_eq!(top.scopes[1].kind, ScopeKind::Global);
        assert_eq!(top.scopes[0].object.as_deref(), Some("s0"));
        assert_eq!(top.to_string(), "tick (http://x/app.js:10:5)");
    }
}
