//! Native value handles to local mirrors.

use std::collections::HashMap;

use jsdebug_protocol::decode;
use jsdebug_protocol::v8::{
    PropertyObject, ScriptHandle, ScriptRef, SomeHandle, SomeRef, ValueHandle, ValueType,
};
use serde_json::Value;

use crate::mirror::{MirrorData, PropertyMirror, PropertyValue, Truncation, ValueKind, ValueMirror};
use crate::script::{Script, ScriptId};

/// The `refs` table of one response, by handle.
#[derive(Debug, Default)]
pub(crate) struct RefTable {
    entries: HashMap<i64, SomeHandle>,
}

impl RefTable {
    /// Index a `refs` array. Entries that do not decode are skipped.
    pub(crate) fn from_refs(refs: &[Value]) -> Self {
        let mut entries = HashMap::new();
        for raw in refs {
            match decode::<SomeHandle>(raw) {
                Ok(entry) => {
                    if let Some(handle) = entry.handle() {
                        entries.insert(handle, entry);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "skipping undecodable refs entry"),
            }
        }
        Self { entries }
    }

    pub(crate) fn script(&self, handle: i64) -> Option<&ScriptHandle> {
        match self.entries.get(&handle) {
            Some(SomeHandle::Script(script)) => Some(script),
            _ => None,
        }
    }

    pub(crate) fn value(&self, handle: i64) -> Option<&ValueHandle> {
        match self.entries.get(&handle) {
            Some(SomeHandle::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Every value entry, for merging into a cache.
    pub(crate) fn values(&self) -> impl Iterator<Item = &ValueHandle> {
        self.entries.values().filter_map(|entry| match entry {
            SomeHandle::Value(value) => Some(value),
            _ => None,
        })
    }
}

pub(crate) fn kind_of(value_type: ValueType, class_name: Option<&str>) -> ValueKind {
    match value_type {
        ValueType::Undefined => ValueKind::Undefined,
        ValueType::Null => ValueKind::Null,
        ValueType::Boolean => ValueKind::Boolean,
        ValueType::Number => ValueKind::Number,
        ValueType::String => ValueKind::String,
        ValueType::Symbol => ValueKind::Symbol,
        ValueType::Object => match class_name {
            Some("Array") => ValueKind::Array,
            Some("Date") => ValueKind::Date,
            _ => ValueKind::Object,
        },
        ValueType::Function => ValueKind::Function,
        ValueType::Regexp => ValueKind::RegExp,
        ValueType::Error => ValueKind::Error,
        ValueType::Promise
        | ValueType::Map
        | ValueType::Set
        | ValueType::Frame
        | ValueType::Script
        | ValueType::Context
        | ValueType::Scope => ValueKind::Other,
    }
}

fn loaded_or_reference(properties: Option<&[PropertyObject]>) -> MirrorData<i64> {
    match properties {
        Some(properties) => MirrorData::Loaded {
            properties: properties.iter().map(property_mirror).collect(),
        },
        None => MirrorData::ReferenceOnly,
    }
}

/// Mirror of a full value handle.
pub(crate) fn mirror_from_handle(value: &ValueHandle) -> ValueMirror<i64> {
    match value {
        ValueHandle::Primitive(p) => ValueMirror {
            handle: p.handle,
            kind: kind_of(p.value_type, None),
            class_name: None,
            description: p.text.clone(),
            data: MirrorData::Primitive {
                value: p.value.as_option().cloned().unwrap_or(Value::Null),
                truncation: p
                    .truncation()
                    .map(|(loaded, full)| Truncation { loaded, full }),
            },
            generation: 0,
        },
        ValueHandle::Object(o) => ValueMirror {
            handle: o.handle,
            kind: kind_of(o.value_type, o.class_name.as_deref()),
            class_name: o.class_name.clone(),
            description: o.text.clone(),
            data: loaded_or_reference(o.properties.as_deref()),
            generation: 0,
        },
        ValueHandle::Function(f) => ValueMirror {
            handle: f.handle,
            kind: ValueKind::Function,
            class_name: f.class_name.clone(),
            description: f.text.clone().or_else(|| f.display_name().map(str::to_string)),
            data: loaded_or_reference(f.properties.as_deref()),
            generation: 0,
        },
    }
}

/// Mirror of a reference, from its inline display data.
///
/// Bare references carry nothing worth mirroring.
pub(crate) fn mirror_from_ref(reference: &SomeRef) -> Option<ValueMirror<i64>> {
    let display = reference.display()?;
    let kind = kind_of(display.value_type, display.class_name.as_deref());
    let data = if display.value_type.is_primitive() {
        MirrorData::Primitive {
            value: display.value.as_option().cloned().unwrap_or(Value::Null),
            truncation: None,
        }
    } else {
        MirrorData::ReferenceOnly
    };
    Some(ValueMirror {
        handle: display.reference,
        kind,
        class_name: display.class_name.clone(),
        description: None,
        data,
        generation: 0,
    })
}

pub(crate) fn script_from_handle(handle: &ScriptHandle) -> Script {
    Script {
        id: ScriptId::from(handle.id),
        name: handle.name.clone(),
        line_offset: handle.line_offset,
        column_offset: handle.column_offset,
        line_count: handle.line_count,
        source: handle.source.clone(),
    }
}

pub(crate) fn script_from_ref(script: &ScriptRef) -> Script {
    Script {
        id: ScriptId::from(script.id),
        name: script.name.clone(),
        line_offset: script.line_offset,
        column_offset: script.column_offset,
        line_count: script.line_count,
        source: None,
    }
}

fn property_mirror(property: &PropertyObject) -> PropertyMirror<i64> {
    let name = property.name().to_string();
    let value = match property {
        PropertyObject::WithRef(p) => PropertyValue::Remote {
            handle: p.reference,
            kind: None,
            description: None,
        },
        PropertyObject::WithValue(p) => match p.value.display() {
            Some(display) if display.value_type.is_primitive() => PropertyValue::Inline {
                kind: kind_of(display.value_type, None),
                value: display.value.as_option().cloned().unwrap_or(Value::Null),
                description: None,
            },
            Some(display) => PropertyValue::Remote {
                handle: display.reference,
                kind: Some(kind_of(display.value_type, display.class_name.as_deref())),
                description: display.class_name.clone(),
            },
            None => PropertyValue::Remote {
                handle: p.value.reference(),
                kind: None,
                description: None,
            },
        },
    };
    PropertyMirror { name, value }
}
