//! Value handles and references carried in native protocol bodies and
//! `refs` tables.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::binding::{
    decode, decode_fields, deserialize_polymorphic, Condition, Field, Polymorphic, Subtype,
};
use crate::error::DecodeError;

/// The `type` tag of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Object,
    Function,
    Regexp,
    Error,
    Promise,
    Map,
    Set,
    Frame,
    Script,
    Context,
    Scope,
}

impl ValueType {
    /// Whether values of this type carry their data inline.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            ValueType::Undefined
                | ValueType::Null
                | ValueType::Boolean
                | ValueType::Number
                | ValueType::String
                | ValueType::Symbol
        )
    }
}

/// A property name: either an identifier or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum PropertyName {
    Index(u64),
    Name(String),
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyName::Index(i) => write!(f, "{i}"),
            PropertyName::Name(n) => f.write_str(n),
        }
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// A reference that also carries display data for the referenced value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefWithDisplayData {
    #[serde(rename = "ref")]
    pub reference: i64,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub value: Field<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inferred_name: Option<String>,
    #[serde(default)]
    pub script_id: Option<i64>,
}

/// A bare reference to a handle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BareRef {
    #[serde(rename = "ref")]
    pub reference: i64,
}

/// `{ref}` possibly enriched with inline display data.
#[derive(Debug, Clone, PartialEq)]
pub enum SomeRef {
    WithDisplayData(RefWithDisplayData),
    Bare(BareRef),
}

impl SomeRef {
    /// The referenced handle.
    pub fn reference(&self) -> i64 {
        match self {
            SomeRef::WithDisplayData(r) => r.reference,
            SomeRef::Bare(r) => r.reference,
        }
    }

    /// Inline display data, if the VM sent any.
    pub fn display(&self) -> Option<&RefWithDisplayData> {
        match self {
            SomeRef::WithDisplayData(r) => Some(r),
            SomeRef::Bare(_) => None,
        }
    }
}

fn build_ref_with_display(raw: &Value) -> Result<SomeRef, DecodeError> {
    decode_fields("RefWithDisplayData", raw).map(SomeRef::WithDisplayData)
}

fn build_bare_ref(raw: &Value) -> Result<SomeRef, DecodeError> {
    decode_fields("BareRef", raw).map(SomeRef::Bare)
}

impl Polymorphic for SomeRef {
    const SHAPE: &'static str = "SomeRef";
    const SUBTYPES: &'static [Subtype<Self>] = &[
        Subtype {
            name: "withDisplayData",
            condition: Condition::Present("type"),
            build: build_ref_with_display,
        },
        Subtype {
            name: "bare",
            condition: Condition::Present("ref"),
            build: build_bare_ref,
        },
    ];
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyWithRef {
    pub name: PropertyName,
    #[serde(rename = "ref")]
    pub reference: i64,
    #[serde(default)]
    pub property_type: Option<i64>,
    #[serde(default)]
    pub attributes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PropertyWithValue {
    pub name: PropertyName,
    pub value: SomeRef,
}

/// One entry of an object's `properties` list.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyObject {
    WithRef(PropertyWithRef),
    WithValue(PropertyWithValue),
}

impl PropertyObject {
    pub fn name(&self) -> &PropertyName {
        match self {
            PropertyObject::WithRef(p) => &p.name,
            PropertyObject::WithValue(p) => &p.name,
        }
    }

    /// Handle of the property's value.
    pub fn reference(&self) -> i64 {
        match self {
            PropertyObject::WithRef(p) => p.reference,
            PropertyObject::WithValue(p) => p.value.reference(),
        }
    }
}

fn build_property_with_ref(raw: &Value) -> Result<PropertyObject, DecodeError> {
    decode_fields("PropertyWithRef", raw).map(PropertyObject::WithRef)
}

fn build_property_with_value(raw: &Value) -> Result<PropertyObject, DecodeError> {
    decode_fields("PropertyWithValue", raw).map(PropertyObject::WithValue)
}

impl Polymorphic for PropertyObject {
    const SHAPE: &'static str = "PropertyObject";
    const SUBTYPES: &'static [Subtype<Self>] = &[
        Subtype {
            name: "withRef",
            condition: Condition::Present("ref"),
            build: build_property_with_ref,
        },
        Subtype {
            name: "withValue",
            condition: Condition::Present("value"),
            build: build_property_with_value,
        },
    ];
}

// ---------------------------------------------------------------------------
// Value handles
// ---------------------------------------------------------------------------

/// A primitive value, possibly truncated by the VM.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveValue {
    pub handle: i64,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub value: Field<Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from_index: Option<u64>,
    #[serde(default)]
    pub to_index: Option<u64>,
    #[serde(default)]
    pub length: Option<u64>,
}

impl PrimitiveValue {
    /// `(loaded, full)` sizes when the VM returned only part of a string.
    pub fn truncation(&self) -> Option<(u64, u64)> {
        let loaded = self.to_index?;
        let full = self.length?;
        (loaded < full).then_some((loaded, full))
    }
}

/// An object (including arrays, errors, regexps) with its property list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectValue {
    pub handle: i64,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub constructor_function: Option<SomeRef>,
    #[serde(default)]
    pub proto_object: Option<SomeRef>,
    #[serde(default)]
    pub prototype_object: Option<SomeRef>,
    #[serde(default)]
    pub properties: Option<Vec<PropertyObject>>,
}

/// A function object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionValue {
    pub handle: i64,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inferred_name: Option<String>,
    #[serde(default)]
    pub script_id: Option<i64>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub properties: Option<Vec<PropertyObject>>,
}

impl FunctionValue {
    /// Declared name, or the inferred one for anonymous functions.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.inferred_name.as_deref())
    }
}

/// A value handle as returned by `lookup`, `evaluate` or a `refs` table.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueHandle {
    Function(FunctionValue),
    Object(ObjectValue),
    Primitive(PrimitiveValue),
}

impl ValueHandle {
    pub fn handle(&self) -> i64 {
        match self {
            ValueHandle::Function(v) => v.handle,
            ValueHandle::Object(v) => v.handle,
            ValueHandle::Primitive(v) => v.handle,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            ValueHandle::Function(_) => ValueType::Function,
            ValueHandle::Object(v) => v.value_type,
            ValueHandle::Primitive(v) => v.value_type,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ValueHandle::Function(v) => v.text.as_deref(),
            ValueHandle::Object(v) => v.text.as_deref(),
            ValueHandle::Primitive(v) => v.text.as_deref(),
        }
    }

    /// Property list, when the VM included one.
    pub fn properties(&self) -> Option<&[PropertyObject]> {
        match self {
            ValueHandle::Function(v) => v.properties.as_deref(),
            ValueHandle::Object(v) => v.properties.as_deref(),
            ValueHandle::Primitive(_) => None,
        }
    }
}

fn is_object_like(object: &Map<String, Value>) -> bool {
    match object.get("type").and_then(Value::as_str) {
        Some(t) => matches!(
            t,
            "object" | "regexp" | "error" | "promise" | "map" | "set"
        ),
        None => false,
    }
}

fn is_primitive(object: &Map<String, Value>) -> bool {
    match object.get("type").and_then(Value::as_str) {
        Some(t) => matches!(
            t,
            "undefined" | "null" | "boolean" | "number" | "string" | "symbol"
        ),
        None => false,
    }
}

fn build_function(raw: &Value) -> Result<ValueHandle, DecodeError> {
    decode_fields("FunctionValue", raw).map(ValueHandle::Function)
}

fn build_object(raw: &Value) -> Result<ValueHandle, DecodeError> {
    decode_fields("ObjectValue", raw).map(ValueHandle::Object)
}

fn build_primitive(raw: &Value) -> Result<ValueHandle, DecodeError> {
    decode_fields("PrimitiveValue", raw).map(ValueHandle::Primitive)
}

impl Polymorphic for ValueHandle {
    const SHAPE: &'static str = "ValueHandle";
    const SUBTYPES: &'static [Subtype<Self>] = &[
        Subtype {
            name: "function",
            condition: Condition::Equals("type", "function"),
            build: build_function,
        },
        Subtype {
            name: "object",
            condition: Condition::Custom(is_object_like),
            build: build_object,
        },
        Subtype {
            name: "primitive",
            condition: Condition::Custom(is_primitive),
            build: build_primitive,
        },
    ];
}

// ---------------------------------------------------------------------------
// Script and context handles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptHandle {
    #[serde(default)]
    pub handle: Option<i64>,
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub line_offset: i64,
    #[serde(default)]
    pub column_offset: i64,
    #[serde(default)]
    pub line_count: u32,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_length: Option<u64>,
    #[serde(default)]
    pub script_type: Option<u32>,
    #[serde(default)]
    pub context: Option<SomeRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContextHandle {
    pub handle: i64,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Any entry of a `refs` table.
#[derive(Debug, Clone, PartialEq)]
pub enum SomeHandle {
    Script(ScriptHandle),
    Context(ContextHandle),
    Value(ValueHandle),
}

impl SomeHandle {
    pub fn handle(&self) -> Option<i64> {
        match self {
            SomeHandle::Script(s) => s.handle,
            SomeHandle::Context(c) => Some(c.handle),
            SomeHandle::Value(v) => Some(v.handle()),
        }
    }
}

fn build_script_handle(raw: &Value) -> Result<SomeHandle, DecodeError> {
    decode_fields("ScriptHandle", raw).map(SomeHandle::Script)
}

fn build_context_handle(raw: &Value) -> Result<SomeHandle, DecodeError> {
    decode_fields("ContextHandle", raw).map(SomeHandle::Context)
}

fn build_value_handle(raw: &Value) -> Result<SomeHandle, DecodeError> {
    decode::<ValueHandle>(raw).map(SomeHandle::Value)
}

impl Polymorphic for SomeHandle {
    const SHAPE: &'static str = "SomeHandle";
    const SUBTYPES: &'static [Subtype<Self>] = &[
        Subtype {
            name: "script",
            condition: Condition::Equals("type", "script"),
            build: build_script_handle,
        },
        Subtype {
            name: "context",
            condition: Condition::Equals("type", "context"),
            build: build_context_handle,
        },
    ];
    const FALLBACK: Option<Subtype<Self>> = Some(Subtype {
        name: "value",
        condition: Condition::Always,
        build: build_value_handle,
    });
}

deserialize_polymorphic!(SomeRef, PropertyObject, ValueHandle, SomeHandle);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Typed;
    use serde_json::json;

    #[test]
    fn number_handle_is_primitive() {
        let v: ValueHandle =
            decode(&json!({"handle": 3, "type": "number", "value": 3, "text": "3"})).unwrap();
        assert_eq!(v.handle(), 3);
        assert_eq!(v.value_type(), ValueType::Number);
        assert_eq!(v.text(), Some("3"));
        assert!(v.properties().is_none());
    }

    #[test]
    fn object_handle_with_mixed_properties() {
        let raw = json!({
            "handle": 10,
            "type": "object",
            "className": "Object",
            "constructorFunction": {"ref": 11},
            "protoObject": {"ref": 12},
            "properties": [
                {"name": "x", "propertyType": 1, "ref": 13},
                {"name": 0, "value": {"ref": 14, "type": "string", "value": "a"}}
            ],
            "text": "#<Object>"
        });
        let v: ValueHandle = decode(&raw).unwrap();
        let ValueHandle::Object(obj) = &v else {
            panic!("expected object, got {v:?}");
        };
        assert_eq!(obj.class_name.as_deref(), Some("Object"));
        let props = v.properties().unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].name(), &PropertyName::Name("x".into()));
        assert_eq!(props[0].reference(), 13);
        assert_eq!(props[1].name().to_string(), "0");
        assert_eq!(props[1].reference(), 14);
    }

    #[test]
    fn function_handle_prefers_declared_name() {
        let v: ValueHandle = decode(&json!({
            "handle": 20, "type": "function", "name": "", "inferredName": "obj.run", "scriptId": 4
        }))
        .unwrap();
        let ValueHandle::Function(f) = v else {
            panic!("expected function");
        };
        assert_eq!(f.display_name(), Some("obj.run"));
    }

    #[test]
    fn unknown_value_type_is_an_error() {
        let err = decode_fields::<RefWithDisplayData>(
            "RefWithDisplayData",
            &json!({"ref": 1, "type": "hologram"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown variant"), "got: {err}");
    }

    #[test]
    fn frame_typed_handle_matches_no_value_subtype() {
        let err = decode::<ValueHandle>(&json!({"handle": 1, "type": "frame"})).unwrap_err();
        assert!(matches!(err, DecodeError::NoMatchingSubtype { .. }));
    }

    #[test]
    fn cast_primitive_to_object_fails() {
        let typed = Typed::<ValueHandle>::decode(json!({
            "handle": 5, "type": "string", "value": "hi"
        }))
        .unwrap();
        assert_eq!(typed.subtype(), "primitive");
        assert!(matches!(
            typed.cast("object"),
            Err(DecodeError::SubtypeMismatch { .. })
        ));
    }

    #[test]
    fn truncated_string_reports_sizes() {
        let v: ValueHandle = decode(&json!({
            "handle": 5, "type": "string", "value": "abc", "fromIndex": 0, "toIndex": 3, "length": 10
        }))
        .unwrap();
        let ValueHandle::Primitive(p) = v else {
            panic!("expected primitive");
        };
        assert_eq!(p.truncation(), Some((3, 10)));
    }

    #[test]
    fn complete_string_is_not_truncated() {
        let p: PrimitiveValue = decode_fields(
            "PrimitiveValue",
            &json!({"handle": 5, "type": "string", "value": "abc", "toIndex": 3, "length": 3}),
        )
        .unwrap();
        assert_eq!(p.truncation(), None);
    }

    #[test]
    fn some_ref_subtypes() {
        let bare: SomeRef = decode(&json!({"ref": 4})).unwrap();
        assert_eq!(bare.reference(), 4);
        assert!(bare.display().is_none());

        let rich: SomeRef = decode(&json!({"ref": 4, "type": "object", "className": "Array"})).unwrap();
        assert_eq!(rich.display().unwrap().class_name.as_deref(), Some("Array"));
    }

    #[test]
    fn refs_table_entries() {
        let script: SomeHandle = decode(&json!({
            "handle": 2, "type": "script", "name": "a.js", "id": 17,
            "lineOffset": 0, "columnOffset": 0, "lineCount": 40,
            "context": {"ref": 0}
        }))
        .unwrap();
        let SomeHandle::Script(s) = &script else {
            panic!("expected script");
        };
        assert_eq!(s.name.as_deref(), Some("a.js"));
        assert_eq!(script.handle(), Some(2));

        let context: SomeHandle = decode(&json!({"handle": 0, "type": "context", "data": "page,1"})).unwrap();
        assert!(matches!(context, SomeHandle::Context(_)));

        let value: SomeHandle = decode(&json!({"handle": 9, "type": "boolean", "value": true})).unwrap();
        assert!(matches!(value, SomeHandle::Value(ValueHandle::Primitive(_))));
    }
}
