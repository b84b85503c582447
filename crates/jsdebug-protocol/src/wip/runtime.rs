//! `Runtime` domain.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::{
    decode_fields, deserialize_polymorphic, Condition, Field, Polymorphic, Subtype,
};
use crate::error::DecodeError;
use crate::wip::message::{Empty, WipCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteObjectType {
    Object,
    Function,
    Undefined,
    String,
    Number,
    Boolean,
    Symbol,
    Bigint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectSubtype {
    Array,
    Null,
    Node,
    Regexp,
    Date,
    Map,
    Set,
    Weakmap,
    Weakset,
    Iterator,
    Generator,
    Error,
    Proxy,
    Promise,
    Typedarray,
    Arraybuffer,
    Dataview,
}

/// A remote object that lives on the VM side and is addressed by id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub object_id: String,
    #[serde(rename = "type")]
    pub object_type: RemoteObjectType,
    #[serde(default)]
    pub subtype: Option<ObjectSubtype>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A value serialized inline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineValue {
    #[serde(rename = "type")]
    pub object_type: RemoteObjectType,
    #[serde(default)]
    pub subtype: Option<ObjectSubtype>,
    #[serde(default)]
    pub value: Field<Value>,
    #[serde(default)]
    pub unserializable_value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteObject {
    Reference(ObjectReference),
    Inline(InlineValue),
}

impl RemoteObject {
    pub fn object_type(&self) -> RemoteObjectType {
        match self {
            RemoteObject::Reference(r) => r.object_type,
            RemoteObject::Inline(v) => v.object_type,
        }
    }

    pub fn object_id(&self) -> Option<&str> {
        match self {
            RemoteObject::Reference(r) => Some(&r.object_id),
            RemoteObject::Inline(_) => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            RemoteObject::Reference(r) => r.description.as_deref(),
            RemoteObject::Inline(v) => v.description.as_deref(),
        }
    }
}

fn build_reference(raw: &Value) -> Result<RemoteObject, DecodeError> {
    decode_fields("ObjectReference", raw).map(RemoteObject::Reference)
}

fn build_inline(raw: &Value) -> Result<RemoteObject, DecodeError> {
    decode_fields("InlineValue", raw).map(RemoteObject::Inline)
}

impl Polymorphic for RemoteObject {
    const SHAPE: &'static str = "RemoteObject";
    const SUBTYPES: &'static [Subtype<Self>] = &[
        Subtype {
            name: "reference",
            condition: Condition::Present("objectId"),
            build: build_reference,
        },
        Subtype {
            name: "inline",
            condition: Condition::Absent("objectId"),
            build: build_inline,
        },
    ];
}

deserialize_polymorphic!(RemoteObject);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default)]
    pub value: Option<RemoteObject>,
    #[serde(default)]
    pub writable: Option<bool>,
    #[serde(default)]
    pub get: Option<RemoteObject>,
    #[serde(default)]
    pub set: Option<RemoteObject>,
    #[serde(default)]
    pub configurable: bool,
    #[serde(default)]
    pub enumerable: bool,
    #[serde(default)]
    pub is_own: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub text: String,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub column_number: Option<u32>,
    #[serde(default)]
    pub exception: Option<RemoteObject>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
    #[serde(default)]
    pub was_thrown: Option<bool>,
}

impl EvaluateResponse {
    pub fn threw(&self) -> bool {
        self.exception_details.is_some() || self.was_thrown == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetPropertiesResponse {
    pub result: Vec<PropertyDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Enable {}

impl WipCommand for Enable {
    const METHOD: &'static str = "Runtime.enable";
    type Response = Empty;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
}

impl WipCommand for Evaluate {
    const METHOD: &'static str = "Runtime.evaluate";
    type Response = EvaluateResponse;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProperties {
    pub object_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_properties: Option<bool>,
}

impl WipCommand for GetProperties {
    const METHOD: &'static str = "Runtime.getProperties";
    type Response = GetPropertiesResponse;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseObjectGroup {
    pub object_group: String,
}

impl WipCommand for ReleaseObjectGroup {
    const METHOD: &'static str = "Runtime.releaseObjectGroup";
    type Response = Empty;
}
