//! Incoming native protocol messages: responses and events.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::binding::{decode, decode_fields, Condition, Field, Polymorphic, Subtype};
use crate::error::DecodeError;

/// A successful reply to a command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SuccessResponse {
    #[serde(default)]
    pub seq: Option<u64>,
    pub request_seq: u64,
    pub command: String,
    #[serde(default)]
    pub running: Option<bool>,
    #[serde(default)]
    pub body: Field<Value>,
    #[serde(default)]
    pub refs: Vec<Value>,
}

impl SuccessResponse {
    /// Decode the body as the given shape. An absent body is an error.
    pub fn body_as<T: DeserializeOwned>(&self, shape: &'static str) -> Result<T, DecodeError> {
        match &self.body {
            Field::Present(body) => decode_fields(shape, body),
            Field::Absent | Field::Null => Err(DecodeError::MissingField {
                shape: "SuccessResponse",
                field: "body",
            }),
        }
    }
}

/// A failed reply (`success: false`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FailedResponse {
    #[serde(default)]
    pub seq: Option<u64>,
    pub request_seq: u64,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub running: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandResponse {
    Success(SuccessResponse),
    Failure(FailedResponse),
}

impl CommandResponse {
    /// Sequence number of the command this replies to.
    pub fn request_seq(&self) -> u64 {
        match self {
            CommandResponse::Success(r) => r.request_seq,
            CommandResponse::Failure(r) => r.request_seq,
        }
    }

    /// The VM's running flag, when reported.
    pub fn running(&self) -> Option<bool> {
        match self {
            CommandResponse::Success(r) => r.running,
            CommandResponse::Failure(r) => r.running,
        }
    }
}

fn build_success(raw: &Value) -> Result<CommandResponse, DecodeError> {
    decode_fields("SuccessResponse", raw).map(CommandResponse::Success)
}

fn build_failure(raw: &Value) -> Result<CommandResponse, DecodeError> {
    decode_fields("FailedResponse", raw).map(CommandResponse::Failure)
}

impl Polymorphic for CommandResponse {
    const SHAPE: &'static str = "CommandResponse";
    const SUBTYPES: &'static [Subtype<Self>] = &[
        Subtype {
            name: "success",
            condition: Condition::Bool("success", true),
            build: build_success,
        },
        Subtype {
            name: "failure",
            condition: Condition::Bool("success", false),
            build: build_failure,
        },
    ];
}

/// Events the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Break,
    Exception,
    AfterCompile,
    ScriptCollected,
}

impl EventKind {
    /// Map a wire event name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "break" => Some(EventKind::Break),
            "exception" => Some(EventKind::Exception),
            "afterCompile" => Some(EventKind::AfterCompile),
            "scriptCollected" => Some(EventKind::ScriptCollected),
            _ => None,
        }
    }
}

/// An unsolicited notification from the VM.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventNotification {
    #[serde(default)]
    pub seq: Option<u64>,
    pub event: String,
    #[serde(default)]
    pub body: Field<Value>,
    #[serde(default)]
    pub refs: Vec<Value>,
}

impl EventNotification {
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_name(&self.event)
    }

    /// Decode the body as the given shape. An absent body is an error.
    pub fn body_as<T: DeserializeOwned>(&self, shape: &'static str) -> Result<T, DecodeError> {
        match &self.body {
            Field::Present(body) => decode_fields(shape, body),
            Field::Absent | Field::Null => Err(DecodeError::MissingField {
                shape: "EventNotification",
                field: "body",
            }),
        }
    }
}

/// Any message the VM sends.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Response(CommandResponse),
    Event(EventNotification),
}

fn build_response(raw: &Value) -> Result<IncomingMessage, DecodeError> {
    decode::<CommandResponse>(raw).map(IncomingMessage::Response)
}

fn build_event(raw: &Value) -> Result<IncomingMessage, DecodeError> {
    decode_fields("EventNotification", raw).map(IncomingMessage::Event)
}

impl Polymorphic for IncomingMessage {
    const SHAPE: &'static str = "IncomingMessage";
    const SUBTYPES: &'static [Subtype<Self>] = &[
        Subtype {
            name: "response",
            condition: Condition::Equals("type", "response"),
            build: build_response,
        },
        Subtype {
            name: "event",
            condition: Condition::Equals("type", "event"),
            build: build_event,
        },
    ];
}

impl IncomingMessage {
    /// Parse and decode one message of wire text.
    pub fn from_text(text: &str) -> Result<Self, DecodeError> {
        let raw = crate::binding::parse(text)?;
        decode(&raw)
    }
}
