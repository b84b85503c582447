//! WIP request and incoming message envelopes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::{decode, decode_fields, Condition, Polymorphic, Subtype};
use crate::error::DecodeError;

/// A typed WIP command.
pub trait WipCommand: Serialize {
    /// Fully qualified method, e.g. `Debugger.resume`.
    const METHOD: &'static str;
    /// Shape of the `result` object.
    type Response: DeserializeOwned;
}

/// A command with its parameters already serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand {
    pub method: &'static str,
    pub params: Value,
}

impl RawCommand {
    pub fn new<C: WipCommand>(command: &C) -> Result<Self, serde_json::Error> {
        Ok(Self {
            method: C::METHOD,
            params: serde_json::to_value(command)?,
        })
    }

    /// Serialize as a request with the given id.
    pub fn to_text(&self, id: u64) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Request<'a> {
            id: u64,
            method: &'a str,
            params: &'a Value,
        }
        serde_json::to_string(&Request {
            id,
            method: self.method,
            params: &self.params,
        })
    }
}

/// `result` of commands that return nothing useful.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Empty {}

/// The protocol domain a method belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Debugger,
    Runtime,
    Page,
    Network,
    Dom,
    Console,
    Inspector,
}

impl Domain {
    /// Domain of a `Domain.method` name. Unknown domains yield `None`.
    pub fn of_method(method: &str) -> Option<Self> {
        let (domain, _) = method.split_once('.')?;
        match domain {
            "Debugger" => Some(Domain::Debugger),
            "Runtime" => Some(Domain::Runtime),
            "Page" => Some(Domain::Page),
            "Network" => Some(Domain::Network),
            "DOM" => Some(Domain::Dom),
            "Console" => Some(Domain::Console),
            "Inspector" => Some(Domain::Inspector),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WipError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WipSuccess {
    pub id: u64,
    #[serde(default)]
    pub result: Value,
}

impl WipSuccess {
    pub fn result_as<T: DeserializeOwned>(&self, shape: &'static str) -> Result<T, DecodeError> {
        decode_fields(shape, &self.result)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WipFailure {
    pub id: u64,
    pub error: WipError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WipResponse {
    Success(WipSuccess),
    Failure(WipFailure),
}

impl WipResponse {
    pub fn id(&self) -> u64 {
        match self {
            WipResponse::Success(r) => r.id,
            WipResponse::Failure(r) => r.id,
        }
    }
}

fn build_wip_failure(raw: &Value) -> Result<WipResponse, DecodeError> {
    decode_fields("WipFailure", raw).map(WipResponse::Failure)
}

fn build_wip_success(raw: &Value) -> Result<WipResponse, DecodeError> {
    decode_fields("WipSuccess", raw).map(WipResponse::Success)
}

impl Polymorphic for WipResponse {
    const SHAPE: &'static str = "WipResponse";
    const SUBTYPES: &'static [Subtype<Self>] = &[
        Subtype {
            name: "failure",
            condition: Condition::Present("error"),
            build: build_wip_failure,
        },
        Subtype {
            name: "success",
            condition: Condition::Absent("error"),
            build: build_wip_success,
        },
    ];
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WipEvent {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl WipEvent {
    pub fn domain(&self) -> Option<Domain> {
        Domain::of_method(&self.method)
    }

    pub fn params_as<T: DeserializeOwned>(&self, shape: &'static str) -> Result<T, DecodeError> {
        decode_fields(shape, &self.params)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WipIncoming {
    Response(WipResponse),
    Event(WipEvent),
}

fn build_wip_response(raw: &Value) -> Result<WipIncoming, DecodeError> {
    decode::<WipResponse>(raw).map(WipIncoming::Response)
}

fn build_wip_event(raw: &Value) -> Result<WipIncoming, DecodeError> {
    decode_fields("WipEvent", raw).map(WipIncoming::Event)
}

impl Polymorphic for WipIncoming {
    const SHAPE: &'static str = "WipIncoming";
    const SUBTYPES: &'static [Subtype<Self>] = &[
        Subtype {
            name: "response",
            condition: Condition::Present("id"),
            build: build_wip_response,
        },
        Subtype {
            name: "event",
            condition: Condition::Present("method"),
            build: build_wip_event,
        },
    ];
}

impl WipIncoming {
    pub fn from_text(text: &str) -> Result<Self, DecodeError> {
        let raw = crate::binding::parse(text)?;
        decode(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Probe {
        object_group: String,
    }

    impl WipCommand for Probe {
        const METHOD: &'static str = "Runtime.inspect";
        type Response = Empty;
    }

    #[test]
    fn raw_command_serializes_request() {
        let raw = RawCommand::new(&Probe {
            object_group: "g".into(),
        })
        .unwrap();
        let text = raw.to_text(9).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"id": 9, "method": "Runtime.inspect", "params": {"objectGroup": "g"}})
        );
    }

    #[test]
    fn domain_of_method() {
        assert_eq!(Domain::of_method("Debugger.paused"), Some(Domain::Debugger));
        assert_eq!(Domain::of_method("DOM.documentUpdated"), Some(Domain::Dom));
        assert_eq!(Domain::of_method("Tracing.start"), None);
        assert_eq!(Domain::of_method("nodot"), None);
    }

    #[test]
    fn success_response() {
        let msg = WipIncoming::from_text(r#"{"id":3,"result":{"breakpointId":"1:10:0"}}"#).unwrap();
        let WipIncoming::Response(WipResponse::Success(ok)) = msg else {
            panic!("expected success");
        };
        assert_eq!(ok.id, 3);
        assert_eq!(ok.result["breakpointId"], "1:10:0");
    }

    #[test]
    fn error_response() {
        let msg: WipIncoming = decode(&json!({
            "id": 4, "error": {"code": -32000, "message": "No script with given id"}
        }))
        .unwrap();
        let WipIncoming::Response(resp) = msg else {
            panic!("expected response");
        };
        assert_eq!(resp.id(), 4);
        let WipResponse::Failure(f) = resp else {
            panic!("expected failure");
        };
        assert_eq!(f.error.code, -32000);
    }

    #[test]
    fn event_without_params() {
        let msg: WipIncoming = decode(&json!({"method": "Debugger.resumed"})).unwrap();
        let WipIncoming::Event(evt) = msg else {
            panic!("expected event");
        };
        assert_eq!(evt.domain(), Some(Domain::Debugger));
        assert!(evt.params.is_null());
    }

    #[test]
    fn neither_id_nor_method_is_rejected() {
        let err = decode::<WipIncoming>(&json!({"result": {}})).unwrap_err();
        assert!(matches!(err, DecodeError::NoMatchingSubtype { .. }));
    }
}
