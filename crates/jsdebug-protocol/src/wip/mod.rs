//! Shape catalogue of the WebSocket Inspector protocol.

pub mod debugger;
pub mod message;
pub mod page;
pub mod runtime;

pub use message::{
    Domain, Empty, RawCommand, WipCommand, WipError, WipEvent, WipFailure, WipIncoming,
    WipResponse, WipSuccess,
};
pub use runtime::RemoteObject;
