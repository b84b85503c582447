//! Session over the WebSocket Inspector protocol.

mod actor;
mod session;
mod values;

pub use actor::SUSPEND_GROUP;
pub use session::{WipSession, WipValueMapping};
