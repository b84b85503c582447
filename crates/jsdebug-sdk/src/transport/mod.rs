//! Wire transports.
//!
//! A transport turns a byte stream into whole text messages. Every
//! transport is exposed the same way: a [`Wire`] holding an outgoing
//! sender and an incoming receiver, with background tasks doing the I/O.

pub mod framing;
pub mod memory;
pub mod tcp;
pub mod ws;

use tokio::sync::mpsc;

/// Something that arrived from the VM side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// One complete message.
    Message(String),
    /// The connection is gone. Sent once, last.
    Closed(String),
}

/// A connected message pipe.
#[derive(Debug)]
pub struct Wire {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<WireEvent>,
}

impl Wire {
    /// Build a wire from raw channel halves.
    pub fn new(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<WireEvent>,
    ) -> Self {
        Self { outgoing, incoming }
    }
}
