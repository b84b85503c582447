//! In-process transport for tests and embedding.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::transport::{Wire, WireEvent};

/// The far end of an in-memory wire, playing the VM.
#[derive(Debug)]
pub struct RemoteEnd {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<WireEvent>,
}

/// Create a connected wire and its remote end.
pub fn pair() -> (Wire, RemoteEnd) {
    let (client_tx, remote_rx) = mpsc::unbounded_channel();
    let (remote_tx, client_rx) = mpsc::unbounded_channel();
    (
        Wire::new(client_tx, client_rx),
        RemoteEnd {
            incoming: remote_rx,
            outgoing: remote_tx,
        },
    )
}

impl RemoteEnd {
    /// Next message the client sent, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Next message the client sent, parsed as JSON.
    ///
    /// Unparseable text yields `Value::String` with the raw text.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let text = self.recv().await?;
        Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Deliver a raw message to the client.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.outgoing.send(WireEvent::Message(text.into())).is_ok()
    }

    /// Deliver a JSON message to the client.
    pub fn send_json(&self, value: &Value) -> bool {
        self.send(value.to_string())
    }

    /// Close the connection from the remote side.
    pub fn close(self, reason: impl Into<String>) {
        let _ = self.outgoing.send(WireEvent::Closed(reason.into()));
    }
}
