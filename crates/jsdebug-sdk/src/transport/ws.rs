//! WebSocket transport for the Inspector protocol.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SdkError;
use crate::transport::{Wire, WireEvent};

/// Open a WebSocket to an Inspector endpoint (`ws://host:port/...`).
///
/// Pings are answered by the WebSocket layer. A close frame or read error
/// ends the incoming stream with [`WireEvent::Closed`].
pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Wire, SdkError> {
    let (stream, _response) = timeout(connect_timeout, connect_async(url))
        .await
        .map_err(|_| SdkError::Transport(format!("timed out connecting to {url}")))?
        .map_err(|e| SdkError::Transport(format!("{url}: {e}")))?;
    tracing::info!(%url, "connected to inspector");

    let (mut sink, mut source) = stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<WireEvent>();

    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            tracing::trace!(message = %text, "send");
            if sink.send(Message::text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        let reason = loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!(message = %text.as_str(), "recv");
                    if in_tx.send(WireEvent::Message(text.as_str().to_string())).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if in_tx.send(WireEvent::Message(text)).is_err() {
                            return;
                        }
                    }
                    Err(_) => tracing::warn!("dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) if !frame.reason.as_str().is_empty() => {
                            format!("closed by peer: {}", frame.reason.as_str())
                        }
                        _ => "closed by peer".to_string(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("websocket error: {e}"),
                None => break "connection closed".to_string(),
            }
        };
        let _ = in_tx.send(WireEvent::Closed(reason));
    });

    Ok(Wire::new(out_tx, in_rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_refused_is_transport_error() {
        let err = connect("ws://127.0.0.1:1/devtools/page/1", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Transport(_)));
    }

    #[tokio::test]
    async fn malformed_url_is_transport_error() {
        let err = connect("not a url", Duration::from_secs(2)).await.unwrap_err();
        assert!(err.to_string().starts_with("transport error"), "{err}");
    }
}
