//! Native debugger socket: TCP with `Content-Length` framing.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::SdkError;
use crate::transport::framing::{encode_frame, FrameDecoder};
use crate::transport::{Wire, WireEvent};

const READ_BUFFER_SIZE: usize = 8192;

/// Connect to a VM's debugger port.
pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<Wire, SdkError> {
    let stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| SdkError::Transport(format!("timed out connecting to {addr}")))?
        .map_err(|e| SdkError::Transport(format!("{addr}: {e}")))?;
    stream
        .set_nodelay(true)
        .map_err(|e| SdkError::Transport(format!("{addr}: {e}")))?;
    tracing::info!(%addr, "connected to debugger socket");
    Ok(spawn_framed(stream))
}

/// Run framed I/O over any byte stream.
///
/// Header-only frames (the connect handshake) are logged and not
/// forwarded.
pub fn spawn_framed<S>(stream: S) -> Wire
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<WireEvent>();

    // Writer task: frames outgoing messages
    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            tracing::trace!(message = %text, "send");
            if writer.write_all(&encode_frame(&text)).await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    // Reader task: decodes frames until EOF or error
    tokio::spawn(async move {
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let reason = loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break "connection closed by peer".to_string(),
                Ok(n) => n,
                Err(e) => break format!("read error: {e}"),
            };
            decoder.push(&buf[..n]);
            let mut failed = None;
            loop {
                match decoder.next_frame() {
                    Ok(Some(frame)) if frame.body.is_empty() => {
                        tracing::debug!(
                            v8_version = frame.header("V8-Version").unwrap_or("unknown"),
                            host = frame.header("Embedding-Host").unwrap_or("unknown"),
                            "debugger handshake"
                        );
                    }
                    Ok(Some(frame)) => {
                        tracing::trace!(message = %frame.body, "recv");
                        if in_tx.send(WireEvent::Message(frame.body)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        failed = Some(e.to_string());
                        break;
                    }
                }
            }
            if let Some(reason) = failed {
                break reason;
            }
        };
        let _ = in_tx.send(WireEvent::Closed(reason));
    });

    Wire::new(out_tx, in_rx)
}
