//! Unix Socket Bridge
//!
//! Exposes the in-process bus to other local processes over a Unix domain
//! socket. The wire protocol is three framed JSON messages:
//!
//! - `Publish {queue, body}` - client pushes a message onto a queue
//! - `Subscribe {queue}` - client attaches a competing consumer
//! - `Delivery {queue, body}` - server forwards a consumed message
//!
//! A request producer typically subscribes to its private reply queue, then
//! publishes requests whose `routing_key` names that queue. The bridge never
//! interprets message bodies; routing stays a dispatcher concern.
//!
//! # Security
//!
//! Connections from peers with a different UID are rejected via
//! `SO_PEERCRED`. Socket files are process-private by directory placement.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use super::frame::{encode, FrameDecoder};
use super::traits::{ConnectionId, MessageBus, TransportError};

/// One frame of the bridge protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WireFrame {
    /// Push `body` onto `queue`.
    Publish {
        /// Target queue name.
        queue: String,
        /// Message body, forwarded opaquely.
        body: serde_json::Value,
    },
    /// Attach a competing consumer to `queue` for this connection.
    Subscribe {
        /// Queue to consume from.
        queue: String,
    },
    /// A message consumed from `queue` on the client's behalf.
    Delivery {
        /// Source queue name.
        queue: String,
        /// Message body.
        body: serde_json::Value,
    },
}

/// Framed socket front for a [`MessageBus`].
pub struct BridgeServer {
    socket_path: PathBuf,
    bus: Arc<dyn MessageBus>,
}

impl BridgeServer {
    /// Create a bridge serving `bus` on `socket_path`.
    #[must_use]
    pub fn new(socket_path: PathBuf, bus: Arc<dyn MessageBus>) -> Self {
        Self { socket_path, bus }
    }

    /// Remote peer UID from `SO_PEERCRED`.
    #[cfg(unix)]
    fn peer_uid(stream: &UnixStream) -> Option<u32> {
        use std::os::unix::io::AsRawFd;

        let fd = stream.as_raw_fd();
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        let result = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                std::ptr::addr_of_mut!(cred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        (result == 0).then_some(cred.uid)
    }

    /// Create the socket directory and remove any stale socket file.
    fn prepare_socket(&self) -> Result<(), TransportError> {
        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!(path = ?parent, "Created socket directory");
            }
        }
        if self.socket_path.exists() {
            warn!(path = ?self.socket_path, "Removing stale socket file");
            std::fs::remove_file(&self.socket_path)?;
        }
        Ok(())
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the socket cannot be prepared or bound;
    /// per-connection failures are logged and do not stop the server.
    pub async fn run(&self, shutdown: Arc<Notify>) -> Result<(), TransportError> {
        self.prepare_socket()?;
        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = ?self.socket_path, "Bridge listening");

        loop {
            tokio::select! {
                () = shutdown.notified() => {
                    info!("Bridge shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let conn_id = ConnectionId::new();
                            if let Err(e) = check_peer(&stream) {
                                warn!(conn_id = %conn_id, error = %e, "Rejected connection");
                                continue;
                            }
                            info!(conn_id = %conn_id, "Client connected");
                            let bus = Arc::clone(&self.bus);
                            tokio::spawn(handle_connection(conn_id, stream, bus));
                        }
                        Err(e) => error!(error = %e, "Accept failed"),
                    }
                }
            }
        }

        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
        Ok(())
    }
}

/// Reject peers running as a different user.
#[cfg(unix)]
fn check_peer(stream: &UnixStream) -> Result<(), TransportError> {
    let own_uid = unsafe { libc::getuid() };
    match BridgeServer::peer_uid(stream) {
        Some(uid) if uid == own_uid => Ok(()),
        Some(uid) => Err(TransportError::PeerRejected(format!(
            "peer uid {uid} does not match server uid {own_uid}"
        ))),
        // Missing credentials are treated as same-user: some kernels do not
        // expose SO_PEERCRED for socketpair-style endpoints.
        None => Ok(()),
    }
}

/// Serve one client connection to completion.
async fn handle_connection(conn_id: ConnectionId, stream: UnixStream, bus: Arc<dyn MessageBus>) {
    let (mut read_half, mut write_half) = stream.into_split();

    // All outbound frames funnel through one writer task so concurrent
    // subscription forwarders cannot interleave partial frames.
    let (out_tx, mut out_rx) = mpsc::channel::<WireFrame>(64);
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            match encode(&frame) {
                Ok(bytes) => {
                    if write_half.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to encode outbound frame");
                    break;
                }
            }
        }
    });

    let mut forwarders: Vec<AbortHandle> = Vec::new();
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 4096];

    'conn: loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Read failed");
                break;
            }
        };
        decoder.push(&buf[..n]);

        loop {
            match decoder.decode::<WireFrame>() {
                Ok(Some(frame)) => {
                    if let Err(e) = handle_frame(frame, &bus, &out_tx, &mut forwarders).await {
                        warn!(conn_id = %conn_id, error = %e, "Frame handling failed");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Corrupt framing leaves the stream position undefined;
                    // drop the connection rather than guess.
                    warn!(conn_id = %conn_id, error = %e, "Protocol error, closing");
                    break 'conn;
                }
            }
        }
    }

    for handle in forwarders {
        handle.abort();
    }
    writer.abort();
    info!(conn_id = %conn_id, "Client disconnected");
}

/// Apply one inbound frame.
async fn handle_frame(
    frame: WireFrame,
    bus: &Arc<dyn MessageBus>,
    out_tx: &mpsc::Sender<WireFrame>,
    forwarders: &mut Vec<AbortHandle>,
) -> Result<(), TransportError> {
    match frame {
        WireFrame::Publish { queue, body } => {
            let payload = serde_json::to_vec(&body)
                .map_err(|e| TransportError::Serialization(e.to_string()))?;
            debug!(queue = %queue, "Publish");
            bus.publish(&queue, payload).await?;
        }
        WireFrame::Subscribe { queue } => {
            debug!(queue = %queue, "Subscribe");
            let consumer = bus.consumer(&queue).await?;
            let out_tx = out_tx.clone();
            let task = tokio::spawn(async move {
                while let Some(delivery) = consumer.recv().await {
                    let body = match serde_json::from_slice(&delivery.payload) {
                        Ok(body) => body,
                        Err(e) => {
                            warn!(queue = %delivery.queue, error = %e, "Undecodable delivery");
                            continue;
                        }
                    };
                    let frame = WireFrame::Delivery {
                        queue: delivery.queue,
                        body,
                    };
                    if out_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            });
            forwarders.push(task.abort_handle());
        }
        WireFrame::Delivery { queue, .. } => {
            // Delivery is server-to-client only.
            warn!(queue = %queue, "Client sent Delivery frame, ignoring");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::in_process::InProcessBus;

    #[test]
    fn test_wire_frame_shape() {
        let frame = WireFrame::Publish {
            queue: "causal_input".to_string(),
            body: json!({"message_id": "m"}),
        };
        let encoded = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            encoded,
            r#"{"op":"publish","queue":"causal_input","body":{"message_id":"m"}}"#
        );

        let back: WireFrame = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back, frame);
    }

    #[tokio::test]
    async fn test_bridge_publish_and_subscribe() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("bridge.sock");

        let bus: Arc<dyn MessageBus> = Arc::new(InProcessBus::new());
        let server = BridgeServer::new(socket_path.clone(), Arc::clone(&bus));
        let shutdown = Arc::new(Notify::new());
        let server_shutdown = Arc::clone(&shutdown);
        let server_task = tokio::spawn(async move { server.run(server_shutdown).await });

        // Wait for the socket file to appear.
        for _ in 0..50 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let mut client = UnixStream::connect(&socket_path).await.unwrap();

        // Subscribe to a reply queue, then publish into it via the bridge.
        let subscribe = encode(&WireFrame::Subscribe {
            queue: "replies".to_string(),
        })
        .unwrap();
        client.write_all(&subscribe).await.unwrap();

        let publish = encode(&WireFrame::Publish {
            queue: "replies".to_string(),
            body: json!({"message_id": "m-1", "response": "hello"}),
        })
        .unwrap();
        client.write_all(&publish).await.unwrap();

        // The delivery comes back as a framed message.
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 1024];
        let delivery = loop {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before delivery");
            decoder.push(&buf[..n]);
            if let Some(frame) = decoder.decode::<WireFrame>().unwrap() {
                break frame;
            }
        };

        assert_eq!(
            delivery,
            WireFrame::Delivery {
                queue: "replies".to_string(),
                body: json!({"message_id": "m-1", "response": "hello"}),
            }
        );

        shutdown.notify_one();
        let _ = server_task.await;
    }
}
