//! WebSocket transport.
//!
//! One task per connection. All chat state lives in a single
//! [`SessionManager`] behind a lock; each connection only holds it for the
//! duration of one request. Outbound events flow back through the session's
//! bounded queue, so a slow socket never stalls a publish. A socket that
//! stops accepting frames altogether is dropped after the send timeout.

use crate::config::ServerConfig;
use anyhow::Context;
use chatline_core::{ClientEvent, Flow, Outbox, ServerEvent, SessionId, SessionManager};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

pub type SharedManager = Arc<RwLock<SessionManager>>;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Pause after an accept error that is not about a single peer.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
struct Timeouts {
    nickname: Option<Duration>,
    send: Option<Duration>,
}

pub struct ChatServer {
    manager: SharedManager,
    timeouts: Timeouts,
}

impl ChatServer {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            manager: Arc::new(RwLock::new(SessionManager::new(&config.core))),
            timeouts: Timeouts {
                nickname: config.nickname_timeout(),
                send: config.send_timeout(),
            },
        }
    }

    pub fn manager(&self) -> SharedManager {
        self.manager.clone()
    }

    /// Accept connections forever. Failed accepts are logged and skipped.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let mut next_id = 0u64;

        loop {
            let (stream, client_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    if let Some(pause) = accept_backoff(&e) {
                        tokio::time::sleep(pause).await;
                    }
                    continue;
                }
            };
            let id = SessionId::new(next_id);
            next_id += 1;

            let manager = self.manager.clone();
            let timeouts = self.timeouts;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, client_addr, id, &manager, timeouts).await
                {
                    tracing::warn!("Connection error from {}: {}", client_addr, e);
                }
                manager.write().await.disconnect(id);
                tracing::debug!("Connection closed: {} ({})", client_addr, id);
            });
        }
    }
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("Listening on ws://{}", listener.local_addr()?);
    ChatServer::new(&config).serve(listener).await
}

/// How long to wait before the next accept, if at all.
///
/// Errors tied to one peer are skipped at once. Anything else, such as
/// running out of file descriptors, would fail again immediately.
fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: SessionId,
    manager: &SharedManager,
    timeouts: Timeouts,
) -> anyhow::Result<()> {
    let mut outbound = {
        let mut m = manager.write().await;
        let (outbox, rx) = Outbox::channel(m.outbound_buffer());
        m.connect(id, outbox);
        rx
    };

    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    tracing::debug!("New connection from {} ({})", addr, id);

    manager.write().await.handshake_complete(id)?;
    let mut deadline = timeouts.nickname.map(|t| Instant::now() + t);

    loop {
        tokio::select! {
            // Incoming frame from the client
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };

                let event: ClientEvent = match serde_json::from_str(&text) {
                    Ok(ev) => ev,
                    Err(e) => {
                        tracing::warn!("Invalid message from {}: {}", addr, e);
                        let reply = ServerEvent::error(format!("Invalid message: {e}"));
                        push(&mut sink, &reply, timeouts.send).await?;
                        continue;
                    }
                };

                let flow = manager.write().await.handle(id, event);
                match flow {
                    Ok(Flow::Joined) => deadline = None,
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Close) => {
                        // Whatever was queued before the leave still goes out.
                        while let Ok(ev) = outbound.try_recv() {
                            push(&mut sink, &ev, timeouts.send).await?;
                        }
                        break;
                    }
                    Err(e) => tracing::debug!("Request from {} refused: {}", id, e),
                }
            }

            // Event routed to this session
            ev = outbound.recv() => {
                // A closed queue means the core already cut this session off.
                match ev {
                    Some(ev) if !outbound.is_closed() => {
                        push(&mut sink, &ev, timeouts.send).await?;
                    }
                    _ => {
                        tracing::warn!("Dropping slow client {} ({})", addr, id);
                        break;
                    }
                }
            }

            _ = expire(deadline) => {
                tracing::info!("{} did not pick a nickname in time", id);
                break;
            }
        }
    }

    let close = sink.close();
    match timeouts.send {
        Some(limit) => {
            let _ = tokio::time::timeout(limit, close).await;
        }
        None => {
            let _ = close.await;
        }
    }
    Ok(())
}

/// Write one event, giving up once the socket has accepted nothing for `limit`.
async fn push(
    sink: &mut WsSink,
    event: &ServerEvent,
    limit: Option<Duration>,
) -> anyhow::Result<()> {
    let frame = encode(event)?;
    match limit {
        Some(limit) => tokio::time::timeout(limit, sink.send(frame))
            .await
            .with_context(|| format!("send stalled for {limit:?}"))??,
        None => sink.send(frame).await?,
    }
    Ok(())
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn encode(event: &ServerEvent) -> anyhow::Result<Message> {
    Ok(Message::Text(serde_json::to_string(event)?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_errors_skip_straight_to_next_accept() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
        ] {
            assert_eq!(accept_backoff(&io::Error::from(kind)), None);
        }
    }

    #[test]
    fn resource_errors_back_off() {
        // EMFILE
        let fds = io::Error::from_raw_os_error(24);
        assert_eq!(accept_backoff(&fds), Some(ACCEPT_BACKOFF));
        let other = io::Error::other("listener hiccup");
        assert_eq!(accept_backoff(&other), Some(ACCEPT_BACKOFF));
    }
}
