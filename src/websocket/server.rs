use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use futures::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::error::WebSocketError;
use crate::hub::ChatHub;
use crate::websocket::{ClientMessage, Connection, ServerMessage};

enum Flow {
    Continue,
    Reply(ServerMessage),
    Close,
}

pub struct WebSocketServer {
    hub: Arc<ChatHub>,
}

impl WebSocketServer {
    pub fn new(hub: Arc<ChatHub>) -> Self {
        Self { hub }
    }

    /// Accepts sockets until the listener fails, one task per client.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, addr).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept WebSocket connection: {}", e);
                    break;
                }
            }
        }
    }

    pub async fn handle_connection(self: Arc<Self>, raw_stream: TcpStream, addr: SocketAddr) {
        info!("New WebSocket connection from: {}", addr);

        let ws_stream = match tokio_tungstenite::accept_async(raw_stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("Error during WebSocket handshake: {}", e);
                return;
            }
        };

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (mut connection, mut inbox) = self.hub.open();
        let connection_id = connection.id();

        let welcome = ServerMessage::Welcome { avatars: self.hub.chat.avatars.clone() };
        if let Err(e) = send_server_message(&mut ws_sink, &welcome).await {
            error!("Failed to greet connection {}: {}", connection_id, e);
            connection.leave().await;
            return;
        }

        let period = self.hub.chat.heartbeat_interval().max(Duration::from_secs(1));
        let timeout = self.hub.chat.client_timeout();
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                frame = ws_stream.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            error!("Error receiving WebSocket message: {}", e);
                            break;
                        }
                        None => break,
                    };
                    last_seen = Instant::now();
                    match self.on_frame(&mut connection, frame).await {
                        Flow::Continue => {}
                        Flow::Reply(reply) => {
                            if let Err(e) = send_server_message(&mut ws_sink, &reply).await {
                                error!("Error sending WebSocket message: {}", e);
                                break;
                            }
                        }
                        Flow::Close => break,
                    }
                }
                event = inbox.recv() => {
                    let Some(message) = event else { break };
                    let event = ServerMessage::Event { message: message.as_ref().clone() };
                    if let Err(e) = send_server_message(&mut ws_sink, &event).await {
                        error!("Error sending WebSocket message: {}", e);
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() > timeout {
                        warn!("Heartbeat timeout for connection {}", connection_id);
                        break;
                    }
                    if let Err(e) = ws_sink.send(WsMessage::Ping(Vec::new())).await {
                        error!("Failed to send heartbeat for connection {}: {}", connection_id, e);
                        break;
                    }
                }
            }
        }

        connection.leave().await;
        if let Err(e) = ws_sink.close().await {
            debug!("Error closing WebSocket connection: {}", e);
        }
        info!("Connection {} from {} closed", connection_id, addr);
    }

    async fn on_frame(&self, connection: &mut Connection, frame: WsMessage) -> Flow {
        match frame {
            WsMessage::Text(text) => {
                let request = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("Failed to parse message on connection {}: {}", connection.id(), e);
                        let err = WebSocketError::InvalidFormat(e.to_string());
                        return Flow::Reply(ServerMessage::error("invalid_format", err.to_string()));
                    }
                };
                let reply = connection.handle(request).await;
                match (reply, connection.is_closed()) {
                    (_, true) => Flow::Close,
                    (Some(reply), false) => Flow::Reply(reply),
                    (None, false) => Flow::Continue,
                }
            }
            WsMessage::Binary(bin) => {
                info!("Received binary message of {} bytes on connection {}", bin.len(), connection.id());
                Flow::Reply(ServerMessage::error("unsupported", "Binary messages are not supported"))
            }
            WsMessage::Close(reason) => {
                info!("Client closed connection {}: {:?}", connection.id(), reason);
                Flow::Close
            }
            // Pings are answered by tungstenite; pongs only refresh `last_seen`.
            _ => Flow::Continue,
        }
    }
}

async fn send_server_message<S>(sink: &mut S, msg: &ServerMessage) -> Result<(), WebSocketError>
where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(msg)
        .map_err(|e| WebSocketError::SendError(format!("Failed to serialize message: {}", e)))?;
    sink.send(WsMessage::Text(text)).await?;
    Ok(())
}
