//! [`Transport`] over a real WebSocket connection.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::NetError;
use crate::transport::{Connection, RemoteEnd, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Connection, NetError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| NetError::Connect(e.to_string()))?;
        debug!(url = %self.url, "Websocket connected");

        let (conn, remote) = Connection::pair();
        tokio::spawn(pump(stream, remote));
        Ok(conn)
    }
}

/// Shuttle text frames between the socket and the [`Connection`] until
/// either side goes away.
async fn pump(stream: WsStream, mut remote: RemoteEnd) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            outgoing = remote.from_client.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        warn!(error = %e, "Websocket send failed");
                        break;
                    }
                }
                None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            },

            incoming = source.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    if remote.to_client.send(text).is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => {
                        if remote.to_client.send(text).is_err() {
                            break;
                        }
                    }
                    Err(_) => debug!("Ignoring non-utf8 binary frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("Websocket closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Websocket error");
                    break;
                }
            },
        }
    }
}
