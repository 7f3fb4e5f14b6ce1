//! WebSocket connection wrapper and receive pump.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::Error;

const CONN_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake header carrying the access token.
pub const TOKEN_HEADER: &str = "x-nls-token";

/// Close code reported when a close frame carries no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the stream ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration for a gateway connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint URL.
    pub endpoint: String,
    /// Access token sent during the handshake.
    pub token: String,
    /// Handshake timeout (default: 10s).
    pub connect_timeout: Duration,
    /// Maximum silence between inbound frames (default: none).
    pub recv_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Creates a configuration with default timeouts.
    pub fn new(endpoint: String, token: String) -> Self {
        Self {
            endpoint,
            token,
            connect_timeout: CONN_TIMEOUT,
            recv_timeout: None,
        }
    }
}

/// Sink for transport notifications.
pub trait ConnectionListener: Send + Sync {
    fn on_open(&self);
    fn on_message(&self, text: &str);
    fn on_binary(&self, data: &[u8]);
    fn on_close(&self, code: u16, reason: &str);
}

/// WebSocket connection wrapper.
pub struct WebSocket {
    write: Arc<Mutex<futures_util::stream::SplitSink<WsStream, Message>>>,
    read: Arc<Mutex<futures_util::stream::SplitStream<WsStream>>>,
    recv_timeout: Option<Duration>,
}

impl WebSocket {
    /// Opens a new WebSocket connection.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, Error> {
        info!(url = %config.endpoint, "WebSocket connecting");

        let mut request = config.endpoint.as_str().into_client_request()?;
        let token = HeaderValue::from_str(&config.token)
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(TOKEN_HEADER, token);

        let (ws_stream, _) = timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| Error::ConnectionTimeout)?
        .map_err(Error::WebSocket)?;

        info!(url = %config.endpoint, "WebSocket connected");

        let (write, read) = ws_stream.split();

        Ok(Self {
            write: Arc::new(Mutex::new(write)),
            read: Arc::new(Mutex::new(read)),
            recv_timeout: config.recv_timeout,
        })
    }

    /// Sends a text message.
    pub async fn send_text(&self, text: &str) -> Result<(), Error> {
        let mut writer = self.write.lock().await;
        writer
            .send(Message::Text(text.to_string()))
            .await
            .map_err(Error::WebSocket)
    }

    /// Sends a binary message.
    pub async fn send_binary(&self, data: Vec<u8>) -> Result<(), Error> {
        let mut writer = self.write.lock().await;
        writer
            .send(Message::Binary(data))
            .await
            .map_err(Error::WebSocket)
    }

    /// Sends a pong message.
    async fn send_pong(&self, data: Vec<u8>) -> Result<(), Error> {
        debug!("Sending pong");
        let mut writer = self.write.lock().await;
        writer
            .send(Message::Pong(data))
            .await
            .map_err(Error::WebSocket)
    }

    /// Receives the next message, honouring the configured receive timeout.
    pub async fn recv(&self) -> Result<Message, Error> {
        let mut reader = self.read.lock().await;
        let next = match self.recv_timeout {
            Some(limit) => timeout(limit, reader.next())
                .await
                .map_err(|_| Error::ConnectionTimeout)?,
            None => reader.next().await,
        };
        match next {
            Some(Ok(msg)) => Ok(msg),
            Some(Err(e)) => Err(Error::WebSocket(e)),
            None => Err(Error::ChannelRecv),
        }
    }

    /// Closes the WebSocket connection.
    pub async fn close(&self) -> Result<(), Error> {
        info!("WebSocket closing");
        let mut writer = self.write.lock().await;
        let _ = writer.send(Message::Close(None)).await;
        let _ = writer.close().await;
        info!("WebSocket closed");
        Ok(())
    }
}

/// Forwards inbound frames to `listener` in arrival order until the
/// connection ends.
///
/// Calls `on_open` first and exactly one `on_close` last.
pub async fn pump(conn: Arc<WebSocket>, listener: Arc<dyn ConnectionListener>) {
    listener.on_open();

    let (code, reason) = loop {
        let msg = match conn.recv().await {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "WebSocket receive failed");
                break (CLOSE_ABNORMAL, e.to_string());
            }
        };
        match msg {
            Message::Text(text) => listener.on_message(&text),
            Message::Binary(data) => listener.on_binary(&data),
            Message::Ping(data) => {
                debug!("Received ping, sending pong");
                let _ = conn.send_pong(data).await;
            }
            Message::Pong(_) => debug!("Received pong"),
            Message::Close(Some(frame)) => {
                debug!(frame = ?frame, "Received close");
                break (u16::from(frame.code), frame.reason.to_string());
            }
            Message::Close(None) => {
                debug!("Received close without status");
                break (CLOSE_NO_STATUS, String::new());
            }
            Message::Frame(_) => debug!("Received raw frame"),
        }
    };

    listener.on_close(code, &reason);
}
