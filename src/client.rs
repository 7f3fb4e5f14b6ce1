//! Streaming session over a gateway connection.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callbacks::Callbacks;
use crate::error::Error;
use crate::event::SessionKind;
use crate::gate::WaitResult;
use crate::session::Session;
use crate::ws::{pump, ConnectionConfig, ConnectionListener, WebSocket, CLOSE_ABNORMAL};

const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// A [`Session`] bound to its own WebSocket connection.
///
/// Inbound frames are dispatched on a background task in arrival order.
/// Commands are built by the caller and sent verbatim. Dropping it without
/// [`close`](Self::close) stops the task and releases the connection.
pub struct StreamingSession {
    session: Session,
    conn: Arc<WebSocket>,
    pump: PumpTask,
}

/// Receive task handle, aborted on drop.
struct PumpTask(JoinHandle<()>);

impl Drop for PumpTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl StreamingSession {
    /// Validates `callbacks`, connects and starts dispatching.
    ///
    /// A missing required callback fails before any connection is made.
    pub async fn open(
        config: &ConnectionConfig,
        kind: SessionKind,
        callbacks: Callbacks,
    ) -> Result<Self, Error> {
        let session = Session::start(kind, callbacks)?;
        info!(session_id = %session.id(), kind = %kind, "Streaming session opening");

        let conn = Arc::new(WebSocket::connect(config).await?);
        let listener: Arc<dyn ConnectionListener> = Arc::new(session.dispatcher());
        let pump = PumpTask(tokio::spawn(pump(Arc::clone(&conn), listener)));

        Ok(Self {
            session,
            conn,
            pump,
        })
    }

    /// Sends a JSON command such as a start or stop request.
    pub async fn send_command(&self, command: &serde_json::Value) -> Result<(), Error> {
        if self.session.state().is_terminal() {
            return Err(Error::NotConnected);
        }
        let json = serde_json::to_string(command)?;
        debug!(session_id = %self.session.id(), json = %json, "Sending command");
        self.conn.send_text(&json).await
    }

    /// Sends a chunk of input audio.
    pub async fn send_audio(&self, audio: Vec<u8>) -> Result<(), Error> {
        if self.session.state().is_terminal() {
            return Err(Error::NotConnected);
        }
        debug!(session_id = %self.session.id(), len = audio.len(), "Sending audio");
        self.conn.send_binary(audio).await
    }

    /// Waits until the session completes, fails or closes.
    pub async fn wait(&self, timeout: Duration) -> WaitResult {
        self.session.wait(timeout).await
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Closes the connection and waits for the receive task to finish.
    ///
    /// Returns the session for inspection; a session that had not finished
    /// ends up `Closed`.
    pub async fn close(mut self) -> Session {
        info!(session_id = %self.session.id(), "Streaming session closing");
        let _ = self.conn.close().await;
        match tokio::time::timeout(CLOSE_GRACE, &mut self.pump.0).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // A panicking callback ends the task before the pump reports the close.
                warn!(session_id = %self.session.id(), error = %e, "Receive task ended abnormally");
                self.session
                    .dispatcher()
                    .handle_close(CLOSE_ABNORMAL, "receive task failed");
            }
            Err(_) => {
                debug!(session_id = %self.session.id(), "Close handshake timed out");
                self.pump.0.abort();
                self.session
                    .dispatcher()
                    .handle_close(CLOSE_ABNORMAL, "close handshake timed out");
            }
        }
        self.session
    }
}
