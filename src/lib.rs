//! Rust client protocol layer for NLS streaming speech sessions.
//!
//! Turns the named JSON event frames a speech gateway sends over a WebSocket
//! into ordered, typed callbacks for transcription, synthesis and dialogue
//! sessions, and lets the caller wait for the session to finish.
//!
//! # Example
//!
//! ```no_run
//! use rust_nls::{Callbacks, ConnectionConfig, SessionKind, StreamingSession, WaitResult};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rust_nls::Error> {
//!     let config = ConnectionConfig::new(
//!         rust_nls::DEFAULT_ENDPOINT.to_string(),
//!         std::env::var("NLS_TOKEN").expect("NLS_TOKEN not set"),
//!     );
//!
//!     let callbacks = Callbacks::new()
//!         .on_start(|doc| println!("started: {:?}", doc.task_id()))
//!         .on_sentence_begin(|_| {})
//!         .on_sentence_end(|doc| println!("sentence: {:?}", doc.payload().get("result")))
//!         .on_result_change(|_| {})
//!         .on_complete(|_| println!("complete"))
//!         .on_fail(|doc| eprintln!("failed: {:?}", doc.status_text()));
//!
//!     let session = StreamingSession::open(&config, SessionKind::Transcription, callbacks).await?;
//!
//!     // The start command is built by the caller.
//!     let start = serde_json::json!({
//!         "header": { "name": "StartTranscription", "namespace": "SpeechTranscriber" },
//!         "payload": { "format": "pcm", "sample_rate": 16000 }
//!     });
//!     session.send_command(&start).await?;
//!     session.send_audio(vec![0u8; 3200]).await?;
//!
//!     match session.wait(Duration::from_secs(30)).await {
//!         WaitResult::Signaled(outcome) => println!("finished: {:?}", outcome),
//!         WaitResult::TimedOut => eprintln!("no answer"),
//!     }
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

mod callbacks;
mod client;
mod dispatcher;
mod error;
mod event;
mod gate;
mod messages;
mod session;
mod state;
mod ws;

pub use callbacks::{AudioHandler, Callbacks, EventHandler};
pub use client::StreamingSession;
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use event::{classify, EventKind, SessionKind};
pub use gate::{CompletionGate, Outcome, WaitResult};
pub use messages::*;
pub use session::{CloseInfo, Diagnostic, Session, SessionHandle};
pub use state::SessionState;
pub use ws::{
    pump, ConnectionConfig, ConnectionListener, WebSocket, CLOSE_ABNORMAL, CLOSE_NO_STATUS,
    TOKEN_HEADER,
};

/// Default gateway WebSocket endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://nls-gateway.cn-shanghai.aliyuncs.com/ws/v1";
