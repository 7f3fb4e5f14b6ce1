//! Routes inbound frames to session callbacks.
//!
//! One frame is handled at a time: parse, classify, commit the state
//! transition, invoke exactly one callback, then fire the completion gate if
//! the frame ended the session. Problems with a frame are recorded as
//! diagnostics and never reach the caller.

use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use crate::event::{classify, EventKind, SessionKind};
use crate::messages::EventDocument;
use crate::session::{CloseInfo, Diagnostic, SessionShared};
use crate::state::SessionState;
use crate::ws::ConnectionListener;

/// Feeds transport frames into a [`Session`](crate::Session).
///
/// Holds only a weak reference; once the session is dropped every call is a
/// no-op.
#[derive(Clone)]
pub struct Dispatcher {
    session: Weak<SessionShared>,
}

impl Dispatcher {
    pub(crate) fn new(session: Weak<SessionShared>) -> Self {
        Self { session }
    }

    fn session(&self) -> Option<Arc<SessionShared>> {
        let session = self.session.upgrade();
        if session.is_none() {
            debug!("Frame for dropped session ignored");
        }
        session
    }

    /// Handles one text frame.
    pub fn handle(&self, frame: &str) {
        let Some(session) = self.session() else {
            return;
        };
        let Some(_turn) = session.begin_turn() else {
            warn!(session_id = %session.label, "Re-entrant dispatch from a callback ignored");
            return;
        };

        if frame.trim().is_empty() {
            debug!(session_id = %session.label, "Blank frame skipped");
            return;
        }
        debug!(session_id = %session.label, frame = %frame, "Frame received");

        let doc = match EventDocument::parse(frame) {
            Ok(doc) => doc,
            Err(e) => {
                error!(session_id = %session.label, error = %e, "Malformed frame");
                session.record(Diagnostic::MalformedFrame {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let Some(event) = classify(session.kind, doc.name()) else {
            warn!(
                session_id = %session.label,
                kind = %session.kind,
                event = %doc.name(),
                "Unrecognized event"
            );
            session.record(Diagnostic::UnrecognizedEvent {
                name: doc.name().to_string(),
            });
            return;
        };

        let (prev, next) = session.transition(|state| state.on_event(event));
        if prev == SessionState::Closed {
            debug!(session_id = %session.label, event = %event, "Event after close ignored");
            return;
        }
        if let Some(task_id) = doc.task_id() {
            session.set_task_id(task_id);
        }
        if prev != next {
            debug!(session_id = %session.label, from = %prev, to = %next, "State changed");
        }

        if event == EventKind::TaskFailed {
            error!(
                session_id = %session.label,
                task_id = ?doc.task_id(),
                status = ?doc.status(),
                status_text = ?doc.status_text(),
                "Task failed"
            );
        }

        if let Some(handler) = session.handlers.get(event) {
            handler(&doc);
            session.count_callback();
        }

        if !prev.is_terminal() {
            if let Some(outcome) = next.outcome() {
                info!(session_id = %session.label, outcome = ?outcome, "Session finished");
                session.gate.fire(outcome);
            }
        }
    }

    /// Handles one binary frame.
    ///
    /// Only synthesis sessions stream binary audio; anything else is recorded
    /// as a diagnostic.
    pub fn handle_binary(&self, data: &[u8]) {
        let Some(session) = self.session() else {
            return;
        };
        let Some(_turn) = session.begin_turn() else {
            warn!(session_id = %session.label, "Re-entrant dispatch from a callback ignored");
            return;
        };

        if session.kind != SessionKind::Synthesis {
            warn!(session_id = %session.label, len = data.len(), "Unexpected binary frame");
            session.record(Diagnostic::UnexpectedBinary { len: data.len() });
            return;
        }

        let (prev, _) = session.transition(SessionState::on_content);
        if prev.is_terminal() {
            debug!(session_id = %session.label, len = data.len(), "Audio after terminal state ignored");
            return;
        }
        debug!(session_id = %session.label, len = data.len(), "Audio received");
        (session.handlers.audio())(data);
        session.count_callback();
    }

    /// Handles the transport opening.
    pub fn handle_open(&self) {
        if let Some(session) = self.session() {
            debug!(session_id = %session.label, "Connection is open");
        }
    }

    /// Handles the transport closing.
    ///
    /// Forces a live session into `Closed` and fires the gate. The close code
    /// and reason are recorded either way.
    pub fn handle_close(&self, code: u16, reason: &str) {
        let Some(session) = self.session() else {
            return;
        };
        let Some(_turn) = session.begin_turn() else {
            warn!(session_id = %session.label, "Re-entrant dispatch from a callback ignored");
            return;
        };

        session.set_close_info(CloseInfo {
            code,
            reason: reason.to_string(),
        });

        let (prev, next) = session.transition(SessionState::on_close);
        if prev.is_terminal() {
            info!(session_id = %session.label, code = code, reason = %reason, "Connection closed");
            return;
        }
        warn!(
            session_id = %session.label,
            code = code,
            reason = %reason,
            state = %prev,
            "Connection closed before session finished"
        );
        if let Some(outcome) = next.outcome() {
            session.gate.fire(outcome);
        }
    }
}

impl ConnectionListener for Dispatcher {
    fn on_open(&self) {
        self.handle_open();
    }

    fn on_message(&self, text: &str) {
        self.handle(text);
    }

    fn on_binary(&self, data: &[u8]) {
        self.handle_binary(data);
    }

    fn on_close(&self, code: u16, reason: &str) {
        self.handle_close(code, reason);
    }
}
