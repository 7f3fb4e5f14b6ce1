//! Session lifecycle states and their transitions.

use std::fmt;

use crate::event::EventKind;
use crate::gate::Outcome;

/// Lifecycle state of a session.
///
/// `Created -> Ready -> Active -> {Completed | Failed | Closed}`. Nothing
/// leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Start command issued, nothing heard back yet.
    Created,
    /// Server is ready to receive input.
    Ready,
    /// Server is streaming results.
    Active,
    Completed,
    Failed,
    /// Connection closed before a terminal event arrived.
    Closed,
}

impl SessionState {
    /// Returns true for `Completed`, `Failed` and `Closed`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Closed)
    }

    /// Returns the gate outcome a terminal state reports.
    pub const fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Completed => Some(Outcome::Completed),
            Self::Failed => Some(Outcome::Failed),
            Self::Closed => Some(Outcome::Closed),
            _ => None,
        }
    }

    /// Returns the state reached by applying `event` to `self`.
    ///
    /// Terminal states absorb every event. Start events only move `Created`
    /// forward; content events lift `Created` and `Ready` to `Active`.
    pub fn on_event(self, event: EventKind) -> SessionState {
        if self.is_terminal() {
            return self;
        }
        match event {
            EventKind::TaskFailed => Self::Failed,
            e if e.is_terminal() => Self::Completed,
            EventKind::TranscriptionStarted | EventKind::RecognitionStarted => match self {
                Self::Created => Self::Ready,
                other => other,
            },
            _ => Self::Active,
        }
    }

    /// Returns the state reached when binary content arrives.
    pub fn on_content(self) -> SessionState {
        if self.is_terminal() {
            self
        } else {
            Self::Active
        }
    }

    /// Returns the state reached when the connection closes.
    pub fn on_close(self) -> SessionState {
        if self.is_terminal() {
            self
        } else {
            Self::Closed
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}
