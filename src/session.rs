//! Caller-owned session: state, completion gate and diagnostics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::info;

use crate::callbacks::{Callbacks, HandlerTable};
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::event::SessionKind;
use crate::gate::{CompletionGate, Outcome, WaitResult};
use crate::state::SessionState;

/// A non-fatal problem seen while processing inbound frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Frame did not parse or had no event name.
    MalformedFrame {
        /// Parser error text.
        reason: String,
    },
    /// Event name outside the session kind's vocabulary.
    UnrecognizedEvent {
        /// The unrecognized name.
        name: String,
    },
    /// Binary frame on a session kind that does not stream audio.
    UnexpectedBinary {
        /// Frame length in bytes.
        len: usize,
    },
}

/// Close code and reason reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// One transcription, synthesis or dialogue interaction.
///
/// The session owns its state; the [`Dispatcher`] it hands out only holds a
/// weak reference and becomes inert once the session is dropped.
pub struct Session {
    shared: Arc<SessionShared>,
}

pub(crate) struct SessionShared {
    pub(crate) kind: SessionKind,
    pub(crate) label: String,
    pub(crate) handlers: HandlerTable,
    pub(crate) gate: CompletionGate,
    state: Mutex<SessionState>,
    /// Held for the whole of one frame so frames never interleave.
    turn: Mutex<()>,
    /// Thread currently holding `turn`.
    turn_owner: Mutex<Option<ThreadId>>,
    task_id: Mutex<Option<String>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
    close_info: Mutex<Option<CloseInfo>>,
    callbacks_invoked: AtomicUsize,
}

/// Locks a mutex, recovering the value if a callback panicked while it was held.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Exclusive right to process one frame. Released on drop.
pub(crate) struct Turn<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        *lock(self.owner) = None;
    }
}

impl SessionShared {
    /// Waits for the previous frame to finish.
    ///
    /// Returns `None` when called from a callback of this same session, which
    /// would otherwise deadlock.
    pub(crate) fn begin_turn(&self) -> Option<Turn<'_>> {
        let me = thread::current().id();
        if *lock(&self.turn_owner) == Some(me) {
            return None;
        }
        let guard = lock(&self.turn);
        *lock(&self.turn_owner) = Some(me);
        Some(Turn {
            owner: &self.turn_owner,
            _guard: guard,
        })
    }

    pub(crate) fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Applies `f` to the current state and returns `(previous, next)`.
    pub(crate) fn transition<F>(&self, f: F) -> (SessionState, SessionState)
    where
        F: FnOnce(SessionState) -> SessionState,
    {
        let mut state = lock(&self.state);
        let prev = *state;
        *state = f(prev);
        (prev, *state)
    }

    pub(crate) fn record(&self, diagnostic: Diagnostic) {
        lock(&self.diagnostics).push(diagnostic);
    }

    pub(crate) fn set_close_info(&self, info: CloseInfo) {
        *lock(&self.close_info) = Some(info);
    }

    pub(crate) fn set_task_id(&self, task_id: &str) {
        let mut slot = lock(&self.task_id);
        if slot.as_deref() != Some(task_id) {
            *slot = Some(task_id.to_string());
        }
    }

    pub(crate) fn count_callback(&self) {
        self.callbacks_invoked.fetch_add(1, Ordering::SeqCst);
    }
}

impl Session {
    /// Starts a session of `kind` with the given callbacks.
    ///
    /// Fails with [`Error::MissingCallback`] if a required handler is absent.
    /// This is the only way starting a session can fail.
    pub fn start(kind: SessionKind, callbacks: Callbacks) -> Result<Self, Error> {
        let handlers = callbacks.resolve(kind)?;
        let label = uuid::Uuid::new_v4().to_string()[..8].to_string();
        info!(session_id = %label, kind = %kind, "Session created");

        Ok(Self {
            shared: Arc::new(SessionShared {
                kind,
                label,
                handlers,
                gate: CompletionGate::new(),
                state: Mutex::new(SessionState::Created),
                turn: Mutex::new(()),
                turn_owner: Mutex::new(None),
                task_id: Mutex::new(None),
                diagnostics: Mutex::new(Vec::new()),
                close_info: Mutex::new(None),
                callbacks_invoked: AtomicUsize::new(0),
            }),
        })
    }

    /// Returns a dispatcher feeding this session.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::downgrade(&self.shared))
    }

    /// Returns a weak handle callbacks can use to observe the session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.shared.kind
    }

    /// Short random label used in logs.
    pub fn id(&self) -> &str {
        &self.shared.label
    }

    /// Current state. Stable once the gate has fired.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Last task id seen on an inbound frame.
    pub fn task_id(&self) -> Option<String> {
        lock(&self.shared.task_id).clone()
    }

    /// Returns the gate fired when the session ends.
    pub fn gate(&self) -> CompletionGate {
        self.shared.gate.clone()
    }

    /// Returns the terminal outcome, if reached.
    pub fn outcome(&self) -> Option<Outcome> {
        self.shared.gate.outcome()
    }

    /// Waits for the session to complete, fail or close.
    pub async fn wait(&self, timeout: Duration) -> WaitResult {
        self.shared.gate.wait(timeout).await
    }

    /// Blocks the current thread until the session completes, fails or closes.
    pub fn wait_blocking(&self, timeout: Duration) -> WaitResult {
        self.shared.gate.wait_blocking(timeout)
    }

    /// Diagnostics recorded so far, oldest first.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        lock(&self.shared.diagnostics).clone()
    }

    /// Close code and reason, once the transport has closed.
    pub fn close_info(&self) -> Option<CloseInfo> {
        lock(&self.shared.close_info).clone()
    }

    /// Number of callbacks invoked so far.
    pub fn callbacks_invoked(&self) -> usize {
        self.shared.callbacks_invoked.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.label)
            .field("kind", &self.shared.kind)
            .field("state", &self.state())
            .finish()
    }
}

/// Weak, cloneable view of a [`Session`].
#[derive(Clone)]
pub struct SessionHandle {
    shared: Weak<SessionShared>,
}

impl SessionHandle {
    /// Current state, or `None` once the session is dropped.
    pub fn state(&self) -> Option<SessionState> {
        self.shared.upgrade().map(|shared| shared.state())
    }

    pub fn kind(&self) -> Option<SessionKind> {
        self.shared.upgrade().map(|shared| shared.kind)
    }
}
