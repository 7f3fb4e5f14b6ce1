//! One-shot completion signal for sessions.
//!
//! # Example
//!
//! ```
//! use rust_nls::{CompletionGate, Outcome, WaitResult};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let gate = CompletionGate::new();
//!     let signaller = gate.clone();
//!
//!     tokio::spawn(async move {
//!         signaller.fire(Outcome::Completed);
//!     });
//!
//!     let result = gate.wait(Duration::from_secs(1)).await;
//!     assert_eq!(result, WaitResult::Signaled(Outcome::Completed));
//! }
//! ```

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// The terminal result a session reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The server confirmed completion.
    Completed,
    /// The server reported `TaskFailed`.
    Failed,
    /// The connection closed before a terminal event.
    Closed,
}

/// Result of waiting on a [`CompletionGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The gate fired with the given outcome.
    Signaled(Outcome),
    /// The timeout elapsed first.
    TimedOut,
}

impl WaitResult {
    /// Returns the outcome if the gate fired.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Signaled(outcome) => Some(*outcome),
            Self::TimedOut => None,
        }
    }
}

/// A one-shot broadcast signal.
///
/// Fires at most once; later calls to [`fire`](Self::fire) are no-ops. Every
/// waiter, async or blocking, is released when it fires.
#[derive(Clone)]
pub struct CompletionGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    outcome: Mutex<Option<Outcome>>,
    cond: Condvar,
    notify: Notify,
}

impl GateInner {
    fn lock(&self) -> MutexGuard<'_, Option<Outcome>> {
        // The slot is a plain Option; a poisoned lock still holds a valid value.
        self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CompletionGate {
    /// Creates an armed gate.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GateInner {
                outcome: Mutex::new(None),
                cond: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Fires the gate with `outcome`.
    ///
    /// Returns true if this call fired it, false if it had already fired.
    pub fn fire(&self, outcome: Outcome) -> bool {
        {
            let mut slot = self.inner.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
        }
        self.inner.cond.notify_all();
        self.inner.notify.notify_waiters();
        true
    }

    /// Returns the outcome if the gate has fired.
    pub fn outcome(&self) -> Option<Outcome> {
        *self.inner.lock()
    }

    /// Returns true if the gate has fired.
    pub fn is_fired(&self) -> bool {
        self.outcome().is_some()
    }

    /// Waits until the gate fires or `timeout` elapses.
    pub async fn wait(&self, timeout: Duration) -> WaitResult {
        let waiting = async {
            loop {
                let notified = self.inner.notify.notified();
                tokio::pin!(notified);
                // Register before checking so a fire in between is not lost.
                notified.as_mut().enable();
                if let Some(outcome) = self.outcome() {
                    return outcome;
                }
                notified.await;
            }
        };
        match tokio::time::timeout(timeout, waiting).await {
            Ok(outcome) => WaitResult::Signaled(outcome),
            Err(_) => WaitResult::TimedOut,
        }
    }

    /// Blocks the current thread until the gate fires or `timeout` elapses.
    ///
    /// Must not be called from inside an async task.
    pub fn wait_blocking(&self, timeout: Duration) -> WaitResult {
        let slot = self.inner.lock();
        let (slot, _) = self
            .inner
            .cond
            .wait_timeout_while(slot, timeout, |outcome| outcome.is_none())
            .unwrap_or_else(|e| e.into_inner());
        match *slot {
            Some(outcome) => WaitResult::Signaled(outcome),
            None => WaitResult::TimedOut,
        }
    }
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_gate_fires_once() {
        let gate = CompletionGate::new();
        assert!(!gate.is_fired());

        assert!(gate.fire(Outcome::Failed));
        assert!(!gate.fire(Outcome::Completed));
        assert!(!gate.fire(Outcome::Closed));

        assert_eq!(gate.outcome(), Some(Outcome::Failed));
        assert_eq!(
            gate.wait(Duration::from_millis(10)).await,
            WaitResult::Signaled(Outcome::Failed)
        );
    }

    #[tokio::test]
    async fn test_gate_times_out() {
        let gate = CompletionGate::new();
        let result = gate.wait(Duration::from_millis(20)).await;
        assert_eq!(result, WaitResult::TimedOut);
        assert_eq!(result.outcome(), None);
    }

    #[tokio::test]
    async fn test_gate_releases_all_async_waiters() {
        let gate = CompletionGate::new();
        let released = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..5 {
            let gate = gate.clone();
            let released = Arc::clone(&released);
            handles.push(tokio::spawn(async move {
                let result = gate.wait(Duration::from_secs(5)).await;
                assert_eq!(result, WaitResult::Signaled(Outcome::Completed));
                released.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.fire(Outcome::Completed);

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_gate_releases_blocking_waiters() {
        let gate = CompletionGate::new();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.wait_blocking(Duration::from_secs(5)))
            })
            .collect();

        std::thread::sleep(Duration::from_millis(20));
        gate.fire(Outcome::Closed);

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), WaitResult::Signaled(Outcome::Closed));
        }
    }

    #[test]
    fn test_blocking_wait_times_out() {
        let gate = CompletionGate::new();
        assert_eq!(
            gate.wait_blocking(Duration::from_millis(10)),
            WaitResult::TimedOut
        );
    }
}
