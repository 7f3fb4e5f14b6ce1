//! Callback slots supplied when a session starts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::event::{EventKind, SessionKind};
use crate::messages::EventDocument;

/// Handler for a recognized event.
pub type EventHandler = Arc<dyn Fn(&EventDocument) + Send + Sync>;

/// Handler for a binary frame (synthesized audio).
pub type AudioHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// The set of handlers a session dispatches to.
///
/// Handlers run on the transport's receive task, one at a time and in frame
/// order. They should return quickly. A handler must not feed frames back
/// into its own session's [`Dispatcher`](crate::Dispatcher); such calls are
/// logged and dropped.
///
/// ```
/// use rust_nls::{Callbacks, SessionKind};
///
/// let callbacks = Callbacks::new()
///     .on_complete(|doc| println!("done: {:?}", doc.task_id()))
///     .on_fail(|doc| eprintln!("failed: {:?}", doc.status_text()))
///     .on_meta_info(|_| {});
///
/// assert!(callbacks.validate(SessionKind::Synthesis).is_ok());
/// assert!(callbacks.validate(SessionKind::Transcription).is_err());
/// ```
#[derive(Clone, Default)]
pub struct Callbacks {
    handlers: HashMap<EventKind, EventHandler>,
    complete: Option<EventHandler>,
    audio: Option<AudioHandler>,
}

impl Callbacks {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a specific event kind.
    pub fn on<F>(mut self, event: EventKind, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        self.handlers.insert(event, Arc::new(handler));
        self
    }

    /// `TranscriptionStarted` or `RecognitionStarted`.
    pub fn on_start<F>(mut self, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        self.handlers
            .insert(EventKind::TranscriptionStarted, Arc::clone(&handler));
        self.handlers.insert(EventKind::RecognitionStarted, handler);
        self
    }

    pub fn on_sentence_begin<F>(self, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        self.on(EventKind::SentenceBegin, handler)
    }

    pub fn on_sentence_end<F>(self, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        self.on(EventKind::SentenceEnd, handler)
    }

    /// Intermediate results: `TranscriptionResultChanged` or `RecognitionResultChanged`.
    pub fn on_result_change<F>(mut self, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        self.handlers
            .insert(EventKind::TranscriptionResultChanged, Arc::clone(&handler));
        self.handlers
            .insert(EventKind::RecognitionResultChanged, handler);
        self
    }

    /// The successful terminal event of whichever session kind is started.
    pub fn on_complete<F>(mut self, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        self.complete = Some(Arc::new(handler));
        self
    }

    /// `TaskFailed`.
    pub fn on_fail<F>(self, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        self.on(EventKind::TaskFailed, handler)
    }

    pub fn on_semantics<F>(self, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        self.on(EventKind::SentenceSemantics, handler)
    }

    pub fn on_meta_info<F>(self, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        self.on(EventKind::MetaInfo, handler)
    }

    pub fn on_recognition_completed<F>(self, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        self.on(EventKind::RecognitionCompleted, handler)
    }

    pub fn on_wake_word_verified<F>(self, handler: F) -> Self
    where
        F: Fn(&EventDocument) + Send + Sync + 'static,
    {
        self.on(EventKind::WakeWordVerificationCompleted, handler)
    }

    /// Binary frames of a synthesis session.
    pub fn on_audio<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.audio = Some(Arc::new(handler));
        self
    }

    /// Checks that every required event of `kind` has a handler.
    pub fn validate(&self, kind: SessionKind) -> Result<(), Error> {
        for event in kind.vocabulary() {
            if event.is_optional() || self.lookup(*event).is_some() {
                continue;
            }
            return Err(Error::MissingCallback {
                kind: kind.as_str(),
                event: event.name(),
            });
        }
        Ok(())
    }

    /// Resolves the handlers for `kind` into a dispatch table.
    ///
    /// Missing optional handlers fall back to logging the event. Handlers for
    /// events `kind` never emits are dropped.
    pub(crate) fn resolve(self, kind: SessionKind) -> Result<HandlerTable, Error> {
        self.validate(kind)?;

        for event in self.handlers.keys() {
            if !kind.recognizes(*event) && !is_shared_slot(*event) {
                warn!(kind = %kind, event = %event, "Handler for foreign event ignored");
            }
        }

        let handlers = kind
            .vocabulary()
            .iter()
            .map(|event| {
                let handler = self.lookup(*event).unwrap_or_else(|| fallback(*event));
                (*event, handler)
            })
            .collect();

        let noop_audio: AudioHandler = Arc::new(|_: &[u8]| {});
        Ok(HandlerTable {
            handlers,
            audio: self.audio.unwrap_or(noop_audio),
        })
    }

    fn lookup(&self, event: EventKind) -> Option<EventHandler> {
        if event.is_terminal() && event != EventKind::TaskFailed {
            if let Some(handler) = &self.complete {
                return Some(Arc::clone(handler));
            }
        }
        self.handlers.get(&event).cloned()
    }
}

/// Default for an optional event nobody registered a handler for.
fn fallback(event: EventKind) -> EventHandler {
    if event == EventKind::MetaInfo {
        return Arc::new(|doc: &EventDocument| {
            info!(task_id = ?doc.task_id(), "MetaInfo received");
        });
    }
    Arc::new(move |doc: &EventDocument| {
        debug!(event = %event, task_id = ?doc.task_id(), "No handler registered");
    })
}

/// Slots filled by helpers that cover more than one vocabulary.
fn is_shared_slot(event: EventKind) -> bool {
    matches!(
        event,
        EventKind::TranscriptionStarted
            | EventKind::RecognitionStarted
            | EventKind::TranscriptionResultChanged
            | EventKind::RecognitionResultChanged
    )
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.handlers.keys().map(EventKind::name).collect();
        events.sort_unstable();
        f.debug_struct("Callbacks")
            .field("events", &events)
            .field("complete", &self.complete.is_some())
            .field("audio", &self.audio.is_some())
            .finish()
    }
}

/// Resolved handlers, one per event of a session kind.
pub(crate) struct HandlerTable {
    handlers: HashMap<EventKind, EventHandler>,
    audio: AudioHandler,
}

impl HandlerTable {
    pub(crate) fn get(&self, event: EventKind) -> Option<&EventHandler> {
        self.handlers.get(&event)
    }

    pub(crate) fn audio(&self) -> &AudioHandler {
        &self.audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transcription_callbacks() -> Callbacks {
        Callbacks::new()
            .on_start(|_| {})
            .on_sentence_begin(|_| {})
            .on_sentence_end(|_| {})
            .on_result_change(|_| {})
            .on_complete(|_| {})
            .on_fail(|_| {})
    }

    #[test]
    fn test_missing_required_callback() {
        let callbacks = Callbacks::new().on_start(|_| {}).on_fail(|_| {});
        let err = callbacks.validate(SessionKind::Transcription).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingCallback {
                kind: "transcription",
                event: "SentenceBegin"
            }
        ));
    }

    #[test]
    fn test_optional_callbacks_have_defaults() {
        let table = transcription_callbacks()
            .resolve(SessionKind::Transcription)
            .unwrap();
        let doc = EventDocument::parse(r#"{"header":{"name":"SentenceSemantics"}}"#).unwrap();
        (table.get(EventKind::SentenceSemantics).unwrap())(&doc);
        assert!(table.get(EventKind::MetaInfo).is_none());
    }

    #[test]
    fn test_complete_helper_covers_every_kind() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let callbacks = Callbacks::new()
            .on_complete(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .on_fail(|_| {});

        let table = callbacks.resolve(SessionKind::Synthesis).unwrap();
        let doc = EventDocument::parse(r#"{"header":{"name":"SynthesisCompleted"}}"#).unwrap();
        (table.get(EventKind::SynthesisCompleted).unwrap())(&doc);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_foreign_callback_is_ignored() {
        let callbacks = Callbacks::new()
            .on_complete(|_| {})
            .on_fail(|_| {})
            .on_semantics(|_| {})
            .on_sentence_begin(|_| {});
        assert!(callbacks.validate(SessionKind::Synthesis).is_ok());

        let table = callbacks.resolve(SessionKind::Synthesis).unwrap();
        assert!(table.get(EventKind::SentenceSemantics).is_none());
        assert!(table.get(EventKind::SentenceBegin).is_none());
        assert!(table.get(EventKind::MetaInfo).is_some());
    }

    #[test]
    fn test_meta_info_fallback_logs() {
        let table = Callbacks::new()
            .on_complete(|_| {})
            .on_fail(|_| {})
            .resolve(SessionKind::Synthesis)
            .unwrap();
        let doc = EventDocument::parse(
            r#"{"header":{"name":"MetaInfo","task_id":"7a"},"payload":{"subtitles":[]}}"#,
        )
        .unwrap();
        (table.get(EventKind::MetaInfo).unwrap())(&doc);
    }

    #[test]
    fn test_dialogue_requirements() {
        let callbacks = Callbacks::new()
            .on_start(|_| {})
            .on_recognition_completed(|_| {})
            .on_complete(|_| {})
            .on_fail(|_| {});
        assert!(callbacks.validate(SessionKind::DialogueAssistant).is_ok());
        // The transcription start handler shares the same slot helper.
        assert!(callbacks.resolve(SessionKind::DialogueAssistant).is_ok());
    }
}
