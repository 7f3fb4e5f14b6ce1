//! Session kinds, event kinds and the event-name classifier.

use std::fmt;

/// The kind of streaming interaction a session carries.
///
/// Fixed when the session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Continuous speech-to-text transcription.
    Transcription,
    /// Text-to-speech synthesis.
    Synthesis,
    /// Spoken dialogue assistant.
    DialogueAssistant,
}

impl SessionKind {
    /// Returns a stable name for logs and errors.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::Synthesis => "synthesis",
            Self::DialogueAssistant => "dialogue_assistant",
        }
    }

    /// Returns the closed vocabulary of this kind in classification order.
    pub const fn vocabulary(&self) -> &'static [EventKind] {
        match self {
            Self::Transcription => TRANSCRIPTION_EVENTS,
            Self::Synthesis => SYNTHESIS_EVENTS,
            Self::DialogueAssistant => DIALOGUE_EVENTS,
        }
    }

    /// Returns true if `event` belongs to this kind's vocabulary.
    pub fn recognizes(&self, event: EventKind) -> bool {
        self.vocabulary().contains(&event)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized server event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Transcription accepted; the server is ready for audio.
    TranscriptionStarted,
    /// A sentence has started.
    SentenceBegin,
    /// A sentence has ended, carrying its final text.
    SentenceEnd,
    /// NLP-augmented sentence result.
    SentenceSemantics,
    /// Intermediate result of the current sentence.
    TranscriptionResultChanged,
    /// Transcription finished successfully.
    TranscriptionCompleted,
    /// All audio for the request has been sent.
    SynthesisCompleted,
    /// Synthesis metadata such as subtitles.
    MetaInfo,
    /// Dialogue recognition accepted.
    RecognitionStarted,
    /// Intermediate dialogue recognition result.
    RecognitionResultChanged,
    /// Wake word check finished.
    WakeWordVerificationCompleted,
    /// Final recognition of the user's utterance.
    RecognitionCompleted,
    /// The assistant's answer; ends a dialogue.
    DialogResultGenerated,
    /// The server gave up on the task. Ends any session kind.
    TaskFailed,
}

const TRANSCRIPTION_EVENTS: &[EventKind] = &[
    EventKind::TranscriptionStarted,
    EventKind::SentenceBegin,
    EventKind::SentenceEnd,
    EventKind::SentenceSemantics,
    EventKind::TranscriptionResultChanged,
    EventKind::TranscriptionCompleted,
    EventKind::TaskFailed,
];

const SYNTHESIS_EVENTS: &[EventKind] = &[
    EventKind::SynthesisCompleted,
    EventKind::MetaInfo,
    EventKind::TaskFailed,
];

const DIALOGUE_EVENTS: &[EventKind] = &[
    EventKind::RecognitionStarted,
    EventKind::RecognitionResultChanged,
    EventKind::WakeWordVerificationCompleted,
    EventKind::RecognitionCompleted,
    EventKind::DialogResultGenerated,
    EventKind::TaskFailed,
];

impl EventKind {
    /// Returns the wire name carried in the frame header.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TranscriptionStarted => "TranscriptionStarted",
            Self::SentenceBegin => "SentenceBegin",
            Self::SentenceEnd => "SentenceEnd",
            Self::SentenceSemantics => "SentenceSemantics",
            Self::TranscriptionResultChanged => "TranscriptionResultChanged",
            Self::TranscriptionCompleted => "TranscriptionCompleted",
            Self::SynthesisCompleted => "SynthesisCompleted",
            Self::MetaInfo => "MetaInfo",
            Self::RecognitionStarted => "RecognitionStarted",
            Self::RecognitionResultChanged => "RecognitionResultChanged",
            Self::WakeWordVerificationCompleted => "WakeWordVerificationCompleted",
            Self::RecognitionCompleted => "RecognitionCompleted",
            Self::DialogResultGenerated => "DialogResultGenerated",
            Self::TaskFailed => "TaskFailed",
        }
    }

    /// Optional events fall back to a logging handler when none is registered.
    pub const fn is_optional(&self) -> bool {
        matches!(
            self,
            Self::SentenceSemantics
                | Self::MetaInfo
                | Self::RecognitionResultChanged
                | Self::WakeWordVerificationCompleted
        )
    }

    /// Returns true for events that end the session.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TranscriptionCompleted
                | Self::SynthesisCompleted
                | Self::DialogResultGenerated
                | Self::TaskFailed
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps an event name to its kind within the vocabulary of `kind`.
///
/// Matching is exact and case-sensitive. Names outside the vocabulary return
/// `None`, including names that belong to another session kind.
pub fn classify(kind: SessionKind, name: &str) -> Option<EventKind> {
    kind.vocabulary()
        .iter()
        .copied()
        .find(|event| event.name() == name)
}
