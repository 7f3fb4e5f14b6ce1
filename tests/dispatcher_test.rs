//! Protocol scenarios driven through the public dispatcher API.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use rust_nls::{
    classify, Callbacks, Diagnostic, EventKind, Outcome, Session, SessionHandle, SessionKind,
    SessionState, WaitResult,
};

type Log = Arc<Mutex<Vec<String>>>;

fn frame(name: &str) -> String {
    format!(r#"{{"header":{{"name":"{name}","task_id":"0f2a"}},"payload":{{"index":1}}}}"#)
}

fn recorder(log: &Log, label: &'static str) -> impl Fn(&rust_nls::EventDocument) + Send + Sync {
    let log = Arc::clone(log);
    move |_: &rust_nls::EventDocument| log.lock().unwrap().push(label.to_string())
}

fn transcription(log: &Log) -> Session {
    Session::start(
        SessionKind::Transcription,
        Callbacks::new()
            .on_start(recorder(log, "start"))
            .on_sentence_begin(recorder(log, "begin"))
            .on_sentence_end(recorder(log, "end"))
            .on_result_change(recorder(log, "changed"))
            .on_complete(recorder(log, "complete"))
            .on_fail(recorder(log, "fail")),
    )
    .unwrap()
}

#[tokio::test]
async fn test_scenario_a_full_transcription() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let log: Log = Arc::new(Mutex::new(vec![]));
    let handle: Arc<OnceLock<SessionHandle>> = Arc::new(OnceLock::new());
    let observed = Arc::new(Mutex::new(vec![]));

    // Every callback records the state it observes through the session handle.
    let observe = |label: &'static str| {
        let log = Arc::clone(&log);
        let handle = Arc::clone(&handle);
        let observed = Arc::clone(&observed);
        move |_: &rust_nls::EventDocument| {
            log.lock().unwrap().push(label.to_string());
            let state = handle.get().and_then(SessionHandle::state);
            observed.lock().unwrap().push(state);
        }
    };

    let session = Session::start(
        SessionKind::Transcription,
        Callbacks::new()
            .on_start(observe("start"))
            .on_sentence_begin(observe("begin"))
            .on_sentence_end(observe("end"))
            .on_result_change(observe("changed"))
            .on_complete(observe("complete"))
            .on_fail(observe("fail")),
    )
    .unwrap();
    handle.set(session.handle()).ok();

    let dispatcher = session.dispatcher();
    let gate = session.gate();
    let mut states = vec![session.state()];
    for name in [
        "TranscriptionStarted",
        "SentenceBegin",
        "TranscriptionResultChanged",
        "SentenceEnd",
    ] {
        dispatcher.handle(&frame(name));
        states.push(session.state());
        assert!(!gate.is_fired(), "gate fired early after {name}");
    }
    dispatcher.handle(&frame("TranscriptionCompleted"));
    states.push(session.state());

    use SessionState::*;
    assert_eq!(states, vec![Created, Ready, Active, Active, Active, Completed]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["start", "begin", "changed", "end", "complete"]
    );
    assert_eq!(
        *observed.lock().unwrap(),
        vec![
            Some(Ready),
            Some(Active),
            Some(Active),
            Some(Active),
            Some(Completed)
        ]
    );
    assert_eq!(session.callbacks_invoked(), 5);
    assert_eq!(
        session.wait(Duration::from_millis(50)).await,
        WaitResult::Signaled(Outcome::Completed)
    );
    assert_eq!(session.task_id().as_deref(), Some("0f2a"));
}

#[tokio::test]
async fn test_scenario_b_task_failed() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let session = transcription(&log);

    session.dispatcher().handle(
        r#"{"header":{"name":"TaskFailed","task_id":"0f2a"},"payload":{"status":400,"status_text":"bad audio"}}"#,
    );

    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(*log.lock().unwrap(), vec!["fail"]);
    assert_eq!(
        session.wait(Duration::from_millis(50)).await,
        WaitResult::Signaled(Outcome::Failed)
    );
}

#[tokio::test]
async fn test_scenario_c_close_before_any_frame() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let session = transcription(&log);

    session.dispatcher().handle_close(1006, "connection reset");

    assert_eq!(session.state(), SessionState::Closed);
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(session.callbacks_invoked(), 0);
    assert_eq!(
        session.wait(Duration::from_millis(50)).await,
        WaitResult::Signaled(Outcome::Closed)
    );
    let close = session.close_info().unwrap();
    assert_eq!(close.code, 1006);
    assert_eq!(close.reason, "connection reset");
}

#[test]
fn test_scenario_d_unknown_event_mid_stream() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let session = transcription(&log);
    let dispatcher = session.dispatcher();

    dispatcher.handle(&frame("TranscriptionStarted"));
    dispatcher.handle(&frame("SentenceBegin"));
    let state = session.state();
    let invoked = session.callbacks_invoked();

    dispatcher.handle(&frame("FutureEvent"));

    assert_eq!(session.state(), state);
    assert_eq!(session.callbacks_invoked(), invoked);
    assert_eq!(
        session.diagnostics(),
        vec![Diagnostic::UnrecognizedEvent {
            name: "FutureEvent".to_string()
        }]
    );

    // Processing carries on afterwards.
    dispatcher.handle(&frame("TranscriptionCompleted"));
    assert_eq!(session.state(), SessionState::Completed);
}

#[test]
fn test_malformed_frames_are_diagnostics() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let session = transcription(&log);
    let dispatcher = session.dispatcher();

    dispatcher.handle("{oops");
    dispatcher.handle(r#"{"header":{"task_id":"0f2a"},"payload":{}}"#);

    assert_eq!(session.state(), SessionState::Created);
    assert!(log.lock().unwrap().is_empty());
    let diagnostics = session.diagnostics();
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics
        .iter()
        .all(|d| matches!(d, Diagnostic::MalformedFrame { .. })));
}

#[test]
fn test_gate_fires_once_across_duplicates_and_close() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let session = transcription(&log);
    let dispatcher = session.dispatcher();

    dispatcher.handle(&frame("TranscriptionCompleted"));
    dispatcher.handle(&frame("TranscriptionCompleted"));
    dispatcher.handle(&frame("TaskFailed"));
    dispatcher.handle_close(1006, "");
    dispatcher.handle_close(1000, "again");

    // The first terminal wins; later frames still reach their callbacks.
    assert_eq!(session.outcome(), Some(Outcome::Completed));
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(*log.lock().unwrap(), vec!["complete", "complete", "fail"]);
    assert_eq!(session.close_info().unwrap().code, 1000);
}

#[test]
fn test_terminal_states_are_monotonic() {
    let names = [
        "TranscriptionStarted",
        "SentenceBegin",
        "SentenceSemantics",
        "TranscriptionResultChanged",
        "SentenceEnd",
        "TranscriptionCompleted",
        "TaskFailed",
    ];
    for terminal in ["TranscriptionCompleted", "TaskFailed"] {
        let log: Log = Arc::new(Mutex::new(vec![]));
        let session = transcription(&log);
        let dispatcher = session.dispatcher();

        dispatcher.handle(&frame(terminal));
        let reached = session.state();
        assert!(reached.is_terminal());
        for name in names {
            dispatcher.handle(&frame(name));
            assert_eq!(session.state(), reached, "{name} moved {reached}");
        }
    }
}

#[test]
fn test_sentence_begin_before_start() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let session = transcription(&log);
    let dispatcher = session.dispatcher();

    dispatcher.handle(&frame("SentenceBegin"));
    assert_eq!(session.state(), SessionState::Active);
    dispatcher.handle(&frame("TranscriptionStarted"));
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(*log.lock().unwrap(), vec!["begin", "start"]);
}

#[test]
fn test_names_outside_vocabulary_change_nothing() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let session = transcription(&log);
    let dispatcher = session.dispatcher();

    for name in [
        "SynthesisCompleted",
        "MetaInfo",
        "DialogResultGenerated",
        "transcriptionstarted",
        "",
    ] {
        dispatcher.handle(&frame(name));
    }

    assert_eq!(session.state(), SessionState::Created);
    assert_eq!(session.callbacks_invoked(), 0);
    assert!(!session.gate().is_fired());
    assert_eq!(session.diagnostics().len(), 5);
}

#[test]
fn test_vocabulary_round_trip() {
    for kind in [
        SessionKind::Transcription,
        SessionKind::Synthesis,
        SessionKind::DialogueAssistant,
    ] {
        for event in kind.vocabulary() {
            let wire = event.name().to_string();
            assert_eq!(classify(kind, &wire), Some(*event));
        }
    }
}

#[test]
fn test_dialogue_session_without_task_id() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let session = Session::start(
        SessionKind::DialogueAssistant,
        Callbacks::new()
            .on_start(recorder(&log, "start"))
            .on_result_change(recorder(&log, "changed"))
            .on_recognition_completed(recorder(&log, "recognized"))
            .on_complete(recorder(&log, "dialog"))
            .on_fail(recorder(&log, "fail")),
    )
    .unwrap();
    let dispatcher = session.dispatcher();

    dispatcher.handle(r#"{"header":{"name":"RecognitionStarted","task_id":"d1"}}"#);
    dispatcher.handle(r#"{"header":{"name":"RecognitionResultChanged","task_id":"d1"},"payload":{"result":"what is"}}"#);
    dispatcher.handle(r#"{"header":{"name":"RecognitionCompleted","task_id":"d1"},"payload":{"result":"what is the weather"}}"#);
    assert_eq!(session.state(), SessionState::Active);
    dispatcher.handle(
        r#"{"header":{"name":"DialogResultGenerated"},"payload":{"display_text":"Sunny","action_params":"[1,2]"}}"#,
    );

    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["start", "changed", "recognized", "dialog"]
    );
    assert_eq!(session.task_id().as_deref(), Some("d1"));
}

#[test]
fn test_blocking_wait_from_caller_thread() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let session = transcription(&log);
    let dispatcher = session.dispatcher();

    let receiver = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        dispatcher.handle(&frame("TranscriptionStarted"));
        dispatcher.handle(&frame("TranscriptionCompleted"));
    });

    assert_eq!(
        session.wait_blocking(Duration::from_secs(5)),
        WaitResult::Signaled(Outcome::Completed)
    );
    receiver.join().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["start", "complete"]);
}

#[test]
fn test_optional_handler_default_counts_as_callback() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let session = transcription(&log);
    session.dispatcher().handle(&frame(EventKind::SentenceSemantics.name()));

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.callbacks_invoked(), 1);
    assert!(log.lock().unwrap().is_empty());
}
