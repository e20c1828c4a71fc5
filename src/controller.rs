//! Central coordinator.
//!
//! The controller owns one inbox that merges engine events, answer progress,
//! user actions, and shutdown signals, and reacts to them in arrival order:
//! - fired commands and live submissions start an answer worker thread
//! - live mode entry schedules retraction of the mention text
//! - answer tokens stream to the presenter, stale generations are dropped
//! - the finished answer is kept for insertion into the host application
//!
//! Answer requests are tagged with a generation counter. Cancelling or
//! superseding a request just bumps the counter; whatever the orphaned worker
//! still sends is ignored on arrival.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{error, info, warn};

use crate::answer::AnswerBackend;
use crate::config::InsertMethod;
use crate::events::OutputEvent;
use crate::hud::{self, Presenter};
use crate::injector::InjectorOp;
use crate::state::SharedState;

/// Requests from the user outside the keystroke stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Put the most recent answer into the focused application.
    InsertAnswer,
    /// Drop the most recent answer.
    CloseResponse,
    /// Abandon the in-flight answer.
    CancelGeneration,
}

/// Progress reports from answer worker threads.
#[derive(Debug)]
pub enum AnswerMsg {
    Token { generation: u64, text: String },
    Done { generation: u64, answer: String },
    Failed { generation: u64, error: String },
}

/// Everything the controller reacts to, merged into one inbox.
#[derive(Debug)]
pub enum ControllerMsg {
    Engine(OutputEvent),
    Answer(AnswerMsg),
    User(UserAction),
    /// Ctrl-C. Cancels a running answer first, stops the loop otherwise.
    Interrupt,
    /// The keyboard hook could not start or died.
    HookFailed(String),
}

pub struct Controller {
    presenter: Box<dyn Presenter>,
    backend: Arc<Mutex<Box<dyn AnswerBackend>>>,
    injector: flume::Sender<InjectorOp>,
    state: SharedState,
    tx: flume::Sender<ControllerMsg>,
    generation: u64,
    last_answer: Option<String>,
    history: Option<BufWriter<File>>,
    auto_insert: bool,
    insert_method: InsertMethod,
}

impl Controller {
    pub fn new(
        presenter: Box<dyn Presenter>,
        backend: Box<dyn AnswerBackend>,
        injector: flume::Sender<InjectorOp>,
        state: SharedState,
        tx: flume::Sender<ControllerMsg>,
    ) -> Self {
        Self {
            presenter,
            backend: Arc::new(Mutex::new(backend)),
            injector,
            state,
            tx,
            generation: 0,
            last_answer: None,
            history: None,
            auto_insert: false,
            insert_method: InsertMethod::Type,
        }
    }

    pub fn with_auto_insert(mut self, auto_insert: bool) -> Self {
        self.auto_insert = auto_insert;
        self
    }

    pub fn with_insert_method(mut self, method: InsertMethod) -> Self {
        self.insert_method = method;
        self
    }

    pub fn with_history(mut self, path: Option<&str>) -> Self {
        self.history = path.and_then(|p| {
            match OpenOptions::new().create(true).append(true).open(p) {
                Ok(file) => Some(BufWriter::new(file)),
                Err(e) => {
                    warn!("cannot open history file {p}: {e}");
                    None
                }
            }
        });
        self
    }

    /// Process messages until shutdown. Runs on the calling thread.
    pub fn run(mut self, rx: flume::Receiver<ControllerMsg>) {
        while let Ok(msg) = rx.recv() {
            match msg {
                ControllerMsg::Engine(event) => self.on_engine_event(event),
                ControllerMsg::Answer(msg) => self.on_answer(msg),
                ControllerMsg::User(action) => self.on_user(action),
                ControllerMsg::Interrupt => {
                    if self.state.is_generating() {
                        self.cancel_generation();
                    } else {
                        info!("shutting down");
                        break;
                    }
                }
                ControllerMsg::HookFailed(e) => {
                    self.presenter.on_hook_error(&e);
                    error!("keyboard hook failed: {e}");
                    error!(
                        "grant this binary Accessibility and Input Monitoring permission (macOS) or access to the input devices (Linux), then restart"
                    );
                    break;
                }
            }
        }
    }

    fn on_engine_event(&mut self, event: OutputEvent) {
        match &event {
            OutputEvent::LiveModeStarted { delete_count } => {
                // The marker text already reached the host application and
                // has to come back out before the answer goes in.
                let _ = self.injector.send(InjectorOp::DeleteChars(*delete_count));
            }
            OutputEvent::DeferredTriggerFired { question } => {
                let question = question.clone();
                hud::forward(self.presenter.as_mut(), &event);
                self.start_ask(question);
                return;
            }
            OutputEvent::LiveSubmit { text } => {
                let question = text.trim().to_string();
                if question.is_empty() {
                    self.presenter.on_live_cancel();
                    return;
                }
                self.presenter.on_live_submit(&question);
                self.start_ask(question);
                return;
            }
            _ => {}
        }
        hud::forward(self.presenter.as_mut(), &event);
    }

    fn start_ask(&mut self, question: String) {
        self.log_history("Q", &question);
        self.generation += 1;
        let generation = self.generation;
        self.state.set_generating(true);

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let Ok(mut backend) = backend.lock() else {
                let _ = tx.send(ControllerMsg::Answer(AnswerMsg::Failed {
                    generation,
                    error: "answer backend is unavailable".to_string(),
                }));
                return;
            };
            let token_tx = tx.clone();
            let mut on_token = |token: &str| {
                let _ = token_tx.send(ControllerMsg::Answer(AnswerMsg::Token {
                    generation,
                    text: token.to_string(),
                }));
            };
            match backend.ask_stream(&question, &mut on_token) {
                Ok(answer) => {
                    let _ = tx.send(ControllerMsg::Answer(AnswerMsg::Done { generation, answer }));
                }
                Err(e) => {
                    let _ = tx.send(ControllerMsg::Answer(AnswerMsg::Failed {
                        generation,
                        error: e.to_string(),
                    }));
                }
            }
        });
    }

    fn on_answer(&mut self, msg: AnswerMsg) {
        match msg {
            AnswerMsg::Token { generation, text } => {
                if generation == self.generation {
                    self.presenter.on_answer_token(&text);
                }
            }
            AnswerMsg::Done { generation, answer } => {
                if generation != self.generation {
                    return; // cancelled or superseded
                }
                self.state.set_generating(false);
                self.presenter.on_answer_done();
                self.log_history("A", &answer);
                self.last_answer = Some(answer);
                if self.auto_insert {
                    self.insert_last_answer();
                }
            }
            AnswerMsg::Failed { generation, error } => {
                if generation != self.generation {
                    return;
                }
                self.state.set_generating(false);
                warn!("answer failed: {error}");
                self.presenter.on_answer_error(&error);
            }
        }
    }

    fn on_user(&mut self, action: UserAction) {
        match action {
            UserAction::InsertAnswer => self.insert_last_answer(),
            UserAction::CloseResponse => {
                self.last_answer = None;
                self.presenter.on_exit_command_mode();
            }
            UserAction::CancelGeneration => self.cancel_generation(),
        }
    }

    fn cancel_generation(&mut self) {
        if !self.state.is_generating() {
            return;
        }
        // Orphan the in-flight request. Its remaining messages arrive with a
        // stale generation and are dropped.
        self.generation += 1;
        self.state.set_generating(false);
        self.presenter.on_answer_done();
        info!("answer cancelled");
    }

    fn insert_last_answer(&mut self) {
        let Some(answer) = self.last_answer.clone() else {
            return;
        };
        let op = match self.insert_method {
            InsertMethod::Type => InjectorOp::TypeText(answer),
            InsertMethod::Paste => InjectorOp::Paste(answer),
        };
        let _ = self.injector.send(op);
    }

    fn log_history(&mut self, kind: &str, text: &str) {
        if let Some(writer) = &mut self.history {
            let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            let result = writeln!(writer, "[{stamp}] {kind}: {text}").and_then(|_| writer.flush());
            if result.is_err() {
                warn!("history write failed, disabling history log");
                self.history = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RuntimeState;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn push(&self, call: String) {
            self.0.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn wait_for(&self, needle: &str) -> bool {
            for _ in 0..1000 {
                if self.calls().iter().any(|c| c.contains(needle)) {
                    return true;
                }
                thread::sleep(Duration::from_millis(5));
            }
            false
        }
    }

    struct RecordingPresenter(Recorder);

    impl Presenter for RecordingPresenter {
        fn on_enter_command_mode(&mut self, trigger_label: &str) {
            self.0.push(format!("enter:{trigger_label}"));
        }
        fn on_preview_update(&mut self, text: &str, _trigger_label: &str) {
            self.0.push(format!("preview:{text}"));
        }
        fn on_exit_command_mode(&mut self) {
            self.0.push("exit".to_string());
        }
        fn on_deferred_fire(&mut self, question: &str) {
            self.0.push(format!("fire:{question}"));
        }
        fn on_live_start(&mut self, delete_count: usize) {
            self.0.push(format!("live-start:{delete_count}"));
        }
        fn on_live_update(&mut self, text: &str) {
            self.0.push(format!("live:{text}"));
        }
        fn on_live_submit(&mut self, text: &str) {
            self.0.push(format!("submit:{text}"));
        }
        fn on_live_cancel(&mut self) {
            self.0.push("live-cancel".to_string());
        }
        fn on_answer_token(&mut self, token: &str) {
            self.0.push(format!("token:{token}"));
        }
        fn on_answer_done(&mut self) {
            self.0.push("done".to_string());
        }
        fn on_answer_error(&mut self, error: &str) {
            self.0.push(format!("error:{error}"));
        }
    }

    struct EchoBackend;

    impl AnswerBackend for EchoBackend {
        fn ask_stream(&mut self, question: &str, on_token: &mut dyn FnMut(&str)) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            let answer = format!("echo: {question}");
            on_token(&answer);
            Ok(answer)
        }
    }

    struct FailingBackend;

    impl AnswerBackend for FailingBackend {
        fn ask_stream(&mut self, _question: &str, _on_token: &mut dyn FnMut(&str)) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Err("boom".into())
        }
    }

    /// Emits one token, then blocks until the test releases it.
    struct GatedBackend {
        release: flume::Receiver<()>,
    }

    impl AnswerBackend for GatedBackend {
        fn ask_stream(&mut self, question: &str, on_token: &mut dyn FnMut(&str)) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            on_token("partial");
            let _ = self.release.recv();
            Ok(format!("full answer to {question}"))
        }
    }

    struct Harness {
        tx: flume::Sender<ControllerMsg>,
        injector_rx: flume::Receiver<InjectorOp>,
        recorder: Recorder,
        handle: thread::JoinHandle<()>,
    }

    fn start(backend: Box<dyn AnswerBackend>, auto_insert: bool) -> Harness {
        let (tx, rx) = flume::unbounded();
        let (injector_tx, injector_rx) = flume::unbounded();
        let recorder = Recorder::default();
        let controller = Controller::new(
            Box::new(RecordingPresenter(recorder.clone())),
            backend,
            injector_tx,
            RuntimeState::new(),
            tx.clone(),
        )
        .with_auto_insert(auto_insert);
        let handle = thread::spawn(move || controller.run(rx));
        Harness {
            tx,
            injector_rx,
            recorder,
            handle,
        }
    }

    /// Shut the controller down and hand back what post-join asserts need.
    fn stop(harness: Harness) -> (Recorder, flume::Receiver<InjectorOp>) {
        harness.tx.send(ControllerMsg::Interrupt).unwrap();
        harness.handle.join().unwrap();
        (harness.recorder, harness.injector_rx)
    }

    #[test]
    fn test_fired_question_streams_and_auto_inserts() {
        let harness = start(Box::new(EchoBackend), true);
        harness
            .tx
            .send(ControllerMsg::Engine(OutputEvent::DeferredTriggerFired {
                question: "hi".to_string(),
            }))
            .unwrap();

        let op = harness
            .injector_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(op, InjectorOp::TypeText("echo: hi".to_string()));
        assert!(harness.recorder.wait_for("fire:hi"));
        assert!(harness.recorder.wait_for("token:echo: hi"));
        assert!(harness.recorder.wait_for("done"));
        stop(harness);
    }

    #[test]
    fn test_live_mode_entry_schedules_retraction() {
        let harness = start(Box::new(EchoBackend), false);
        harness
            .tx
            .send(ControllerMsg::Engine(OutputEvent::LiveModeStarted {
                delete_count: 7,
            }))
            .unwrap();

        let op = harness
            .injector_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(op, InjectorOp::DeleteChars(7));
        stop(harness);
    }

    #[test]
    fn test_empty_live_submit_asks_nothing() {
        let harness = start(Box::new(EchoBackend), true);
        harness
            .tx
            .send(ControllerMsg::Engine(OutputEvent::LiveSubmit {
                text: "   ".to_string(),
            }))
            .unwrap();

        assert!(harness.recorder.wait_for("live-cancel"));
        let (recorder, injector_rx) = stop(harness);
        // No question was asked, so nothing was inserted.
        assert!(injector_rx.try_recv().is_err());
        assert!(!recorder.calls().iter().any(|c| c.starts_with("token")));
    }

    #[test]
    fn test_cancel_drops_stale_answer() {
        let (release_tx, release_rx) = flume::unbounded();
        let harness = start(Box::new(GatedBackend { release: release_rx }), true);

        harness
            .tx
            .send(ControllerMsg::Engine(OutputEvent::LiveSubmit {
                text: "slow question".to_string(),
            }))
            .unwrap();
        assert!(harness.recorder.wait_for("token:partial"));

        harness
            .tx
            .send(ControllerMsg::User(UserAction::CancelGeneration))
            .unwrap();
        assert!(harness.recorder.wait_for("done"));

        // Let the orphaned worker finish. Its answer arrives with a stale
        // generation and must not be inserted.
        release_tx.send(()).unwrap();
        let (_recorder, injector_rx) = stop(harness);
        assert!(injector_rx.try_recv().is_err());
    }

    #[test]
    fn test_failed_answer_reports_and_keeps_running() {
        let harness = start(Box::new(FailingBackend), true);
        harness
            .tx
            .send(ControllerMsg::Engine(OutputEvent::DeferredTriggerFired {
                question: "hi".to_string(),
            }))
            .unwrap();

        assert!(harness.recorder.wait_for("error:boom"));
        assert!(harness.injector_rx.try_recv().is_err());
        stop(harness);
    }

    #[test]
    fn test_manual_insert_and_close() {
        let harness = start(Box::new(EchoBackend), false);
        harness
            .tx
            .send(ControllerMsg::Engine(OutputEvent::DeferredTriggerFired {
                question: "hi".to_string(),
            }))
            .unwrap();
        assert!(harness.recorder.wait_for("done"));
        // Nothing inserted until asked.
        assert!(harness.injector_rx.try_recv().is_err());

        harness
            .tx
            .send(ControllerMsg::User(UserAction::InsertAnswer))
            .unwrap();
        let op = harness
            .injector_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(op, InjectorOp::TypeText("echo: hi".to_string()));

        harness
            .tx
            .send(ControllerMsg::User(UserAction::CloseResponse))
            .unwrap();
        harness
            .tx
            .send(ControllerMsg::User(UserAction::InsertAnswer))
            .unwrap();
        let (_recorder, injector_rx) = stop(harness);
        // Closed answers cannot be inserted again.
        assert!(injector_rx.try_recv().is_err());
    }

    #[test]
    fn test_history_logs_question_and_answer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.log");

        let (tx, rx) = flume::unbounded();
        let (injector_tx, _injector_rx) = flume::unbounded();
        let recorder = Recorder::default();
        let controller = Controller::new(
            Box::new(RecordingPresenter(recorder.clone())),
            Box::new(EchoBackend),
            injector_tx,
            RuntimeState::new(),
            tx.clone(),
        )
        .with_history(path.to_str());
        let handle = thread::spawn(move || controller.run(rx));

        tx.send(ControllerMsg::Engine(OutputEvent::DeferredTriggerFired {
            question: "hi".to_string(),
        }))
        .unwrap();
        assert!(recorder.wait_for("done"));
        tx.send(ControllerMsg::Interrupt).unwrap();
        handle.join().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Q: hi"));
        assert!(contents.contains("A: echo: hi"));
    }
}
