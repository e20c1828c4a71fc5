//! Synthetic keystroke injection.
//!
//! A single worker thread owns the `enigo` handle and the clipboard and
//! executes [`InjectorOp`]s sent from the engine and the controller. Ops are
//! queued, so a retraction and the text that replaces it run in order even
//! when they were requested from different threads.
//!
//! While an op executes, the shared `injecting` flag is raised so the
//! keyboard hook ignores the resulting events instead of feeding them back
//! into the command engine.

use std::fmt;
use std::thread;
use std::time::Duration;

use arboard::Clipboard;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use tracing::{debug, warn};

use crate::state::SharedState;

/// Delay between individual synthetic key presses.
const KEY_DELAY: Duration = Duration::from_millis(5);

/// Work items for the injector thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectorOp {
    /// Press Backspace this many times.
    DeleteChars(usize),
    /// Type text as individual keystrokes.
    TypeText(String),
    /// Insert text through the clipboard with a paste chord. Survives
    /// multi-line content that per-key typing would mangle in some apps.
    Paste(String),
}

#[derive(Debug, Clone)]
pub enum InjectError {
    Input(String),
    Clipboard(String),
}

impl fmt::Display for InjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectError::Input(e) => write!(f, "keystroke injection error: {e}"),
            InjectError::Clipboard(e) => write!(f, "clipboard error: {e}"),
        }
    }
}

impl std::error::Error for InjectError {}

/// Start the injector thread. Fails fast when the platform refuses input
/// injection (missing accessibility permission, no display server), so the
/// caller can report the problem before any command is typed.
pub fn spawn(
    settle_ms: u64,
    state: SharedState,
) -> Result<(flume::Sender<InjectorOp>, thread::JoinHandle<()>), InjectError> {
    let (tx, rx) = flume::unbounded::<InjectorOp>();
    let (ready_tx, ready_rx) = flume::bounded::<Result<(), InjectError>>(1);

    let handle = thread::spawn(move || {
        let worker = match Worker::new(settle_ms) {
            Ok(worker) => {
                let _ = ready_tx.send(Ok(()));
                worker
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        worker.run(rx, state);
    });

    match ready_rx.recv() {
        Ok(Ok(())) => Ok((tx, handle)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(InjectError::Input(
            "injector thread exited during startup".to_string(),
        )),
    }
}

struct Worker {
    enigo: Enigo,
    clipboard: Clipboard,
    settle: Duration,
}

impl Worker {
    fn new(settle_ms: u64) -> Result<Self, InjectError> {
        let enigo =
            Enigo::new(&Settings::default()).map_err(|e| InjectError::Input(e.to_string()))?;
        let clipboard = Clipboard::new().map_err(|e| InjectError::Clipboard(e.to_string()))?;
        Ok(Self {
            enigo,
            clipboard,
            settle: Duration::from_millis(settle_ms),
        })
    }

    fn run(mut self, rx: flume::Receiver<InjectorOp>, state: SharedState) {
        while let Ok(op) = rx.recv() {
            // Give the host application a moment to finish processing the
            // user's own keystrokes before synthetic ones arrive.
            thread::sleep(self.settle);
            state.set_injecting(true);
            debug!("injector: {:?}", op);
            let result = self.apply(op);
            // The OS can still be delivering our events right after the
            // calls return. Keep the flag up until the queue drains.
            thread::sleep(Duration::from_millis(20));
            state.set_injecting(false);
            if let Err(e) = result {
                warn!("injection failed: {e}");
            }
        }
    }

    fn apply(&mut self, op: InjectorOp) -> Result<(), InjectError> {
        match op {
            InjectorOp::DeleteChars(count) => self.delete_chars(count),
            InjectorOp::TypeText(text) => self.type_text(&text),
            InjectorOp::Paste(text) => self.paste(&text),
        }
    }

    fn delete_chars(&mut self, count: usize) -> Result<(), InjectError> {
        for _ in 0..count {
            self.enigo
                .key(Key::Backspace, Direction::Click)
                .map_err(|e| InjectError::Input(e.to_string()))?;
            thread::sleep(KEY_DELAY);
        }
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), InjectError> {
        self.enigo
            .text(text)
            .map_err(|e| InjectError::Input(e.to_string()))
    }

    /// Set the clipboard, send the platform paste chord, then restore
    /// whatever text was on the clipboard before.
    fn paste(&mut self, text: &str) -> Result<(), InjectError> {
        let saved = self.clipboard.get_text().ok();

        self.clipboard
            .set_text(text)
            .map_err(|e| InjectError::Clipboard(e.to_string()))?;
        thread::sleep(Duration::from_millis(50));

        self.send_paste_chord()?;
        // Wait for the host application to read the clipboard before
        // putting the old contents back.
        thread::sleep(Duration::from_millis(100));

        if let Some(old) = saved {
            self.clipboard
                .set_text(old)
                .map_err(|e| InjectError::Clipboard(e.to_string()))?;
        }
        Ok(())
    }

    fn send_paste_chord(&mut self) -> Result<(), InjectError> {
        let modifier = modifier_key();
        self.enigo
            .key(modifier, Direction::Press)
            .map_err(|e| InjectError::Input(e.to_string()))?;
        thread::sleep(Duration::from_millis(10));
        self.enigo
            .key(Key::Unicode('v'), Direction::Click)
            .map_err(|e| InjectError::Input(e.to_string()))?;
        thread::sleep(Duration::from_millis(50));
        self.enigo
            .key(modifier, Direction::Release)
            .map_err(|e| InjectError::Input(e.to_string()))?;
        Ok(())
    }
}

/// Cmd on macOS, Ctrl everywhere else.
fn modifier_key() -> Key {
    #[cfg(target_os = "macos")]
    {
        Key::Meta
    }
    #[cfg(not(target_os = "macos"))]
    {
        Key::Control
    }
}
