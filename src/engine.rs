//! The command engine: a pure state machine over keystrokes.
//!
//! Every key press observed by the hook is fed to [`CommandEngine::handle`],
//! which decides whether the host application gets to see it and announces
//! state changes as [`OutputEvent`]s. Processing order for each event:
//!
//! 1. Tab completion of a partially typed mention marker.
//! 2. Entry into live capture when the buffer ends with the mention marker.
//! 3. Live capture handling while a mention is open (keystrokes are swallowed).
//! 4. Deferred trigger handling: Enter fires a trigger-prefixed buffer,
//!    Backspace edits it, printable characters grow it.
//!
//! The engine owns no timers, threads, or platform handles. Its only side
//! channel is the injector sender, used when a completion or a fired command
//! has to put synthetic keystrokes back into the host application.

use crate::events::{ControlKey, InputEvent, OutputEvent, Verdict};
use crate::injector::InjectorOp;
use crate::quotes;
use crate::triggers::{TriggerError, TriggerRegistry};

/// Most recent characters kept when the shadow buffer overflows.
pub const BUFFER_CAP: usize = 500;

/// Shown while the buffer ends in a partial mention marker.
pub const TAB_HINT: &str = "Press Tab to autocomplete";

/// Characters that may separate a completed mention marker from the question.
const MENTION_DELIMITERS: [char; 3] = [' ', ':', ','];

// ============================================================
// Buffers
// ============================================================

/// Shadow of the text the user typed, capped at [`BUFFER_CAP`] characters.
/// Overflow drops the oldest characters, so the buffer always holds the most
/// recently typed text.
#[derive(Debug, Default, Clone)]
pub struct CommandBuffer {
    text: String,
}

impl CommandBuffer {
    pub fn push(&mut self, c: char) {
        self.text.push(c);
        self.enforce_cap();
    }

    pub fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
        self.enforce_cap();
    }

    pub fn pop(&mut self) -> Option<char> {
        self.text.pop()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn lower(&self) -> String {
        self.text.to_ascii_lowercase()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }

    fn enforce_cap(&mut self) {
        let count = self.char_count();
        if count > BUFFER_CAP {
            self.text = self.text.chars().skip(count - BUFFER_CAP).collect();
        }
    }
}

/// An open live-capture session. Keystrokes land here instead of the host
/// application until Enter or Escape closes the session.
#[derive(Debug)]
struct LiveSession {
    buffer: CommandBuffer,
    prefix_delete_count: usize,
}

impl LiveSession {
    fn new(prefix_delete_count: usize) -> Self {
        Self {
            buffer: CommandBuffer::default(),
            prefix_delete_count,
        }
    }

    fn text(&self) -> &str {
        self.buffer.as_str()
    }

    fn into_text(self) -> String {
        self.buffer.into_string()
    }
}

// ============================================================
// Outcomes
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    DeferredPending,
    LiveActive,
}

/// The engine's answer to one keystroke.
#[derive(Debug)]
pub struct Outcome {
    pub verdict: Verdict,
    pub events: Vec<OutputEvent>,
}

impl Outcome {
    fn consume(events: Vec<OutputEvent>) -> Self {
        Self {
            verdict: Verdict::Consume,
            events,
        }
    }

    fn pass(events: Vec<OutputEvent>) -> Self {
        Self {
            verdict: Verdict::PassThrough,
            events,
        }
    }
}

// ============================================================
// Engine
// ============================================================

pub struct CommandEngine {
    buffer: CommandBuffer,
    mode: Mode,
    live: Option<LiveSession>,
    triggers: TriggerRegistry,
    marker: String,
    injector: flume::Sender<InjectorOp>,
}

impl CommandEngine {
    pub fn new(
        triggers: TriggerRegistry,
        marker: &str,
        injector: flume::Sender<InjectorOp>,
    ) -> Self {
        Self {
            buffer: CommandBuffer::default(),
            mode: Mode::Idle,
            live: None,
            triggers,
            marker: marker.trim().to_ascii_lowercase(),
            injector,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn buffer(&self) -> &str {
        self.buffer.as_str()
    }

    pub fn live_text(&self) -> Option<&str> {
        self.live.as_ref().map(LiveSession::text)
    }

    pub fn triggers(&self) -> &TriggerRegistry {
        &self.triggers
    }

    /// Switch the active trigger. Any in-progress match is abandoned so the
    /// old trigger can never fire from a stale buffer.
    pub fn set_active_trigger(&mut self, phrase: &str) -> Result<Vec<OutputEvent>, TriggerError> {
        self.triggers.set_active(phrase)?;
        let mut events = Vec::new();
        if self.live.is_some() {
            events.push(OutputEvent::LiveCancel);
        }
        events.push(OutputEvent::ExitCommandMode);
        self.buffer.clear();
        self.live = None;
        self.mode = Mode::Idle;
        Ok(events)
    }

    pub fn handle(&mut self, event: &InputEvent) -> Outcome {
        // Shortcut chords are none of our business, in any mode.
        if event.mods.has_chord() {
            return Outcome::pass(Vec::new());
        }
        if self.mode == Mode::LiveActive {
            return self.handle_live(event);
        }
        if event.key == ControlKey::Tab {
            if let Some(outcome) = self.try_tab_complete() {
                return outcome;
            }
        }
        if let Some(outcome) = self.try_enter_live(event) {
            return outcome;
        }
        self.handle_deferred(event)
    }

    // ------------------------------------------------------------
    // Step 1: tab completion
    // ------------------------------------------------------------

    /// Complete a partially typed mention marker, longest suffix first.
    /// Returns `None` when the buffer does not end in any marker prefix,
    /// letting Tab fall through untouched.
    fn try_tab_complete(&mut self) -> Option<Outcome> {
        if self.marker.is_empty() {
            return None;
        }
        let lower = self.buffer.lower();
        // The marker comes from config and may hold multi-byte characters;
        // prefix splits must land on char boundaries.
        let split = self
            .marker
            .char_indices()
            .rev()
            .map(|(i, c)| i + c.len_utf8())
            .find(|&n| lower.ends_with(&self.marker[..n]))?;
        if split == self.marker.len() {
            // Marker fully typed: Tab just supplies the delimiter.
            let _ = self.injector.send(InjectorOp::TypeText(" ".to_string()));
            self.buffer.push(' ');
            return Some(Outcome::consume(Vec::new()));
        }
        let mut completion = self.marker[split..].to_string();
        completion.push(' ');
        let _ = self.injector.send(InjectorOp::TypeText(completion.clone()));
        self.buffer.push_str(&completion);
        self.mode = Mode::DeferredPending;
        Some(Outcome::consume(vec![
            OutputEvent::EnterCommandMode {
                trigger_label: self.marker.clone(),
            },
            OutputEvent::PreviewUpdate {
                text: String::new(),
                trigger_label: self.marker.clone(),
            },
        ]))
    }

    // ------------------------------------------------------------
    // Step 2: live capture entry
    // ------------------------------------------------------------

    /// Open a live session when the buffer ends with the mention marker. The
    /// raw buffer is kept as typed; it is the host application's text and is
    /// only retracted through the injector.
    fn try_enter_live(&mut self, event: &InputEvent) -> Option<Outcome> {
        if self.marker.is_empty() {
            return None;
        }
        let lower = self.buffer.lower();
        let after_delimiter = MENTION_DELIMITERS
            .iter()
            .any(|d| lower.strip_suffix(*d).is_some_and(|rest| rest.ends_with(&self.marker)));
        let marker_chars = self.marker.chars().count();

        if after_delimiter {
            // Tab completion already placed marker plus delimiter in the host
            // text. Whatever arrives next belongs to the live session.
            let delete_count = marker_chars + 1;
            self.open_live(delete_count);
            let mut outcome = self.handle_live(event);
            outcome
                .events
                .insert(0, OutputEvent::LiveModeStarted { delete_count });
            return Some(outcome);
        }

        if !lower.ends_with(&self.marker) {
            return None;
        }
        // Bare marker: only a printable character confirms the mention.
        // Control keys keep deferred handling (Backspace can still erase it).
        let c = event.chr?;
        if MENTION_DELIMITERS.contains(&c) {
            // The delimiter reaches the host text, so it is retracted along
            // with the marker. It is not part of the question.
            let delete_count = marker_chars + 1;
            self.open_live(delete_count);
            return Some(Outcome::pass(vec![OutputEvent::LiveModeStarted {
                delete_count,
            }]));
        }
        let delete_count = marker_chars;
        self.open_live(delete_count);
        let mut outcome = self.handle_live(event);
        outcome
            .events
            .insert(0, OutputEvent::LiveModeStarted { delete_count });
        Some(outcome)
    }

    fn open_live(&mut self, prefix_delete_count: usize) {
        self.mode = Mode::LiveActive;
        self.live = Some(LiveSession::new(prefix_delete_count));
    }

    // ------------------------------------------------------------
    // Step 3: live capture
    // ------------------------------------------------------------

    /// While a live session is open every keystroke is swallowed: printable
    /// characters grow the live buffer, Enter submits, Escape cancels.
    fn handle_live(&mut self, event: &InputEvent) -> Outcome {
        match event.key {
            ControlKey::Enter => {
                let text = self.live.take().map(LiveSession::into_text).unwrap_or_default();
                self.buffer.clear();
                self.mode = Mode::Idle;
                Outcome::consume(vec![OutputEvent::LiveSubmit { text }])
            }
            ControlKey::Escape => {
                self.live = None;
                self.buffer.clear();
                self.mode = Mode::Idle;
                Outcome::consume(vec![OutputEvent::LiveCancel])
            }
            ControlKey::Backspace => {
                let mut events = Vec::new();
                if let Some(live) = self.live.as_mut() {
                    live.buffer.pop();
                    events.push(OutputEvent::LiveBufferUpdated {
                        text: live.text().to_string(),
                    });
                }
                Outcome::consume(events)
            }
            _ => {
                let mut events = Vec::new();
                if let Some(c) = event.chr {
                    if let Some(live) = self.live.as_mut() {
                        live.buffer.push(quotes::normalize_char(c));
                        events.push(OutputEvent::LiveBufferUpdated {
                            text: live.text().to_string(),
                        });
                    }
                }
                Outcome::consume(events)
            }
        }
    }

    // ------------------------------------------------------------
    // Step 4: deferred triggers
    // ------------------------------------------------------------

    fn handle_deferred(&mut self, event: &InputEvent) -> Outcome {
        match event.key {
            ControlKey::Enter => self.deferred_enter(),
            ControlKey::Backspace => self.deferred_backspace(),
            _ => match event.chr {
                Some(c) => self.deferred_char(c),
                None => Outcome::pass(Vec::new()),
            },
        }
    }

    /// Enter fires the active trigger if the buffer holds one plus a
    /// non-empty question. The typed command is retracted from the host
    /// application before the question is announced, so the Enter itself
    /// must never reach the application.
    fn deferred_enter(&mut self) -> Outcome {
        let trigger = self.triggers.active().to_string();
        if self.buffer.lower().starts_with(&trigger) {
            let remainder = &self.buffer.as_str()[trigger.len()..];
            let question = quotes::extract(remainder);
            if !question.is_empty() {
                let delete_count = self.buffer.char_count();
                let _ = self.injector.send(InjectorOp::DeleteChars(delete_count));
                self.buffer.clear();
                self.mode = Mode::Idle;
                return Outcome::consume(vec![
                    OutputEvent::DeferredTriggerFired { question },
                    OutputEvent::ExitCommandMode,
                ]);
            }
        }
        // No command to fire: the Enter is an ordinary newline.
        self.buffer.clear();
        self.mode = Mode::Idle;
        Outcome::pass(vec![OutputEvent::ExitCommandMode])
    }

    fn deferred_backspace(&mut self) -> Outcome {
        self.buffer.pop();
        let trigger = self.triggers.active().to_string();
        let mut events = Vec::new();
        if self.buffer.lower().starts_with(&trigger) {
            events.push(OutputEvent::PreviewUpdate {
                text: self.buffer.as_str()[trigger.len()..].to_string(),
                trigger_label: self.triggers.label().to_string(),
            });
            self.mode = Mode::DeferredPending;
        } else {
            events.push(OutputEvent::ExitCommandMode);
            self.mode = Mode::Idle;
        }
        Outcome::pass(events)
    }

    fn deferred_char(&mut self, c: char) -> Outcome {
        self.buffer.push(quotes::normalize_char(c));
        let mut events = Vec::new();

        // A partial mention marker at the end of the buffer earns a hint and
        // keeps the buffer alive even when it no longer matches a trigger.
        let partial_mention = self.ends_in_marker_prefix();
        if partial_mention {
            events.push(OutputEvent::EnterCommandMode {
                trigger_label: self.marker.clone(),
            });
            events.push(OutputEvent::PreviewUpdate {
                text: TAB_HINT.to_string(),
                trigger_label: self.marker.clone(),
            });
            self.mode = Mode::DeferredPending;
        }

        let trigger = self.triggers.active().to_string();
        let lower = self.buffer.lower();
        if lower.starts_with(&trigger) {
            events.push(OutputEvent::EnterCommandMode {
                trigger_label: self.triggers.label().to_string(),
            });
            events.push(OutputEvent::PreviewUpdate {
                text: self.buffer.as_str()[trigger.len()..].to_string(),
                trigger_label: self.triggers.label().to_string(),
            });
            self.mode = Mode::DeferredPending;
        } else if !partial_mention
            && !trigger.starts_with(&lower)
            && self.buffer.char_count() >= trigger.chars().count()
        {
            // The buffer can no longer become this trigger. Start over.
            // ExitCommandMode is only emitted after a matching
            // EnterCommandMode; a reset from Idle stays silent.
            if self.mode == Mode::DeferredPending {
                events.push(OutputEvent::ExitCommandMode);
            }
            self.buffer.clear();
            self.mode = Mode::Idle;
        }
        Outcome::pass(events)
    }

    fn ends_in_marker_prefix(&self) -> bool {
        if self.marker.is_empty() {
            return false;
        }
        let lower = self.buffer.lower();
        self.marker
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .any(|n| lower.ends_with(&self.marker[..n]))
    }
}
