//! Presentation surface for command activity.
//!
//! The controller pushes every engine event plus answer progress through the
//! [`Presenter`] trait. The built-in [`StatusLine`] renders a single rewriting
//! terminal line; anything that can draw text (a menu-bar applet, an overlay
//! window) can implement the same trait instead.

use std::io::Write;

use crate::events::OutputEvent;

pub trait Presenter: Send {
    fn on_enter_command_mode(&mut self, trigger_label: &str);
    fn on_preview_update(&mut self, text: &str, trigger_label: &str);
    fn on_exit_command_mode(&mut self);
    fn on_deferred_fire(&mut self, question: &str);
    fn on_live_start(&mut self, delete_count: usize);
    fn on_live_update(&mut self, text: &str);
    fn on_live_submit(&mut self, text: &str);
    fn on_live_cancel(&mut self);
    fn on_answer_token(&mut self, token: &str);
    fn on_answer_done(&mut self);
    fn on_answer_error(&mut self, error: &str);
    /// The keyboard hook could not be installed. The watcher is about to
    /// shut down; most presenters only need to show the message.
    fn on_hook_error(&mut self, _error: &str) {}
}

/// Route one engine event to the matching presenter callback.
pub fn forward(presenter: &mut dyn Presenter, event: &OutputEvent) {
    match event {
        OutputEvent::PreviewUpdate {
            text,
            trigger_label,
        } => presenter.on_preview_update(text, trigger_label),
        OutputEvent::EnterCommandMode { trigger_label } => {
            presenter.on_enter_command_mode(trigger_label)
        }
        OutputEvent::ExitCommandMode => presenter.on_exit_command_mode(),
        OutputEvent::DeferredTriggerFired { question } => presenter.on_deferred_fire(question),
        OutputEvent::LiveModeStarted { delete_count } => presenter.on_live_start(*delete_count),
        OutputEvent::LiveBufferUpdated { text } => presenter.on_live_update(text),
        OutputEvent::LiveSubmit { text } => presenter.on_live_submit(text),
        OutputEvent::LiveCancel => presenter.on_live_cancel(),
    }
}

/// Shown from the moment a question goes out until the first token arrives.
const THINKING: &str = "\x1b[33m⠋ Thinking...\x1b[0m";

/// One rewriting terminal line: gray while a command is being typed, magenta
/// during live capture, cyan while an answer streams in.
pub struct StatusLine {
    answering: bool,
    thinking: bool,
}

impl StatusLine {
    pub fn new() -> Self {
        Self {
            answering: false,
            thinking: false,
        }
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}

impl Presenter for StatusLine {
    fn on_enter_command_mode(&mut self, trigger_label: &str) {
        print!("\r\x1b[K\x1b[90m[{}]\x1b[0m", trigger_label);
        std::io::stdout().flush().ok();
    }

    fn on_preview_update(&mut self, text: &str, trigger_label: &str) {
        print!("\r\x1b[K\x1b[90m[{}] {}\x1b[0m", trigger_label, text);
        std::io::stdout().flush().ok();
    }

    fn on_exit_command_mode(&mut self) {
        // A deferred fire is followed by ExitCommandMode in the same batch;
        // the spinner stays on screen until the answer starts.
        if self.thinking {
            print!("\r\x1b[K{}", THINKING);
        } else {
            print!("\r\x1b[K");
        }
        std::io::stdout().flush().ok();
    }

    fn on_deferred_fire(&mut self, question: &str) {
        print!("\r\x1b[K> {}\n", question);
        print!("{}", THINKING);
        self.thinking = true;
        std::io::stdout().flush().ok();
    }

    fn on_live_start(&mut self, _delete_count: usize) {
        print!("\r\x1b[K\x1b[35m● \x1b[0m");
        std::io::stdout().flush().ok();
    }

    fn on_live_update(&mut self, text: &str) {
        print!("\r\x1b[K\x1b[35m● \x1b[0m{}", text);
        std::io::stdout().flush().ok();
    }

    fn on_live_submit(&mut self, text: &str) {
        print!("\r\x1b[K> {}\n", text);
        print!("{}", THINKING);
        self.thinking = true;
        std::io::stdout().flush().ok();
    }

    fn on_live_cancel(&mut self) {
        print!("\r\x1b[K");
        std::io::stdout().flush().ok();
    }

    fn on_answer_token(&mut self, token: &str) {
        if !self.answering {
            print!("\r\x1b[K\x1b[36m");
            self.answering = true;
            self.thinking = false;
        }
        print!("{}", token);
        std::io::stdout().flush().ok();
    }

    fn on_answer_done(&mut self) {
        if self.answering {
            println!("\x1b[0m\n");
        } else {
            print!("\r\x1b[K");
        }
        self.answering = false;
        self.thinking = false;
        std::io::stdout().flush().ok();
    }

    fn on_answer_error(&mut self, error: &str) {
        if self.answering {
            print!("\x1b[0m\n");
        }
        print!("\r\x1b[K\x1b[31mAnswer failed: {}\x1b[0m\n", error);
        self.answering = false;
        self.thinking = false;
        std::io::stdout().flush().ok();
    }

    fn on_hook_error(&mut self, error: &str) {
        print!("\r\x1b[K\x1b[31mKeyboard hook failed: {}\x1b[0m\n", error);
        std::io::stdout().flush().ok();
    }
}
