//! Event vocabulary shared between the keyboard hook, the command engine,
//! and the controller.
//!
//! The hook translates raw key events into [`InputEvent`]s, the engine answers
//! each one with a [`Verdict`] plus zero or more [`OutputEvent`]s, and the
//! controller reacts to the output events. Keeping these types free of any
//! platform handles is what makes the engine testable without a real keyboard.

/// Control keys the engine cares about. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    Enter,
    Backspace,
    Escape,
    Tab,
    Other,
}

/// Modifier flags captured at the time of a key press.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    /// True when the event is part of a keyboard shortcut rather than text
    /// entry. Shift is excluded since it produces ordinary characters.
    pub fn has_chord(&self) -> bool {
        self.control || self.alt || self.meta
    }
}

/// One keystroke, already resolved against the user's keyboard layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    /// The printable character this key produced, if any.
    pub chr: Option<char>,
    pub key: ControlKey,
    pub mods: Modifiers,
}

impl InputEvent {
    pub fn character(c: char) -> Self {
        Self {
            chr: Some(c),
            key: ControlKey::Other,
            mods: Modifiers::default(),
        }
    }

    pub fn control(key: ControlKey) -> Self {
        Self {
            chr: None,
            key,
            mods: Modifiers::default(),
        }
    }

    pub fn with_modifiers(mut self, mods: Modifiers) -> Self {
        self.mods = mods;
        self
    }
}

/// Whether the keystroke should reach the frontmost application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Swallow the event. The host application never sees it.
    Consume,
    /// Deliver the event unchanged.
    PassThrough,
}

/// State changes the engine announces while processing keystrokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// The question text typed so far, for display while a command is open.
    PreviewUpdate { text: String, trigger_label: String },
    /// The buffer started matching a trigger phrase.
    EnterCommandMode { trigger_label: String },
    /// The buffer stopped matching, or a command finished.
    ExitCommandMode,
    /// A deferred command was completed with Enter.
    DeferredTriggerFired { question: String },
    /// A mention marker was completed. `delete_count` is how many characters
    /// of marker text the host application received and should retract.
    LiveModeStarted { delete_count: usize },
    /// The live capture buffer changed.
    LiveBufferUpdated { text: String },
    /// Enter was pressed during live capture.
    LiveSubmit { text: String },
    /// Escape was pressed during live capture.
    LiveCancel,
}
