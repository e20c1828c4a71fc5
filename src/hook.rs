//! System-wide keyboard hook.
//!
//! Runs `rdev::grab` on its own thread, translates raw key events into
//! [`InputEvent`]s, and asks the engine for a verdict on each press.
//! Returning `None` from the grab callback swallows the event before the
//! frontmost application sees it, which is how Enter on a completed command
//! and everything typed during live capture stay invisible.
//!
//! Modifier state is tracked here from press and release events because the
//! grab API reports single keys, not chords.

use std::sync::{Arc, Mutex};
use std::thread;

use rdev::{Event, EventType, Key, grab};

use crate::controller::ControllerMsg;
use crate::engine::CommandEngine;
use crate::events::{ControlKey, InputEvent, Modifiers, Verdict};
use crate::state::SharedState;

#[derive(Debug, Default)]
struct ModifierTracker {
    shift: bool,
    control: bool,
    alt: bool,
    meta: bool,
}

impl ModifierTracker {
    fn apply(&mut self, event_type: &EventType) {
        let (key, pressed) = match event_type {
            EventType::KeyPress(key) => (*key, true),
            EventType::KeyRelease(key) => (*key, false),
            _ => return,
        };
        match key {
            Key::ShiftLeft | Key::ShiftRight => self.shift = pressed,
            Key::ControlLeft | Key::ControlRight => self.control = pressed,
            Key::Alt | Key::AltGr => self.alt = pressed,
            Key::MetaLeft | Key::MetaRight => self.meta = pressed,
            _ => {}
        }
    }

    fn snapshot(&self) -> Modifiers {
        Modifiers {
            shift: self.shift,
            control: self.control,
            alt: self.alt,
            meta: self.meta,
        }
    }
}

fn control_key_for(key: Key) -> Option<ControlKey> {
    match key {
        Key::Return | Key::KpReturn => Some(ControlKey::Enter),
        Key::Backspace => Some(ControlKey::Backspace),
        Key::Escape => Some(ControlKey::Escape),
        Key::Tab => Some(ControlKey::Tab),
        _ => None,
    }
}

fn is_modifier(key: Key) -> bool {
    matches!(
        key,
        Key::ShiftLeft
            | Key::ShiftRight
            | Key::ControlLeft
            | Key::ControlRight
            | Key::Alt
            | Key::AltGr
            | Key::MetaLeft
            | Key::MetaRight
            | Key::CapsLock
            | Key::Function
    )
}

/// Turn a raw key press into an engine event. Characters come from the
/// event's layout-resolved name, never from the physical key code, so dead
/// keys and non-QWERTY layouts produce what the user actually typed.
/// Returns `None` for modifier presses, which the engine never needs to see.
fn translate(key: Key, name: Option<&str>, mods: Modifiers) -> Option<InputEvent> {
    if let Some(control) = control_key_for(key) {
        return Some(InputEvent {
            chr: None,
            key: control,
            mods,
        });
    }
    if is_modifier(key) {
        return None;
    }
    let chr = name
        .and_then(|n| n.chars().next())
        .filter(|c| !c.is_control());
    Some(InputEvent {
        chr,
        key: ControlKey::Other,
        mods,
    })
}

/// Start grabbing keyboard events. The thread runs until the process exits.
/// If the platform refuses the hook (no accessibility or input-monitoring
/// permission), a [`ControllerMsg::HookFailed`] is sent instead of panicking.
pub fn spawn(
    engine: Arc<Mutex<CommandEngine>>,
    tx: flume::Sender<ControllerMsg>,
    state: SharedState,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let error_tx = tx.clone();
        let tracker = Mutex::new(ModifierTracker::default());

        let callback = move |event: Event| -> Option<Event> {
            let mods = {
                let Ok(mut tracker) = tracker.lock() else {
                    return Some(event);
                };
                // Synthetic events update the tracker too. The injector's
                // paste chord presses a real modifier, and its release must
                // not leave the tracker thinking the key is still down.
                tracker.apply(&event.event_type);
                tracker.snapshot()
            };

            let key = match &event.event_type {
                EventType::KeyPress(key) => *key,
                _ => return Some(event),
            };
            if state.is_injecting() {
                return Some(event);
            }
            let Some(input) = translate(key, event.name.as_deref(), mods) else {
                return Some(event);
            };

            let outcome = {
                let Ok(mut engine) = engine.lock() else {
                    return Some(event);
                };
                engine.handle(&input)
            };
            let verdict = outcome.verdict;
            for output in outcome.events {
                let _ = tx.send(ControllerMsg::Engine(output));
            }
            match verdict {
                Verdict::Consume => None,
                Verdict::PassThrough => Some(event),
            }
        };

        if let Err(e) = grab(callback) {
            let _ = error_tx.send(ControllerMsg::HookFailed(format!("{e:?}")));
        }
    })
}
