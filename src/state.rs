//! Shared runtime state - thread-safe flags accessible from all components
//!
//! One `RuntimeState` is created at startup and handed (via `Arc`) to the
//! keyboard hook, the injector worker, and the controller. All fields are
//! atomic so no component ever blocks on another just to check a flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct RuntimeState {
    /// The injector is currently sending synthetic keystrokes. The hook
    /// passes events straight through while this is set, so injected text is
    /// never re-captured as if the user had typed it.
    injecting: AtomicBool,
    /// An answer request is in flight.
    generating: AtomicBool,
}

impl RuntimeState {
    pub fn new() -> SharedState {
        Arc::new(Self::default())
    }

    pub fn set_injecting(&self, value: bool) {
        self.injecting.store(value, Ordering::SeqCst);
    }

    pub fn is_injecting(&self) -> bool {
        self.injecting.load(Ordering::SeqCst)
    }

    pub fn set_generating(&self, value: bool) {
        self.generating.store(value, Ordering::SeqCst);
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }
}

/// Type alias for shared state
pub type SharedState = Arc<RuntimeState>;
