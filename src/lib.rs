//! Craig - inline AI commands for any textbox.
//!
//! Craig watches the keyboard system-wide and recognizes two ways of asking
//! a question without leaving whatever application has focus:
//!
//! - Deferred triggers: type `/craig how do I exit vim` and press Enter. The
//!   typed command is retracted from the host application and the question is
//!   answered by the configured model backend.
//! - Live mentions: type `@craig` anywhere in your text. Everything after it
//!   is captured invisibly until Enter submits or Escape cancels.
//!
//! The interesting state lives in [`engine::CommandEngine`], a pure state
//! machine over keystrokes. The platform pieces around it (the rdev hook,
//! the enigo injector, the backends) stay thin.

pub mod answer;
pub mod config;
pub mod controller;
pub mod engine;
pub mod events;
pub mod hook;
pub mod hud;
pub mod injector;
pub mod quotes;
pub mod state;
pub mod triggers;
