//! In-memory conversation sessions.
//!
//! Each Telegram chat gets at most one live [`ChatSession`] holding the
//! ordered turn history for the backend conversation. Sessions live for
//! the process lifetime only; `/new` discards and recreates them.

pub mod store;
pub mod turn;

pub use {
    store::{ChatSession, SessionStore, SharedSession},
    turn::{Part, Role, Turn},
};
