//! Telegram front end for gemrelay.
//!
//! Uses teloxide to receive and send messages via the Telegram Bot API.
//! Answers stream in by editing a placeholder reply in place; rendering
//! goes through a markdown-to-HTML formatter that keeps every partial
//! buffer valid for Telegram's HTML parser.

pub mod access;
pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod markdown;
pub mod relay;

pub use {
    bot::App,
    config::BotConfig,
    error::{Error, Result},
};
