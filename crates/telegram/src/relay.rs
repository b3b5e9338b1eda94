//! Edit-in-place streaming of one generation turn.
//!
//! Consumes the backend's tagged step stream and mirrors the accumulated
//! answer into a single Telegram reply, re-rendering the whole buffer on
//! every chunk. Faults are handled per step: only a transport failure
//! aborts the turn; everything else recovers locally and keeps the
//! stream draining so backend-side resources are released.

use std::time::Duration;

use {
    futures::{Stream, StreamExt},
    tracing::{debug, warn},
};

use {
    gemrelay_backend::StreamStep,
    gemrelay_sessions::{ChatSession, Turn},
};

use crate::markdown;

pub const BLOCKED_NOTICE: &str = "Blocked due to safety concerns.";
pub const STOPPED_NOTICE: &str = "The model unexpectedly stopped generating.";
pub const NETWORK_NOTICE: &str = "Looks like your network is down. Please try again later.";
pub const UNSUPPORTED_NOTICE: &str = "This response is not supported.";

/// Cap on the source text rendered into the reply. Keeps the rendered
/// HTML safely under Telegram's 4096-char message limit even after tag
/// expansion, so an edit is never rejected mid-markup.
pub const SOURCE_TEXT_CAP: usize = 3500;

/// Why a reply edit failed, as far as recovery is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditFault {
    /// The gateway rejected the content; skip this render, keep going.
    Rejected,
    /// The gateway is unreachable; the turn cannot continue.
    Transport,
    /// Anything else; fall back to sending the text as a new message.
    Other,
}

/// The single outbound reply a relay turn streams into.
///
/// Abstracts the Telegram edit calls so the state machine is testable
/// with a scripted editor. `send_followup` re-targets subsequent edits
/// at the newly sent message; `notify` sends a standalone message and
/// leaves the reply target alone.
#[async_trait::async_trait]
pub trait ReplyEditor: Send {
    async fn edit(&mut self, html: &str) -> Result<(), EditFault>;
    async fn send_followup(&mut self, html: &str) -> Result<(), EditFault>;
    async fn notify(&mut self, text: &str) -> Result<(), EditFault>;
}

/// Terminal state of one relay turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Stream exhausted; the model turn was appended to history.
    Completed,
    /// Input rejected before any output; history unchanged.
    BlockedAtStart,
    /// Generation aborted mid-way; the turn was rewound.
    Stopped,
    /// Transport failure; aborted without rewinding.
    Failed,
}

/// Relay one turn: commit `user_turn`, stream the answer into `editor`,
/// and settle the session history according to the outcome.
///
/// The user turn is committed only once the stream yields output, so a
/// block-at-start leaves history exactly as it was. After a stop the
/// loop keeps consuming steps without rendering, because the backend
/// may still emit trailing stream-closing events.
pub async fn run_turn<S, E>(
    session: &mut ChatSession,
    user_turn: Turn,
    steps: S,
    editor: &mut E,
    edit_delay: Duration,
) -> RelayOutcome
where
    S: Stream<Item = StreamStep>,
    E: ReplyEditor + ?Sized,
{
    tokio::pin!(steps);

    let mut buffer = String::new();
    let mut pending_user_turn = Some(user_turn);
    let mut outcome = RelayOutcome::Completed;
    let mut draining = false;

    while let Some(step) = steps.next().await {
        match step {
            StreamStep::Chunk(text) => {
                if let Some(turn) = pending_user_turn.take() {
                    session.push(turn);
                }
                buffer.push_str(&text);
                if draining {
                    continue;
                }
                let capped = markdown::truncate_at_char_boundary(&buffer, SOURCE_TEXT_CAP);
                let html = markdown::render_html(capped);
                match editor.edit(&html).await {
                    Ok(()) => tokio::time::sleep(edit_delay).await,
                    Err(EditFault::Rejected) => {
                        debug!(chat_id = session.chat_id(), "edit rejected, skipping render");
                    },
                    Err(EditFault::Transport) => {
                        warn!(
                            chat_id = session.chat_id(),
                            "reply edits unreachable, aborting turn"
                        );
                        return RelayOutcome::Failed;
                    },
                    Err(EditFault::Other) => {
                        // Don't lose the content: hand it over as a new
                        // message and keep streaming into that one.
                        if let Err(fault) = editor.send_followup(&html).await {
                            debug!(
                                chat_id = session.chat_id(),
                                ?fault,
                                "followup send failed, dropping render"
                            );
                        }
                    },
                }
            },
            StreamStep::Blocked => {
                if draining {
                    continue;
                }
                let _ = editor.edit(BLOCKED_NOTICE).await;
                if pending_user_turn.is_some() {
                    outcome = RelayOutcome::BlockedAtStart;
                } else {
                    // Blocked after output started behaves like a stop.
                    session.rewind_last_turn();
                    outcome = RelayOutcome::Stopped;
                }
                draining = true;
            },
            StreamStep::Stopped => {
                if draining {
                    continue;
                }
                debug!(chat_id = session.chat_id(), "generation stopped, rewinding turn");
                let _ = editor.edit(STOPPED_NOTICE).await;
                if pending_user_turn.take().is_none() {
                    session.rewind_last_turn();
                }
                outcome = RelayOutcome::Stopped;
                draining = true;
            },
            StreamStep::Transport(message) => {
                warn!(
                    chat_id = session.chat_id(),
                    error = %message,
                    "stream transport failure"
                );
                let _ = editor.edit(NETWORK_NOTICE).await;
                return RelayOutcome::Failed;
            },
            StreamStep::Decode(message) => {
                debug!(
                    chat_id = session.chat_id(),
                    error = %message,
                    "undecodable stream event, skipping"
                );
                // Announce in a separate message; the reply keeps the
                // output accumulated so far.
                if !draining {
                    let _ = editor.notify(UNSUPPORTED_NOTICE).await;
                }
            },
            StreamStep::Done => break,
        }
    }

    if outcome == RelayOutcome::Completed && !buffer.is_empty() {
        session.push(Turn::model(&buffer));
    }
    outcome
}
