//! Inbound update handling: slash commands, text turns, photo turns and
//! the model-picker callback.

use std::{sync::Arc, time::Duration};

use {
    teloxide::{
        prelude::*,
        types::{
            CallbackQuery, ChatAction, ChatId, InlineKeyboardButton, InlineKeyboardMarkup,
            MediaKind, Message, MessageId, MessageKind, ParseMode, ReplyParameters,
        },
        ApiError, RequestError,
    },
    tracing::{debug, info, warn},
};

use {
    gemrelay_backend::FileHandle,
    gemrelay_sessions::{Part, Turn},
};

use crate::{
    access,
    bot::App,
    markdown,
    relay::{self, EditFault, ReplyEditor},
    Result,
};

const PLACEHOLDER: &str = "Thinking…";
const DEFAULT_PHOTO_PROMPT: &str = "Analyse this image and generate response";
const UPLOAD_FAILED_NOTICE: &str = "Failed to process the image. Please try again.";

const HELP_TEXT: &str = "Basic commands:\n\
    /start - Start the bot\n\
    /help - Show this message\n\
    /new - Start a new chat session\n\
    /model - Switch the active model\n\n\
    Send a message or a photo and the model replies, streaming the \
    answer into a single message.";

/// Handle one inbound Telegram message.
pub async fn handle_message(app: &Arc<App>, msg: Message) -> Result<()> {
    let chat_id = msg.chat.id;
    let (user_id, username) = match msg.from.as_ref() {
        Some(user) => (user.id.0 as i64, user.username.clone()),
        None => return Ok(()),
    };

    if !access::is_allowed(&app.config, user_id, username.as_deref()) {
        debug!(chat_id = chat_id.0, user_id, "dropping message from non-allowlisted user");
        return Ok(());
    }

    let text = extract_text(&msg);

    if let Some(command) = text.as_deref().and_then(command_of) {
        return match command {
            "start" => handle_start(app, &msg).await,
            "help" => handle_help(app, chat_id).await,
            "new" => handle_new(app, chat_id).await,
            "model" => handle_model(app, chat_id).await,
            other => {
                debug!(chat_id = chat_id.0, command = other, "ignoring unknown command");
                Ok(())
            },
        };
    }

    if let Some(file_id) = largest_photo_file_id(&msg) {
        return handle_photo(app, chat_id, &file_id, text.as_deref()).await;
    }

    match text {
        Some(text) if !text.is_empty() => relay_turn(app, chat_id, Turn::user(text)).await,
        _ => Ok(()),
    }
}

/// Handle an inline-keyboard button press (`model_<variantId>`).
pub async fn handle_callback(app: &Arc<App>, query: CallbackQuery) -> Result<()> {
    let _ = app.bot.answer_callback_query(&query.id).await;

    let Some(variant_id) = query.data.as_deref().and_then(|d| d.strip_prefix("model_")) else {
        return Ok(());
    };

    // Re-selecting the active variant is a no-op success.
    let response = if app.registry.switch_active(variant_id) {
        let name = app
            .registry
            .get(variant_id)
            .map(|v| v.display_name.clone())
            .unwrap_or_else(|| variant_id.to_string());
        info!(model = variant_id, "active model switched");
        format!("Switched to {name}.")
    } else {
        warn!(model = variant_id, "model switch failed: unknown variant");
        "Model switch failed.".to_string()
    };

    if let Some(message) = query.message.as_ref() {
        app.bot
            .edit_message_text(message.chat().id, message.id(), response)
            .await?;
    }
    Ok(())
}

async fn handle_start(app: &Arc<App>, msg: &Message) -> Result<()> {
    let greeting = match msg.from.as_ref() {
        Some(user) => format!(
            "Hi <a href=\"tg://user?id={}\">{}</a>! Send me a message or a photo \
             and I'll answer with the active Gemini model.",
            user.id.0,
            escape(&user.first_name)
        ),
        None => "Hi! Send me a message or a photo and I'll answer with the \
                 active Gemini model."
            .to_string(),
    };
    app.bot
        .send_message(msg.chat.id, greeting)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn handle_help(app: &Arc<App>, chat_id: ChatId) -> Result<()> {
    app.bot.send_message(chat_id, HELP_TEXT).await?;
    Ok(())
}

async fn handle_new(app: &Arc<App>, chat_id: ChatId) -> Result<()> {
    let notice = app
        .bot
        .send_message(chat_id, "Starting a new chat session…")
        .await?;
    app.store.reset(chat_id.0);
    app.bot
        .edit_message_text(chat_id, notice.id, "New chat session started.")
        .await?;
    Ok(())
}

async fn handle_model(app: &Arc<App>, chat_id: ChatId) -> Result<()> {
    let active = app.registry.active_variant();
    let buttons: Vec<Vec<InlineKeyboardButton>> = app
        .registry
        .list()
        .iter()
        .map(|variant| {
            let label = if variant.id == active.id {
                format!("{} ✓", variant.display_name)
            } else {
                variant.display_name.clone()
            };
            vec![InlineKeyboardButton::callback(
                label,
                format!("model_{}", variant.id),
            )]
        })
        .collect();
    app.bot
        .send_message(chat_id, "Select a model:")
        .reply_markup(InlineKeyboardMarkup::new(buttons))
        .await?;
    Ok(())
}

async fn handle_photo(
    app: &Arc<App>,
    chat_id: ChatId,
    file_id: &str,
    caption: Option<&str>,
) -> Result<()> {
    let placeholder = app.bot.send_message(chat_id, PLACEHOLDER).await?;

    let handle = match download_telegram_file(&app.bot, file_id).await {
        // Telegram photos are re-encoded JPEG.
        Ok(bytes) => app.backend.upload_file(&bytes, "image/jpeg").await,
        Err(e) => Err(gemrelay_backend::Error::message(e.to_string())),
    };
    let handle = match handle {
        Ok(handle) => handle,
        Err(e) => {
            warn!(chat_id = chat_id.0, error = %e, "photo ingestion failed");
            app.bot
                .edit_message_text(chat_id, placeholder.id, UPLOAD_FAILED_NOTICE)
                .await?;
            return Ok(());
        },
    };

    relay_with_placeholder(app, chat_id, placeholder.id, photo_turn(handle, caption)).await
}

async fn relay_turn(app: &Arc<App>, chat_id: ChatId, user_turn: Turn) -> Result<()> {
    let placeholder = app.bot.send_message(chat_id, PLACEHOLDER).await?;
    relay_with_placeholder(app, chat_id, placeholder.id, user_turn).await
}

/// Stream one turn's answer into an already-sent placeholder message.
///
/// Holds the session lock for the whole turn, so concurrent messages in
/// one chat queue up instead of interleaving.
async fn relay_with_placeholder(
    app: &Arc<App>,
    chat_id: ChatId,
    placeholder_id: MessageId,
    user_turn: Turn,
) -> Result<()> {
    let _ = app.bot.send_chat_action(chat_id, ChatAction::Typing).await;

    let session = app.store.get_or_create(chat_id.0);
    let mut session = session.lock().await;

    let mut request_turns = session.history().to_vec();
    request_turns.push(user_turn.clone());
    let steps = app.backend.stream_generate(session.model(), &request_turns);

    let mut editor = TelegramEditor {
        bot: app.bot.clone(),
        chat_id,
        message_id: placeholder_id,
    };
    let outcome = relay::run_turn(
        &mut session,
        user_turn,
        steps,
        &mut editor,
        Duration::from_millis(app.config.edit_delay_ms),
    )
    .await;

    info!(
        chat_id = chat_id.0,
        model = session.model(),
        ?outcome,
        turns = session.history().len(),
        "relay turn finished"
    );
    Ok(())
}

/// Production [`ReplyEditor`]: edits the tracked message over the Bot
/// API, re-targeting at the followup message after a fallback send.
struct TelegramEditor {
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
}

fn classify_request_error(error: &RequestError) -> EditFault {
    match error {
        RequestError::Api(_) => EditFault::Rejected,
        RequestError::Network(_) | RequestError::Io(_) => EditFault::Transport,
        _ => EditFault::Other,
    }
}

#[async_trait::async_trait]
impl ReplyEditor for TelegramEditor {
    async fn edit(&mut self, html: &str) -> std::result::Result<(), EditFault> {
        match self
            .bot
            .edit_message_text(self.chat_id, self.message_id, html)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => Ok(()),
            // Identical content is fine; the render just didn't change.
            Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(classify_request_error(&e)),
        }
    }

    async fn send_followup(&mut self, html: &str) -> std::result::Result<(), EditFault> {
        match self
            .bot
            .send_message(self.chat_id, html)
            .parse_mode(ParseMode::Html)
            .reply_parameters(ReplyParameters::new(self.message_id))
            .await
        {
            Ok(sent) => {
                self.message_id = sent.id;
                Ok(())
            },
            Err(e) => Err(classify_request_error(&e)),
        }
    }

    async fn notify(&mut self, text: &str) -> std::result::Result<(), EditFault> {
        // Standalone message; the streaming reply stays the edit target.
        match self.bot.send_message(self.chat_id, text).await {
            Ok(_) => Ok(()),
            Err(e) => Err(classify_request_error(&e)),
        }
    }
}

/// Extract the text or caption of a message.
fn extract_text(msg: &Message) -> Option<String> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Text(t) => Some(t.text.clone()),
            MediaKind::Photo(p) => p.caption.clone(),
            _ => None,
        },
        _ => None,
    }
}

/// File id of the largest available photo variant, if any.
fn largest_photo_file_id(msg: &Message) -> Option<String> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            // Variants are ordered smallest to largest.
            MediaKind::Photo(p) => p.photo.last().map(|ps| ps.file.id.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Parse a leading slash command, dropping any `@botname` suffix.
fn command_of(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    Some(command.split('@').next().unwrap_or(command))
}

fn photo_prompt(caption: Option<&str>) -> &str {
    match caption {
        Some(caption) if !caption.trim().is_empty() => caption,
        _ => DEFAULT_PHOTO_PROMPT,
    }
}

/// A user turn pairing the uploaded image with its prompt text.
fn photo_turn(handle: FileHandle, caption: Option<&str>) -> Turn {
    let mut turn = Turn::user_file(handle.uri, handle.mime_type);
    turn.parts.push(Part::Text(photo_prompt(caption).to_string()));
    turn
}

fn escape(text: &str) -> String {
    markdown::truncate_at_char_boundary(text, markdown::TELEGRAM_MAX_MESSAGE_LEN)
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Fetch raw file bytes through the Bot API file endpoint.
async fn download_telegram_file(bot: &Bot, file_id: &str) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;
    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        bot.token(),
        file.path
    );
    let response = reqwest::get(&url).await?;
    if !response.status().is_success() {
        return Err(crate::Error::message(format!(
            "file download failed: HTTP {}",
            response.status()
        )));
    }
    Ok(response.bytes().await?.to_vec())
}
