use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    teloxide::{
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tracing::{debug, error, info, warn},
};

use {gemrelay_backend::GeminiClient, gemrelay_models::ModelRegistry, gemrelay_sessions::SessionStore};

use crate::{config::BotConfig, handlers, Result};

/// Shared runtime state for one bot process.
pub struct App {
    pub bot: Bot,
    pub config: BotConfig,
    pub registry: Arc<ModelRegistry>,
    pub store: Arc<SessionStore>,
    pub backend: Arc<GeminiClient>,
}

impl App {
    pub fn new(
        config: BotConfig,
        registry: Arc<ModelRegistry>,
        store: Arc<SessionStore>,
        backend: Arc<GeminiClient>,
    ) -> Result<Self> {
        // Client timeout must exceed the long-polling timeout (30s) so the
        // HTTP client doesn't abort before Telegram responds. teloxide
        // bundles its own reqwest, so its build error is mapped by hand.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(45))
            .build()
            .map_err(|e| crate::Error::message(format!("telegram client setup: {e}")))?;
        let bot = Bot::with_client(config.token.expose_secret(), client);
        Ok(Self {
            bot,
            config,
            registry,
            store,
            backend,
        })
    }
}

/// Poll for updates until the task is dropped.
///
/// Verifies credentials, clears any webhook so long polling works,
/// registers the slash commands, then loops on `getUpdates`. Handler
/// errors are logged per update; a failed poll backs off for 5 seconds.
pub async fn run_polling(app: Arc<App>) -> Result<()> {
    let me = app.bot.get_me().await?;
    app.bot.delete_webhook().send().await?;
    info!(username = ?me.username, "telegram bot connected (webhook cleared)");

    let commands = vec![
        BotCommand::new("start", "Start the bot"),
        BotCommand::new("help", "Show available commands"),
        BotCommand::new("new", "Start a new chat session"),
        BotCommand::new("model", "Switch the active model"),
    ];
    if let Err(e) = app.bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    let mut offset: i32 = 0;
    loop {
        let result = app
            .bot
            .get_updates()
            .offset(offset)
            .timeout(30)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .await;

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    match update.kind {
                        UpdateKind::Message(msg) => {
                            let chat_id = msg.chat.id.0;
                            if let Err(e) = handlers::handle_message(&app, msg).await {
                                error!(chat_id, error = %e, "error handling telegram message");
                            }
                        },
                        UpdateKind::CallbackQuery(query) => {
                            if let Err(e) = handlers::handle_callback(&app, query).await {
                                error!(error = %e, "error handling telegram callback query");
                            }
                        },
                        other => {
                            debug!("ignoring non-message update: {other:?}");
                        },
                    }
                }
            },
            Err(e) => {
                warn!(error = %e, "telegram getUpdates failed");
                tokio::time::sleep(Duration::from_secs(5)).await;
            },
        }
    }
}
