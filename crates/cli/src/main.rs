use std::sync::Arc;

use {
    clap::Parser,
    secrecy::Secret,
    tracing::info,
    tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter},
};

use {
    gemrelay_backend::GeminiClient,
    gemrelay_models::ModelRegistry,
    gemrelay_sessions::SessionStore,
    gemrelay_telegram::{bot, App, BotConfig},
};

#[derive(Parser)]
#[command(name = "gemrelay", about = "Gemini-backed Telegram chat bot")]
struct Cli {
    /// Telegram bot token from @BotFather.
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    /// Google Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: String,

    /// Users allowed to talk to the bot (ids or usernames). Empty = open.
    #[arg(long, env = "ALLOWED_USERS", value_delimiter = ',')]
    allowed_users: Vec<String>,

    /// Pause after each streaming edit (ms).
    #[arg(long, default_value_t = 100)]
    edit_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "gemrelay starting");

    let registry = Arc::new(ModelRegistry::standard());
    let store = Arc::new(SessionStore::new(Arc::clone(&registry)));
    let backend = Arc::new(GeminiClient::new(Secret::new(cli.gemini_api_key.clone())));
    let config = BotConfig {
        token: Secret::new(cli.bot_token.clone()),
        allowlist: cli.allowed_users.clone(),
        edit_delay_ms: cli.edit_delay_ms,
    };

    let app = Arc::new(App::new(config, registry, store, backend)?);

    tokio::select! {
        result = bot::run_polling(app) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        },
    }

    Ok(())
}
