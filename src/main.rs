use library_lending::{
    config::{self, AppConfig},
    core::overdue,
    errors::Result,
    integrations::{DiscordSink, LogSink, NotificationSink, Notifier},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn build_sink(app_config: &AppConfig) -> Result<Arc<dyn NotificationSink>> {
    let Some(channel_id) = app_config.notifications.discord_channel_id else {
        info!("No Discord channel configured, notifications go to the log");
        return Ok(Arc::new(LogSink));
    };

    // DISCORD_BOT_TOKEN is loaded here, directly before use, not stored in AppConfig
    match std::env::var("DISCORD_BOT_TOKEN") {
        Ok(token) => Ok(Arc::new(DiscordSink::new(&token, channel_id)?)),
        Err(e) => {
            warn!("DISCORD_BOT_TOKEN not available ({}), notifications go to the log", e);
            Ok(Arc::new(LogSink))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal: env vars can be set externally
    dotenvy::dotenv().ok();

    // 3. Load the application configuration
    let app_config = config::settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Connect and make sure the tables exist
    let db = config::database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    config::database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Start the notification dispatcher
    let (notifier, dispatcher) = Notifier::spawn(build_sink(&app_config)?);

    // 6. Run the overdue schedule until Ctrl-C
    info!(
        "Scanning for overdue borrowings every {:?}",
        app_config.overdue.interval()
    );
    overdue::run_overdue_schedule(&db, &notifier, &app_config.overdue, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    })
    .await;

    drop(notifier);
    if let Err(e) = dispatcher.await {
        error!("Notification dispatcher panicked: {}", e);
    }
    Ok(())
}
