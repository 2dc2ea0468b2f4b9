use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::signal;
use tokio::sync::mpsc;

use loyalty_bot::cli::{Cli, Commands};
use loyalty_bot::core::config::Config;
use loyalty_bot::core::logging::log_configuration;
use loyalty_bot::core::init_logger;
use loyalty_bot::engine::ChatId;
use loyalty_bot::lifecycle::{BotController, ControllerOptions};
use loyalty_bot::services::memory::MemoryStore;
use loyalty_bot::services::{BusinessSettings, Services};
use loyalty_bot::storage::{create_pool, SqliteStore};
use loyalty_bot::telegram::{create_bot, schema, setup_bot_commands, TelegramNotifier, TelegramTransport};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    let _ = dotenv();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    match cli.command() {
        Commands::CheckConfig => {
            println!("Configuration OK");
            println!("  admin id:  {}", config.admin_id);
            println!("  timezone:  UTC{}", config.timezone);
            println!("  database:  {}", config.database_path);
            Ok(())
        }
        Commands::Run { in_memory } => run_bot(config, in_memory).await,
    }
}

async fn run_bot(config: Config, in_memory: bool) -> Result<()> {
    init_logger(config.log_level, &config.log_file_path)?;

    // Panics inside handlers are contained by the router; this only logs strays
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {}", panic_info);
    }));

    log_configuration(&config);

    let settings = BusinessSettings::from_config(&config);
    let services = if in_memory {
        log::warn!("Running with in-memory storage, data is lost on exit");
        Services::from_store(Arc::new(MemoryStore::new(config.timezone)), settings)
    } else {
        let pool = create_pool(&config.database_path)?;
        Services::from_store(Arc::new(SqliteStore::new(Arc::new(pool), config.timezone)), settings)
    };

    let bot = create_bot(&config)?;
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let controller = BotController::new(Arc::new(services), transport, ControllerOptions::from_config(&config))?;
    controller
        .scheduler()
        .add_notification_callback(Arc::new(TelegramNotifier::new(bot.clone(), ChatId(config.admin_id))));

    if let Err(e) = setup_bot_commands(&bot, controller.router().commands()).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::builder(bot, schema(tx))
        .default_handler(|_| async {})
        .build();
    let dispatcher_token = dispatcher.shutdown_token();
    let dispatcher_handle = tokio::spawn(async move { dispatcher.dispatch().await });

    controller.start().await;
    log::info!("Bot is running. Press Ctrl+C to stop");

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
        }
        match dispatcher_token.shutdown() {
            Ok(stopped) => stopped.await,
            Err(e) => log::warn!("Dispatcher was not running: {}", e),
        }
    };
    let report = controller.run(rx, shutdown).await;
    log::info!(
        "Dispatched {} event(s), lanes drained: {}",
        report.dispatched_events,
        report.drained
    );

    if let Err(e) = dispatcher_handle.await {
        log::error!("Dispatcher task failed: {}", e);
    }
    Ok(())
}
