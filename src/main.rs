mod analysis;
mod character;
mod config;
mod core;
mod error;
mod memory;
mod models;
mod providers;

use std::sync::Arc;

use character::CharacterConfig;
use config::Config;
use crate::core::runtime::Runtime;
use providers::telegram_user::UserSession;
use dotenv::dotenv;
use log::{info, warn};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let env_loaded = dotenv();

    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level(
            "cookie_relay_agent",
            if std::env::var("DEBUG").is_ok() {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
        )
        .env()
        .init()?;

    if let Err(e) = env_loaded {
        warn!("Error loading .env file: {}", e);
    }

    let config = Config::from_env()?;
    if config.allowed_user_ids.is_empty() {
        warn!("ALLOWED_USER_IDS is empty, anyone in chat {} can issue commands", config.allowed_room_id);
    }

    info!("Running character: {}", config.character_name);
    let character = CharacterConfig::load(&config.character_name)?;

    let session = Arc::new(UserSession::connect(&config.telegram_user).await?);
    let runtime = Arc::new(Runtime::new(&config, character, session)?);
    runtime.run().await?;

    Ok(())
}
