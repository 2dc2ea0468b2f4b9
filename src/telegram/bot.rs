//! Bot instance creation and the Telegram command menu

use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use teloxide::prelude::*;
use teloxide::types::BotCommand;

use crate::core::config::{self, Config};
use crate::engine::commands::CommandRegistry;
use crate::handlers::WORKFLOW_COMMANDS;

/// Creates a Bot with the configured token and request timeout
///
/// # Returns
/// * `Ok(Bot)` - Bot instance ready for requests
/// * `Err(anyhow::Error)` - The HTTP client could not be built
pub fn create_bot(config: &Config) -> anyhow::Result<Bot> {
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    Ok(Bot::with_client(config.bot_token.expose_secret(), client))
}

/// Command list shown in the Telegram UI: registry commands plus workflow commands
pub fn bot_commands(registry: &CommandRegistry) -> Vec<BotCommand> {
    let mut commands: Vec<BotCommand> = registry
        .descriptions()
        .into_iter()
        .map(|(name, description)| BotCommand::new(name, description))
        .collect();
    commands.extend(
        WORKFLOW_COMMANDS
            .iter()
            .map(|(name, description)| BotCommand::new(*name, *description)),
    );
    commands
}

/// Sets up bot commands in Telegram UI
pub async fn setup_bot_commands(bot: &Bot, registry: &CommandRegistry) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(bot_commands(registry)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::registry;

    #[test]
    fn test_command_menu_has_no_duplicates() {
        let commands = bot_commands(&registry());
        let mut names: Vec<&str> = commands.iter().map(|c| c.command.as_str()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(names.contains(&"purchase"));
        assert!(names.contains(&"start"));
    }
}
