use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "loyalty-bot")]
#[command(author, version, about = "Telegram assistant for a coffee-shop loyalty program", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot (default)
    Run {
        /// Keep clients and balances in memory instead of SQLite
        #[arg(long)]
        in_memory: bool,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run; no subcommand means `run` against SQLite.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run { in_memory: false })
    }
}
