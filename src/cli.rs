use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "botfleet")]
#[command(author, version, about = "Dynamic multi-tenant Telegram bot host", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the host: bootstrap persisted bots and serve the admin API
    Run {
        /// Override the admin/webhook port (default: WEBHOOK_PORT env or 3001)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Check a bot token's shape without contacting the network
    CheckToken {
        /// The token to check
        token: String,
    },

    /// List active bot records from the store
    List,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
