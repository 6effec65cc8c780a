//! Controller attachment: wires a freshly built client's command behavior
//!
//! The registry treats the controller as an opaque injected function, so
//! the lifecycle core has no compile-time dependency on any particular
//! bot's conversational behavior. The default controller here installs a
//! minimal command set; richer menu trees belong to the individual bots.

use std::sync::{Arc, Weak};

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;
use teloxide::utils::command::BotCommands;

use crate::core::error::{BotError, BotResult};
use crate::manager::registry::BotRegistry;
use crate::manager::scheduler::SchedulerHandle;
use crate::telegram::adapter::{BotClient, TelegramBotClient};

/// Error type produced by dispatcher handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Wires up one bot's behavior, given its client, its scheduler handle,
/// and a (weak) handle to the registry so commands can inspect siblings.
/// Invoked exactly once per successful start, before the client starts,
/// so handlers are in place before traffic can arrive.
pub type ControllerAttach =
    Arc<dyn Fn(&Arc<dyn BotClient>, &SchedulerHandle, Weak<BotRegistry>) -> BotResult<()> + Send + Sync>;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(description = "toggle the daily good-morning message")]
    Gm,
    #[command(description = "show fleet status")]
    Fleet,
}

/// Dependencies captured by the default controller's handlers.
#[derive(Clone)]
struct ControllerDeps {
    scheduler: SchedulerHandle,
    registry: Weak<BotRegistry>,
}

/// The default controller attachment: installs the [`Command`] schema on
/// the teloxide client. Fails with an attachment error when handed a
/// non-Telegram client (tests inject their own controllers instead).
pub fn default_controller() -> ControllerAttach {
    Arc::new(|client, scheduler, registry| {
        let telegram = client
            .as_any()
            .downcast_ref::<TelegramBotClient>()
            .ok_or_else(|| BotError::Attachment("default controller requires the Telegram client".to_string()))?;

        telegram.set_schema(schema(ControllerDeps {
            scheduler: scheduler.clone(),
            registry,
        }));
        Ok(())
    })
}

/// Handler tree for the default command set.
fn schema(deps: ControllerDeps) -> UpdateHandler<HandlerError> {
    dptree::entry().branch(
        Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
            move |bot: Bot, msg: Message, cmd: Command| {
                let deps = deps.clone();
                async move { handle_command(bot, msg, cmd, deps).await }
            },
        )),
    )
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command, deps: ControllerDeps) -> Result<(), HandlerError> {
    match cmd {
        Command::Start => {
            bot.send_message(msg.chat.id, "👋 Hello! Use /help to see what I can do.")
                .await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
        }
        Command::Gm => {
            let subscribed = deps.scheduler.toggle_subscription(msg.chat.id.0);
            let reply = if subscribed {
                "🌅 You'll get a good-morning message every day. Send /gm again to stop."
            } else {
                "🌙 Good-morning messages disabled."
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Fleet => {
            let reply = match deps.registry.upgrade() {
                Some(registry) => {
                    let stats = registry.stats();
                    format!(
                        "🤖 Fleet status\nActive bots: {}\nIdentities: {}",
                        stats.active_count,
                        if stats.identities.is_empty() {
                            "(none)".to_string()
                        } else {
                            stats.identities.join(", ")
                        }
                    )
                }
                None => "Fleet manager is shutting down.".to_string(),
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
    }
    Ok(())
}
