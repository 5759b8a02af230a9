use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::Me;
use tracing::{debug, info, warn};

use crate::commands::{CommandRegistry, Invocation, Reply};
use crate::config::Config;
use crate::leads::{Lead, LeadNotifier};
use crate::links::LinkBuilder;

/// Shared application state, built once at startup and injected into handlers
pub struct AppState {
    pub links: LinkBuilder,
    pub leads: LeadNotifier,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        let links = LinkBuilder::new(&config.operator.link_host, &config.operator.username)?;
        let leads = LeadNotifier::new(config.lead_webhook()?, config.lead_timeout())?;
        Ok(Self { links, leads })
    }
}

/// Start the Telegram bot
pub async fn run(
    bot_token: &str,
    state: Arc<AppState>,
    commands: Arc<CommandRegistry>,
) -> Result<()> {
    let bot = Bot::new(bot_token);

    info!("Starting Telegram bot...");

    if let Err(e) = bot.set_my_commands(commands.bot_commands()).await {
        warn!("Failed to publish command menu: {}", e);
    }

    let handler = Update::filter_message()
        .filter_map(|msg: Message, me: Me, commands: Arc<CommandRegistry>| {
            let invocation = Invocation::parse(msg.text()?, Some(me.username()))?;
            commands.contains(&invocation.name).then_some(invocation)
        })
        .endpoint(handle_command);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state, commands])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("bot"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    invocation: Invocation,
    state: Arc<AppState>,
    commands: Arc<CommandRegistry>,
) -> ResponseResult<()> {
    let Some(outcome) = commands.route(&state, &invocation) else {
        return Ok(());
    };

    match msg.from.as_ref() {
        Some(user) => info!(
            "Command /{} from user {} ({}), argument: {:?}",
            invocation.name, user.id.0, user.full_name(), invocation.argument
        ),
        None => info!("Command /{} in chat {}", invocation.name, msg.chat.id),
    }

    for reply in outcome.replies {
        send_reply(&bot, msg.chat.id, reply).await?;
    }

    // Not awaited: the POST races any later traffic and its result is discarded.
    if let (Some(source), Some(user)) = (outcome.lead_source, msg.from.as_ref()) {
        state.leads.dispatch(Lead::from_user(user, source));
    }

    Ok(())
}

async fn send_reply(bot: &Bot, chat_id: ChatId, reply: Reply) -> ResponseResult<()> {
    let mut request = bot.send_message(chat_id, reply.text);
    if let Some(mode) = reply.parse_mode {
        request = request.parse_mode(mode);
    }
    if let Some(keyboard) = reply.keyboard {
        request = request.reply_markup(keyboard);
    }
    request.await?;
    Ok(())
}
