pub(crate) mod config;
pub(crate) mod sql;

use anyhow::Result;
use bastion_core::args::Args;
use bastion_core::markup::inline_code;
use bastion_core::platform::Message;

use crate::bot::BotContext;
use crate::commands::{BotCommand, Invocation};

pub(crate) async fn handle_command(
    context: &BotContext,
    message: &Message,
    invocation: Invocation,
) -> Result<()> {
    let args = match Args::parse(&invocation.args) {
        Ok(args) => args,
        Err(err) => {
            context
                .platform()
                .say(message.channel_id, &inline_code(&err.to_string()))
                .await?;
            return Ok(());
        }
    };

    match invocation.command {
        BotCommand::Sql => sql::run_sql(context, message, args).await,
        BotCommand::Config => config::run_config(context, message, args).await,
    }
}
