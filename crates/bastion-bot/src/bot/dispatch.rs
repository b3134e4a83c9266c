use std::sync::Arc;

use bastion_core::platform::Message;

use crate::bot::context::BotContext;
use crate::commands::{self, parse_command};
use crate::events::{Envelope, GatewayEvent, Source};
use crate::handlers::handle_command;

/// Routes one gateway event. Never blocks on handler work: commands and
/// relay replies run on their own tasks.
pub(crate) fn dispatch_event(context: &Arc<BotContext>, envelope: Envelope) {
    match (envelope.source, envelope.event) {
        (Source::Staff, GatewayEvent::MessageCreate(message)) => {
            dispatch_staff_message(context, message);
        }
        (Source::Staff, GatewayEvent::Reaction(reaction)) => {
            let delivered = context.hub().dispatch(&reaction);
            tracing::trace!(delivered, emoji = %reaction.emoji, "reaction dispatched");
        }
        (Source::Relay, GatewayEvent::MessageCreate(message)) => match context.relay() {
            Some(relay) => {
                if !relay.deliver(message) {
                    tracing::warn!("relay worker stopped, dropping DM");
                }
            }
            None => tracing::debug!("relay not configured, ignoring DM {}", message.id),
        },
        (Source::Relay, GatewayEvent::Reaction(_)) => {}
    }
}

fn dispatch_staff_message(context: &Arc<BotContext>, message: Message) {
    if message.author.bot || message.author.id == context.platform().current_user_id() {
        return;
    }

    if let Some(invocation) = parse_command(&context.config().command_prefix, &message.content) {
        if commands::requires_admin(invocation.command)
            && !context.config().is_admin(message.author.id)
        {
            tracing::info!(
                user_id = message.author.id,
                command = commands::describe(invocation.command),
                "denied command"
            );
            return;
        }
        let command = invocation.command;
        let context = Arc::clone(context);
        tokio::spawn(async move {
            if let Err(err) = handle_command(&context, &message, invocation).await {
                tracing::error!(?command, "command failed: {err:#}");
            }
        });
        return;
    }

    if message.reference.is_some()
        && let Some(relay) = context.relay()
    {
        let relay = Arc::clone(relay.relay());
        tokio::spawn(async move {
            if let Err(err) = relay.on_staff_message(&message).await {
                tracing::error!(message_id = message.id, "relay reply failed: {err:#}");
            }
        });
    }
}
