//! `config`: reads and writes the key-value settings store.
//!
//! ```text
//! config                         list namespaces
//! config <ns>                    list keys
//! config <ns> <key>              show a value
//! config <ns> <key> <json>       set a value
//! config --delete <ns> <key>     delete a value
//! ```

use anyhow::Result;
use bastion_core::args::{Arg, Args};
use bastion_core::blocking::offload_result;
use bastion_core::markup::inline_code;
use bastion_core::platform::Message;
use serde_json::Value;

use crate::bot::BotContext;

const DONE: &str = "\u{2705}";
const NOTHING: &str = "None";

/// A value argument: JSON if it parses, otherwise the text as a string.
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn list(items: &[String]) -> String {
    if items.is_empty() {
        return NOTHING.to_string();
    }
    items
        .iter()
        .map(|item| inline_code(item))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Text of a bare-word argument; other kinds end the command silently.
fn word(arg: Option<Arg>) -> Option<String> {
    arg.and_then(|arg| arg.as_text().map(str::to_string))
}

pub(crate) async fn run_config(
    context: &BotContext,
    message: &Message,
    mut args: Args,
) -> Result<()> {
    let kv = context.kv().clone();
    let platform = context.platform();
    let channel = message.channel_id;

    let Some(first) = args.next_arg() else {
        let namespaces = offload_result(move || kv.namespaces()).await?;
        platform.say(channel, &list(&namespaces)).await?;
        return Ok(());
    };
    let Some(first) = word(Some(first)) else {
        return Ok(());
    };

    if first == "--delete" {
        let (Some(namespace), Some(key)) = (word(args.next_arg()), word(args.next_arg())) else {
            return Ok(());
        };
        tracing::info!(user_id = message.author.id, %namespace, %key, "config delete");
        offload_result(move || kv.set(&namespace, &key, None)).await?;
        platform.say(channel, DONE).await?;
        return Ok(());
    }

    let namespace = first;
    let Some(key) = args.next_arg() else {
        let keys = offload_result(move || kv.keys(&namespace)).await?;
        platform.say(channel, &list(&keys)).await?;
        return Ok(());
    };
    let Some(key) = word(Some(key)) else {
        return Ok(());
    };

    let Some(value) = args.next_arg() else {
        let stored = offload_result(move || kv.get_raw(&namespace, &key)).await?;
        let reply = stored.map_or_else(|| NOTHING.to_string(), |raw| inline_code(&raw));
        platform.say(channel, &reply).await?;
        return Ok(());
    };

    let value = parse_value(value.text());
    tracing::info!(user_id = message.author.id, %namespace, %key, "config set");
    offload_result(move || kv.set(&namespace, &key, Some(&value))).await?;
    platform.say(channel, DONE).await?;
    Ok(())
}
