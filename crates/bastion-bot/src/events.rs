//! Gateway events as the bot consumes them.
//!
//! The gateway connections themselves run outside this process and forward
//! dispatch payloads as JSON lines:
//!
//! ```text
//! {"source": "staff", "t": "MESSAGE_REACTION_ADD", "d": {...}}
//! ```
//!
//! `source` says which bot account saw the event: the staff bot or the relay
//! bot that receives DMs.

use anyhow::{Context, Result};
use bastion_core::platform::{Message, ReactionEvent, ReactionKind};
use serde::Deserialize;
use serde_json::Value;

use crate::discord::{ApiMessage, ApiReaction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Staff,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    MessageCreate(Message),
    Reaction(ReactionEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: Source,
    pub event: GatewayEvent,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    source: Source,
    t: String,
    #[serde(default)]
    d: Value,
}

/// Parses one line. `Ok(None)` for event types the bot doesn't handle.
pub fn parse_line(line: &str) -> Result<Option<Envelope>> {
    let raw: RawEnvelope = serde_json::from_str(line).context("Invalid event envelope")?;
    let event = match raw.t.as_str() {
        "MESSAGE_CREATE" => {
            let message: ApiMessage =
                serde_json::from_value(raw.d).context("Invalid MESSAGE_CREATE payload")?;
            GatewayEvent::MessageCreate(message.into())
        }
        "MESSAGE_REACTION_ADD" | "MESSAGE_REACTION_REMOVE" => {
            let kind = if raw.t == "MESSAGE_REACTION_ADD" {
                ReactionKind::Add
            } else {
                ReactionKind::Remove
            };
            let reaction: ApiReaction = serde_json::from_value(raw.d)
                .with_context(|| format!("Invalid {} payload", raw.t))?;
            GatewayEvent::Reaction(reaction.into_event(kind))
        }
        _ => return Ok(None),
    };

    Ok(Some(Envelope {
        source: raw.source,
        event,
    }))
}
