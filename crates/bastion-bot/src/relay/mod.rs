//! Mail relay between direct messages to the relay bot and a staff channel.
//!
//! Inbound: a DM is copied into the staff channel with a header naming the
//! sender and a role mention, and the DM gets ✉. Outbound: a staff reply to a
//! copy asks how to answer (anonymously, personally, or not at all) and
//! delivers the reply as a response to the original DM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bastion_core::blocking::offload_result;
use bastion_core::confirm::{ConfirmationFlow, Feedback, PendingConfirmation};
use bastion_core::markup::{bold, mention_role, mention_user};
use bastion_core::platform::{
    AllowedMentions, ChannelId, ChannelKind, ChatPlatform, GuildId, Message, MessageRef,
    OutgoingMessage, PlatformResult, RoleId,
};
use bastion_core::reactions::ReactionHub;
use bastion_core::store::{KvStore, StoreError};
use tokio::sync::mpsc;

mod index;

pub(crate) use index::{RelayIndex, SCHEMA};

/// KV namespace holding the relay settings.
pub(crate) const NAMESPACE: &str = "modmail";

const MESSAGE_LIMIT: usize = 2000;

const MAIL: &str = "\u{2709}";
const ANONYMOUS: &str = "\u{1F574}";
const NAMED: &str = "\u{1F9CD}";
const CANCEL: &str = "\u{274C}";

const CANCELLED: &str = "Cancelled";
const DELIVERED: &str = "Message delivered";
const UNDELIVERABLE: &str = "Could not deliver DM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplyMode {
    Anonymous,
    Named,
    Cancel,
}

/// Where relayed DMs go. Read from the KV store on every message so that
/// `config modmail ...` takes effect without a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RelaySettings {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub role: RoleId,
}

impl RelaySettings {
    /// `None` unless guild, channel and role are all set to valid ids.
    pub(crate) fn load(kv: &KvStore) -> Result<Option<Self>, StoreError> {
        let id = |key: &str| -> Result<Option<u64>, StoreError> {
            Ok(kv
                .get_string(NAMESPACE, key)?
                .and_then(|value| value.trim().parse().ok()))
        };
        let (Some(guild), Some(channel), Some(role)) = (id("guild")?, id("channel")?, id("role")?)
        else {
            return Ok(None);
        };
        Ok(Some(Self {
            guild,
            channel,
            role,
        }))
    }
}

/// Token for the relay bot account, if configured.
pub(crate) fn relay_token(kv: &KvStore) -> Result<Option<String>, StoreError> {
    Ok(kv
        .get_string(NAMESPACE, "token")?
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty()))
}

pub(crate) struct Relay {
    staff: Arc<dyn ChatPlatform>,
    direct: Arc<dyn ChatPlatform>,
    hub: ReactionHub,
    index: RelayIndex,
    kv: KvStore,
    reply_timeout: Duration,
}

impl Relay {
    /// `staff` posts in the staff channel and sees staff reactions through
    /// `hub`; `direct` is the relay bot that receives and answers DMs.
    pub(crate) fn new(
        staff: Arc<dyn ChatPlatform>,
        direct: Arc<dyn ChatPlatform>,
        hub: ReactionHub,
        index: RelayIndex,
        kv: KvStore,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            staff,
            direct,
            hub,
            index,
            kv,
            reply_timeout,
        }
    }

    pub(crate) fn index(&self) -> &RelayIndex {
        &self.index
    }

    /// Copies a DM into the staff channel.
    pub(crate) async fn on_direct_message(&self, message: &Message) -> Result<()> {
        if !message.is_direct() || message.author.id == self.direct.current_user_id() {
            return Ok(());
        }

        let kv = self.kv.clone();
        let Some(settings) = offload_result(move || RelaySettings::load(&kv)).await? else {
            tracing::warn!("relay settings incomplete, dropping DM {}", message.id);
            return Ok(());
        };
        if !self.staff_channel_ready(settings).await? {
            tracing::warn!(
                ?settings,
                "relay staff channel unavailable, dropping DM {}",
                message.id
            );
            return Ok(());
        }

        let header = format!(
            "{} {} {} on {}:\n\n",
            bold(&format!("From {}", message.author.tag())),
            message.author.id,
            mention_user(message.author.id),
            message
                .timestamp
                .unwrap_or_else(chrono::Utc::now)
                .format("%Y-%m-%d %H:%M:%S"),
        );
        let mut footer: String = message
            .attachments
            .iter()
            .map(|attachment| {
                format!(
                    "{} {} {}\n",
                    bold("Attachment:"),
                    attachment.filename,
                    attachment.url
                )
            })
            .collect();
        footer.insert_str(0, "\n\n");
        footer.push_str(&mention_role(settings.role));

        for copy in split_copy(&header, &message.content, &footer) {
            let sent = self
                .staff
                .send_message(
                    settings.channel,
                    OutgoingMessage::text(copy).mentions(AllowedMentions::roles([settings.role])),
                )
                .await
                .context("Failed to relay DM to staff channel")?;
            self.index.record(message.location(), sent.id).await?;
        }

        tracing::info!(user_id = message.author.id, dm = message.id, "relayed DM");
        if let Err(err) = self.direct.add_reaction(message.location(), MAIL).await {
            tracing::warn!("failed to mark DM {} as relayed: {err}", message.id);
        }
        Ok(())
    }

    async fn staff_channel_ready(&self, settings: RelaySettings) -> Result<bool> {
        let channel = match self.staff.fetch_channel(settings.channel).await {
            Ok(channel) => channel,
            Err(err) if err.is_gone() => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if channel.kind != ChannelKind::GuildText || channel.guild_id != Some(settings.guild) {
            return Ok(false);
        }
        match self.staff.role_exists(settings.guild, settings.role).await {
            Ok(exists) => Ok(exists),
            Err(err) if err.is_gone() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Handles a staff message; only replies to relayed copies do anything.
    pub(crate) async fn on_staff_message(&self, message: &Message) -> Result<()> {
        let Some(target) = message.reference.and_then(|id| self.index.lookup(id)) else {
            return Ok(());
        };

        let prompt =
            format!("Reply anonymously {ANONYMOUS}, personally {NAMED}, or cancel {CANCEL}");
        let query = match self.staff.say(message.channel_id, &prompt).await {
            Ok(query) => query,
            Err(err) if err.is_gone() => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let pending =
            PendingConfirmation::new(query.location(), message.author.id, self.reply_timeout)
                .choice(ANONYMOUS, ReplyMode::Anonymous)
                .choice(NAMED, ReplyMode::Named)
                .default_choice(CANCEL, ReplyMode::Cancel)
                .feedback(Feedback::DeletePrompt);

        let resolution = ConfirmationFlow::new(self.staff.as_ref(), &self.hub)
            .run(pending, |mode| self.reply(message, target, mode))
            .await?;
        tracing::info!(
            user_id = message.author.id,
            mode = ?resolution.action,
            timed_out = resolution.timed_out,
            "relay reply resolved"
        );
        Ok(())
    }

    async fn reply(&self, message: &Message, target: MessageRef, mode: ReplyMode) -> Result<()> {
        let status = match mode {
            ReplyMode::Cancel => CANCELLED,
            ReplyMode::Anonymous | ReplyMode::Named => {
                let header = if mode == ReplyMode::Named {
                    format!(
                        "{} {}:\n\n",
                        bold(&format!("From {}", message.display_name())),
                        mention_user(message.author.id)
                    )
                } else {
                    String::new()
                };
                let body = OutgoingMessage::text(format!("{header}{}", message.content))
                    .reply_to(target);
                if self.deliver(target.channel_id, body).await? {
                    DELIVERED
                } else {
                    UNDELIVERABLE
                }
            }
        };
        self.staff.say(message.channel_id, status).await?;
        Ok(())
    }

    /// Sends into a DM channel. `Ok(false)` when the channel is gone or isn't
    /// a DM.
    async fn deliver(&self, channel_id: ChannelId, body: OutgoingMessage) -> Result<bool> {
        match self.send_direct(channel_id, body).await {
            Ok(delivered) => Ok(delivered),
            Err(err) if err.is_gone() => {
                tracing::info!("DM channel {channel_id} unreachable: {err}");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn send_direct(
        &self,
        channel_id: ChannelId,
        body: OutgoingMessage,
    ) -> PlatformResult<bool> {
        let channel = self.direct.fetch_channel(channel_id).await?;
        if channel.kind != ChannelKind::Direct {
            return Ok(false);
        }
        self.direct.send_message(channel_id, body).await?;
        Ok(true)
    }
}

/// Splits a relayed copy that would exceed the message limit into two
/// messages: header plus the start of the text, then the rest plus footer.
fn split_copy(header: &str, text: &str, footer: &str) -> Vec<String> {
    let header_len = header.chars().count();
    let total = header_len + text.chars().count() + footer.chars().count();
    if total <= MESSAGE_LIMIT {
        return vec![format!("{header}{text}{footer}")];
    }

    let first: String = header.chars().chain(text.chars()).take(MESSAGE_LIMIT).collect();
    let second: String = text
        .chars()
        .skip(MESSAGE_LIMIT.saturating_sub(header_len))
        .chain(footer.chars())
        .collect();
    vec![first, second]
}

/// Drains DMs queued by the dispatcher until the queue closes.
pub(crate) async fn run_inbox(
    relay: Arc<Relay>,
    mut inbox: mpsc::UnboundedReceiver<Message>,
) -> Result<()> {
    while let Some(message) = inbox.recv().await {
        if let Err(err) = relay.on_direct_message(&message).await {
            tracing::error!(dm = message.id, "failed to relay DM: {err:#}");
        }
    }
    Ok(())
}
