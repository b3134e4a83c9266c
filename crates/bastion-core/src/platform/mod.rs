//! Chat platform abstraction.
//!
//! Everything the bot needs from the chat service goes through
//! [`ChatPlatform`]: sending messages, reacting, deleting and looking up
//! channels. The Discord REST client implements it for production. With the
//! `test-utils` feature, `MemoryPlatform` implements it for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "test-utils"))]
mod memory;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryPlatform, SentMessage};

pub type UserId = u64;
pub type ChannelId = u64;
pub type MessageId = u64;
pub type GuildId = u64;
pub type RoleId = u64;

/// Errors returned by platform calls.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("request failed with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// The target no longer exists or we lost access to it.
    ///
    /// Follow-up updates (reactions, deletes) ignore these.
    pub fn is_gone(&self) -> bool {
        matches!(self, PlatformError::NotFound(_) | PlatformError::Forbidden(_))
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Legacy `#1234` tag; `None` or `"0"` for migrated usernames.
    pub discriminator: Option<String>,
    pub bot: bool,
}

impl User {
    /// `name#1234`, or just `name` for accounts without a tag.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(discriminator) if !discriminator.is_empty() && discriminator != "0" => {
                format!("{}#{}", self.name, discriminator)
            }
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
}

/// Points at one message in one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

impl MessageRef {
    pub fn new(channel_id: ChannelId, message_id: MessageId) -> Self {
        Self {
            channel_id,
            message_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    /// `None` for direct messages.
    pub guild_id: Option<GuildId>,
    pub author: User,
    /// Server nickname of the author, when sent in a guild.
    pub author_nick: Option<String>,
    pub content: String,
    pub attachments: Vec<Attachment>,
    /// Message this one replies to.
    pub reference: Option<MessageId>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn location(&self) -> MessageRef {
        MessageRef::new(self.channel_id, self.id)
    }

    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }

    /// Nickname if set, else the account name.
    pub fn display_name(&self) -> &str {
        self.author_nick.as_deref().unwrap_or(&self.author.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Add,
    Remove,
}

/// A reaction added to or removed from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub kind: ReactionKind,
    /// Unicode emoji, or the name of a custom emoji.
    pub emoji: String,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub guild_id: Option<GuildId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    GuildText,
    Direct,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub kind: ChannelKind,
    pub guild_id: Option<GuildId>,
}

/// Which mentions in a message are allowed to notify.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedMentions {
    pub roles: Vec<RoleId>,
    pub users: bool,
}

impl AllowedMentions {
    /// No mention pings anyone.
    pub fn none() -> Self {
        Self::default()
    }

    /// Only the given roles ping.
    pub fn roles(roles: impl IntoIterator<Item = RoleId>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            users: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    pub allowed_mentions: AllowedMentions,
    pub reply_to: Option<MessageRef>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            allowed_mentions: AllowedMentions::none(),
            reply_to: None,
        }
    }

    #[must_use]
    pub fn mentions(mut self, allowed_mentions: AllowedMentions) -> Self {
        self.allowed_mentions = allowed_mentions;
        self
    }

    #[must_use]
    pub fn reply_to(mut self, reference: MessageRef) -> Self {
        self.reply_to = Some(reference);
        self
    }
}

/// Operations the bot consumes from the chat service.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The account this client is logged in as.
    fn current_user_id(&self) -> UserId;

    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: OutgoingMessage,
    ) -> PlatformResult<Message>;

    async fn add_reaction(&self, target: MessageRef, emoji: &str) -> PlatformResult<()>;

    /// Removes a reaction this client added.
    async fn remove_own_reaction(&self, target: MessageRef, emoji: &str) -> PlatformResult<()>;

    async fn delete_message(&self, target: MessageRef) -> PlatformResult<()>;

    async fn fetch_channel(&self, channel_id: ChannelId) -> PlatformResult<Channel>;

    /// Whether `role_id` exists in `guild_id`.
    async fn role_exists(&self, guild_id: GuildId, role_id: RoleId) -> PlatformResult<bool>;

    /// Convenience for plain replies.
    async fn say(&self, channel_id: ChannelId, text: &str) -> PlatformResult<Message> {
        self.send_message(channel_id, OutgoingMessage::text(text))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gone_errors_are_not_found_and_forbidden() {
        assert!(PlatformError::NotFound("message".into()).is_gone());
        assert!(PlatformError::Forbidden("missing access".into()).is_gone());
        assert!(
            !PlatformError::Api {
                status: 500,
                message: "oops".into()
            }
            .is_gone()
        );
        assert!(!PlatformError::Transport("reset".into()).is_gone());
    }

    #[test]
    fn user_tag_skips_migrated_discriminator() {
        let mut user = User {
            id: 1,
            name: "ferris".into(),
            discriminator: Some("0042".into()),
            bot: false,
        };
        assert_eq!(user.tag(), "ferris#0042");
        user.discriminator = Some("0".into());
        assert_eq!(user.tag(), "ferris");
        user.discriminator = None;
        assert_eq!(user.tag(), "ferris");
    }
}
