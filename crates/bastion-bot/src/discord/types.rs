use bastion_core::platform::{
    Attachment, Channel, ChannelKind, Message, ReactionEvent, ReactionKind, User,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discord sends ids as strings; accept numbers too.
mod snowflake {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    fn convert<E: serde::de::Error>(raw: Raw) -> Result<u64, E> {
        match raw {
            Raw::Text(text) => text.parse().map_err(E::custom),
            Raw::Number(number) => Ok(number),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        convert(Raw::deserialize(deserializer)?)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            Option::<super::Raw>::deserialize(deserializer)?
                .map(super::convert)
                .transpose()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
    #[serde(with = "snowflake")]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl From<ApiUser> for User {
    fn from(user: ApiUser) -> Self {
        User {
            id: user.id,
            name: user.username,
            discriminator: user.discriminator,
            bot: user.bot,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiMember {
    #[serde(default)]
    pub nick: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiAttachment {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiMessageReference {
    #[serde(default, with = "snowflake::option")]
    pub message_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMessage {
    #[serde(with = "snowflake")]
    pub id: u64,
    #[serde(with = "snowflake")]
    pub channel_id: u64,
    #[serde(default, with = "snowflake::option")]
    pub guild_id: Option<u64>,
    pub author: ApiUser,
    #[serde(default)]
    pub member: Option<ApiMember>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<ApiAttachment>,
    #[serde(default)]
    pub message_reference: Option<ApiMessageReference>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<ApiMessage> for Message {
    fn from(message: ApiMessage) -> Self {
        Message {
            id: message.id,
            channel_id: message.channel_id,
            guild_id: message.guild_id,
            author: message.author.into(),
            author_nick: message.member.and_then(|member| member.nick),
            content: message.content,
            attachments: message
                .attachments
                .into_iter()
                .map(|attachment| Attachment {
                    filename: attachment.filename,
                    url: attachment.url,
                })
                .collect(),
            reference: message
                .message_reference
                .and_then(|reference| reference.message_id),
            timestamp: message.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiChannel {
    #[serde(with = "snowflake")]
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default, with = "snowflake::option")]
    pub guild_id: Option<u64>,
}

impl From<ApiChannel> for Channel {
    fn from(channel: ApiChannel) -> Self {
        let kind = match channel.kind {
            0 | 5 => ChannelKind::GuildText,
            1 => ChannelKind::Direct,
            _ => ChannelKind::Other,
        };
        Channel {
            id: channel.id,
            kind,
            guild_id: channel.guild_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiRole {
    #[serde(with = "snowflake")]
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct ApiEmoji {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiReaction {
    #[serde(with = "snowflake")]
    pub user_id: u64,
    #[serde(with = "snowflake")]
    pub channel_id: u64,
    #[serde(with = "snowflake")]
    pub message_id: u64,
    #[serde(default, with = "snowflake::option")]
    pub guild_id: Option<u64>,
    pub emoji: ApiEmoji,
}

impl ApiReaction {
    pub fn into_event(self, kind: ReactionKind) -> ReactionEvent {
        ReactionEvent {
            kind,
            emoji: self.emoji.name.unwrap_or_default(),
            user_id: self.user_id,
            channel_id: self.channel_id,
            message_id: self.message_id,
            guild_id: self.guild_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CreateMessageRequest<'a> {
    pub content: &'a str,
    pub allowed_mentions: AllowedMentionsBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReferenceBody>,
}

#[derive(Debug, Serialize)]
pub struct AllowedMentionsBody {
    pub parse: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    pub replied_user: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageReferenceBody {
    pub message_id: String,
    pub channel_id: String,
    pub fail_if_not_exists: bool,
}
