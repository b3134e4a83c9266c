//! Discord REST client.

use async_trait::async_trait;
use bastion_core::platform::{
    AllowedMentions, Channel, ChannelId, ChatPlatform, GuildId, Message, MessageRef,
    OutgoingMessage, PlatformError, PlatformResult, RoleId, UserId,
};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

mod types;

pub use types::{ApiMessage, ApiReaction};
use types::{
    AllowedMentionsBody, ApiChannel, ApiError, ApiRole, ApiUser, CreateMessageRequest,
    MessageReferenceBody,
};

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/bastion-bot/bastion, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    user_id: UserId,
}

impl DiscordClient {
    /// Logs in: resolves the bot's own user id with `GET /users/@me`.
    pub async fn connect(token: String) -> PlatformResult<Self> {
        Self::connect_to(DISCORD_API_BASE.to_string(), token).await
    }

    pub async fn connect_to(base_url: String, token: String) -> PlatformResult<Self> {
        let mut client = Self {
            http: reqwest::Client::new(),
            base_url,
            token,
            user_id: 0,
        };
        let me: ApiUser = client.request(Method::GET, "/users/@me", None::<&()>).await?;
        tracing::info!(user_id = me.id, name = %me.username, "discord client ready");
        client.user_id = me.id;
        Ok(client)
    }

    async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> PlatformResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let bytes = self.send(method, path, body).await?;
        serde_json::from_slice(&bytes).map_err(|err| PlatformError::Decode(err.to_string()))
    }

    /// For endpoints that answer `204 No Content`.
    async fn request_empty<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> PlatformResult<()>
    where
        B: Serialize + ?Sized,
    {
        self.send(method, path, body).await.map(|_| ())
    }

    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> PlatformResult<Vec<u8>>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, url)
            .header("Authorization", format!("Bot {}", self.token))
            .header("User-Agent", USER_AGENT);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| PlatformError::Transport(err.without_url().to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| PlatformError::Transport(err.without_url().to_string()))?;

        if status.is_success() {
            return Ok(bytes.to_vec());
        }

        let message = serde_json::from_slice::<ApiError>(&bytes)
            .map(|error| error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
        tracing::debug!(%status, path, %message, "discord request failed");
        Err(match status {
            StatusCode::NOT_FOUND => PlatformError::NotFound(message),
            StatusCode::FORBIDDEN => PlatformError::Forbidden(message),
            _ => PlatformError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }
}

fn encode_emoji(emoji: &str) -> String {
    url::form_urlencoded::byte_serialize(emoji.as_bytes()).collect()
}

fn reaction_path(target: MessageRef, emoji: &str) -> String {
    format!(
        "/channels/{}/messages/{}/reactions/{}/@me",
        target.channel_id,
        target.message_id,
        encode_emoji(emoji)
    )
}

fn mentions_body(mentions: &AllowedMentions) -> AllowedMentionsBody {
    AllowedMentionsBody {
        parse: if mentions.users { vec!["users"] } else { Vec::new() },
        roles: mentions.roles.iter().map(ToString::to_string).collect(),
        replied_user: false,
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    fn current_user_id(&self) -> UserId {
        self.user_id
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: OutgoingMessage,
    ) -> PlatformResult<Message> {
        let body = CreateMessageRequest {
            content: &message.content,
            allowed_mentions: mentions_body(&message.allowed_mentions),
            message_reference: message.reply_to.map(|reference| MessageReferenceBody {
                message_id: reference.message_id.to_string(),
                channel_id: reference.channel_id.to_string(),
                fail_if_not_exists: false,
            }),
        };
        let sent: ApiMessage = self
            .request(
                Method::POST,
                &format!("/channels/{channel_id}/messages"),
                Some(&body),
            )
            .await?;
        Ok(sent.into())
    }

    async fn add_reaction(&self, target: MessageRef, emoji: &str) -> PlatformResult<()> {
        self.request_empty(Method::PUT, &reaction_path(target, emoji), None::<&()>)
            .await
    }

    async fn remove_own_reaction(&self, target: MessageRef, emoji: &str) -> PlatformResult<()> {
        self.request_empty(Method::DELETE, &reaction_path(target, emoji), None::<&()>)
            .await
    }

    async fn delete_message(&self, target: MessageRef) -> PlatformResult<()> {
        self.request_empty(
            Method::DELETE,
            &format!(
                "/channels/{}/messages/{}",
                target.channel_id, target.message_id
            ),
            None::<&()>,
        )
        .await
    }

    async fn fetch_channel(&self, channel_id: ChannelId) -> PlatformResult<Channel> {
        let channel: ApiChannel = self
            .request(Method::GET, &format!("/channels/{channel_id}"), None::<&()>)
            .await?;
        Ok(channel.into())
    }

    async fn role_exists(&self, guild_id: GuildId, role_id: RoleId) -> PlatformResult<bool> {
        let roles: Vec<ApiRole> = self
            .request(Method::GET, &format!("/guilds/{guild_id}/roles"), None::<&()>)
            .await?;
        Ok(roles.iter().any(|role| role.id == role_id))
    }
}
