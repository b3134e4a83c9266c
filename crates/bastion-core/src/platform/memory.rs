use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{
    ChatPlatform, Channel, ChannelId, ChannelKind, GuildId, Message, MessageId, MessageRef,
    OutgoingMessage, PlatformError, PlatformResult, RoleId, User, UserId,
};

/// A message sent through [`MemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub message: OutgoingMessage,
}

impl SentMessage {
    pub fn location(&self) -> MessageRef {
        MessageRef::new(self.channel_id, self.id)
    }

    pub fn content(&self) -> &str {
        &self.message.content
    }
}

#[derive(Default)]
struct MemoryState {
    sent: Vec<SentMessage>,
    reactions: Vec<(MessageRef, String)>,
    deleted: Vec<MessageRef>,
    channels: HashMap<ChannelId, Channel>,
    roles: HashSet<(GuildId, RoleId)>,
    failing_reactions: HashSet<String>,
    failing_channels: HashSet<ChannelId>,
    gone_messages: HashSet<MessageId>,
}

/// In-memory [`ChatPlatform`] that records every call.
///
/// Failures can be injected per emoji, channel or message.
pub struct MemoryPlatform {
    user_id: UserId,
    next_id: AtomicU64,
    state: Mutex<MemoryState>,
    changed: Notify,
}

impl MemoryPlatform {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            next_id: AtomicU64::new(1_000),
            state: Mutex::new(MemoryState::default()),
            changed: Notify::new(),
        }
    }

    #[must_use]
    pub fn with_channel(self, id: ChannelId, kind: ChannelKind, guild_id: Option<GuildId>) -> Self {
        self.lock().channels.insert(id, Channel { id, kind, guild_id });
        self
    }

    #[must_use]
    pub fn with_role(self, guild_id: GuildId, role_id: RoleId) -> Self {
        self.lock().roles.insert((guild_id, role_id));
        self
    }

    /// Adding `emoji` anywhere fails with `Forbidden`.
    pub fn fail_reaction(&self, emoji: &str) {
        self.lock().failing_reactions.insert(emoji.to_string());
    }

    /// Sending to `channel_id` fails with `Forbidden`.
    pub fn fail_channel(&self, channel_id: ChannelId) {
        self.lock().failing_channels.insert(channel_id);
    }

    /// Any call targeting `message_id` fails with `NotFound`.
    pub fn mark_gone(&self, message_id: MessageId) {
        self.lock().gone_messages.insert(message_id);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    pub fn sent_to(&self, channel_id: ChannelId) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .filter(|sent| sent.channel_id == channel_id)
            .map(|sent| sent.message.content.clone())
            .collect()
    }

    /// Reactions this client currently has on `target`, in the order added.
    pub fn own_reactions(&self, target: MessageRef) -> Vec<String> {
        self.lock()
            .reactions
            .iter()
            .filter(|(location, _)| *location == target)
            .map(|(_, emoji)| emoji.clone())
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.lock().deleted.clone()
    }

    /// Waits until a sent message matches `predicate`.
    pub async fn wait_for_sent<F>(&self, predicate: F) -> SentMessage
    where
        F: Fn(&SentMessage) -> bool,
    {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(found) = self.lock().sent.iter().find(|sent| predicate(sent)) {
                return found.clone();
            }
            notified.await;
        }
    }

    /// Waits until `target` carries `count` reactions from this client.
    pub async fn wait_for_reactions(&self, target: MessageRef, count: usize) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.own_reactions(target).len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_gone(state: &MemoryState, target: MessageRef) -> PlatformResult<()> {
        if state.gone_messages.contains(&target.message_id) {
            return Err(PlatformError::NotFound(format!(
                "message {}",
                target.message_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for MemoryPlatform {
    fn current_user_id(&self) -> UserId {
        self.user_id
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: OutgoingMessage,
    ) -> PlatformResult<Message> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guild_id = {
            let mut state = self.lock();
            if state.failing_channels.contains(&channel_id) {
                return Err(PlatformError::Forbidden(format!("channel {channel_id}")));
            }
            state.sent.push(SentMessage {
                id,
                channel_id,
                message: message.clone(),
            });
            state
                .channels
                .get(&channel_id)
                .and_then(|channel| channel.guild_id)
        };
        self.changed.notify_waiters();

        Ok(Message {
            id,
            channel_id,
            guild_id,
            author: User {
                id: self.user_id,
                name: "bastion".to_string(),
                discriminator: None,
                bot: true,
            },
            author_nick: None,
            content: message.content,
            attachments: Vec::new(),
            reference: message.reply_to.map(|reference| reference.message_id),
            timestamp: None,
        })
    }

    async fn add_reaction(&self, target: MessageRef, emoji: &str) -> PlatformResult<()> {
        {
            let mut state = self.lock();
            Self::check_gone(&state, target)?;
            if state.failing_reactions.contains(emoji) {
                return Err(PlatformError::Forbidden(format!("reaction {emoji}")));
            }
            let present = state
                .reactions
                .iter()
                .any(|(location, existing)| *location == target && existing == emoji);
            if !present {
                state.reactions.push((target, emoji.to_string()));
            }
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn remove_own_reaction(&self, target: MessageRef, emoji: &str) -> PlatformResult<()> {
        {
            let mut state = self.lock();
            Self::check_gone(&state, target)?;
            state
                .reactions
                .retain(|(location, existing)| !(*location == target && existing == emoji));
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn delete_message(&self, target: MessageRef) -> PlatformResult<()> {
        {
            let mut state = self.lock();
            Self::check_gone(&state, target)?;
            state.deleted.push(target);
            state.reactions.retain(|(location, _)| *location != target);
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn fetch_channel(&self, channel_id: ChannelId) -> PlatformResult<Channel> {
        self.lock()
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("channel {channel_id}")))
    }

    async fn role_exists(&self, guild_id: GuildId, role_id: RoleId) -> PlatformResult<bool> {
        Ok(self.lock().roles.contains(&(guild_id, role_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_messages_and_reactions() {
        let platform = MemoryPlatform::new(7).with_channel(10, ChannelKind::GuildText, Some(1));

        let sent = platform.say(10, "hello").await.unwrap();
        assert_eq!(sent.guild_id, Some(1));
        assert_eq!(platform.sent_to(10), vec!["hello".to_string()]);

        let location = sent.location();
        platform.add_reaction(location, "✅").await.unwrap();
        platform.add_reaction(location, "✅").await.unwrap();
        platform.add_reaction(location, "↩").await.unwrap();
        assert_eq!(platform.own_reactions(location), vec!["✅", "↩"]);

        platform.remove_own_reaction(location, "✅").await.unwrap();
        assert_eq!(platform.own_reactions(location), vec!["↩"]);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let platform = MemoryPlatform::new(7);
        platform.fail_reaction("❌");
        platform.fail_channel(99);
        platform.mark_gone(5);

        let err = platform
            .add_reaction(MessageRef::new(1, 2), "❌")
            .await
            .unwrap_err();
        assert!(err.is_gone());

        let err = platform.say(99, "hi").await.unwrap_err();
        assert!(matches!(err, PlatformError::Forbidden(_)));

        let err = platform
            .delete_message(MessageRef::new(1, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));

        let err = platform.fetch_channel(42).await.unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
    }
}
