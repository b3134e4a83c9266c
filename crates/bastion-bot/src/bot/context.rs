use std::sync::Arc;

use bastion_core::config::Config;
use bastion_core::platform::{ChatPlatform, Message};
use bastion_core::reactions::ReactionHub;
use bastion_core::store::{Database, KvStore};
use tokio::sync::mpsc;

use crate::relay::Relay;

/// The relay plus the inbox its worker task drains.
#[derive(Clone)]
pub(crate) struct RelayHandle {
    relay: Arc<Relay>,
    inbox: mpsc::UnboundedSender<Message>,
}

impl RelayHandle {
    pub(crate) fn new(relay: Arc<Relay>, inbox: mpsc::UnboundedSender<Message>) -> Self {
        Self { relay, inbox }
    }

    pub(crate) fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Queues a direct message for the relay worker. False once the worker
    /// has stopped.
    pub(crate) fn deliver(&self, message: Message) -> bool {
        self.inbox.send(message).is_ok()
    }
}

pub(crate) struct BotContext {
    platform: Arc<dyn ChatPlatform>,
    hub: ReactionHub,
    config: Config,
    database: Database,
    kv: KvStore,
    relay: Option<RelayHandle>,
}

impl BotContext {
    pub(crate) fn new(
        platform: Arc<dyn ChatPlatform>,
        hub: ReactionHub,
        config: Config,
        database: Database,
        relay: Option<RelayHandle>,
    ) -> Self {
        let kv = KvStore::new(database.clone());
        Self {
            platform,
            hub,
            config,
            database,
            kv,
            relay,
        }
    }

    pub(crate) fn platform(&self) -> &dyn ChatPlatform {
        self.platform.as_ref()
    }

    pub(crate) fn hub(&self) -> &ReactionHub {
        &self.hub
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn database(&self) -> &Database {
        &self.database
    }

    pub(crate) fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub(crate) fn relay(&self) -> Option<&RelayHandle> {
        self.relay.as_ref()
    }
}
