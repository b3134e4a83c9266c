//! Discord bot with an admin SQL console and a DM-to-staff mail relay.
//!
//! Gateway events arrive as JSON lines on stdin (see [`events`]); replies go
//! out through the Discord REST API.

use std::sync::Arc;

use anyhow::{Context, Result};
use bastion_core::blocking::offload_result;
use bastion_core::config::Config;
use bastion_core::platform::ChatPlatform;
use bastion_core::reactions::ReactionHub;
use bastion_core::store::{self, Database, KvStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bot::{BotContext, RelayHandle, dispatch_event, spawn_supervised};
use crate::discord::DiscordClient;
use crate::relay::{Relay, RelayIndex};

mod bot;
mod commands;
pub mod discord;
pub mod events;
mod handlers;
mod relay;

/// Creates every table the bot uses. Safe to run repeatedly.
pub async fn init_db(config: &Config) -> Result<Database> {
    let database = Database::new(config.database_path());
    let target = database.clone();
    offload_result(move || target.initialize(&[store::kv::SCHEMA, relay::SCHEMA]))
        .await
        .with_context(|| format!("Failed to initialize {}", database.path().display()))?;
    Ok(database)
}

/// Runs the bot until stdin closes or Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    let database = init_db(&config).await?;
    tracing::info!(path = %database.path().display(), "database ready");

    let token = config.resolve_token().context(
        "No bot token configured. Set bot_token in config.toml or BASTION_DISCORD_TOKEN",
    )?;
    let staff: Arc<dyn ChatPlatform> = Arc::new(
        DiscordClient::connect(token)
            .await
            .context("Failed to log in the staff bot")?,
    );

    let hub = ReactionHub::new();
    let cancel = CancellationToken::new();
    let started = start_relay(&config, &database, &staff, &hub, &cancel).await?;
    let (relay, relay_worker) = match started {
        Some((handle, worker)) => (Some(handle), Some(worker)),
        None => (None, None),
    };

    tracing::info!(
        prefix = %config.command_prefix,
        admins = config.admin_user_ids.len(),
        relay = relay.is_some(),
        "bastion started, reading events from stdin"
    );
    let context = Arc::new(BotContext::new(staff, hub, config, database, relay));
    let result = read_events(&context).await;

    cancel.cancel();
    if let Some(worker) = relay_worker {
        let _ = worker.await;
    }
    result
}

/// Logs in the relay bot and starts its worker. `None` when the relay isn't
/// configured or can't log in; the staff bot runs either way.
async fn start_relay(
    config: &Config,
    database: &Database,
    staff: &Arc<dyn ChatPlatform>,
    hub: &ReactionHub,
    cancel: &CancellationToken,
) -> Result<Option<(RelayHandle, JoinHandle<()>)>> {
    let kv = KvStore::new(database.clone());
    let lookup = kv.clone();
    let Some(token) = offload_result(move || relay::relay_token(&lookup)).await? else {
        tracing::info!("relay disabled: no {} token configured", relay::NAMESPACE);
        return Ok(None);
    };

    let direct = match DiscordClient::connect(token).await {
        Ok(client) => client,
        Err(err) => {
            tracing::error!("relay bot login failed, relay disabled: {err}");
            return Ok(None);
        }
    };

    let index = RelayIndex::load(database.clone()).await?;
    let relay = Arc::new(Relay::new(
        Arc::clone(staff),
        Arc::new(direct),
        hub.clone(),
        index,
        kv,
        config.relay_confirm_timeout(),
    ));
    tracing::info!(entries = relay.index().len(), "relay ready");

    let (inbox, queue) = mpsc::unbounded_channel();
    let worker = spawn_supervised(
        "relay",
        cancel.clone(),
        relay::run_inbox(Arc::clone(&relay), queue),
    );
    Ok(Some((RelayHandle::new(relay, inbox), worker)))
}

async fn read_events(context: &Arc<BotContext>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read events from stdin")? else {
                    tracing::info!("event stream closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match events::parse_line(&line) {
                    Ok(Some(envelope)) => dispatch_event(context, envelope),
                    Ok(None) => {}
                    Err(err) => tracing::warn!("skipping event: {err:#}"),
                }
            }
        }
    }
    Ok(())
}
