pub(crate) mod context;
pub(crate) mod dispatch;
pub(crate) mod task;

pub(crate) use context::{BotContext, RelayHandle};
pub(crate) use dispatch::dispatch_event;
pub(crate) use task::spawn_supervised;
