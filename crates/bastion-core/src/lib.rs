//! Core of the bastion bot: bounded output, reaction monitors, confirmation
//! prompts, argument parsing and storage.

pub mod args;
pub mod blocking;
pub mod config;
pub mod confirm;
pub mod logging;
pub mod markup;
pub mod output;
pub mod platform;
pub mod reactions;
pub mod store;
