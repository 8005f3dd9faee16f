//! Channel side of parley.
//!
//! Parses Bot Framework activities, runs agent commands and relays messages
//! between connected parties through a [`ChannelOutbound`].

pub mod activity;
pub mod commands;
pub mod error;
pub mod plugin;
pub mod relay;

pub use {
    activity::{Activity, ActivityAccount, ActivityConversation},
    commands::Command,
    error::{Error, Result},
    plugin::{ChannelOutbound, RecordingOutbound, SentMessage},
    relay::{Relay, RelayAction},
};
