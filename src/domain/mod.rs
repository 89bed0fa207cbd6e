//! Domain models for wavectl
//!
//! This module contains all domain types with validation.
//! Types are validated on construction (fail-fast pattern).

pub mod channel;
pub mod frequency;
pub mod longterm;

pub use channel::{
    AlertFlags, Channel, ChannelConfig, ChannelId, ChannelRuntime, PidConfig, MAX_CHANNELS,
};
pub use frequency::Frequency;
pub use longterm::LongtermSeries;
