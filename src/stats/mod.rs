//! Per-channel and per-session statistics

pub mod metrics;

pub use metrics::{ChannelStats, ChannelStatsSnapshot, SessionStats};
