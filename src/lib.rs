//! fbcheck — bulk account status checker.
//!
//! Extracts Facebook-style account identifiers from raw input lines,
//! verifies them against an upstream status API through a same-origin proxy
//! relay, and partitions the input into valid / invalid / duplicate line
//! buckets. The pipeline is UI-agnostic: progress flows out as events, the
//! CLI in `main.rs` is one consumer.

pub mod client;
pub mod config;
pub mod i18n;
pub mod pipeline;
pub mod proxy;
