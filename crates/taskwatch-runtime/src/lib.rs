//! taskwatch-runtime: async engine that merges per-tab task observations
//! into one canonical count, persists it, and announces idle settlement.
//!
//! The [`aggregator::Aggregator`] is the single serialization point for all
//! mutations; the UDS server, heartbeat monitor and idle timer all funnel
//! through it.

pub mod aggregator;
pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;
pub mod hooks;
pub mod listeners;
pub mod monitor;
pub mod persist;
pub mod protocol;
pub mod server;
pub mod store;
pub mod timer;

pub use taskwatch_core as core;
