//! # Scarlet
//!
//! An asynchronous Redis client for tokio.
//!
//! Scarlet speaks RESP2 over a single TCP connection and provides pipelined
//! request/response, pub/sub subscriptions with per-channel message streams,
//! and MULTI/EXEC transactions — all multiplexed over one socket with strict
//! FIFO reply matching.

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod pubsub;
pub mod resp;
pub mod transaction;

pub use client::Client;
pub use config::Config;
pub use connection::ConnectionState;
pub use error::{ScarletError, ScarletResult};
pub use pubsub::{Message, Subscription, SubscriptionKind};
pub use resp::RespValue;
pub use transaction::{QueuedReply, Transaction};
