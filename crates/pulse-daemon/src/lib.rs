//! Pulse Daemon library
//!
//! This module provides the host process around the engine:
//! - Historical backfill and live stream ingestion
//! - HTTP delivery of spike notifications
//! - REST query API
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod server;

pub use config::PulseConfig;
pub use error::{ApiError, DaemonError, DaemonResult, StreamError};
pub use notify::HttpNotificationSink;
pub use server::{RunOptions, Server};
