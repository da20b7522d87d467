//! Live edit stream consumer.
//!
//! Reads the server-sent-event feed line by line and ingests every `data:`
//! payload that survives decoding and normalization. A connection that goes
//! quiet for longer than the configured period is torn down and re-opened;
//! failures back off exponentially up to a cap and are retried forever.
//! Engine state is untouched by reconnects.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use pulse_engine::PulseEngine;
use pulse_types::{LiveChange, Normalizer, RawEdit};
use reqwest::{header, Client};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::StreamConfig;
use crate::error::StreamError;

/// Connection phase of the live stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    /// Waiting before the next attempt.
    Backoff,
    Stopped,
}

/// Observable health of the live stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamHealth {
    pub state: ConnectionState,
    /// Connection attempts since startup.
    pub attempts: u64,
    pub connected_since: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Edits ingested from the stream since startup.
    pub ingested: u64,
    /// `data:` lines dropped by decoding or normalization.
    pub skipped: u64,
}

impl StreamHealth {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// What became of one stream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Not a `data:` line (comments, `event:`, `id:`, blank separators).
    Ignored,
    /// Payload failed to decode or was rejected by the normalizer.
    Skipped,
    Ingested,
}

/// Longest line kept by [`LineBuffer`] before it is discarded.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One line produced by [`LineBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Complete(String),
    /// A line grew past the limit. Its bytes are discarded up to the next
    /// newline.
    Oversized,
}

/// Splits a byte stream into lines. Handles `\n` and `\r\n`, and lines split
/// across chunks. Memory is bounded by the line limit.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
            discarding: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Line> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    continue;
                }
                if self.pending.last() == Some(&b'\r') {
                    self.pending.pop();
                }
                lines.push(Line::Complete(String::from_utf8_lossy(&self.pending).into_owned()));
                self.pending.clear();
            } else if self.discarding {
                continue;
            } else if self.pending.len() >= self.limit {
                self.pending.clear();
                self.discarding = true;
                lines.push(Line::Oversized);
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }
}

pub struct LiveStream {
    client: Client,
    url: String,
    config: StreamConfig,
    normalizer: Normalizer,
    engine: Arc<PulseEngine>,
    health: watch::Sender<StreamHealth>,
}

impl LiveStream {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        config: StreamConfig,
        normalizer: Normalizer,
        engine: Arc<PulseEngine>,
    ) -> Self {
        let (health, _) = watch::channel(StreamHealth::default());
        Self {
            client,
            url: url.into(),
            config,
            normalizer,
            engine,
            health,
        }
    }

    /// Receiver for connection health updates.
    pub fn health(&self) -> watch::Receiver<StreamHealth> {
        self.health.subscribe()
    }

    /// Consume the stream until `shutdown` flips to `true` or its sender is
    /// dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = self.config.initial_backoff();

        loop {
            self.health.send_modify(|h| {
                h.state = ConnectionState::Connecting;
                h.attempts += 1;
            });
            let attempt = self.health.borrow().attempts;
            info!(url = %self.url, attempt, "Connecting to live stream");

            let result = tokio::select! {
                result = self.consume() => result,
                _ = wait_for_shutdown(&mut shutdown) => break,
            };

            let error = match result {
                Ok(()) => StreamError::Closed,
                Err(e) => e,
            };
            // A connection that got as far as streaming starts the backoff over.
            let was_connected = self.health.borrow().connected_since.is_some();
            if was_connected {
                backoff = self.config.initial_backoff();
            }
            warn!(error = %error, retry_in_ms = backoff.as_millis() as u64, "Live stream interrupted, reconnecting");
            self.health.send_modify(|h| {
                h.state = ConnectionState::Backoff;
                h.connected_since = None;
                h.last_error = Some(error.to_string());
            });

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
            backoff = (backoff * 2).min(self.config.max_backoff());
        }

        self.health.send_modify(|h| {
            h.state = ConnectionState::Stopped;
            h.connected_since = None;
        });
        info!("Live stream stopped");
    }

    /// One connection: returns when it fails, stalls or is closed.
    async fn consume(&self) -> Result<(), StreamError> {
        let response = self
            .client
            .get(&self.url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(StreamError::Connect)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status.as_u16()));
        }

        self.health.send_modify(|h| {
            h.state = ConnectionState::Connected;
            h.connected_since = Some(Utc::now());
        });
        info!(url = %self.url, "Connected to live stream");

        let quiet = self.config.quiet_period();
        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::default();
        loop {
            let chunk = match tokio::time::timeout(quiet, body.next()).await {
                Err(_) => return Err(StreamError::Stalled(quiet)),
                Ok(None) => return Err(StreamError::Closed),
                Ok(Some(Err(e))) => return Err(StreamError::Read(e)),
                Ok(Some(Ok(chunk))) => chunk,
            };

            let (mut ingested, mut skipped) = (0, 0);
            for line in lines.push(&chunk) {
                let outcome = match line {
                    Line::Complete(line) => self.handle_line(&line),
                    Line::Oversized => {
                        warn!(limit = MAX_LINE_BYTES, "Discarding oversized stream line");
                        LineOutcome::Skipped
                    }
                };
                match outcome {
                    LineOutcome::Ingested => ingested += 1,
                    LineOutcome::Skipped => skipped += 1,
                    LineOutcome::Ignored => {}
                }
            }
            if ingested + skipped > 0 {
                self.health.send_modify(|h| {
                    h.ingested += ingested;
                    h.skipped += skipped;
                });
            }
        }
    }

    /// Decode, normalize and ingest one line.
    pub fn handle_line(&self, line: &str) -> LineOutcome {
        let Some(payload) = line.strip_prefix("data:") else {
            return LineOutcome::Ignored;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        let change = match LiveChange::from_json(payload) {
            Ok(change) => change,
            Err(e) => {
                debug!(error = %e, "Skipping undecodable stream line");
                return LineOutcome::Skipped;
            }
        };
        match self.normalizer.normalize(RawEdit::Live(change)) {
            Ok(record) => {
                self.engine.ingest(&record);
                LineOutcome::Ingested
            }
            Err(rejection) => {
                trace!(reason = %rejection, "Skipping stream change");
                LineOutcome::Skipped
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Client for long-lived stream connections: connect timeout only, since a
/// whole-request timeout would cut the stream.
pub fn stream_client(connect_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().connect_timeout(connect_timeout).build()
}
