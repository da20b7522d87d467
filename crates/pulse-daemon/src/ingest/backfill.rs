//! One-shot replay of the historical edit feed.

use pulse_engine::PulseEngine;
use pulse_types::{decode_historical, Normalizer, RawEdit};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::SourcesConfig;
use crate::error::BackfillError;

/// What a backfill run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Records in the payload.
    pub fetched: usize,
    /// Records that did not decode.
    pub undecodable: usize,
    /// Records the normalizer rejected.
    pub rejected: usize,
    pub ingested: usize,
}

/// Fetch `{base}/edits`, trying the fallback base when the primary cannot be
/// reached, and feed every accepted record to the engine.
pub async fn run(
    client: &Client,
    sources: &SourcesConfig,
    normalizer: &Normalizer,
    engine: &PulseEngine,
) -> Result<BackfillReport, BackfillError> {
    let body = match fetch(client, &sources.historical_base_url).await {
        Ok(body) => body,
        Err(e @ BackfillError::Request { .. }) => match &sources.historical_fallback_url {
            Some(fallback) => {
                warn!(error = %e, fallback = %fallback, "Primary historical source unreachable, trying fallback");
                fetch(client, fallback).await?
            }
            None => return Err(e),
        },
        Err(e) => return Err(e),
    };
    replay(&body, normalizer, engine)
}

async fn fetch(client: &Client, base_url: &str) -> Result<Vec<u8>, BackfillError> {
    let url = format!("{}/edits", base_url.trim_end_matches('/'));
    info!(url = %url, "Fetching historical edits");

    let request_error = |source: reqwest::Error| BackfillError::Request {
        url: url.clone(),
        source,
    };
    let response = client.get(&url).send().await.map_err(request_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(BackfillError::Status {
            url: url.clone(),
            status: status.as_u16(),
        });
    }
    let body = response.bytes().await.map_err(request_error)?;
    Ok(body.to_vec())
}

/// Decode a historical payload and ingest what survives normalization.
pub fn replay(
    body: &[u8],
    normalizer: &Normalizer,
    engine: &PulseEngine,
) -> Result<BackfillReport, BackfillError> {
    let (edits, undecodable) = decode_historical(body)?;
    let mut report = BackfillReport {
        fetched: edits.len() + undecodable,
        undecodable,
        ..BackfillReport::default()
    };

    for edit in edits {
        match normalizer.normalize(RawEdit::Historical(edit)) {
            Ok(record) => {
                engine.ingest(&record);
                report.ingested += 1;
            }
            Err(rejection) => {
                debug!(reason = %rejection, "Skipping historical edit");
                report.rejected += 1;
            }
        }
    }

    info!(
        fetched = report.fetched,
        ingested = report.ingested,
        rejected = report.rejected,
        undecodable = report.undecodable,
        "Processed {} historical edits",
        report.ingested
    );
    Ok(report)
}
