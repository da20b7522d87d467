//! Edit sources: historical backfill and the live stream

pub mod backfill;
pub mod stream;

pub use backfill::BackfillReport;
pub use stream::{ConnectionState, LiveStream, StreamHealth};
