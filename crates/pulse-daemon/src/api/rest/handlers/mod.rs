//! API request handlers

mod buckets;
mod entities;
mod health;
mod spikes;

pub use buckets::*;
pub use entities::*;
pub use health::*;
pub use spikes::*;
