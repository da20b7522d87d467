//! REST API over the engine's query interface

pub mod handlers;
pub mod router;
pub mod state;
