//! Query API

pub mod rest;

pub use rest::router::create_router;
