//! HTTP gateway for the podcast pipeline.
//!
//! Exposes document upload, question generation and podcast production as a
//! JSON API and serves the published audio files.

pub mod api;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod server;
pub mod state;

pub use server::{router, start_gateway};
pub use state::GatewayState;
