//! Core types, config, and errors for Papercast.

pub mod config;
pub mod error;
pub mod types;
