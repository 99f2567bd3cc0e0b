//! Shared configuration, error and wire types for the Gatekeeper crates.

pub mod config;
pub mod error;
pub mod types;
