//! Infrastructure layer for AEON.
//!
//! Contains the pieces that touch the outside world: `config.toml` loading
//! and the network-facing action executors (`api_call`, `webhook`, `email`)
//! that plug into `aeon-core`'s `ActionRegistry`.

pub mod actions;
pub mod config;
