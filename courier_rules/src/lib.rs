//! # Courier Rules
//!
//! The rules crate for the courier's obligation queue: identifiers, delivery
//! obligations and their lifecycle, standing obligations and their effect tags,
//! relationship state, and engine configuration.
//! This crate holds no planning logic; the engine lives in `obligation_core`.

pub mod config;
pub mod entities;
pub mod mechanics;
pub mod world_state;

pub use config::*;
pub use entities::*;
pub use mechanics::*;
pub use world_state::*;
