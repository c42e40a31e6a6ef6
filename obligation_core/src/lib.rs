//! # Obligation Core
//!
//! The courier's obligation queue engine. This crate reads relationship state
//! from `courier_rules`, previews queue mutations, and commits them atomically.
//!
//! ## Core Components
//!
//! - **leverage**: Priority score per (NPC, category), cached per turn
//! - **queue**: Fixed-capacity ordered slots and their invariants
//! - **overlay**: Standing obligation rules layered over default behavior
//! - **planner**: Side-effect-free previews of every queue action
//! - **executor**: Commit-or-rollback application of plans and lifecycle changes
//! - **engine**: Facade owning all of the above
//!
//! ## Workflow
//!
//! Plan, inspect, execute. A plan never mutates anything; execution
//! re-validates the plan against current state and either commits every
//! effect or none.

pub mod engine;
pub mod error;
pub mod executor;
pub mod leverage;
pub mod overlay;
pub mod planner;
pub mod queue;

pub use engine::*;
pub use error::*;
pub use executor::*;
pub use leverage::*;
pub use overlay::*;
pub use planner::*;
pub use queue::*;
