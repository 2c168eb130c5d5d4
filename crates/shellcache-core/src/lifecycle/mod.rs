//! Lifecycle controller.
//!
//! A generation moves `Installing → Installed → Activating → {Ready, Failed}`.
//! The transitions themselves are pure (`machine`); `Generation` executes
//! their effects against the stores and the network.
//!
//! - Install stages the core set with cache bypass, all or nothing
//! - Activate prunes stale content, promotes staging, persists the snapshot
//! - Any activation error resets all three stores

pub mod generation;
pub mod machine;

pub use generation::{Generation, GenerationStatus, SyncContext};
pub use machine::{Phase, Signal};
