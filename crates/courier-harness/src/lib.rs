//! Deterministic simulation harness for Courier sessions.
//!
//! Seeded and scripted implementations of the session's collaborators:
//!
//! - [`SimEnv`]: seeded jitter entropy over tokio's (pausable) clock
//! - [`SimRelay`] / [`SimDriver`]: a relay that records every frame it gets
//! - [`SimDirectory`]: an in-memory directory with injectable failures
//!
//! The same doubles plug into [`courier_app::Runtime`] for async scenario
//! tests under a paused clock, and into [`SimWorld`], which steps a
//! controller synchronously so property tests control every interleaving.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. [`SimWorld`] runs [`InvariantRegistry::standard()`] after every
//! step.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod operation;
pub mod sim_directory;
pub mod sim_driver;
pub mod sim_env;
pub mod world;

pub use invariants::{
    ActiveMeansOpen, Invariant, InvariantRegistry, InvariantResult, OrderedViews, SessionSnapshot,
    StopIsTerminal, StoreConsistency, UniqueMessages, ViewSnapshot, Violation,
};
pub use operation::Operation;
pub use sim_directory::{DirectoryOp, SimDirectory};
pub use sim_driver::{SimDriver, SimDriverError, SimRelay, relay_epoch};
pub use sim_env::SimEnv;
pub use world::SimWorld;
