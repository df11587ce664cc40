//! Application layer for Courier
//!
//! Generic session runtime that drives the Sans-IO
//! [`SyncController`](courier_client::SyncController) over real or simulated
//! I/O, so deterministic simulation tests exercise the same code that runs in
//! production.
//!
//! # Components
//!
//! - [`Driver`]: Trait for platform-specific connection I/O
//! - [`Runtime`]: Single-threaded orchestration loop over a Driver
//! - [`SessionHandle`]: Intents from the presentation layer
//! - [`SessionUpdate`]: What the presentation layer should redraw
//! - [`SystemEnv`]: Production environment (system clock, OS randomness)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod error;
mod runtime;
mod session;
mod system_env;

pub use driver::Driver;
pub use error::{RuntimeError, SessionError};
pub use runtime::Runtime;
pub use session::{SessionHandle, SessionUpdate, SessionUpdates};
pub use system_env::SystemEnv;
