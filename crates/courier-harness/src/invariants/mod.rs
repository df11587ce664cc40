//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold while a session runs.
//! Unlike example-based tests that check specific scenarios, invariants
//! verify behavioral properties across every execution path a simulation
//! explores.
//!
//! # Architecture
//!
//! The invariant system extracts observable state from a
//! [`courier_client::SyncController`] into a [`SessionSnapshot`], then runs
//! registered [`Invariant`] checks against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = SessionSnapshot::from_controller(&controller);
//! registry.check_all(&snapshot)?;
//! ```

mod checks;
mod snapshot;

pub use checks::{ActiveMeansOpen, OrderedViews, StopIsTerminal, StoreConsistency, UniqueMessages};
pub use snapshot::{SessionSnapshot, ViewSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against session state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &SessionSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
///
/// Use [`InvariantRegistry::standard()`] for the session invariants.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the standard session invariants.
    ///
    /// Includes:
    /// - [`UniqueMessages`]: no duplicate dedupe keys in a view
    /// - [`OrderedViews`]: views ordered by timestamp
    /// - [`StoreConsistency`]: store index matches its views
    /// - [`ActiveMeansOpen`]: Active only over an open connection
    /// - [`StopIsTerminal`]: nothing runs or redials after Stopped
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(UniqueMessages);
        registry.add(OrderedViews);
        registry.add(StoreConsistency);
        registry.add(ActiveMeansOpen);
        registry.add(StopIsTerminal);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether no invariant is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &SessionSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> = self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking on the first report.
    ///
    /// Use this in tests where you want immediate failure with context.
    #[allow(clippy::panic, reason = "test assertion helper")]
    pub fn assert_all(&self, state: &SessionSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }
}

#[cfg(test)]
mod tests {
    use courier_client::{SyncConfig, SyncController};

    use super::*;
    use crate::SimEnv;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn idle_controller_passes_invariants() {
        let controller = SyncController::new(SimEnv::with_seed(1), SyncConfig::default());
        let snapshot = SessionSnapshot::from_controller(&controller);

        assert!(InvariantRegistry::standard().check_all(&snapshot).is_ok());
    }
}
