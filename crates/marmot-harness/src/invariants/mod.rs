//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold during a scenario.
//! Unlike example-based tests, which assert on one specific sequence of
//! events, invariants verify behavioral properties across whatever sequence
//! a scenario happened to drive.
//!
//! # Architecture
//!
//! Test code builds a [`ClusterSnapshot`] from a [`crate::SimCluster`]'s
//! controllers, then runs registered [`Invariant`] checks against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.assert_all(&snapshot, "after three-party invite");
//! ```

mod checks;
mod snapshot;

pub use checks::{EpochMonotonicity, GroupRootConsistency, RosterConsistency, SubscriptionCompleteness};
pub use snapshot::{ClusterSnapshot, MemberView};

/// An invariant violation with context.
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

/// An invariant that can be checked against a [`ClusterSnapshot`].
///
/// Invariants capture WHAT must be true, not a specific test scenario.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against `snapshot`, returning every violation
    /// found (empty if it holds).
    fn check(&self, snapshot: &ClusterSnapshot) -> Vec<Violation>;
}

/// A collection of invariants to check together.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// A registry with the standard set of cluster-wide invariants:
    /// [`EpochMonotonicity`], [`GroupRootConsistency`], [`RosterConsistency`],
    /// and [`SubscriptionCompleteness`].
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(EpochMonotonicity);
        registry.add(GroupRootConsistency);
        registry.add(RosterConsistency);
        registry.add(SubscriptionCompleteness);
        registry
    }

    /// Register an additional invariant.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check every registered invariant against `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns every violation found, across every invariant, if any.
    pub fn check_all(&self, snapshot: &ClusterSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> = self.invariants.iter().flat_map(|inv| inv.check(snapshot)).collect();
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check every registered invariant, panicking with full detail on the
    /// first failure. Test-only assertion helper; never called from engine code.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, snapshot: &ClusterSnapshot, context: &str) {
        if let Err(violations) = self.check_all(snapshot) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether the registry has no invariants registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_four_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn empty_snapshot_passes_every_invariant() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&ClusterSnapshot::empty()).is_ok());
    }
}
