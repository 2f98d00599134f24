//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold
//! across a cluster of members sharing one MLS group, independent of which
//! scenario drove them to the snapshot being checked.

use std::collections::HashMap;

use super::{ClusterSnapshot, Invariant, MemberView, Violation};

/// Epochs observed by any one member never decrease.
///
/// Grounded in the MLS guarantee that a commit strictly advances the group
/// epoch; a member's own `epoch_history` is just that member's view of the
/// commits it has merged, so it must be non-decreasing by construction.
pub struct EpochMonotonicity;

impl Invariant for EpochMonotonicity {
    fn name(&self) -> &'static str {
        "epoch_monotonicity"
    }

    fn check(&self, snapshot: &ClusterSnapshot) -> Vec<Violation> {
        let mut violations = Vec::new();
        for member in &snapshot.members {
            for window in member.epoch_history.windows(2) {
                if window[1] < window[0] {
                    violations.push(Violation {
                        invariant: self.name(),
                        message: format!(
                            "member {} observed epoch {} after epoch {}",
                            hex::encode(member.pubkey),
                            window[1],
                            window[0]
                        ),
                    });
                }
            }
        }
        violations
    }
}

/// Every member who has joined a group reports the same group root.
///
/// A cluster in these tests represents one MLS group; `derive_group_root`
/// is a pure function of the group's id, so any two members who have
/// actually joined the same group must agree on it regardless of epoch.
pub struct GroupRootConsistency;

impl Invariant for GroupRootConsistency {
    fn name(&self) -> &'static str {
        "group_root_consistency"
    }

    fn check(&self, snapshot: &ClusterSnapshot) -> Vec<Violation> {
        let mut roots = snapshot.members.iter().filter_map(|member| member.group_root.as_ref());
        let Some(first) = roots.next() else {
            return Vec::new();
        };

        let mut violations = Vec::new();
        for (member, root) in snapshot
            .members
            .iter()
            .filter_map(|member| member.group_root.as_ref().map(|root| (member, root)))
        {
            if root != first {
                violations.push(Violation {
                    invariant: self.name(),
                    message: format!(
                        "member {} reports group root {root}, expected {first}",
                        hex::encode(member.pubkey)
                    ),
                });
            }
        }
        violations
    }
}

/// Members who share the same current epoch agree on the roster.
///
/// MLS guarantees every member who has processed the commit that produced
/// epoch N holds the same ratchet tree at N, so their credential-derived
/// rosters (pubkey, admin flag) must match exactly.
pub struct RosterConsistency;

impl Invariant for RosterConsistency {
    fn name(&self) -> &'static str {
        "roster_consistency"
    }

    fn check(&self, snapshot: &ClusterSnapshot) -> Vec<Violation> {
        let mut by_epoch: HashMap<u64, Vec<&MemberView>> = HashMap::new();
        for member in &snapshot.members {
            if let Some(epoch) = member.epoch() {
                by_epoch.entry(epoch).or_default().push(member);
            }
        }

        let mut violations = Vec::new();
        for (epoch, members) in by_epoch {
            let Some((first, rest)) = members.split_first() else {
                continue;
            };
            let mut expected = first.roster.clone();
            expected.sort_unstable();

            for member in rest {
                let mut roster = member.roster.clone();
                roster.sort_unstable();
                if roster != expected {
                    violations.push(Violation {
                        invariant: self.name(),
                        message: format!(
                            "member {} disagrees with member {} on the roster at epoch {epoch}",
                            hex::encode(member.pubkey),
                            hex::encode(first.pubkey)
                        ),
                    });
                }
            }
        }
        violations
    }
}

/// Every other roster member is subscribed to once a commit has admitted
/// them.
///
/// After a member processes a commit that adds a peer, the engine queues a
/// `SubscribePeer` action for that peer's track (see `marmot-app`'s
/// controller); this invariant is the observable consequence of that: the
/// subscription set should be a superset of the roster, minus the member
/// itself.
pub struct SubscriptionCompleteness;

impl Invariant for SubscriptionCompleteness {
    fn name(&self) -> &'static str {
        "subscription_completeness"
    }

    fn check(&self, snapshot: &ClusterSnapshot) -> Vec<Violation> {
        let mut violations = Vec::new();
        for member in &snapshot.members {
            for (peer, _is_admin) in &member.roster {
                if *peer == member.pubkey {
                    continue;
                }
                if !member.subscribed_peers.contains(peer) {
                    violations.push(Violation {
                        invariant: self.name(),
                        message: format!(
                            "member {} has {} on its roster but no subscription to their track",
                            hex::encode(member.pubkey),
                            hex::encode(*peer)
                        ),
                    });
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(pubkey: u8, epoch_history: Vec<u64>, group_root: Option<&str>) -> MemberView {
        MemberView {
            pubkey: [pubkey; 32],
            epoch_history,
            group_root: group_root.map(str::to_string),
            roster: Vec::new(),
            subscribed_peers: std::collections::BTreeSet::new(),
        }
    }

    #[test]
    fn epoch_monotonicity_flags_a_regression() {
        let snapshot = ClusterSnapshot { members: vec![member(1, vec![0, 1, 0], None)] };
        let violations = EpochMonotonicity.check(&snapshot);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn epoch_monotonicity_allows_non_decreasing_history() {
        let snapshot = ClusterSnapshot { members: vec![member(1, vec![0, 1, 1, 2], None)] };
        assert!(EpochMonotonicity.check(&snapshot).is_empty());
    }

    #[test]
    fn group_root_consistency_flags_a_mismatch() {
        let snapshot = ClusterSnapshot {
            members: vec![member(1, vec![0], Some("aa")), member(2, vec![0], Some("bb"))],
        };
        assert_eq!(GroupRootConsistency.check(&snapshot).len(), 1);
    }

    #[test]
    fn subscription_completeness_flags_a_missing_subscription() {
        let mut member = member(1, vec![0], Some("aa"));
        member.roster = vec![([1; 32], true), ([2; 32], false)];
        let snapshot = ClusterSnapshot { members: vec![member] };
        let violations = SubscriptionCompleteness.check(&snapshot);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn subscription_completeness_passes_when_every_peer_is_subscribed() {
        let mut member = member(1, vec![0], Some("aa"));
        member.roster = vec![([1; 32], true), ([2; 32], false)];
        member.subscribed_peers.insert([2; 32]);
        let snapshot = ClusterSnapshot { members: vec![member] };
        assert!(SubscriptionCompleteness.check(&snapshot).is_empty());
    }
}
