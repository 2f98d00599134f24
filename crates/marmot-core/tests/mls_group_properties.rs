//! Property and example-based tests for the MLS group commit lifecycle.
//!
//! These exercise the same invariants as `mls::group`'s own unit tests, but
//! from outside the crate, across arbitrary-length chains of membership
//! changes: pending commit is tracked after `add_members`/`remove_members`,
//! epoch advances by exactly one per merge, and a stale pending commit is
//! detected as timed out once it has outlived its deadline.

use std::time::{Duration, Instant};

use marmot_core::env::test_utils::MockEnv;
use marmot_core::mls::{Invitee, MlsAction, MlsGroup};
use proptest::prelude::*;

fn pubkey(byte: u8) -> [u8; 32] {
    [byte; 32]
}

fn add_one_member(env: &MockEnv, group: &mut MlsGroup<MockEnv>, invitee_byte: u8) {
    let (key_package_bytes, _pending_state) =
        MlsGroup::create_key_package(env.clone(), pubkey(invitee_byte)).expect("key package generation");
    let actions =
        group.add_members(&[Invitee { key_package_bytes, is_admin: false }]).expect("add_members succeeds");
    assert!(group.has_pending_commit(), "add_members must leave a pending commit");
    assert!(actions.iter().any(|a| matches!(a, MlsAction::Publish(_))), "add_members must publish a commit");
}

#[test]
fn add_members_sets_pending_commit() {
    let env = MockEnv::with_crypto_rng();
    let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
    assert!(!group.has_pending_commit(), "a fresh group has no pending commit");

    add_one_member(&env, &mut group, 2);
}

#[test]
fn remove_members_sets_pending_commit() {
    let env = MockEnv::with_crypto_rng();
    let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
    add_one_member(&env, &mut group, 2);
    group.merge_pending_commit().unwrap();
    assert!(!group.has_pending_commit());

    let actions = group.remove_members(&[pubkey(2)]).expect("remove_members succeeds");
    assert!(group.has_pending_commit(), "remove_members must leave a pending commit");
    assert!(actions.iter().any(|a| matches!(a, MlsAction::Publish(_))));
}

#[test]
fn merge_commit_advances_epoch_by_one() {
    let env = MockEnv::with_crypto_rng();
    let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
    let epoch_before = group.epoch();
    assert_eq!(epoch_before, 0);

    add_one_member(&env, &mut group, 2);
    assert_eq!(group.epoch(), epoch_before, "epoch must not advance until the commit is merged");

    group.merge_pending_commit().expect("merge succeeds");
    assert_eq!(group.epoch(), epoch_before + 1);
}

#[test]
fn pending_commit_cleared_after_merge() {
    let env = MockEnv::with_crypto_rng();
    let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
    add_one_member(&env, &mut group, 2);
    assert!(group.has_pending_commit());

    group.merge_pending_commit().unwrap();
    assert!(!group.has_pending_commit());
}

#[test]
fn commit_timeout_detection() {
    let env = MockEnv::with_crypto_rng();
    let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
    add_one_member(&env, &mut group, 2);

    let now = Instant::now();
    let timeout = Duration::from_secs(30);
    assert!(!group.is_commit_timeout(now, timeout), "must not be timed out immediately");

    let later = now + timeout + Duration::from_secs(1);
    assert!(group.is_commit_timeout(later, timeout));
}

#[test]
fn clear_pending_commit_without_merging_leaves_no_pending_commit() {
    let env = MockEnv::with_crypto_rng();
    let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
    add_one_member(&env, &mut group, 2);
    assert!(group.has_pending_commit());

    group.clear_pending_commit();
    assert!(!group.has_pending_commit());
    // The epoch stays put: the commit was abandoned, not merged.
    assert_eq!(group.epoch(), 0);
}

#[test]
fn sequential_commits_advance_epoch_correctly() {
    let env = MockEnv::with_crypto_rng();
    let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();

    for i in 1..=3u8 {
        let epoch_before = group.epoch();
        add_one_member(&env, &mut group, 100 + i);
        group.merge_pending_commit().unwrap();
        assert_eq!(group.epoch(), epoch_before + 1, "commit {i} should advance epoch by exactly 1");
    }

    assert_eq!(group.epoch(), 3);
    assert_eq!(group.list_members().unwrap().len(), 4);
}

proptest! {
    /// INVARIANT: for any chain of sequential add-then-merge commits (up to
    /// 8 invitees), the epoch ends exactly at the chain length and no
    /// pending commit is ever left outstanding between merges.
    #[test]
    fn epoch_tracks_commit_count_across_arbitrary_chain_lengths(chain_len in 0usize..8) {
        let env = MockEnv::with_crypto_rng();
        let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();

        for i in 0..chain_len {
            prop_assert!(!group.has_pending_commit());
            add_one_member(&env, &mut group, 10 + i as u8);
            group.merge_pending_commit().unwrap();
        }

        prop_assert_eq!(group.epoch(), chain_len as u64);
        prop_assert!(!group.has_pending_commit());
        prop_assert_eq!(group.list_members().unwrap().len(), chain_len + 1);
    }

    /// INVARIANT: a pending commit is timed out exactly when the elapsed
    /// duration is at least the configured timeout, for any elapsed/timeout
    /// pair (in whole seconds, to avoid sub-second rounding noise).
    #[test]
    fn commit_timeout_is_exact_at_the_boundary(elapsed_secs in 0u64..120, timeout_secs in 1u64..120) {
        let env = MockEnv::with_crypto_rng();
        let (mut group, _) = MlsGroup::create_group(env.clone(), pubkey(1), &[]).unwrap();
        add_one_member(&env, &mut group, 2);

        let now = Instant::now();
        let elapsed = Duration::from_secs(elapsed_secs);
        let timeout = Duration::from_secs(timeout_secs);
        let expected = elapsed >= timeout;

        prop_assert_eq!(group.is_commit_timeout(now + elapsed, timeout), expected);
    }
}
