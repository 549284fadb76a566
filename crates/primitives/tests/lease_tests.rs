//! LeaseCoordinator behavior over the in-memory backend
//!
//! Covers exclusive acquisition under contention, renewal, expiry, release
//! ownership and payload preservation.

use chrono::{TimeZone, Utc};
use keystone_core::{Context, ErrorKind};
use keystone_engine::{EntityStore, RetryConfig};
use keystone_primitives::{install_schemas, Clock, LeaseCoordinator, ManualClock};
use keystone_storage::MemoryDatabase;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn setup() -> (LeaseCoordinator<Arc<MemoryDatabase>>, Arc<ManualClock>) {
    let db = MemoryDatabase::new().with_retry(RetryConfig::new().with_max_retries(50));
    install_schemas(&db).unwrap();
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
    let coordinator =
        LeaseCoordinator::with_clock(EntityStore::new(Arc::new(db)), clock.clone());
    (coordinator, clock)
}

const TTL: Duration = Duration::from_secs(5);

// ============================================================================
// Acquisition
// ============================================================================

#[test]
fn test_scenario_expiry_hands_lock_to_waiting_worker() {
    let (leases, clock) = setup();
    let ctx = Context::background();

    leases.try_acquire(&ctx, "S1", "w1", TTL).unwrap();

    let err = leases.try_acquire(&ctx, "S1", "w2", TTL).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyLocked);
    assert_eq!(
        leases.read_lease(&ctx, "S1").unwrap().lock_holder_id.as_deref(),
        Some("w1")
    );

    clock.advance(Duration::from_secs(6));
    let lease = leases.try_acquire(&ctx, "S1", "w2", TTL).unwrap();
    assert_eq!(lease.lock_holder_id.as_deref(), Some("w2"));
}

#[test]
fn test_lock_held_until_exact_expiry() {
    let (leases, clock) = setup();
    let ctx = Context::background();

    leases.try_acquire(&ctx, "r", "w1", TTL).unwrap();
    clock.advance(Duration::from_secs(4));
    assert!(leases.try_acquire(&ctx, "r", "w2", TTL).is_err());
    clock.advance(Duration::from_secs(1));
    assert!(leases.try_acquire(&ctx, "r", "w2", TTL).is_ok());
}

#[test]
fn test_concurrent_acquire_has_one_winner() {
    for round in 0..10 {
        let (leases, _clock) = setup();
        let leases = Arc::new(leases);
        let barrier = Arc::new(Barrier::new(2));
        let resource = format!("resource-{}", round);

        let handles: Vec<_> = ["h1", "h2"]
            .into_iter()
            .map(|holder| {
                let leases = Arc::clone(&leases);
                let barrier = Arc::clone(&barrier);
                let resource = resource.clone();
                thread::spawn(move || {
                    barrier.wait();
                    leases.try_acquire(&Context::background(), &resource, holder, TTL)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "round {}: {:?}", round, results);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::AlreadyLocked);
    }
}

#[test]
fn test_renewal_extends_expiry() {
    let (leases, clock) = setup();
    let ctx = Context::background();

    let first = leases.try_acquire(&ctx, "r", "w1", TTL).unwrap();
    clock.advance(Duration::from_secs(2));
    let ttl2 = Duration::from_secs(30);
    let now = clock.now();
    let second = leases.try_acquire(&ctx, "r", "w1", ttl2).unwrap();

    let expected = now + chrono::Duration::from_std(ttl2).unwrap();
    assert!(second.expires_at.unwrap() >= expected);
    assert!(second.expires_at > first.expires_at);
}

#[test]
fn test_invalid_acquire_arguments() {
    let (leases, _clock) = setup();
    let ctx = Context::background();

    let err = leases.try_acquire(&ctx, "r", "w1", Duration::ZERO).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = leases.try_acquire(&ctx, "r", "", TTL).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(leases.read_lease(&ctx, "r").unwrap_err().is_not_found());
}

#[test]
fn test_cancelled_acquire_writes_nothing() {
    let (leases, _clock) = setup();
    let ctx = Context::background();
    ctx.cancel();

    let err = leases.try_acquire(&ctx, "r", "w1", TTL).unwrap_err();
    assert!(err.is_cancellation());
    assert!(leases
        .read_lease(&Context::background(), "r")
        .unwrap_err()
        .is_not_found());
}

// ============================================================================
// Release and payload
// ============================================================================

#[test]
fn test_release_by_other_holder_is_rejected() {
    let (leases, _clock) = setup();
    let ctx = Context::background();

    let held = leases.try_acquire(&ctx, "r", "h1", TTL).unwrap();
    let err = leases.release(&ctx, "r", "h2").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockNotOwned);
    assert_eq!(leases.read_lease(&ctx, "r").unwrap(), held);
}

#[test]
fn test_release_without_lease_is_rejected() {
    let (leases, _clock) = setup();
    let ctx = Context::background();

    let err = leases.release(&ctx, "never", "h1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockNotOwned);

    leases.try_acquire(&ctx, "r", "h1", TTL).unwrap();
    leases.release(&ctx, "r", "h1").unwrap();
    let err = leases.release(&ctx, "r", "h1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockNotOwned);
}

#[test]
fn test_release_frees_lock_and_keeps_row() {
    let (leases, _clock) = setup();
    let ctx = Context::background();

    leases.try_acquire(&ctx, "r", "h1", TTL).unwrap();
    leases.release(&ctx, "r", "h1").unwrap();

    let lease = leases.read_lease(&ctx, "r").unwrap();
    assert_eq!(lease.lock_holder_id, None);
    assert_eq!(lease.expires_at, None);
    leases.try_acquire(&ctx, "r", "h2", TTL).unwrap();
}

#[test]
fn test_payload_survives_release_and_reacquire() {
    let (leases, _clock) = setup();
    let ctx = Context::background();

    leases.try_acquire(&ctx, "r", "h1", TTL).unwrap();
    leases
        .update_payload(&ctx, "r", "h1", Some("gs://bucket/part-7".into()))
        .unwrap();
    leases.release(&ctx, "r", "h1").unwrap();
    assert_eq!(
        leases.read_lease(&ctx, "r").unwrap().payload.as_deref(),
        Some("gs://bucket/part-7")
    );

    let lease = leases.try_acquire(&ctx, "r", "h2", TTL).unwrap();
    assert_eq!(lease.payload.as_deref(), Some("gs://bucket/part-7"));
}

#[test]
fn test_update_payload_requires_row_and_ownership() {
    let (leases, clock) = setup();
    let ctx = Context::background();

    let err = leases
        .update_payload(&ctx, "r", "h1", Some("x".into()))
        .unwrap_err();
    assert!(err.is_not_found());

    leases.try_acquire(&ctx, "r", "h1", TTL).unwrap();
    let err = leases
        .update_payload(&ctx, "r", "h2", Some("x".into()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockNotOwned);

    clock.advance(Duration::from_secs(10));
    let err = leases
        .update_payload(&ctx, "r", "h1", Some("x".into()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockNotOwned);
    assert_eq!(leases.read_lease(&ctx, "r").unwrap().payload, None);
}
