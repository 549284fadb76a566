//! LeaseCoordinator: TTL-bounded exclusive worker locks
//!
//! ## States
//!
//! A resource is **unlocked** when it has no lease row, a row without a
//! holder, or a row whose `expires_at` is not after `now`. Otherwise it is
//! **locked** by `lock_holder_id` until `expires_at`.
//!
//! - Any worker may acquire an unlocked resource
//! - The current holder may re-acquire to extend the expiry (renewal)
//! - Only the current holder may release; release clears the holder and
//!   expiry but keeps the row
//!
//! The `payload` column is sideband state owned by the resource, not by the
//! holder. Acquire and release carry it over untouched; only
//! [`LeaseCoordinator::update_payload`] changes it.
//!
//! ## Atomicity
//!
//! Every operation is one read-inspect-mutate call, so the ownership check
//! and the conditional write commit together. Coordination happens only
//! through the store, which keeps the lease correct across processes.
//!
//! `now` is read inside the inspector, so a retried attempt re-evaluates
//! expiry against a fresh clock reading.

use crate::tables::LEASES_TABLE;
use chrono::{DateTime, Utc};
use keystone_core::{Context, Database, Error, Mutation, Result, Statement};
use keystone_engine::{EntityStore, Keyed};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Clock
// ============================================================================

/// Source of the current time for expiry decisions
pub trait Clock: Send + Sync + Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic expiry
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = chrono::Duration::from_std(by)
            .ok()
            .and_then(|by| now.checked_add_signed(by))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Jump to `at`
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ============================================================================
// Lease rows
// ============================================================================

/// One lease row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LeaseRecord {
    /// Locked resource
    #[serde(rename = "ResourceID")]
    pub resource_id: String,
    /// Current holder; `None` once released
    #[serde(rename = "LockHolderID")]
    pub lock_holder_id: Option<String>,
    /// End of the current lock; `None` once released
    pub expires_at: Option<DateTime<Utc>>,
    /// Sideband state that survives release and re-acquisition
    pub payload: Option<String>,
}

impl LeaseRecord {
    /// Holder of a lock that is still in force at `now`
    pub fn active_holder(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.lock_holder_id, self.expires_at) {
            (Some(holder), Some(expires_at)) if expires_at > now => Some(holder),
            _ => None,
        }
    }

    /// True if the lock is in force at `now`
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.active_holder(now).is_some()
    }
}

/// Mapper for the leases table
pub struct LeaseMapper;

impl Keyed for LeaseMapper {
    type Entity = LeaseRecord;
    type Key = String;
    const TABLE: &'static str = LEASES_TABLE;

    fn key_of(entity: &LeaseRecord) -> String {
        entity.resource_id.clone()
    }

    fn select_by_key(key: &String) -> Statement {
        Statement::new("SELECT * FROM Leases WHERE ResourceID = @resourceID")
            .bind("resourceID", key.as_str())
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// TTL lock coordinator over the entity store
#[derive(Debug, Clone)]
pub struct LeaseCoordinator<D> {
    store: EntityStore<D>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

/// TTL used by [`LeaseCoordinator::try_acquire_default`] unless configured
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(300);

impl<D: Database> LeaseCoordinator<D> {
    /// Coordinator using the wall clock
    pub fn new(store: EntityStore<D>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Coordinator using a custom clock
    pub fn with_clock(store: EntityStore<D>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            default_ttl: DEFAULT_LEASE_TTL,
        }
    }

    /// Replace the TTL used by [`try_acquire_default`](Self::try_acquire_default)
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// TTL used by [`try_acquire_default`](Self::try_acquire_default)
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// [`try_acquire`](Self::try_acquire) with the configured default TTL
    ///
    /// # Errors
    ///
    /// As [`try_acquire`](Self::try_acquire).
    pub fn try_acquire_default(
        &self,
        ctx: &Context,
        resource_id: &str,
        holder_id: &str,
    ) -> Result<LeaseRecord> {
        self.try_acquire(ctx, resource_id, holder_id, self.default_ttl)
    }

    /// Acquire or renew the lease on `resource_id` for `ttl`
    ///
    /// Returns the lease as written. Renewal by the current holder succeeds
    /// and moves the expiry to `now + ttl`.
    ///
    /// # Errors
    ///
    /// - `AlreadyLocked` if another holder's lock is in force; nothing is written
    /// - `InvalidInput` for an empty holder id or a zero TTL
    pub fn try_acquire(
        &self,
        ctx: &Context,
        resource_id: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<LeaseRecord> {
        if holder_id.is_empty() {
            return Err(Error::invalid_input("holder id must not be empty"));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .ok()
            .filter(|t| *t > chrono::Duration::zero())
            .ok_or_else(|| Error::invalid_input(format!("invalid lease ttl {:?}", ttl)))?;

        let key = resource_id.to_string();
        let mut granted = None;
        self.store
            .read_inspect_mutate::<LeaseMapper, _>(ctx, &key, |existing| {
                let now = self.clock.now();
                if let Some(holder) = existing.as_ref().and_then(|l| l.active_holder(now)) {
                    if holder != holder_id {
                        return Err(Error::AlreadyLocked {
                            resource_id: resource_id.to_string(),
                        });
                    }
                }
                let expires_at = now
                    .checked_add_signed(ttl)
                    .ok_or_else(|| Error::invalid_input("lease expiry out of range"))?;
                let lease = LeaseRecord {
                    resource_id: resource_id.to_string(),
                    lock_holder_id: Some(holder_id.to_string()),
                    expires_at: Some(expires_at),
                    payload: existing.and_then(|l| l.payload),
                };
                let mutation = Mutation::insert_or_update(LEASES_TABLE, &lease)?;
                granted = Some(lease);
                Ok(vec![mutation])
            })
            .map_err(|e| {
                debug!(target: "keystone::lease", resource_id, holder_id, error = %e, "Lease not acquired");
                e
            })?;

        let lease = granted.ok_or_else(|| Error::internal("lease write committed without a record"))?;
        debug!(
            target: "keystone::lease",
            resource_id,
            holder_id,
            expires_at = ?lease.expires_at,
            "Lease acquired"
        );
        Ok(lease)
    }

    /// Release the lease held by `holder_id`, keeping the payload
    ///
    /// # Errors
    ///
    /// `LockNotOwned` if there is no lease row, no holder, or a different holder.
    pub fn release(&self, ctx: &Context, resource_id: &str, holder_id: &str) -> Result<()> {
        let key = resource_id.to_string();
        self.store
            .read_inspect_mutate::<LeaseMapper, _>(ctx, &key, |existing| {
                let lease = match existing {
                    Some(lease) if lease.lock_holder_id.as_deref() == Some(holder_id) => lease,
                    _ => {
                        return Err(Error::LockNotOwned {
                            resource_id: resource_id.to_string(),
                            holder_id: holder_id.to_string(),
                        })
                    }
                };
                let cleared = LeaseRecord {
                    lock_holder_id: None,
                    expires_at: None,
                    ..lease
                };
                Ok(vec![Mutation::insert_or_update(LEASES_TABLE, &cleared)?])
            })?;
        debug!(target: "keystone::lease", resource_id, holder_id, "Lease released");
        Ok(())
    }

    /// Current lease row of `resource_id`
    ///
    /// # Errors
    ///
    /// `NotFound` if the resource was never leased.
    pub fn read_lease(&self, ctx: &Context, resource_id: &str) -> Result<LeaseRecord> {
        self.store.read_by_key::<LeaseMapper>(ctx, &resource_id.to_string())
    }

    /// Replace the sideband payload; the caller must hold the lock
    ///
    /// # Errors
    ///
    /// - `NotFound` if the resource was never leased
    /// - `LockNotOwned` if `holder_id` does not hold a lock in force
    pub fn update_payload(
        &self,
        ctx: &Context,
        resource_id: &str,
        holder_id: &str,
        payload: Option<String>,
    ) -> Result<()> {
        let key = resource_id.to_string();
        self.store
            .read_inspect_mutate::<LeaseMapper, _>(ctx, &key, |existing| {
                let lease = existing
                    .ok_or_else(|| Error::not_found(format!("lease {}", resource_id)))?;
                if lease.active_holder(self.clock.now()) != Some(holder_id) {
                    return Err(Error::LockNotOwned {
                        resource_id: resource_id.to_string(),
                        holder_id: holder_id.to_string(),
                    });
                }
                let updated = LeaseRecord {
                    payload: payload.clone(),
                    ..lease
                };
                Ok(vec![Mutation::insert_or_update(LEASES_TABLE, &updated)?])
            })
    }
}
