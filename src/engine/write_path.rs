//! Engine write-path helpers.
//!
//! Every write to the target store goes through here: the throttle spacing
//! consecutive writes, and the idempotent claim merge.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::claim::Claim;
use crate::entity::{Entity, EntityId};
use crate::error::{ImportError, ImportResult, WriteTarget};
use crate::storage::{KnowledgeStore, StoreError};
use crate::value::Value;

/// Enforces a minimum spacing between consecutive writes.
///
/// Shared by reference between the importer and the mergers it drives.
#[derive(Debug)]
pub struct WriteThrottle {
    min_interval: Duration,
    last_write: Mutex<Option<Instant>>,
}

impl WriteThrottle {
    /// A throttle allowing one write per `min_interval`. Zero disables it.
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_write: Mutex::new(None),
        }
    }

    /// Same as [`WriteThrottle::new`] with milliseconds.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Blocks until the next write is allowed, then records it.
    pub fn wait(&self) {
        let mut last_write = self.last_write.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = *last_write {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        *last_write = Some(Instant::now());
    }

    /// Configured spacing between writes.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

impl Default for WriteThrottle {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

/// Outcome of an idempotent write.
#[derive(Debug, Clone, PartialEq)]
pub enum Merged<T> {
    /// Already present; nothing was written.
    Existing(T),
    /// Newly written.
    Added(T),
}

impl<T> Merged<T> {
    /// True when this call wrote something.
    #[must_use]
    pub const fn is_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }

    /// The merged item, whether new or existing.
    #[must_use]
    pub const fn get(&self) -> &T {
        match self {
            Self::Existing(v) | Self::Added(v) => v,
        }
    }

    /// Consumes the outcome, returning the item.
    pub fn into_inner(self) -> T {
        match self {
            Self::Existing(v) | Self::Added(v) => v,
        }
    }
}

pub(crate) fn rejected(target: WriteTarget) -> impl FnOnce(StoreError) -> ImportError {
    move |err| ImportError::write_rejected(target, err.to_string())
}

/// Adds `property = value` to `local` unless an equal claim already exists.
///
/// A new claim is also appended to `local`, so a duplicate later in the same
/// pass is found without re-reading the entity.
///
/// # Errors
///
/// `WriteRejected` with target `claim` when the store refuses the write.
pub fn add_claim(
    store: &dyn KnowledgeStore,
    throttle: &WriteThrottle,
    local: &mut Entity,
    property: &EntityId,
    value: &Value,
) -> ImportResult<Merged<Claim>> {
    if let Some(existing) = local.claims_for(property).iter().find(|c| c.asserts(property, value)) {
        return Ok(Merged::Existing(existing.clone()));
    }

    throttle.wait();
    let claim = store
        .write_claim(&local.id, property, value)
        .map_err(rejected(WriteTarget::Claim))?;
    info!(entity = %local.id, property = %property, value = %value, "claim added");

    local.push_claim(claim.clone());
    Ok(Merged::Added(claim))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::NewEntity;
    use crate::storage::InMemoryStore;
    use crate::value::Quantity;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn store_with_entity() -> (InMemoryStore, Entity) {
        let store = InMemoryStore::new("local");
        let mut data = NewEntity::default();
        data.labels.insert("en".into(), "A".into());
        let entity = store.create_entity(data).unwrap();
        (store, entity)
    }

    #[test]
    fn add_claim_is_idempotent() {
        let (store, mut local) = store_with_entity();
        let throttle = WriteThrottle::default();

        let human = Value::from(id("Q5"));
        let first = add_claim(&store, &throttle, &mut local, &id("P31"), &human).unwrap();
        assert!(first.is_added());
        let second = add_claim(&store, &throttle, &mut local, &id("P31"), &human).unwrap();
        assert!(!second.is_added());
        assert_eq!(first.get().id, second.get().id);

        assert_eq!(store.stats().claims_written, 1);
        assert_eq!(store.fetch_entity(&local.id).unwrap().unwrap().claim_count(), 1);
    }

    #[test]
    fn equality_is_semantic() {
        let (store, mut local) = store_with_entity();
        let throttle = WriteThrottle::default();
        let a = Value::from(Quantity::new("+10"));
        let b = Value::from(Quantity::new("10.0"));
        add_claim(&store, &throttle, &mut local, &id("P1"), &a).unwrap();
        assert!(!add_claim(&store, &throttle, &mut local, &id("P1"), &b).unwrap().is_added());
        // Same value under another property is a different claim.
        assert!(add_claim(&store, &throttle, &mut local, &id("P2"), &a).unwrap().is_added());
    }

    #[test]
    fn rejected_write_is_reported() {
        let (store, mut local) = store_with_entity();
        store.reject_writes_for(id("P18")).unwrap();
        let throttle = WriteThrottle::default();
        let err = add_claim(&store, &throttle, &mut local, &id("P18"), &Value::from("x"))
            .unwrap_err();
        assert!(matches!(err, ImportError::WriteRejected { target: WriteTarget::Claim, .. }));
        assert_eq!(local.claim_count(), 0);
    }

    #[test]
    fn throttle_spaces_writes() {
        let throttle = WriteThrottle::from_millis(30);
        let start = Instant::now();
        throttle.wait();
        throttle.wait();
        throttle.wait();
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn zero_throttle_never_sleeps() {
        let throttle = WriteThrottle::default();
        let start = Instant::now();
        for _ in 0..100 {
            throttle.wait();
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
