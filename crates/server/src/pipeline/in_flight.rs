//! Per-fingerprint request collapsing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    /// Holders plus parked waiters.
    claims: usize,
}

/// Serializes requests that share a fingerprint.
///
/// Holders of the same key run one at a time; the map entry is dropped once
/// the last holder or waiter goes away, including waiters cancelled mid-wait.
#[derive(Debug, Default)]
pub struct InFlight {
    slots: Mutex<HashMap<String, Slot>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive use of `key`.
    pub async fn acquire(&self, key: &str) -> InFlightSlot<'_> {
        let lock = {
            let mut slots = self.slots();
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot { lock: Arc::default(), claims: 0 });
            slot.claims += 1;
            Arc::clone(&slot.lock)
        };

        // The claim is released on drop even if this future is dropped while parked.
        let mut held = InFlightSlot { owner: self, key: key.to_string(), guard: None };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    /// Number of keys currently held or awaited.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claim on one fingerprint; exclusive once `acquire` returns, released on drop.
#[derive(Debug)]
pub struct InFlightSlot<'a> {
    owner: &'a InFlight,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let mut slots = self.owner.slots();
        self.guard.take();
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.claims = slot.claims.saturating_sub(1);
            if slot.claims == 0 {
                slots.remove(&self.key);
            }
        }
    }
}
