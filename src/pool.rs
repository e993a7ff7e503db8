//! Fixed-capacity table of session slots.
//!
//! Each active match owns exactly one slot. Allocation is the only place
//! matches contend with each other: the table lock is held for a
//! scan-and-mark and never across a match.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Index of a slot in its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ownership record for one match.
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    active: bool,
    claimed_at: Option<Instant>,
}

impl SessionSlot {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// When the current match claimed this slot.
    pub fn claimed_at(&self) -> Option<Instant> {
        self.claimed_at
    }
}

pub struct SessionPool {
    capacity: usize,
    slots: Mutex<Vec<SessionSlot>>,
}

impl SessionPool {
    /// Create a pool with `capacity` inactive slots. The capacity never
    /// changes afterwards.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(vec![SessionSlot::default(); capacity]),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock cannot leave a slot half-marked, so a
    // poisoned table is still consistent.
    fn table(&self) -> MutexGuard<'_, Vec<SessionSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the first inactive slot. `None` means the pool is full.
    pub fn claim_slot(&self) -> Option<SlotId> {
        let mut slots = self.table();
        let (index, slot) = slots.iter_mut().enumerate().find(|(_, s)| !s.active)?;
        slot.active = true;
        slot.claimed_at = Some(Instant::now());
        Some(SlotId(index))
    }

    /// Mark a slot inactive. Releasing an inactive slot is a no-op.
    pub fn release_slot(&self, id: SlotId) {
        if let Some(slot) = self.table().get_mut(id.0) {
            slot.active = false;
            slot.claimed_at = None;
        }
    }

    pub fn is_active(&self, id: SlotId) -> bool {
        self.table().get(id.0).is_some_and(SessionSlot::is_active)
    }

    /// When the match holding `id` claimed it, or `None` if the slot is free.
    pub fn claimed_at(&self, id: SlotId) -> Option<Instant> {
        self.table().get(id.0).and_then(SessionSlot::claimed_at)
    }

    pub fn active_count(&self) -> usize {
        self.table().iter().filter(|s| s.active).count()
    }

    /// Claim a slot wrapped in a lease that frees it when dropped.
    pub fn lease(self: &Arc<Self>) -> Option<SlotLease> {
        let id = self.claim_slot()?;
        Some(SlotLease {
            pool: Arc::clone(self),
            id,
            released: false,
        })
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("capacity", &self.capacity)
            .field("active", &self.active_count())
            .finish()
    }
}

/// A claimed slot. The slot is released exactly once, by [`SlotLease::release`]
/// or on drop.
pub struct SlotLease {
    pool: Arc<SessionPool>,
    id: SlotId,
    released: bool,
}

impl SlotLease {
    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.release_slot(self.id);
        }
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for SlotLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotLease")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}
