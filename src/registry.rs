//! Concurrency-safe session registry.
//!
//! Sessions live in a vector of slots guarded by a single lock. The vector grows
//! by doubling when no slot is free and shrinks by halving once occupancy drops
//! to a quarter of capacity and the tail is empty.
//!
//! Callbacks passed to [`Registry::find_first`] and [`Registry::find_all`] run
//! with the lock held. They must not block or call back into the registry.
//!
//! Removing a stream session from another context is a two-step handoff: the
//! slot is marked `Closing` under the lock, the worker is cancelled and joined
//! outside it, and the worker frees the slot itself via [`Registry::release`]
//! on its way out. A slot is therefore never reused while its worker runs.

use crate::error::CapacityError;
use crate::session::{Session, SessionId};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default smallest capacity.
pub const DEFAULT_MIN_CAPACITY: usize = 5;

/// Default largest capacity.
pub const DEFAULT_MAX_CAPACITY: usize = 20;

#[derive(Debug)]
enum Slot {
    Vacant,
    Occupied(Box<Session>),
    /// Session taken out for teardown; its worker has not released it yet.
    Closing(SessionId),
}

impl Slot {
    fn is_vacant(&self) -> bool {
        matches!(self, Slot::Vacant)
    }

    fn session(&self) -> Option<&Session> {
        match self {
            Slot::Occupied(session) => Some(&**session),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Registry {
    slots: Mutex<Vec<Slot>>,
    current: AtomicUsize,
    total: AtomicU64,
    min_capacity: usize,
    max_capacity: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CAPACITY, DEFAULT_MAX_CAPACITY)
    }
}

impl Registry {
    pub fn new(min_capacity: usize, max_capacity: usize) -> Self {
        let min_capacity = min_capacity.max(1);
        let max_capacity = max_capacity.max(min_capacity);
        let mut slots = Vec::with_capacity(max_capacity);
        slots.resize_with(min_capacity, || Slot::Vacant);

        Self {
            slots: Mutex::new(slots),
            current: AtomicUsize::new(0),
            total: AtomicU64::new(0),
            min_capacity,
            max_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the session produced by `build` in a free slot.
    ///
    /// `build` receives the new id and runs under the registry lock, so a
    /// worker it spawns can never observe its own slot missing.
    pub fn allocate<F>(&self, build: F) -> Result<SessionId, CapacityError>
    where
        F: FnOnce(SessionId) -> Session,
    {
        let mut slots = self.lock();
        self.shrink_locked(&mut slots);

        let idx = match slots.iter().position(Slot::is_vacant) {
            Some(idx) => idx,
            None => {
                let old = slots.len();
                if old >= self.max_capacity {
                    return Err(CapacityError { capacity: old });
                }
                let new = (old * 2).min(self.max_capacity);
                slots.resize_with(new, || Slot::Vacant);
                tracing::debug!(from = old, to = new, "registry grown");
                old
            }
        };

        let id = SessionId(self.total.fetch_add(1, Ordering::SeqCst) + 1);
        slots[idx] = Slot::Occupied(Box::new(build(id)));
        self.current.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    /// Applies `consume` to the first session matching `pred`.
    pub fn find_first<P, C, R>(&self, pred: P, consume: C) -> Option<R>
    where
        P: Fn(&Session) -> bool,
        C: FnOnce(&mut Session) -> R,
    {
        let mut slots = self.lock();
        for slot in slots.iter_mut() {
            if let Slot::Occupied(session) = slot {
                if pred(&**session) {
                    return Some(consume(&mut **session));
                }
            }
        }
        None
    }

    /// Applies `consume` to every session matching `pred`; returns how many matched.
    pub fn find_all<P, C>(&self, pred: P, mut consume: C) -> usize
    where
        P: Fn(&Session) -> bool,
        C: FnMut(&mut Session),
    {
        let mut slots = self.lock();
        let mut matched = 0;
        for slot in slots.iter_mut() {
            if let Slot::Occupied(session) = slot {
                if pred(&**session) {
                    consume(&mut **session);
                    matched += 1;
                }
            }
        }
        matched
    }

    /// Convenience lookup by id.
    pub fn with_session<C, R>(&self, id: SessionId, consume: C) -> Option<R>
    where
        C: FnOnce(&mut Session) -> R,
    {
        self.find_first(|session| session.id == id, consume)
    }

    /// Destroys the first session matching `pred`, returning its id.
    pub async fn delete_first_if<P>(&self, pred: P) -> Option<SessionId>
    where
        P: Fn(&Session) -> bool,
    {
        let session = {
            let mut slots = self.lock();
            let idx = slots
                .iter()
                .position(|slot| slot.session().is_some_and(&pred))?;
            self.take_locked(&mut slots, idx)?
        };
        let id = session.id;
        session.close().await;
        Some(id)
    }

    /// Destroys every session matching `pred`, returning how many were removed.
    pub async fn delete_all_if<P>(&self, pred: P) -> usize
    where
        P: Fn(&Session) -> bool,
    {
        let mut doomed = Vec::new();
        {
            let mut slots = self.lock();
            let matching: Vec<usize> = slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.session().is_some_and(&pred))
                .map(|(idx, _)| idx)
                .collect();
            for idx in matching {
                if let Some(session) = self.take_locked(&mut slots, idx) {
                    doomed.push(session);
                }
            }
        }

        let removed = doomed.len();
        for session in doomed {
            session.close().await;
        }
        removed
    }

    /// Frees the slot of `id`; called by a stream worker as it exits.
    ///
    /// Works whether the session is still occupied (hangup, logout) or was
    /// already marked closing by a kill.
    pub fn release(&self, id: SessionId) -> bool {
        let mut slots = self.lock();
        let found = slots.iter().position(|slot| match slot {
            Slot::Occupied(session) => session.id == id,
            Slot::Closing(closing) => *closing == id,
            Slot::Vacant => false,
        });
        match found {
            Some(idx) => {
                slots[idx] = Slot::Vacant;
                self.current.fetch_sub(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Destroys every session. Used at shutdown.
    pub async fn drain(&self) -> usize {
        self.delete_all_if(|_| true).await
    }

    /// Shrinks the slot vector if occupancy allows; returns whether it shrank.
    #[cfg(test)]
    pub fn shrink(&self) -> bool {
        let mut slots = self.lock();
        self.shrink_locked(&mut slots)
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn total_issued(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    /// Moves a session out of slot `idx`.
    ///
    /// Sessions with a worker leave a `Closing` marker behind and stay counted
    /// until the worker releases them; the rest are reclaimed immediately.
    fn take_locked(&self, slots: &mut [Slot], idx: usize) -> Option<Session> {
        if !matches!(slots[idx], Slot::Occupied(_)) {
            return None;
        }
        let Slot::Occupied(session) = std::mem::replace(&mut slots[idx], Slot::Vacant) else {
            return None;
        };
        if session.has_worker() {
            slots[idx] = Slot::Closing(session.id);
        } else {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
        Some(*session)
    }

    fn shrink_locked(&self, slots: &mut Vec<Slot>) -> bool {
        let capacity = slots.len();
        if capacity <= self.min_capacity || self.current_count() > capacity / 4 {
            return false;
        }

        let target = (capacity / 2).max(self.min_capacity);
        if !slots.iter().skip(target).all(Slot::is_vacant) {
            return false;
        }

        slots.truncate(target);
        tracing::debug!(from = capacity, to = target, "registry shrunk");
        true
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
