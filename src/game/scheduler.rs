//! Cancellable timers driven by the match clock

use std::collections::{BTreeMap, HashMap};

/// Handle to a scheduled timer. Ids are never reused, so a stale handle can
/// never cancel or match a newer timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Ordered timer queue. Timers due at the same instant fire in scheduling
/// order.
#[derive(Debug)]
pub struct Scheduler<E> {
    next_id: u64,
    queue: BTreeMap<(u64, TimerId), E>,
    due_by_id: HashMap<TimerId, u64>,
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            queue: BTreeMap::new(),
            due_by_id: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, due_at: u64, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.queue.insert((due_at, id), event);
        self.due_by_id.insert(id, due_at);
        id
    }

    /// Cancel a pending timer. Returns false if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.due_by_id.remove(&id) {
            Some(due_at) => self.queue.remove(&(due_at, id)).is_some(),
            None => false,
        }
    }

    /// Cancel the timer in `slot` (if any) and clear the slot
    pub fn cancel_slot(&mut self, slot: &mut Option<TimerId>) {
        if let Some(id) = slot.take() {
            self.cancel(id);
        }
    }

    /// Cancel every pending timer whose event matches
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&E) -> bool) -> usize {
        let doomed: Vec<(u64, TimerId)> = self
            .queue
            .iter()
            .filter(|(_, event)| predicate(event))
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            self.queue.remove(key);
            self.due_by_id.remove(&key.1);
        }
        doomed.len()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.due_by_id.contains_key(&id)
    }

    /// Remove and return the earliest timer due at or before `now`
    pub fn pop_due(&mut self, now: u64) -> Option<(TimerId, u64, E)> {
        let (&(due_at, id), _) = self.queue.iter().next()?;
        if due_at > now {
            return None;
        }
        let event = self.queue.remove(&(due_at, id))?;
        self.due_by_id.remove(&id);
        Some((id, due_at, event))
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.keys().next().map(|(due_at, _)| *due_at)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}
