//! Bounded window of recently seen push event ids.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use crate::models::EventId;

/// Remembers event ids by count and by age, whichever bound is hit first.
#[derive(Debug, Clone)]
pub struct RecentEvents {
    capacity: usize,
    max_age: Duration,
    order: VecDeque<(EventId, Instant)>,
    seen: HashSet<EventId>,
}

impl RecentEvents {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            max_age,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Record `id`; returns false if it is already in the window.
    pub fn insert(&mut self, id: EventId) -> bool {
        self.insert_at(id, Instant::now())
    }

    pub(crate) fn insert_at(&mut self, id: EventId, now: Instant) -> bool {
        self.evict_expired(now);
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back((id, now));
        while self.order.len() > self.capacity {
            if let Some((oldest, _)) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(&(id, seen_at)) = self.order.front() {
            if now.saturating_duration_since(seen_at) <= self.max_age {
                break;
            }
            self.order.pop_front();
            self.seen.remove(&id);
        }
    }
}
