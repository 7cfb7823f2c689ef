//! Binary-heap event queue with lazy cancellation.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use super::{EventKey, Scheduler, SimTime, Wakeup};

#[derive(Debug)]
struct Entry {
    at: SimTime,
    key: EventKey,
    wakeup: Wakeup,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap, we pop the earliest (time, key).
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Single-threaded virtual-time event queue.
///
/// Events at the same instant fire in scheduling order. Cancelled events stay
/// in the heap and are skipped when popped.
#[derive(Debug, Default)]
pub struct EventQueue {
    now: SimTime,
    next_key: u64,
    heap: BinaryHeap<Entry>,
    cancelled: HashSet<EventKey>,
}

impl EventQueue {
    /// Empty queue at time 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty queue whose clock starts at `now`.
    #[must_use]
    pub fn starting_at(now: SimTime) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    /// Number of live (not cancelled) pending events.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    /// Time of the next live event, if any.
    #[must_use]
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap
            .iter()
            .filter(|e| !self.cancelled.contains(&e.key))
            .max()
            .map(|e| e.at)
    }

    /// Pop the next live event, advancing the clock to its time.
    pub fn next_wakeup(&mut self) -> Option<Wakeup> {
        while let Some(entry) = self.heap.pop() {
            if self.cancelled.remove(&entry.key) {
                continue;
            }
            if entry.at > self.now {
                self.now = entry.at;
            }
            return Some(entry.wakeup);
        }
        None
    }

    /// Drain every event, passing each wakeup to `f` together with the queue.
    pub fn run<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Self, Wakeup),
    {
        while let Some(wakeup) = self.next_wakeup() {
            f(self, wakeup);
        }
    }

    /// Like [`EventQueue::run`] but stops before any event later than `until`,
    /// then advances the clock to `until`.
    pub fn run_until<F>(&mut self, until: SimTime, mut f: F)
    where
        F: FnMut(&mut Self, Wakeup),
    {
        while self.peek_time().is_some_and(|t| t <= until) {
            let Some(wakeup) = self.next_wakeup() else {
                break;
            };
            f(self, wakeup);
        }
        if until > self.now {
            self.now = until;
        }
    }
}

impl Scheduler for EventQueue {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule(&mut self, wakeup: Wakeup, delay: SimTime) -> EventKey {
        let key = EventKey(self.next_key);
        self.next_key += 1;
        self.heap.push(Entry {
            at: self.now + super::clamp_delay(delay),
            key,
            wakeup,
        });
        key
    }

    fn cancel(&mut self, key: EventKey) -> bool {
        if key.0 >= self.next_key || self.cancelled.contains(&key) {
            return false;
        }
        if !self.heap.iter().any(|e| e.key == key) {
            return false;
        }
        self.cancelled.insert(key)
    }
}
