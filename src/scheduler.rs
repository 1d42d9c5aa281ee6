//! Cooperative Scheduler
//!
//! A single-threaded virtual clock holding timeouts, fixed-rate intervals and
//! animation-frame callbacks. Nothing here blocks: components schedule a task
//! and return, and the owner of the scheduler pops due tasks and dispatches
//! them in due-time order.
//!
//! Tasks due at the same instant fire in the order they were scheduled.

use std::collections::{BTreeMap, HashMap};

/// Default animation frame interval (~60 fps)
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

/// Handle to a scheduled task, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repeat {
    Once,
    Every(u64),
}

#[derive(Debug)]
struct Entry<T> {
    id: TimerId,
    repeat: Repeat,
    task: T,
}

/// Virtual-clock task scheduler
#[derive(Debug)]
pub struct Scheduler<T> {
    now_ms: u64,
    frame_interval_ms: u64,
    next_seq: u64,
    /// Pending entries keyed by (due time, insertion sequence)
    queue: BTreeMap<(u64, u64), Entry<T>>,
    /// Current queue key of every live timer
    keys: HashMap<TimerId, (u64, u64)>,
}

impl<T: Clone> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL_MS)
    }
}

impl<T: Clone> Scheduler<T> {
    /// Create a scheduler starting at t = 0
    ///
    /// # Arguments
    /// * `frame_interval_ms` - Spacing of animation frames (clamped to >= 1)
    pub fn new(frame_interval_ms: u64) -> Self {
        Self {
            now_ms: 0,
            frame_interval_ms: frame_interval_ms.max(1),
            next_seq: 0,
            queue: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }

    /// Current virtual time in milliseconds
    pub fn now(&self) -> u64 {
        self.now_ms
    }

    /// Animation frame spacing in milliseconds
    pub fn frame_interval(&self) -> u64 {
        self.frame_interval_ms
    }

    /// Run `task` once after `delay_ms`; due times saturate at `u64::MAX`
    pub fn set_timeout(&mut self, delay_ms: u64, task: T) -> TimerId {
        self.insert(self.now_ms.saturating_add(delay_ms), Repeat::Once, task)
    }

    /// Run `task` every `period_ms` until cancelled (period clamped to >= 1)
    pub fn set_interval(&mut self, period_ms: u64, task: T) -> TimerId {
        let period = period_ms.max(1);
        self.insert(self.now_ms.saturating_add(period), Repeat::Every(period), task)
    }

    /// Run `task` on the next animation frame
    ///
    /// Frames fall on multiples of the frame interval, so every request made
    /// during the same frame lands on the same following frame.
    pub fn request_frame(&mut self, task: T) -> TimerId {
        let next_frame =
            (self.now_ms / self.frame_interval_ms + 1).saturating_mul(self.frame_interval_ms);
        self.insert(next_frame, Repeat::Once, task)
    }

    /// Cancel a pending task. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.keys.remove(&id) {
            Some(key) => self.queue.remove(&key).is_some(),
            None => false,
        }
    }

    /// Check whether a timer is still pending
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.keys.contains_key(&id)
    }

    /// Number of pending tasks
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Due time of the earliest pending task
    pub fn next_due(&self) -> Option<u64> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    /// Move the clock forward without firing anything. Never moves backwards.
    pub fn advance_to(&mut self, t_ms: u64) {
        self.now_ms = self.now_ms.max(t_ms);
    }

    /// Pop the earliest task due at or before `until_ms`
    ///
    /// The clock moves to the task's due time. Intervals are re-armed before
    /// the task is handed out, so the task may cancel its own timer.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<(TimerId, T)> {
        let (&key, _) = self.queue.iter().next()?;
        if key.0 > until_ms {
            return None;
        }
        let entry = self.queue.remove(&key)?;
        self.keys.remove(&entry.id);
        self.now_ms = self.now_ms.max(key.0);

        if let Repeat::Every(period) = entry.repeat {
            let seq = self.bump_seq();
            let next_key = (key.0.saturating_add(period), seq);
            self.keys.insert(entry.id, next_key);
            self.queue.insert(
                next_key,
                Entry {
                    id: entry.id,
                    repeat: entry.repeat,
                    task: entry.task.clone(),
                },
            );
        }

        Some((entry.id, entry.task))
    }

    fn insert(&mut self, due: u64, repeat: Repeat, task: T) -> TimerId {
        let seq = self.bump_seq();
        let id = TimerId(seq);
        self.keys.insert(id, (due, seq));
        self.queue.insert((due, seq), Entry { id, repeat, task });
        id
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}
