//! Skill-sorted matchmaking queue

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// Which skill metric a queue pairs by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Pairs by rank
    Ranked,
    /// Pairs by level
    Level,
}

impl QueueKind {
    pub fn from_ranked(ranked: bool) -> Self {
        if ranked {
            QueueKind::Ranked
        } else {
            QueueKind::Level
        }
    }

    pub fn is_ranked(self) -> bool {
        self == QueueKind::Ranked
    }
}

/// Player waiting for an opponent
#[derive(Debug, Clone)]
pub struct WaitingClient<T> {
    pub user_id: Uuid,
    /// Rank or level, depending on the queue
    pub skill: i32,
    pub enqueued_at: Instant,
    /// Current tolerance around `skill`
    pub range: i32,
    pub ticket: T,
}

impl<T> WaitingClient<T> {
    fn reaches(&self, skill: i32) -> bool {
        self.skill + self.range >= skill
    }
}

/// The matchmaking queue, kept sorted ascending by skill
pub struct MatchmakingQueue<T> {
    waiting: Vec<WaitingClient<T>>,
    max_range: i32,
    expand_interval: Duration,
}

impl<T> MatchmakingQueue<T> {
    pub fn new(max_range: i32, expand_interval: Duration) -> Self {
        Self {
            waiting: Vec::new(),
            max_range,
            expand_interval,
        }
    }

    /// Add a player, replacing any entry they already had
    pub fn enqueue(&mut self, user_id: Uuid, skill: i32, ticket: T, now: Instant) {
        self.dequeue(user_id);
        let position = self.waiting.partition_point(|w| w.skill <= skill);
        self.waiting.insert(
            position,
            WaitingClient {
                user_id,
                skill,
                enqueued_at: now,
                range: 0,
                ticket,
            },
        );
    }

    /// Remove a player from the queue
    pub fn dequeue(&mut self, user_id: Uuid) -> Option<WaitingClient<T>> {
        let position = self.waiting.iter().position(|w| w.user_id == user_id)?;
        Some(self.waiting.remove(position))
    }

    /// Check if a player is in the queue
    pub fn contains(&self, user_id: &Uuid) -> bool {
        self.waiting.iter().any(|w| &w.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WaitingClient<T>> {
        self.waiting.iter()
    }

    /// Tolerance after waiting `waited`
    pub fn range_after(&self, waited: Duration) -> i32 {
        if self.expand_interval.is_zero() {
            return self.max_range;
        }
        let steps = waited.as_millis() / self.expand_interval.as_millis();
        steps.min(self.max_range.max(0) as u128) as i32
    }

    fn expand_ranges(&mut self, now: Instant) {
        for i in 0..self.waiting.len() {
            let waited = now.saturating_duration_since(self.waiting[i].enqueued_at);
            self.waiting[i].range = self.range_after(waited);
        }
    }

    /// Pair every mutually compatible couple, in sorted order
    pub fn find_matches(&mut self, now: Instant) -> Vec<(WaitingClient<T>, WaitingClient<T>)> {
        self.expand_ranges(now);

        let mut pairs = Vec::new();
        while let Some((i, j)) = self.next_pair() {
            // j > i, so removing j first keeps i valid
            let second = self.waiting.remove(j);
            let first = self.waiting.remove(i);
            pairs.push((first, second));
        }
        pairs
    }

    fn next_pair(&self) -> Option<(usize, usize)> {
        for i in 0..self.waiting.len() {
            let first = &self.waiting[i];
            for j in i + 1..self.waiting.len() {
                let second = &self.waiting[j];
                if first.reaches(second.skill) && second.reaches(first.skill) {
                    return Some((i, j));
                }
                // Sorted: nobody further right is reachable either
                if !first.reaches(second.skill) {
                    break;
                }
            }
        }
        None
    }
}
