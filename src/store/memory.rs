//! In-memory player store for local runs and tests

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::players::{BattleRecord, PlayerProfile};
use crate::game::rewards::PlayerStats;

#[derive(Default)]
pub struct MemoryStore {
    players: DashMap<Uuid, PlayerProfile>,
    battles: Mutex<Vec<BattleRecord>>,
    stat_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_player(&self, user_id: Uuid, default_name: &str) -> PlayerProfile {
        self.players
            .entry(user_id)
            .or_insert_with(|| PlayerProfile::new(user_id, default_name))
            .clone()
    }

    /// Insert or replace a profile
    pub fn put_player(&self, profile: PlayerProfile) {
        self.players.insert(profile.user_id, profile);
    }

    pub fn player(&self, user_id: Uuid) -> Option<PlayerProfile> {
        self.players.get(&user_id).map(|p| p.clone())
    }

    /// Returns false when the player is unknown
    pub fn update_stats(&self, user_id: Uuid, stats: PlayerStats) -> bool {
        self.stat_writes.fetch_add(1, Ordering::Relaxed);
        match self.players.get_mut(&user_id) {
            Some(mut profile) => {
                profile.set_stats(stats);
                true
            }
            None => false,
        }
    }

    pub fn save_battle(&self, record: BattleRecord) {
        self.battles.lock().push(record);
    }

    pub fn battles(&self) -> Vec<BattleRecord> {
        self.battles.lock().clone()
    }

    /// Number of stat updates attempted
    pub fn stat_writes(&self) -> usize {
        self.stat_writes.load(Ordering::Relaxed)
    }
}
