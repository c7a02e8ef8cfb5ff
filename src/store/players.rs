//! Player profiles and battle records

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::supabase::{SupabaseClient, SupabaseError};
use crate::game::rewards::PlayerStats;

const PUBLIC_ID_LEN: usize = 8;
const PUBLIC_ID_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Character every new player starts with
pub const STARTER_CHARACTER_ID: u32 = 1;

/// Player profile as stored in the players table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub user_id: Uuid,
    /// Short code other players see
    pub public_id: String,
    pub display_name: String,
    pub level: i32,
    pub rank: i32,
    pub money: i32,
    pub character_id: u32,
}

impl PlayerProfile {
    pub fn new(user_id: Uuid, display_name: &str) -> Self {
        Self {
            user_id,
            public_id: generate_public_id(),
            display_name: display_name.to_string(),
            level: 0,
            rank: 0,
            money: 0,
            character_id: STARTER_CHARACTER_ID,
        }
    }

    pub fn stats(&self) -> PlayerStats {
        PlayerStats {
            level: self.level,
            rank: self.rank,
            money: self.money,
        }
    }

    pub fn set_stats(&mut self, stats: PlayerStats) {
        self.level = stats.level;
        self.rank = stats.rank;
        self.money = stats.money;
    }
}

/// Random public id, e.g. `K7XQ2MPA`
pub fn generate_public_id() -> String {
    let mut rng = rand::thread_rng();
    (0..PUBLIC_ID_LEN)
        .map(|_| PUBLIC_ID_CHARSET[rng.gen_range(0..PUBLIC_ID_CHARSET.len())] as char)
        .collect()
}

/// Persisted outcome of one battle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub id: Uuid,
    pub player1_id: Uuid,
    pub player2_id: Uuid,
    /// None for a draw
    pub winner_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_ranked: bool,
}

/// Stats update
#[derive(Debug, Clone, Serialize)]
struct StatsUpdate {
    level: i32,
    rank: i32,
    money: i32,
}

/// Player operations against Supabase
#[derive(Clone)]
pub struct PlayerRepository {
    client: SupabaseClient,
}

impl PlayerRepository {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    pub async fn get_player(&self, user_id: Uuid) -> Result<Option<PlayerProfile>, SupabaseError> {
        let query = format!("user_id=eq.{}", user_id);
        self.client.get_one("players", &query).await
    }

    pub async fn create_player(
        &self,
        user_id: Uuid,
        display_name: &str,
    ) -> Result<PlayerProfile, SupabaseError> {
        let profile = PlayerProfile::new(user_id, display_name);
        self.client.insert("players", &profile).await
    }

    /// Get or create player (ensures the row exists)
    pub async fn ensure_player(
        &self,
        user_id: Uuid,
        default_name: &str,
    ) -> Result<PlayerProfile, SupabaseError> {
        match self.get_player(user_id).await? {
            Some(profile) => Ok(profile),
            None => self.create_player(user_id, default_name).await,
        }
    }

    pub async fn update_stats(&self, user_id: Uuid, stats: PlayerStats) -> Result<(), SupabaseError> {
        let query = format!("user_id=eq.{}", user_id);
        let update = StatsUpdate {
            level: stats.level,
            rank: stats.rank,
            money: stats.money,
        };
        self.client.update("players", &query, &update).await
    }

    pub async fn insert_battle(&self, record: &BattleRecord) -> Result<(), SupabaseError> {
        self.client.insert_minimal("battles", record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_ids_use_the_unambiguous_charset() {
        for _ in 0..50 {
            let id = generate_public_id();
            assert_eq!(id.len(), PUBLIC_ID_LEN);
            assert!(id.bytes().all(|b| PUBLIC_ID_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn new_profile_starts_from_zero() {
        let profile = PlayerProfile::new(Uuid::new_v4(), "Nova");
        assert_eq!(profile.stats(), PlayerStats::default());
        assert_eq!(profile.character_id, STARTER_CHARACTER_ID);
    }

    #[test]
    fn draw_record_serializes_null_winner() {
        let record = BattleRecord {
            id: Uuid::nil(),
            player1_id: Uuid::nil(),
            player2_id: Uuid::nil(),
            winner_id: None,
            start_time: Utc::now(),
            end_time: Utc::now(),
            is_ranked: false,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["winner_id"].is_null());
    }
}
