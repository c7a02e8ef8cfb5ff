//! Persistence: Supabase in production, memory for local runs and tests

pub mod memory;
pub mod players;
pub mod supabase;

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::game::rewards::PlayerStats;

pub use memory::MemoryStore;
pub use players::{BattleRecord, PlayerProfile, PlayerRepository};
pub use supabase::{SupabaseClient, SupabaseError};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Supabase(#[from] SupabaseError),

    #[error("Player {0} not found")]
    PlayerNotFound(Uuid),
}

#[derive(Clone)]
enum Backend {
    Supabase(PlayerRepository),
    Memory(Arc<MemoryStore>),
}

/// Persistence collaborator used by sessions and battles
#[derive(Clone)]
pub struct PlayerStore {
    backend: Backend,
}

impl PlayerStore {
    pub fn supabase(client: SupabaseClient) -> Self {
        Self {
            backend: Backend::Supabase(PlayerRepository::new(client)),
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryStore::new())),
        }
    }

    /// Supabase when credentials are configured, memory otherwise
    pub fn from_config(config: &Config) -> Self {
        match config.supabase() {
            Some((url, key)) => Self::supabase(SupabaseClient::new(url, key)),
            None => Self::memory(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            Backend::Supabase(_) => "supabase",
            Backend::Memory(_) => "memory",
        }
    }

    /// Direct access to the memory backend
    pub fn as_memory(&self) -> Option<&MemoryStore> {
        match &self.backend {
            Backend::Memory(store) => Some(&**store),
            Backend::Supabase(_) => None,
        }
    }

    pub async fn ensure_player(
        &self,
        user_id: Uuid,
        default_name: &str,
    ) -> Result<PlayerProfile, StoreError> {
        match &self.backend {
            Backend::Supabase(repo) => Ok(repo.ensure_player(user_id, default_name).await?),
            Backend::Memory(store) => Ok(store.ensure_player(user_id, default_name)),
        }
    }

    pub async fn save_battle_result(&self, record: &BattleRecord) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Supabase(repo) => Ok(repo.insert_battle(record).await?),
            Backend::Memory(store) => {
                store.save_battle(record.clone());
                Ok(())
            }
        }
    }

    pub async fn update_player_stats(
        &self,
        user_id: Uuid,
        stats: PlayerStats,
    ) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Supabase(repo) => Ok(repo.update_stats(user_id, stats).await?),
            Backend::Memory(store) => {
                if store.update_stats(user_id, stats) {
                    Ok(())
                } else {
                    Err(StoreError::PlayerNotFound(user_id))
                }
            }
        }
    }
}
