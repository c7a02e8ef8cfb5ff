//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{BattleRegistry, CharacterRegistry};
use crate::matchmaking::MatchmakingService;
use crate::store::PlayerStore;

use super::presence::PresenceRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub characters: Arc<CharacterRegistry>,
    pub store: PlayerStore,
    pub matchmaking: Arc<MatchmakingService>,
    pub battles: Arc<BattleRegistry>,
    pub presence: Arc<PresenceRegistry>,
}

impl AppState {
    pub fn new(config: Config, characters: CharacterRegistry, store: PlayerStore) -> Self {
        let config = Arc::new(config);

        // Initialize battle registry
        let battles = Arc::new(BattleRegistry::new());

        // Initialize matchmaking service (Arc for sharing across cloned AppState)
        let matchmaking = Arc::new(MatchmakingService::new(
            config.matchmaking,
            config.battle,
            battles.clone(),
            store.clone(),
        ));

        Self {
            config,
            characters: Arc::new(characters),
            store,
            matchmaking,
            battles,
            presence: Arc::new(PresenceRegistry::new()),
        }
    }
}
