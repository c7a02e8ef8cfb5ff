//! Matchmaking service - manages queues and battle creation

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{BattleSettings, MatchmakingSettings};
use crate::game::battle::{BattleController, BattleRegistry, Participant};
use crate::store::PlayerStore;

use super::queue::{MatchmakingQueue, QueueKind, WaitingClient};

/// Matchmaking service
pub struct MatchmakingService {
    ranked: Mutex<MatchmakingQueue<Participant>>,
    level: Mutex<MatchmakingQueue<Participant>>,
    settings: MatchmakingSettings,
    battle_settings: BattleSettings,
    registry: Arc<BattleRegistry>,
    store: PlayerStore,
}

impl MatchmakingService {
    pub fn new(
        settings: MatchmakingSettings,
        battle_settings: BattleSettings,
        registry: Arc<BattleRegistry>,
        store: PlayerStore,
    ) -> Self {
        Self {
            ranked: Mutex::new(MatchmakingQueue::new(
                settings.max_rank_range,
                settings.expand_interval,
            )),
            level: Mutex::new(MatchmakingQueue::new(
                settings.max_level_range,
                settings.expand_interval,
            )),
            settings,
            battle_settings,
            registry,
            store,
        }
    }

    fn queue(&self, kind: QueueKind) -> &Mutex<MatchmakingQueue<Participant>> {
        match kind {
            QueueKind::Ranked => &self.ranked,
            QueueKind::Level => &self.level,
        }
    }

    /// Join a queue; a player already waiting there is re-enqueued
    pub async fn join(&self, kind: QueueKind, participant: Participant) {
        let user_id = participant.user_id;
        let skill = participant.skill(kind.is_ranked());

        let mut queue = self.queue(kind).lock().await;
        queue.enqueue(user_id, skill, participant, Instant::now());

        info!(user_id = %user_id, ?kind, skill, queue_size = queue.len(), "Player joined matchmaking queue");
    }

    /// Leave a queue. False if the player was not waiting (already paired).
    pub async fn leave(&self, kind: QueueKind, user_id: Uuid) -> bool {
        let removed = self.queue(kind).lock().await.dequeue(user_id).is_some();
        if removed {
            info!(user_id = %user_id, ?kind, "Player left matchmaking queue");
        }
        removed
    }

    /// Scan both queues once and start a battle per pair
    pub async fn scan(&self) -> usize {
        let mut started = 0;
        for kind in [QueueKind::Ranked, QueueKind::Level] {
            let pairs = self.queue(kind).lock().await.find_matches(Instant::now());
            for (first, second) in pairs {
                self.start_battle(kind, first, second);
                started += 1;
            }
        }
        started
    }

    fn start_battle(
        &self,
        kind: QueueKind,
        first: WaitingClient<Participant>,
        second: WaitingClient<Participant>,
    ) {
        info!(
            first = %first.user_id,
            second = %second.user_id,
            ?kind,
            first_skill = first.skill,
            second_skill = second.skill,
            "Pair formed"
        );

        let controller = BattleController::new(
            first.ticket,
            second.ticket,
            kind.is_ranked(),
            self.battle_settings,
            self.store.clone(),
            self.registry.clone(),
        );
        let battle_id = controller.id();

        tokio::spawn(async move {
            let outcome = controller.run().await;
            debug!(battle_id = %battle_id, ?outcome, "Battle controller finished");
        });
    }

    /// Run the matchmaking service (periodic queue processing)
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.settings.interval);

        loop {
            interval.tick().await;
            self.scan().await;
        }
    }

    /// Current sizes of the ranked and level queues
    pub async fn queue_sizes(&self) -> (usize, usize) {
        let ranked = self.ranked.lock().await.len();
        let level = self.level.lock().await.len();
        (ranked, level)
    }

    pub async fn is_queued(&self, kind: QueueKind, user_id: &Uuid) -> bool {
        self.queue(kind).lock().await.contains(user_id)
    }

    pub fn registry(&self) -> &Arc<BattleRegistry> {
        &self.registry
    }
}
