//! Battle lifecycle: readiness handshake, timed window, outcome, rewards

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::character::CharacterDefinition;
use super::rewards::{PlayerStats, RewardDelta};
use super::session::{SessionEvent, SessionMailbox};
use crate::config::BattleSettings;
use crate::store::{BattleRecord, PlayerStore};
use crate::util::time::unix_millis;
use crate::ws::protocol::{BattleResult, StartBattleInfo};

/// One side of a battle, as handed over by matchmaking
#[derive(Clone)]
pub struct Participant {
    pub user_id: Uuid,
    pub public_id: String,
    pub display_name: String,
    pub stats: PlayerStats,
    pub character: Arc<CharacterDefinition>,
    pub mailbox: SessionMailbox,
    /// Search this participant was taken from; sessions number their searches
    pub search: u64,
}

impl Participant {
    /// Rank in ranked battles, level otherwise
    pub fn skill(&self, ranked: bool) -> i32 {
        if ranked {
            self.stats.rank
        } else {
            self.stats.level
        }
    }
}

/// Signals a session sends to its battle controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleSignal {
    Ready { user_id: Uuid },
    Died { user_id: Uuid },
    /// Forfeit on request
    Exit { user_id: Uuid },
    /// The session went away or refused the battle
    Left { user_id: Uuid },
}

impl BattleSignal {
    pub fn user_id(&self) -> Uuid {
        match *self {
            BattleSignal::Ready { user_id }
            | BattleSignal::Died { user_id }
            | BattleSignal::Exit { user_id }
            | BattleSignal::Left { user_id } => user_id,
        }
    }
}

/// Everything a session needs to take part in a battle
#[derive(Clone)]
pub struct BattleLink {
    pub battle_id: Uuid,
    /// The receiver's search that was paired
    pub search: u64,
    pub ranked: bool,
    /// Unix ms of the battle window
    pub start_at: u64,
    pub end_at: u64,
    pub announcement: StartBattleInfo,
    pub opponent: Arc<CharacterDefinition>,
    pub peer: SessionMailbox,
    pub controller: mpsc::UnboundedSender<BattleSignal>,
}

impl BattleLink {
    pub fn window_contains(&self, unix_ms: u64) -> bool {
        unix_ms >= self.start_at && unix_ms <= self.end_at
    }
}

/// Final word from the controller to one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleConclusion {
    pub battle_id: Uuid,
    pub result: BattleResult,
    /// Stats after rewards
    pub stats: PlayerStats,
}

/// Active battle summary for observability
#[derive(Debug, Clone)]
pub struct BattleHandle {
    pub id: Uuid,
    pub players: [Uuid; 2],
    pub ranked: bool,
    pub start_at: u64,
    pub end_at: u64,
}

/// Registry of active battles
pub struct BattleRegistry {
    battles: DashMap<Uuid, BattleHandle>,
}

impl BattleRegistry {
    pub fn new() -> Self {
        Self {
            battles: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<BattleHandle> {
        self.battles.get(id).map(|b| b.value().clone())
    }

    pub fn insert(&self, handle: BattleHandle) {
        self.battles.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<BattleHandle> {
        self.battles.remove(id).map(|(_, h)| h)
    }

    pub fn active_battles(&self) -> usize {
        self.battles.len()
    }

    pub fn total_players(&self) -> usize {
        self.battles.len() * 2
    }
}

impl Default for BattleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// How the active phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleOutcome {
    /// Readiness failed or a side left before the battle became active
    Aborted,
    /// Index of the winning participant, `None` for a draw
    Decided { winner: Option<usize> },
}

enum ReadyCheck {
    AllReady,
    Aborted,
    Decided(Option<usize>),
}

/// Start of the battle window: `now + delay`, truncated to the whole second
pub fn battle_window(now: DateTime<Utc>, settings: &BattleSettings) -> (DateTime<Utc>, DateTime<Utc>) {
    let second = TimeDelta::seconds(1);
    let delay = TimeDelta::from_std(settings.start_delay).unwrap_or(TimeDelta::zero());
    let duration = TimeDelta::from_std(settings.duration).unwrap_or(TimeDelta::zero());

    let start = now + delay;
    let start = start.duration_trunc(second).unwrap_or(start);
    let end = start + duration;
    let end = end.duration_trunc(second).unwrap_or(end);
    (start, end)
}

/// Orchestrates one battle between two sessions
pub struct BattleController {
    id: Uuid,
    ranked: bool,
    players: [Participant; 2],
    settings: BattleSettings,
    store: PlayerStore,
    registry: Arc<BattleRegistry>,
    signals_tx: mpsc::UnboundedSender<BattleSignal>,
    signals_rx: mpsc::UnboundedReceiver<BattleSignal>,
}

impl BattleController {
    pub fn new(
        first: Participant,
        second: Participant,
        ranked: bool,
        settings: BattleSettings,
        store: PlayerStore,
        registry: Arc<BattleRegistry>,
    ) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            ranked,
            players: [first, second],
            settings,
            store,
            registry,
            signals_tx,
            signals_rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn index_of(&self, user_id: Uuid) -> Option<usize> {
        self.players.iter().position(|p| p.user_id == user_id)
    }

    /// Run the battle to completion
    pub async fn run(mut self) -> BattleOutcome {
        let (start, end) = battle_window(Utc::now(), &self.settings);
        let start_at = start.timestamp_millis().max(0) as u64;
        let end_at = end.timestamp_millis().max(0) as u64;

        self.registry.insert(BattleHandle {
            id: self.id,
            players: [self.players[0].user_id, self.players[1].user_id],
            ranked: self.ranked,
            start_at,
            end_at,
        });

        info!(
            battle_id = %self.id,
            first = %self.players[0].user_id,
            second = %self.players[1].user_id,
            ranked = self.ranked,
            start_at,
            end_at,
            "Battle created"
        );

        let outcome = if self.announce(start_at, end_at) {
            match self.ready_check().await {
                ReadyCheck::AllReady => {
                    info!(battle_id = %self.id, "Both players ready");
                    BattleOutcome::Decided {
                        winner: self.active_phase(end_at).await,
                    }
                }
                ReadyCheck::Decided(winner) => BattleOutcome::Decided { winner },
                ReadyCheck::Aborted => BattleOutcome::Aborted,
            }
        } else {
            BattleOutcome::Aborted
        };

        match outcome {
            BattleOutcome::Aborted => self.abort(),
            BattleOutcome::Decided { winner } => self.conclude(start, winner).await,
        }

        self.registry.remove(&self.id);
        outcome
    }

    /// Tell both sessions about the battle. False if one is gone.
    fn announce(&self, start_at: u64, end_at: u64) -> bool {
        let now = unix_millis();
        for (index, player) in self.players.iter().enumerate() {
            let opponent = &self.players[1 - index];
            let link = BattleLink {
                battle_id: self.id,
                search: player.search,
                ranked: self.ranked,
                start_at,
                end_at,
                announcement: StartBattleInfo {
                    server_timestamp: now,
                    start_time: start_at,
                    end_time: end_at,
                    opponent_public_id: opponent.public_id.clone(),
                    opponent_name: opponent.display_name.clone(),
                    opponent_rank: opponent.stats.rank,
                    opponent_level: opponent.stats.level,
                    opponent_character: opponent.character.info(),
                },
                opponent: opponent.character.clone(),
                peer: opponent.mailbox.clone(),
                controller: self.signals_tx.clone(),
            };

            if player.mailbox.send(SessionEvent::BattleFound(link)).is_err() {
                warn!(battle_id = %self.id, user_id = %player.user_id, "Participant vanished before the battle");
                return false;
            }
        }
        true
    }

    async fn ready_check(&mut self) -> ReadyCheck {
        let mut ready = [false; 2];
        let id = self.id;
        let players = [self.players[0].user_id, self.players[1].user_id];
        let signals = &mut self.signals_rx;

        let waited = timeout(self.settings.ready_timeout, async {
            while let Some(signal) = signals.recv().await {
                let Some(index) = players.iter().position(|p| *p == signal.user_id()) else {
                    continue;
                };
                match signal {
                    BattleSignal::Ready { .. } => {
                        ready[index] = true;
                        if ready.iter().all(|r| *r) {
                            return ReadyCheck::AllReady;
                        }
                    }
                    // A knockout can land before the other side acknowledged
                    BattleSignal::Died { .. } => return ReadyCheck::Decided(Some(1 - index)),
                    BattleSignal::Exit { .. } | BattleSignal::Left { .. } => {
                        debug!(battle_id = %id, user_id = %signal.user_id(), "Left during ready check");
                        return ReadyCheck::Aborted;
                    }
                }
            }
            ReadyCheck::Aborted
        })
        .await;

        match waited {
            Ok(check) => check,
            Err(_) => {
                info!(battle_id = %self.id, ?ready, "Readiness timed out");
                ReadyCheck::Aborted
            }
        }
    }

    /// Wait for a knockout, a forfeit or the end of the window
    async fn active_phase(&mut self, end_at: u64) -> Option<usize> {
        let remaining = Duration::from_millis(end_at.saturating_sub(unix_millis()));
        let deadline = Instant::now() + remaining;

        loop {
            tokio::select! {
                signal = self.signals_rx.recv() => {
                    let Some(signal) = signal else {
                        return None;
                    };
                    let Some(index) = self.index_of(signal.user_id()) else {
                        continue;
                    };
                    match signal {
                        BattleSignal::Ready { .. } => {}
                        BattleSignal::Died { .. } => {
                            info!(battle_id = %self.id, user_id = %signal.user_id(), "Knockout");
                            return Some(1 - index);
                        }
                        BattleSignal::Exit { .. } | BattleSignal::Left { .. } => {
                            info!(battle_id = %self.id, user_id = %signal.user_id(), "Forfeit");
                            return Some(1 - index);
                        }
                    }
                }
                _ = sleep_until(deadline) => {
                    info!(battle_id = %self.id, "Battle time is up, draw");
                    return None;
                }
            }
        }
    }

    fn abort(&self) {
        info!(battle_id = %self.id, "Battle aborted, no battle occurred");
        for player in &self.players {
            let conclusion = BattleConclusion {
                battle_id: self.id,
                result: BattleResult::NoBattle,
                stats: player.stats,
            };
            let _ = player.mailbox.send(SessionEvent::BattleEnded(conclusion));
        }
    }

    async fn conclude(&self, start: DateTime<Utc>, winner: Option<usize>) {
        let record = BattleRecord {
            id: self.id,
            player1_id: self.players[0].user_id,
            player2_id: self.players[1].user_id,
            winner_id: winner.map(|w| self.players[w].user_id),
            start_time: start,
            end_time: Utc::now(),
            is_ranked: self.ranked,
        };

        if let Err(e) = self.store.save_battle_result(&record).await {
            error!(battle_id = %self.id, error = %e, "Failed to save battle result");
        }

        for (index, player) in self.players.iter().enumerate() {
            let opponent = &self.players[1 - index];
            let result = match winner {
                None => BattleResult::Draw,
                Some(w) if w == index => BattleResult::Victory,
                Some(_) => BattleResult::Defeat,
            };
            let outcome = result.outcome().unwrap_or(0);
            let skill_diff = player.skill(self.ranked) - opponent.skill(self.ranked);
            let delta = RewardDelta::compute(skill_diff, outcome, self.ranked);
            let stats = player.stats.apply(delta);

            if let Err(e) = self.store.update_player_stats(player.user_id, stats).await {
                error!(battle_id = %self.id, user_id = %player.user_id, error = %e, "Failed to update player stats");
            }

            info!(
                battle_id = %self.id,
                user_id = %player.user_id,
                ?result,
                rank = stats.rank,
                level = stats.level,
                money = stats.money,
                "Rewards granted"
            );

            let _ = player.mailbox.send(SessionEvent::BattleEnded(BattleConclusion {
                battle_id: self.id,
                result,
                stats,
            }));
        }
    }
}
