//! Per-connection worker owning one player's character state

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::battle::{BattleConclusion, BattleLink, BattleSignal, Participant};
use super::character::{CharacterDefinition, CharacterState, DamageOutcome};
use super::combat::{CombatEvent, CombatSystem, OpponentView};
use crate::matchmaking::queue::QueueKind;
use crate::matchmaking::MatchmakingService;
use crate::store::PlayerProfile;
use crate::util::time::{monotonic_millis, unix_millis};
use crate::ws::protocol::{
    ActionResult, ClientMsg, Command, EndBattleInfo, ServerMsg, Who,
};

/// Sender half of a session mailbox
pub type SessionMailbox = mpsc::UnboundedSender<SessionEvent>;

/// Everything that can wake a session worker
#[derive(Clone)]
pub enum SessionEvent {
    /// Parsed message from the client
    Client(ClientMsg),
    /// Matchmaking paired us
    BattleFound(BattleLink),
    /// Message from the opponent's worker
    Peer { battle_id: Uuid, event: PeerEvent },
    BattleEnded(BattleConclusion),
    /// The attack timer with this token elapsed
    AttackElapsed { token: u64 },
    Disconnected,
}

/// Messages exchanged between the two workers of a battle
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Opponent state, already mirrored into the receiver's frame, observed
    /// at monotonic time `at`
    OpponentState { result: ActionResult, at: u64 },
    /// The sender's attack connected
    Damage { amount: i32 },
    /// The receiver's last hit left the opponent at this health
    OpponentHealth { health: i32 },
}

/// Transient, user-visible policy errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Battle has not started yet or is already over")]
    OutsideBattleWindow,

    #[error("Already searching for a battle")]
    AlreadyQueued,

    #[error("Already in a battle")]
    AlreadyInBattle,

    #[error("Not searching for a battle")]
    NotQueued,

    #[error("Not in a battle")]
    NotInBattle,

    #[error("Malformed message")]
    Malformed,

    #[error("Too many messages, input dropped")]
    RateLimited,
}

impl SessionError {
    /// Stable code sent to the client
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::OutsideBattleWindow => "outside_battle_window",
            SessionError::AlreadyQueued => "already_queued",
            SessionError::AlreadyInBattle => "already_in_battle",
            SessionError::NotQueued => "not_queued",
            SessionError::NotInBattle => "not_in_battle",
            SessionError::Malformed => "malformed_message",
            SessionError::RateLimited => "rate_limited",
        }
    }

    pub fn to_msg(&self) -> ServerMsg {
        ServerMsg::error(self.code(), self.to_string())
    }
}

struct ActiveBattle {
    link: BattleLink,
    opponent: OpponentView,
    ready_sent: bool,
}

enum Phase {
    /// Free movement against nobody
    Lobby,
    /// Waiting in a queue under this search number
    Queued { kind: QueueKind, search: u64 },
    InBattle(Box<ActiveBattle>),
}

struct AttackTimer {
    token: u64,
    abort: AbortHandle,
}

/// Player session worker
pub struct PlayerSession {
    profile: PlayerProfile,
    character: Arc<CharacterDefinition>,
    state: CharacterState,
    phase: Phase,
    outbound: mpsc::Sender<ServerMsg>,
    mailbox: SessionMailbox,
    inbox: mpsc::UnboundedReceiver<SessionEvent>,
    matchmaking: Arc<MatchmakingService>,
    attack_timer: Option<AttackTimer>,
    next_token: u64,
    searches: u64,
}

impl PlayerSession {
    pub fn new(
        profile: PlayerProfile,
        character: Arc<CharacterDefinition>,
        outbound: mpsc::Sender<ServerMsg>,
        matchmaking: Arc<MatchmakingService>,
    ) -> Self {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let state = CharacterState::for_character(&character, monotonic_millis());
        Self {
            profile,
            character,
            state,
            phase: Phase::Lobby,
            outbound,
            mailbox,
            inbox,
            matchmaking,
            attack_timer: None,
            next_token: 0,
            searches: 0,
        }
    }

    /// Handle for posting events to this session
    pub fn mailbox(&self) -> SessionMailbox {
        self.mailbox.clone()
    }

    fn user_id(&self) -> Uuid {
        self.profile.user_id
    }

    /// Process events until disconnected
    pub async fn run(mut self) {
        self.send(ServerMsg::Welcome {
            user_id: self.profile.user_id,
            public_id: self.profile.public_id.clone(),
            display_name: self.profile.display_name.clone(),
            level: self.profile.level,
            rank: self.profile.rank,
            money: self.profile.money,
            character: self.character.info(),
            server_time: unix_millis(),
        });
        self.send_state(ServerMsg::ActionCharacter, None);

        while let Some(event) = self.inbox.recv().await {
            match event {
                SessionEvent::Client(msg) => self.on_client(msg).await,
                SessionEvent::BattleFound(link) => self.on_battle_found(link),
                SessionEvent::Peer { battle_id, event } => self.on_peer(battle_id, event),
                SessionEvent::BattleEnded(conclusion) => self.on_battle_ended(conclusion),
                SessionEvent::AttackElapsed { token } => self.on_attack_elapsed(token),
                SessionEvent::Disconnected => {
                    self.on_disconnect().await;
                    break;
                }
            }
        }

        debug!(user_id = %self.user_id(), "Session worker stopped");
    }

    fn send(&self, msg: ServerMsg) {
        match self.outbound.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id = %self.user_id(), "Outbound queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(user_id = %self.user_id(), "Outbound channel closed");
            }
        }
    }

    fn send_error(&self, error: SessionError) {
        debug!(user_id = %self.user_id(), code = error.code(), "Rejected client message");
        self.send(error.to_msg());
    }

    fn send_state(&self, wrap: fn(ActionResult) -> ServerMsg, command_id: Option<u32>) {
        self.send(wrap(self.state.to_action_result(command_id, unix_millis())));
    }

    fn participant(&self) -> Participant {
        Participant {
            user_id: self.profile.user_id,
            public_id: self.profile.public_id.clone(),
            display_name: self.profile.display_name.clone(),
            stats: self.profile.stats(),
            character: self.character.clone(),
            mailbox: self.mailbox.clone(),
            search: self.searches,
        }
    }

    async fn on_client(&mut self, msg: ClientMsg) {
        match msg {
            ClientMsg::Action(command) => self.on_command(command),
            ClientMsg::FindBattle { ranked } => self.on_find_battle(ranked).await,
            ClientMsg::CancelSearch => self.on_cancel_search().await,
            ClientMsg::Ready => self.on_ready(),
            ClientMsg::ExitBattle => self.on_exit_battle().await,
            ClientMsg::Ping { t } => self.send(ServerMsg::Pong { t }),
        }
    }

    fn on_command(&mut self, command: Command) {
        let now = monotonic_millis();
        let events = match &mut self.phase {
            Phase::Lobby => {
                CombatSystem::apply_command(&self.character, &mut self.state, &command, None, now)
            }
            Phase::Queued { .. } => {
                self.send_error(SessionError::AlreadyQueued);
                return;
            }
            Phase::InBattle(battle) => {
                if !battle.link.window_contains(unix_millis()) {
                    self.send_error(SessionError::OutsideBattleWindow);
                    return;
                }
                CombatSystem::apply_command(
                    &self.character,
                    &mut self.state,
                    &command,
                    Some(&mut battle.opponent),
                    now,
                )
            }
        };
        self.dispatch(events, now);
    }

    fn on_attack_elapsed(&mut self, token: u64) {
        if self.attack_timer.as_ref().map(|t| t.token) != Some(token) {
            return;
        }
        self.attack_timer = None;

        let now = monotonic_millis();
        let opponent = match &mut self.phase {
            Phase::InBattle(battle) => Some(&mut battle.opponent),
            _ => None,
        };
        let events = CombatSystem::resolve_due_attack(&self.character, &mut self.state, opponent, now);
        if events.is_empty() {
            // Woke before the deadline
            if let Some(deadline) = self.state.attack_deadline.filter(|d| *d > now) {
                self.schedule_attack(deadline);
            }
            return;
        }
        self.dispatch(events, now);
    }

    /// Act on resolver output
    fn dispatch(&mut self, events: Vec<CombatEvent>, now: u64) {
        for event in events {
            match event {
                CombatEvent::StateChanged { command_id } => self.broadcast_state(command_id, now),
                CombatEvent::AttackScheduled { deadline } => self.schedule_attack(deadline),
                CombatEvent::Hit { damage } => {
                    if let Phase::InBattle(battle) = &self.phase {
                        info!(
                            battle_id = %battle.link.battle_id,
                            user_id = %self.user_id(),
                            damage,
                            "Attack hit"
                        );
                        self.to_peer(&battle.link, PeerEvent::Damage { amount: damage });
                    }
                }
                CombatEvent::Missed => {
                    debug!(user_id = %self.user_id(), "Attack missed");
                }
            }
        }
    }

    fn to_peer(&self, link: &BattleLink, event: PeerEvent) {
        let sent = link.peer.send(SessionEvent::Peer {
            battle_id: link.battle_id,
            event,
        });
        if sent.is_err() {
            debug!(user_id = %self.user_id(), "Opponent session is gone");
        }
    }

    fn broadcast_state(&self, command_id: Option<u32>, now: u64) {
        let result = self.state.to_action_result(command_id, unix_millis());
        if let Phase::InBattle(battle) = &self.phase {
            let mirrored = result.mirrored(self.character.frame_width as f32);
            self.to_peer(
                &battle.link,
                PeerEvent::OpponentState {
                    result: mirrored,
                    at: now,
                },
            );
        }
        self.send(ServerMsg::ActionCharacter(result));
    }

    fn schedule_attack(&mut self, deadline: u64) {
        self.cancel_attack_timer();
        self.next_token += 1;
        let token = self.next_token;
        let delay = Duration::from_millis(deadline.saturating_sub(monotonic_millis()));
        let mailbox = self.mailbox.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = mailbox.send(SessionEvent::AttackElapsed { token });
        });

        self.attack_timer = Some(AttackTimer {
            token,
            abort: task.abort_handle(),
        });
    }

    fn cancel_attack_timer(&mut self) {
        if let Some(timer) = self.attack_timer.take() {
            timer.abort.abort();
        }
    }

    /// Fresh character at spawn
    fn reset_character(&mut self) {
        self.cancel_attack_timer();
        self.state.reset(monotonic_millis());
    }

    async fn on_find_battle(&mut self, ranked: bool) {
        match self.phase {
            Phase::Lobby => {}
            Phase::Queued { .. } => return self.send_error(SessionError::AlreadyQueued),
            Phase::InBattle(_) => return self.send_error(SessionError::AlreadyInBattle),
        }

        let kind = QueueKind::from_ranked(ranked);
        self.reset_character();
        self.searches += 1;
        self.phase = Phase::Queued {
            kind,
            search: self.searches,
        };
        self.matchmaking.join(kind, self.participant()).await;
        self.send_state(ServerMsg::WaitingBattle, None);
    }

    async fn on_cancel_search(&mut self) {
        let Phase::Queued { kind, search } = self.phase else {
            return self.send_error(SessionError::NotQueued);
        };
        if !self.matchmaking.leave(kind, self.user_id()).await {
            // Already paired; the announcement for this search will be refused
            debug!(user_id = %self.user_id(), search, "Cancelled after pairing");
        }
        self.phase = Phase::Lobby;
        self.send(ServerMsg::SearchCancelled);
    }

    fn on_ready(&mut self) {
        let user_id = self.user_id();
        match &mut self.phase {
            Phase::InBattle(battle) => {
                if !battle.ready_sent {
                    battle.ready_sent = true;
                    let _ = battle.link.controller.send(BattleSignal::Ready { user_id });
                }
            }
            _ => self.send_error(SessionError::NotInBattle),
        }
    }

    async fn on_exit_battle(&mut self) {
        if let Phase::Queued { .. } = self.phase {
            return self.on_cancel_search().await;
        }
        match &self.phase {
            Phase::InBattle(battle) => {
                info!(battle_id = %battle.link.battle_id, user_id = %self.user_id(), "Player left the battle");
                let _ = battle.link.controller.send(BattleSignal::Exit {
                    user_id: self.user_id(),
                });
            }
            _ => self.send_error(SessionError::NotInBattle),
        }
    }

    fn on_battle_found(&mut self, link: BattleLink) {
        let current = match self.phase {
            Phase::Queued { search, .. } => Some(search),
            _ => None,
        };
        if current != Some(link.search) {
            // Cancelled while the pair was being formed
            debug!(
                battle_id = %link.battle_id,
                user_id = %self.user_id(),
                search = link.search,
                "Refusing stale battle"
            );
            let _ = link.controller.send(BattleSignal::Left {
                user_id: self.user_id(),
            });
            return;
        }

        let now = monotonic_millis();
        self.reset_character();
        let opponent = OpponentView::spawned_opposite(link.opponent.clone(), now);
        self.send(ServerMsg::StartBattleInfo(link.announcement.clone()));
        info!(battle_id = %link.battle_id, user_id = %self.user_id(), "Battle found");
        self.phase = Phase::InBattle(Box::new(ActiveBattle {
            link,
            opponent,
            ready_sent: false,
        }));
    }

    fn on_peer(&mut self, battle_id: Uuid, event: PeerEvent) {
        let Phase::InBattle(battle) = &mut self.phase else {
            return;
        };
        if battle.link.battle_id != battle_id {
            return;
        }

        match event {
            PeerEvent::OpponentState { result, at } => {
                battle.opponent.observe(&result, at);
                self.send(ServerMsg::ActionOpponent(result));
            }
            PeerEvent::OpponentHealth { health } => {
                battle.opponent.state.health = health;
                self.send(ServerMsg::HealthUpdate {
                    who: Who::Opponent,
                    health,
                });
            }
            PeerEvent::Damage { amount } => self.on_damage(amount),
        }
    }

    fn on_damage(&mut self, amount: i32) {
        self.state.advance_to(monotonic_millis());
        match self.state.take_damage(amount) {
            DamageOutcome::Ignored => {}
            DamageOutcome::Wounded { health } => {
                self.send(ServerMsg::HealthUpdate {
                    who: Who::Character,
                    health,
                });
                if let Phase::InBattle(battle) = &self.phase {
                    self.to_peer(&battle.link, PeerEvent::OpponentHealth { health });
                }
            }
            DamageOutcome::Killed => {
                self.cancel_attack_timer();
                self.broadcast_state(None, monotonic_millis());
                if let Phase::InBattle(battle) = &self.phase {
                    info!(battle_id = %battle.link.battle_id, user_id = %self.user_id(), "Player died");
                    let _ = battle.link.controller.send(BattleSignal::Died {
                        user_id: self.user_id(),
                    });
                }
            }
        }
    }

    fn on_battle_ended(&mut self, conclusion: BattleConclusion) {
        match &self.phase {
            Phase::InBattle(battle) if battle.link.battle_id == conclusion.battle_id => {}
            _ => return,
        }

        self.phase = Phase::Lobby;
        self.reset_character();
        self.profile.set_stats(conclusion.stats);

        self.send(ServerMsg::EndBattle(EndBattleInfo {
            result: conclusion.result,
            total_money: conclusion.stats.money,
            current_rank: conclusion.stats.rank,
            current_level: conclusion.stats.level,
            final_state: self.state.to_action_result(None, unix_millis()),
        }));
    }

    async fn on_disconnect(&mut self) {
        self.cancel_attack_timer();
        match &self.phase {
            Phase::Lobby => {}
            Phase::Queued { kind, .. } => {
                self.matchmaking.leave(*kind, self.user_id()).await;
            }
            Phase::InBattle(battle) => {
                info!(battle_id = %battle.link.battle_id, user_id = %self.user_id(), "Disconnected mid-battle");
                let _ = battle.link.controller.send(BattleSignal::Left {
                    user_id: self.user_id(),
                });
            }
        }
        self.phase = Phase::Lobby;
        info!(user_id = %self.user_id(), "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BattleSettings, MatchmakingSettings};
    use crate::game::battle::BattleRegistry;
    use crate::store::PlayerStore;
    use crate::ws::protocol::{BattleResult, Verb};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    struct Harness {
        user_id: Uuid,
        mailbox: SessionMailbox,
        out: mpsc::Receiver<ServerMsg>,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn client(&self, msg: ClientMsg) {
            self.mailbox.send(SessionEvent::Client(msg)).unwrap();
        }

        async fn next(&mut self) -> ServerMsg {
            timeout(Duration::from_secs(5), self.out.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("outbound closed")
        }

        /// Skip messages until one matches
        async fn expect<F: Fn(&ServerMsg) -> bool>(&mut self, pred: F) -> ServerMsg {
            loop {
                let msg = self.next().await;
                if pred(&msg) {
                    return msg;
                }
            }
        }
    }

    fn fighter() -> Arc<CharacterDefinition> {
        // Wide frames so spawned opponents overlap
        let mut def = CharacterDefinition::solid(1, 700, 100, 50);
        def.health = 10;
        Arc::new(def)
    }

    fn settings(start_delay: Duration) -> BattleSettings {
        BattleSettings {
            start_delay,
            duration: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(2),
        }
    }

    fn service_with(store: PlayerStore, battle: BattleSettings) -> Arc<MatchmakingService> {
        Arc::new(MatchmakingService::new(
            MatchmakingSettings::default(),
            battle,
            Arc::new(BattleRegistry::new()),
            store,
        ))
    }

    fn service(store: PlayerStore) -> Arc<MatchmakingService> {
        service_with(store, settings(Duration::ZERO))
    }

    async fn spawn(store: &PlayerStore, matchmaking: Arc<MatchmakingService>, name: &str) -> Harness {
        spawn_as(store, matchmaking, name, fighter()).await
    }

    async fn spawn_as(
        store: &PlayerStore,
        matchmaking: Arc<MatchmakingService>,
        name: &str,
        character: Arc<CharacterDefinition>,
    ) -> Harness {
        let user_id = Uuid::new_v4();
        let profile = store.ensure_player(user_id, name).await.unwrap();
        let (out_tx, out) = mpsc::channel(256);
        let session = PlayerSession::new(profile, character, out_tx, matchmaking);
        let mailbox = session.mailbox();
        let task = tokio::spawn(session.run());
        let mut harness = Harness {
            user_id,
            mailbox,
            out,
            task,
        };
        assert!(matches!(harness.next().await, ServerMsg::Welcome { .. }));
        assert!(matches!(harness.next().await, ServerMsg::ActionCharacter(_)));
        harness
    }

    async fn paired(store: &PlayerStore) -> (Arc<MatchmakingService>, Harness, Harness) {
        paired_with(store, service(store.clone()), fighter()).await
    }

    async fn paired_with(
        store: &PlayerStore,
        matchmaking: Arc<MatchmakingService>,
        character: Arc<CharacterDefinition>,
    ) -> (Arc<MatchmakingService>, Harness, Harness) {
        let mut a = spawn_as(store, matchmaking.clone(), "A", character.clone()).await;
        let mut b = spawn_as(store, matchmaking.clone(), "B", character).await;

        for h in [&mut a, &mut b] {
            h.client(ClientMsg::FindBattle { ranked: true });
            assert!(matches!(h.next().await, ServerMsg::WaitingBattle(_)));
        }
        assert_eq!(matchmaking.scan().await, 1);

        for h in [&mut a, &mut b] {
            h.expect(|m| matches!(m, ServerMsg::StartBattleInfo(_))).await;
            h.client(ClientMsg::Ready);
        }
        (matchmaking, a, b)
    }

    #[tokio::test]
    async fn lobby_commands_run_in_training_mode() {
        let store = PlayerStore::memory();
        let mut a = spawn(&store, service(store.clone()), "A").await;

        a.client(ClientMsg::Action(Command {
            id: 1,
            verb: Verb::RunRight,
        }));
        match a.next().await {
            ServerMsg::ActionCharacter(result) => {
                assert_eq!(result.command_id, Some(1));
                assert!(result.is_running);
            }
            other => panic!("unexpected {other:?}"),
        }

        a.client(ClientMsg::Ping { t: 42 });
        assert!(matches!(a.next().await, ServerMsg::Pong { t: 42 }));
    }

    #[tokio::test]
    async fn commands_while_queued_are_rejected() {
        let store = PlayerStore::memory();
        let matchmaking = service(store.clone());
        let mut a = spawn(&store, matchmaking.clone(), "A").await;

        a.client(ClientMsg::FindBattle { ranked: false });
        assert!(matches!(a.next().await, ServerMsg::WaitingBattle(_)));

        a.client(ClientMsg::Action(Command {
            id: 1,
            verb: Verb::Attack,
        }));
        match a.next().await {
            ServerMsg::Error { code, .. } => assert_eq!(code, "already_queued"),
            other => panic!("unexpected {other:?}"),
        }

        a.client(ClientMsg::FindBattle { ranked: true });
        assert!(matches!(a.next().await, ServerMsg::Error { .. }));

        a.client(ClientMsg::CancelSearch);
        assert!(matches!(a.next().await, ServerMsg::SearchCancelled));
        assert_eq!(matchmaking.queue_sizes().await, (0, 0));
    }

    #[tokio::test]
    async fn ready_outside_battle_is_an_error() {
        let store = PlayerStore::memory();
        let mut a = spawn(&store, service(store.clone()), "A").await;
        a.client(ClientMsg::Ready);
        match a.next().await {
            ServerMsg::Error { code, .. } => assert_eq!(code, SessionError::NotInBattle.code()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn knockout_ends_the_battle_with_rewards() {
        let store = PlayerStore::memory();
        let (_matchmaking, mut a, mut b) = paired(&store).await;

        a.client(ClientMsg::Action(Command {
            id: 1,
            verb: Verb::Attack,
        }));

        let dying = b
            .expect(|m| matches!(m, ServerMsg::ActionCharacter(r) if r.is_dying))
            .await;
        if let ServerMsg::ActionCharacter(result) = dying {
            assert_eq!(result.health, 0);
        }

        let a_end = a.expect(|m| matches!(m, ServerMsg::EndBattle(_))).await;
        let b_end = b.expect(|m| matches!(m, ServerMsg::EndBattle(_))).await;
        match (a_end, b_end) {
            (ServerMsg::EndBattle(a_end), ServerMsg::EndBattle(b_end)) => {
                assert_eq!(a_end.result, BattleResult::Victory);
                assert_eq!(a_end.current_rank, 25);
                assert_eq!(b_end.result, BattleResult::Defeat);
                assert_eq!(b_end.current_rank, 0);
                // Characters are back at spawn with full health
                assert_eq!(b_end.final_state.health, 10);
                assert!(!b_end.final_state.is_dying);
            }
            _ => unreachable!(),
        }

        let memory = store.as_memory().unwrap();
        assert_eq!(memory.battles()[0].winner_id, Some(a.user_id));
        assert_eq!(memory.player(a.user_id).unwrap().rank, 25);
    }

    #[tokio::test]
    async fn non_lethal_hit_updates_both_health_bars() {
        let store = PlayerStore::memory();
        let mut tough = CharacterDefinition::solid(1, 700, 100, 50);
        tough.health = 25;
        let matchmaking = service(store.clone());
        let (_matchmaking, mut a, mut b) = paired_with(&store, matchmaking, Arc::new(tough)).await;

        a.client(ClientMsg::Action(Command {
            id: 1,
            verb: Verb::Attack,
        }));

        let own = b
            .expect(|m| matches!(m, ServerMsg::HealthUpdate { .. }))
            .await;
        assert!(matches!(
            own,
            ServerMsg::HealthUpdate {
                who: Who::Character,
                health: 15
            }
        ));
        let seen = a
            .expect(|m| matches!(m, ServerMsg::HealthUpdate { .. }))
            .await;
        assert!(matches!(
            seen,
            ServerMsg::HealthUpdate {
                who: Who::Opponent,
                health: 15
            }
        ));
    }

    #[tokio::test]
    async fn commands_before_the_window_are_rejected() {
        let store = PlayerStore::memory();
        let matchmaking = service_with(store.clone(), settings(Duration::from_secs(60)));
        let (_matchmaking, mut a, _b) = paired_with(&store, matchmaking, fighter()).await;

        a.client(ClientMsg::Action(Command {
            id: 1,
            verb: Verb::RunRight,
        }));
        match a.next().await {
            ServerMsg::Error { code, .. } => {
                assert_eq!(code, SessionError::OutsideBattleWindow.code())
            }
            other => panic!("unexpected {other:?}"),
        }

        // Nothing moved: the next accepted message is the pong
        a.client(ClientMsg::Ping { t: 7 });
        assert!(matches!(a.next().await, ServerMsg::Pong { t: 7 }));
    }

    #[tokio::test]
    async fn cancel_after_pairing_refuses_the_old_battle() {
        let store = PlayerStore::memory();
        let matchmaking = service(store.clone());
        let mut a = spawn(&store, matchmaking.clone(), "A").await;
        let mut b = spawn(&store, matchmaking.clone(), "B").await;
        for h in [&mut a, &mut b] {
            h.client(ClientMsg::FindBattle { ranked: true });
            assert!(matches!(h.next().await, ServerMsg::WaitingBattle(_)));
        }

        // Paired, but A cancels and searches again before the announcement lands
        assert_eq!(matchmaking.scan().await, 1);
        a.client(ClientMsg::CancelSearch);
        a.client(ClientMsg::FindBattle { ranked: true });

        assert!(matches!(a.next().await, ServerMsg::SearchCancelled));
        assert!(matches!(a.next().await, ServerMsg::WaitingBattle(_)));

        match b.expect(|m| matches!(m, ServerMsg::EndBattle(_))).await {
            ServerMsg::EndBattle(end) => assert_eq!(end.result, BattleResult::NoBattle),
            _ => unreachable!(),
        }

        // A is still waiting for a fresh opponent and never saw the old battle
        assert!(matchmaking.is_queued(QueueKind::Ranked, &a.user_id).await);
        assert_eq!(matchmaking.queue_sizes().await, (1, 0));
        assert!(a.out.try_recv().is_err());
    }

    #[tokio::test]
    async fn opponent_sees_mirrored_state() {
        let store = PlayerStore::memory();
        let (_matchmaking, mut a, mut b) = paired(&store).await;

        a.client(ClientMsg::Action(Command {
            id: 1,
            verb: Verb::StartJump,
        }));
        let own = a.expect(|m| matches!(m, ServerMsg::ActionCharacter(_))).await;
        let seen = b.expect(|m| matches!(m, ServerMsg::ActionOpponent(_))).await;
        match (own, seen) {
            (ServerMsg::ActionCharacter(own), ServerMsg::ActionOpponent(seen)) => {
                assert_eq!(seen, own.mirrored(700.0));
                assert!(seen.is_jumping);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn disconnect_mid_battle_forfeits() {
        let store = PlayerStore::memory();
        let (matchmaking, a, mut b) = paired(&store).await;
        // Let both acknowledgements reach the controller
        tokio::time::sleep(Duration::from_millis(100)).await;

        a.mailbox.send(SessionEvent::Disconnected).unwrap();
        a.task.await.unwrap();

        match b.expect(|m| matches!(m, ServerMsg::EndBattle(_))).await {
            ServerMsg::EndBattle(end) => assert_eq!(end.result, BattleResult::Victory),
            _ => unreachable!(),
        }
        timeout(Duration::from_secs(2), async {
            while matchmaking.registry().active_battles() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("battle was not unregistered");
    }

    #[tokio::test]
    async fn disconnect_while_queued_dequeues() {
        let store = PlayerStore::memory();
        let matchmaking = service(store.clone());
        let mut a = spawn(&store, matchmaking.clone(), "A").await;
        a.client(ClientMsg::FindBattle { ranked: true });
        assert!(matches!(a.next().await, ServerMsg::WaitingBattle(_)));

        a.mailbox.send(SessionEvent::Disconnected).unwrap();
        a.task.await.unwrap();
        assert_eq!(matchmaking.queue_sizes().await, (0, 0));
    }
}
