//! Combat resolution: commands, attack completion and damage

use std::sync::Arc;

use tracing::debug;

use super::character::{
    CharacterDefinition, CharacterState, CompletedAttack, VerbOutcome,
};
use super::collision::CollisionOracle;
use crate::ws::protocol::{ActionResult, AttackKind, Command};

/// Damage multipliers
pub const LIGHT_MULTIPLIER: f32 = 1.0;
pub const HEAVY_MULTIPLIER: f32 = 1.75;
pub const AIRBORNE_HEAVY_MULTIPLIER: f32 = 2.5;

/// Latest authoritative view of the opponent, in our screen frame
#[derive(Debug, Clone)]
pub struct OpponentView {
    pub definition: Arc<CharacterDefinition>,
    pub state: CharacterState,
}

impl OpponentView {
    pub fn new(definition: Arc<CharacterDefinition>, now: u64) -> Self {
        let state = CharacterState::for_character(&definition, now);
        Self { definition, state }
    }

    /// Opponent standing at its own spawn, seen from the other side
    pub fn spawned_opposite(definition: Arc<CharacterDefinition>, now: u64) -> Self {
        let mut view = Self::new(definition, now);
        let spawn = view
            .state
            .to_action_result(None, 0)
            .mirrored(view.definition.frame_width as f32);
        view.observe(&spawn, now);
        view
    }

    /// Record a mirrored result observed at monotonic time `at`
    pub fn observe(&mut self, result: &ActionResult, at: u64) {
        self.state.apply_snapshot(result, at);
    }
}

/// Things the owner of a state must act on after a resolution step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CombatEvent {
    /// Broadcast the state, tagged with the originating command
    StateChanged { command_id: Option<u32> },
    /// An attack completes at this monotonic deadline
    AttackScheduled { deadline: u64 },
    /// The attack connected; the defender takes this much damage
    Hit { damage: i32 },
    Missed,
}

/// Combat system for resolving commands and attacks
pub struct CombatSystem;

impl CombatSystem {
    pub fn damage_for(base: i32, kind: AttackKind, airborne: bool) -> i32 {
        let multiplier = match (kind, airborne) {
            (AttackKind::Light, _) => LIGHT_MULTIPLIER,
            (AttackKind::Heavy, false) => HEAVY_MULTIPLIER,
            (AttackKind::Heavy, true) => AIRBORNE_HEAVY_MULTIPLIER,
        };
        (base as f32 * multiplier) as i32
    }

    /// Apply one command from the owner of `state`
    pub fn apply_command(
        definition: &CharacterDefinition,
        state: &mut CharacterState,
        command: &Command,
        opponent: Option<&mut OpponentView>,
        now: u64,
    ) -> Vec<CombatEvent> {
        let mut events = Vec::new();
        let report = state.apply_verb(command.verb, now);

        if let Some(completed) = report.completed {
            events.push(Self::resolve_attack(definition, state, completed, opponent, now));
        }

        match report.outcome {
            VerbOutcome::Dropped => {
                debug!(command_id = command.id, "command dropped, character is dying");
            }
            VerbOutcome::Buffered | VerbOutcome::Applied => {
                events.push(CombatEvent::StateChanged {
                    command_id: Some(command.id),
                });
            }
            VerbOutcome::AttackStarted { deadline } => {
                events.push(CombatEvent::StateChanged {
                    command_id: Some(command.id),
                });
                events.push(CombatEvent::AttackScheduled { deadline });
            }
        }

        events
    }

    /// Complete an attack whose timer elapsed. A no-op when the command path
    /// already completed it.
    pub fn resolve_due_attack(
        definition: &CharacterDefinition,
        state: &mut CharacterState,
        opponent: Option<&mut OpponentView>,
        now: u64,
    ) -> Vec<CombatEvent> {
        match state.advance_to(now) {
            Some(completed) => vec![
                Self::resolve_attack(definition, state, completed, opponent, now),
                CombatEvent::StateChanged { command_id: None },
            ],
            None => Vec::new(),
        }
    }

    fn resolve_attack(
        definition: &CharacterDefinition,
        state: &CharacterState,
        completed: CompletedAttack,
        opponent: Option<&mut OpponentView>,
        now: u64,
    ) -> CombatEvent {
        let opponent = match opponent {
            Some(opponent) => opponent,
            None => return CombatEvent::Missed,
        };
        if opponent.state.is_dying {
            return CombatEvent::Missed;
        }

        // Bring the opponent up to the same instant
        opponent.state.advance_to(now);

        if CollisionOracle::hits(
            definition,
            state,
            &opponent.definition,
            &opponent.state,
            completed.kind,
        ) {
            CombatEvent::Hit {
                damage: Self::damage_for(definition.damage, completed.kind, completed.airborne),
            }
        } else {
            CombatEvent::Missed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::LEFT;
    use crate::ws::protocol::Verb;

    const ATTACK_MS: u64 = 300;

    fn fighter() -> Arc<CharacterDefinition> {
        Arc::new(CharacterDefinition::solid(1, 100, 100, ATTACK_MS))
    }

    fn command(id: u32, verb: Verb) -> Command {
        Command { id, verb }
    }

    #[test]
    fn damage_multipliers_truncate() {
        assert_eq!(CombatSystem::damage_for(10, AttackKind::Light, true), 10);
        assert_eq!(CombatSystem::damage_for(10, AttackKind::Heavy, false), 17);
        assert_eq!(CombatSystem::damage_for(10, AttackKind::Heavy, true), 25);
        assert_eq!(CombatSystem::damage_for(7, AttackKind::Heavy, false), 12);
    }

    #[test]
    fn attack_command_schedules_completion() {
        let def = fighter();
        let mut state = CharacterState::for_character(&def, 0);
        let events =
            CombatSystem::apply_command(&def, &mut state, &command(1, Verb::Attack), None, 50);
        assert_eq!(
            events,
            vec![
                CombatEvent::StateChanged {
                    command_id: Some(1)
                },
                CombatEvent::AttackScheduled {
                    deadline: 50 + ATTACK_MS
                },
            ]
        );
    }

    #[test]
    fn elapsed_attack_hits_overlapping_opponent() {
        let def = fighter();
        let mut state = CharacterState::for_character(&def, 0);
        let mut opponent = OpponentView::new(def.clone(), 0);
        opponent.state.motion.x = state.motion.x + 20.0;
        opponent.state.motion.direction = LEFT;

        CombatSystem::apply_command(&def, &mut state, &command(1, Verb::HeavyAttack), None, 0);
        let events =
            CombatSystem::resolve_due_attack(&def, &mut state, Some(&mut opponent), 2 * ATTACK_MS);
        assert_eq!(
            events,
            vec![
                CombatEvent::Hit { damage: 17 },
                CombatEvent::StateChanged { command_id: None },
            ]
        );
        assert!(!state.is_attacking);
    }

    #[test]
    fn stale_timer_is_a_no_op() {
        let def = fighter();
        let mut state = CharacterState::for_character(&def, 0);
        CombatSystem::apply_command(&def, &mut state, &command(1, Verb::Attack), None, 0);
        // A later command completes the attack first
        let events = CombatSystem::apply_command(
            &def,
            &mut state,
            &command(2, Verb::StopJump),
            None,
            ATTACK_MS + 10,
        );
        assert_eq!(events[0], CombatEvent::Missed);
        assert!(CombatSystem::resolve_due_attack(&def, &mut state, None, ATTACK_MS + 20).is_empty());
    }

    #[test]
    fn attack_without_opponent_misses() {
        let def = fighter();
        let mut state = CharacterState::for_character(&def, 0);
        CombatSystem::apply_command(&def, &mut state, &command(1, Verb::Attack), None, 0);
        let events = CombatSystem::resolve_due_attack(&def, &mut state, None, ATTACK_MS);
        assert_eq!(events[0], CombatEvent::Missed);
    }

    #[test]
    fn distant_opponent_is_missed() {
        let def = fighter();
        let mut state = CharacterState::for_character(&def, 0);
        let mut opponent = OpponentView::new(def.clone(), 0);
        opponent.state.motion.x = 900.0;

        CombatSystem::apply_command(&def, &mut state, &command(1, Verb::Attack), None, 0);
        let events =
            CombatSystem::resolve_due_attack(&def, &mut state, Some(&mut opponent), ATTACK_MS);
        assert_eq!(events[0], CombatEvent::Missed);
    }

    #[test]
    fn opponent_spawns_on_the_far_side_facing_us() {
        let view = OpponentView::spawned_opposite(fighter(), 0);
        assert_eq!(view.state.motion.x, 1280.0 - 100.0);
        assert_eq!(view.state.motion.direction, LEFT);
    }

    #[test]
    fn dying_owner_drops_commands_silently() {
        let def = fighter();
        let mut state = CharacterState::for_character(&def, 0);
        state.take_damage(1_000);
        let events =
            CombatSystem::apply_command(&def, &mut state, &command(1, Verb::RunRight), None, 10);
        assert!(events.is_empty());
    }
}
