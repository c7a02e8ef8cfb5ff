//! Character definitions and authoritative per-player character state

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::mask::BitMask;
use super::physics::{Bounds, Motion, PhysicsSystem, LEFT, RIGHT};
use crate::ws::protocol::{ActionResult, AttackKind, CharacterInfo, Verb};

/// Animation kinds a character sheet can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Animation {
    Idle,
    Run,
    Jump,
    Fall,
    Attack,
    HeavyAttack,
    Death,
    TakeHit,
}

impl Animation {
    pub fn for_attack(kind: AttackKind) -> Self {
        match kind {
            AttackKind::Light => Animation::Attack,
            AttackKind::Heavy => Animation::HeavyAttack,
        }
    }
}

/// Authoritative attack durations in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackTimings {
    pub light_ms: u64,
    pub heavy_ms: u64,
}

impl AttackTimings {
    pub fn duration(&self, kind: AttackKind) -> u64 {
        match kind {
            AttackKind::Light => self.light_ms,
            AttackKind::Heavy => self.heavy_ms,
        }
    }
}

/// Immutable definition of a playable character
#[derive(Debug)]
pub struct CharacterDefinition {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub health: i32,
    pub damage: i32,
    pub cost: i32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub silhouette_height: u32,
    pub x_boundary: u32,
    pub(crate) masks: HashMap<Animation, BitMask>,
    pub(crate) weapon_masks: HashMap<AttackKind, BitMask>,
    pub(crate) durations_ms: HashMap<Animation, u64>,
}

impl CharacterDefinition {
    pub fn bounds(&self) -> Bounds {
        Bounds::for_frame(
            self.frame_width,
            self.frame_height,
            self.x_boundary,
            self.silhouette_height,
        )
    }

    /// Whole-animation silhouette used when this character is hit
    pub fn mask(&self, animation: Animation) -> Option<&BitMask> {
        self.masks.get(&animation)
    }

    /// Weapon-inclusive silhouette used when this character attacks
    pub fn weapon_mask(&self, kind: AttackKind) -> Option<&BitMask> {
        self.weapon_masks.get(&kind)
    }

    pub fn duration_ms(&self, animation: Animation) -> u64 {
        self.durations_ms.get(&animation).copied().unwrap_or(0)
    }

    pub fn attack_timings(&self) -> AttackTimings {
        AttackTimings {
            light_ms: self.duration_ms(Animation::Attack),
            heavy_ms: self.duration_ms(Animation::HeavyAttack),
        }
    }

    pub fn info(&self) -> CharacterInfo {
        let bounds = self.bounds();
        let (x_start, y_start) = bounds.spawn();
        let timings = self.attack_timings();
        CharacterInfo {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            health: self.health,
            damage: self.damage,
            cost: self.cost,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            silhouette_height: self.silhouette_height,
            x_start,
            y_start,
            attack_ms: timings.light_ms,
            heavy_attack_ms: timings.heavy_ms,
        }
    }

    /// Fully opaque character of the given frame size
    #[cfg(test)]
    pub(crate) fn solid(id: u32, frame_width: u32, frame_height: u32, attack_ms: u64) -> Self {
        let (w, h) = (frame_width as usize, frame_height as usize);
        let animations = [
            Animation::Idle,
            Animation::Run,
            Animation::Jump,
            Animation::Fall,
            Animation::Attack,
            Animation::HeavyAttack,
            Animation::Death,
            Animation::TakeHit,
        ];
        let masks = animations
            .iter()
            .map(|a| (*a, BitMask::filled(w, h)))
            .collect();
        let weapon_masks = [AttackKind::Light, AttackKind::Heavy]
            .iter()
            .map(|k| (*k, BitMask::filled(w, h)))
            .collect();
        let durations_ms = [
            (Animation::Attack, attack_ms),
            (Animation::HeavyAttack, attack_ms * 2),
        ]
        .into_iter()
        .collect();
        Self {
            id,
            name: format!("Fighter {id}"),
            description: String::new(),
            health: 100,
            damage: 10,
            cost: 0,
            frame_width,
            frame_height,
            silhouette_height: frame_height,
            x_boundary: 0,
            masks,
            weapon_masks,
            durations_ms,
        }
    }
}

/// Registered characters, shared by every session
#[derive(Default)]
pub struct CharacterRegistry {
    characters: DashMap<u32, Arc<CharacterDefinition>>,
}

impl CharacterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, definition: CharacterDefinition) {
        self.characters.insert(definition.id, Arc::new(definition));
    }

    pub fn get(&self, id: u32) -> Option<Arc<CharacterDefinition>> {
        self.characters.get(&id).map(|c| c.value().clone())
    }

    /// Requested character, or the lowest registered id as a fallback
    pub fn get_or_default(&self, id: u32) -> Option<Arc<CharacterDefinition>> {
        self.get(id).or_else(|| {
            let fallback = self.characters.iter().map(|c| *c.key()).min()?;
            self.get(fallback)
        })
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}

/// Movement to resume once the current attack completes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AfterAttack {
    /// Direction to run in
    pub run: Option<f32>,
    pub jump: bool,
}

/// An attack whose animation just finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedAttack {
    pub kind: AttackKind,
    pub airborne: bool,
}

/// What happened to a verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbOutcome {
    /// The character is dying
    Dropped,
    /// Latched until the running attack completes
    Buffered,
    Applied,
    AttackStarted { deadline: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerbReport {
    pub outcome: VerbOutcome,
    /// Attack that completed while catching up to the verb's timestamp
    pub completed: Option<CompletedAttack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    Ignored,
    Wounded { health: i32 },
    Killed,
}

/// Authoritative physics and combat state of one character.
///
/// Physics is integrated lazily: every mutation first catches the state up
/// to the given monotonic timestamp (ms).
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterState {
    pub motion: Motion,
    pub health: i32,
    pub max_health: i32,
    pub is_attacking: bool,
    pub is_dying: bool,
    pub attack_type: Option<AttackKind>,
    pub attack_airborne: bool,
    pub attack_deadline: Option<u64>,
    pub after_attack: AfterAttack,
    pub last_update: u64,
    bounds: Bounds,
    timings: AttackTimings,
}

impl CharacterState {
    pub fn new(bounds: Bounds, max_health: i32, timings: AttackTimings, now: u64) -> Self {
        Self {
            motion: Motion::standing(&bounds),
            health: max_health,
            max_health,
            is_attacking: false,
            is_dying: false,
            attack_type: None,
            attack_airborne: false,
            attack_deadline: None,
            after_attack: AfterAttack::default(),
            last_update: now,
            bounds,
            timings,
        }
    }

    pub fn for_character(definition: &CharacterDefinition, now: u64) -> Self {
        Self::new(
            definition.bounds(),
            definition.health,
            definition.attack_timings(),
            now,
        )
    }

    /// Rebuild from the public character description a client receives
    pub fn from_info(info: &CharacterInfo, now: u64) -> Self {
        let x_boundary = (-info.x_start).max(0.0) as u32;
        let bounds = Bounds::for_frame(
            info.frame_width,
            info.frame_height,
            x_boundary,
            info.silhouette_height,
        );
        let timings = AttackTimings {
            light_ms: info.attack_ms,
            heavy_ms: info.heavy_attack_ms,
        };
        Self::new(bounds, info.health, timings, now)
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn timings(&self) -> &AttackTimings {
        &self.timings
    }

    /// Back to spawn with full health
    pub fn reset(&mut self, now: u64) {
        *self = Self::new(self.bounds, self.max_health, self.timings, now);
    }

    /// Integrate physics up to `now`, completing a due attack on the way.
    ///
    /// The attack completes exactly at its deadline; latched intents take
    /// effect from that instant.
    pub fn advance_to(&mut self, now: u64) -> Option<CompletedAttack> {
        let mut completed = None;

        if let Some(deadline) = self.attack_deadline {
            if deadline <= now {
                self.integrate_until(deadline);
                completed = self.finish_attack();
            }
        }

        self.integrate_until(now);
        completed
    }

    fn integrate_until(&mut self, until: u64) {
        if until <= self.last_update {
            return;
        }
        PhysicsSystem::integrate_millis(&mut self.motion, &self.bounds, until - self.last_update);
        self.last_update = until;
    }

    fn finish_attack(&mut self) -> Option<CompletedAttack> {
        self.attack_deadline = None;
        self.is_attacking = false;
        let completed = CompletedAttack {
            kind: self.attack_type.take()?,
            airborne: std::mem::take(&mut self.attack_airborne),
        };

        let intents = std::mem::take(&mut self.after_attack);
        if let Some(direction) = intents.run {
            self.motion.is_running = true;
            self.motion.direction = direction;
        }
        if intents.jump {
            self.motion.start_jump();
        }

        Some(completed)
    }

    /// Apply a control verb at monotonic time `now`
    pub fn apply_verb(&mut self, verb: Verb, now: u64) -> VerbReport {
        if self.is_dying {
            return VerbReport {
                outcome: VerbOutcome::Dropped,
                completed: None,
            };
        }

        let completed = self.advance_to(now);

        if self.is_attacking && verb != Verb::StopJump {
            match verb {
                Verb::RunRight => self.after_attack.run = Some(RIGHT),
                Verb::RunLeft => self.after_attack.run = Some(LEFT),
                Verb::StopRun => self.after_attack.run = None,
                Verb::StartJump => self.after_attack.jump = true,
                _ => {}
            }
            return VerbReport {
                outcome: VerbOutcome::Buffered,
                completed,
            };
        }

        let outcome = match verb {
            Verb::RunRight | Verb::RunLeft => {
                self.motion.is_running = true;
                self.motion.direction = if verb == Verb::RunRight { RIGHT } else { LEFT };
                VerbOutcome::Applied
            }
            Verb::StopRun => {
                self.motion.is_running = false;
                VerbOutcome::Applied
            }
            Verb::StartJump => {
                self.motion.start_jump();
                VerbOutcome::Applied
            }
            Verb::StopJump => VerbOutcome::Applied,
            Verb::Attack | Verb::HeavyAttack => {
                let kind = match verb.attack_kind() {
                    Some(kind) => kind,
                    None => return VerbReport { outcome: VerbOutcome::Dropped, completed },
                };
                self.motion.is_running = false;
                self.is_attacking = true;
                self.attack_type = Some(kind);
                self.attack_airborne = self.motion.is_jumping;
                let deadline = now + self.timings.duration(kind);
                self.attack_deadline = Some(deadline);
                VerbOutcome::AttackStarted { deadline }
            }
        };

        VerbReport { outcome, completed }
    }

    /// Reduce health, clamped at zero. Reaching zero is terminal.
    pub fn take_damage(&mut self, amount: i32) -> DamageOutcome {
        if self.is_dying {
            return DamageOutcome::Ignored;
        }
        self.health = (self.health - amount.max(0)).max(0);
        if self.health > 0 {
            return DamageOutcome::Wounded {
                health: self.health,
            };
        }

        self.is_dying = true;
        self.is_attacking = false;
        self.attack_type = None;
        self.attack_airborne = false;
        self.attack_deadline = None;
        self.motion.is_running = false;
        self.after_attack = AfterAttack::default();
        DamageOutcome::Killed
    }

    /// Pose for rendering
    pub fn pose(&self) -> Animation {
        if self.is_dying {
            Animation::Death
        } else {
            self.hit_pose()
        }
    }

    /// Pose whose silhouette is used when this character is hit
    pub fn hit_pose(&self) -> Animation {
        if self.motion.is_running {
            Animation::Run
        } else if self.motion.is_jumping {
            if self.motion.velocity_y < 0.0 {
                Animation::Jump
            } else {
                Animation::Fall
            }
        } else if self.is_attacking {
            match self.attack_type {
                Some(AttackKind::Heavy) => Animation::HeavyAttack,
                _ => Animation::Attack,
            }
        } else {
            Animation::Idle
        }
    }

    pub fn to_action_result(&self, command_id: Option<u32>, t: u64) -> ActionResult {
        ActionResult {
            t,
            command_id,
            health: self.health,
            direction: self.motion.direction,
            x: self.motion.x,
            y: self.motion.y,
            vy: self.motion.velocity_y,
            is_dying: self.is_dying,
            is_attacking: self.is_attacking,
            attack_type: if self.is_attacking { self.attack_type } else { None },
            is_jumping: self.motion.is_jumping,
            is_running: self.motion.is_running,
        }
    }

    /// Overwrite with an observed snapshot taken at monotonic time `at`.
    ///
    /// Latched intents and the attack deadline are not part of a snapshot
    /// and are cleared.
    pub fn apply_snapshot(&mut self, result: &ActionResult, at: u64) {
        self.motion.x = result.x;
        self.motion.y = result.y;
        self.motion.velocity_y = result.vy;
        self.motion.direction = result.direction;
        self.motion.is_running = result.is_running;
        self.motion.is_jumping = result.is_jumping;
        self.health = result.health;
        self.is_dying = result.is_dying;
        self.is_attacking = result.is_attacking;
        self.attack_type = if result.is_attacking {
            result.attack_type
        } else {
            None
        };
        self.attack_deadline = None;
        self.after_attack = AfterAttack::default();
        self.last_update = at;
    }
}
