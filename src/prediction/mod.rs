//! Client-side prediction with server reconciliation.
//!
//! A client runs the same [`CharacterState`] rules as the server, logs every
//! verb it sends and, when an authoritative result arrives for command `k`,
//! rebuilds its state from that result and replays the commands sent after it.

use std::collections::BTreeMap;

use crate::game::character::{Animation, CharacterState};
use crate::ws::protocol::{ActionResult, CharacterInfo, Command, Verb};

/// A sent command and the predicted state right after it
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub verb: Verb,
    pub snapshot: CharacterState,
    /// Client monotonic ms at which the command was applied
    pub sent_at: u64,
}

/// Predictive copy of the local character
#[derive(Debug, Clone)]
pub struct Predictor {
    state: CharacterState,
    pending: BTreeMap<u32, PendingCommand>,
    next_id: u32,
    halted: bool,
}

impl Predictor {
    pub fn new(state: CharacterState) -> Self {
        Self {
            state,
            pending: BTreeMap::new(),
            next_id: 1,
            halted: false,
        }
    }

    /// Predictor for the character described in a welcome message
    pub fn from_info(info: &CharacterInfo, now: u64) -> Self {
        Self::new(CharacterState::from_info(info, now))
    }

    pub fn state(&self) -> &CharacterState {
        &self.state
    }

    pub fn pose(&self) -> Animation {
        self.state.pose()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn pending(&self) -> impl Iterator<Item = (&u32, &PendingCommand)> {
        self.pending.iter()
    }

    /// Apply a verb locally and log it. Returns the command to send, or
    /// `None` once the character is dying.
    pub fn input(&mut self, verb: Verb, now: u64) -> Option<Command> {
        if self.halted {
            return None;
        }

        self.state.apply_verb(verb, now);
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(
            id,
            PendingCommand {
                verb,
                snapshot: self.state.clone(),
                sent_at: now,
            },
        );
        Some(Command { id, verb })
    }

    /// Advance physics. A landing is reported to the server as a stop-jump.
    pub fn tick(&mut self, now: u64) -> Option<Command> {
        if self.halted {
            return None;
        }

        let was_jumping = self.state.motion.is_jumping;
        self.state.advance_to(now);
        if was_jumping && !self.state.motion.is_jumping {
            return self.input(Verb::StopJump, now);
        }
        None
    }

    /// Rebuild from an authoritative result and replay newer commands.
    ///
    /// Returns false when the result was discarded as stale or unknown.
    pub fn reconcile(&mut self, result: &ActionResult, now: u64) -> bool {
        if result.is_dying {
            self.state.apply_snapshot(result, now);
            self.pending.clear();
            self.halted = true;
            return true;
        }
        if self.halted {
            return false;
        }

        let Some(id) = result.command_id else {
            return false;
        };
        let Some(acked) = self.pending.get(&id) else {
            return false;
        };

        // Intents and the deadline are not on the wire; keep our own
        let mut state = acked.snapshot.clone();
        let after_attack = state.after_attack;
        let attack_deadline = state.attack_deadline;
        state.apply_snapshot(result, acked.sent_at);
        if state.is_attacking {
            state.attack_deadline = attack_deadline;
            state.after_attack = after_attack;
        }

        for (_, pending) in self.pending.range_mut(id + 1..) {
            state.apply_verb(pending.verb, pending.sent_at);
            pending.snapshot = state.clone();
        }
        state.advance_to(now);

        self.state = state;
        self.pending = self.pending.split_off(&(id + 1));
        true
    }

    /// Reset to a server snapshot, dropping every prediction in flight
    pub fn restore(&mut self, result: &ActionResult, now: u64) {
        self.state.apply_snapshot(result, now);
        self.pending.clear();
        self.halted = result.is_dying;
    }
}
