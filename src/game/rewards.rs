//! Post-battle progression

use serde::{Deserialize, Serialize};

/// Average rank or level progress of one battle
pub const BASE_PROGRESS: f64 = 25.0;
/// Coins for a casual draw; doubled in ranked battles
pub const BASE_COINS: f64 = 50.0;
/// Steepness of the skill-gap curve
pub const EFFECT_SCALE: f64 = 0.03;
/// Lower bound of every modifier
pub const MIN_MODIFIER: f64 = 0.2;

/// Persistent progression numbers of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    pub level: i32,
    pub rank: i32,
    pub money: i32,
}

/// Stat changes earned in one battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RewardDelta {
    pub rank: i32,
    pub level: i32,
    pub money: i32,
}

impl RewardDelta {
    /// Reward for `outcome` (-1, 0, 1) given `skill_diff = own - opponent`.
    ///
    /// Beating a stronger opponent pays more, losing to one costs less.
    pub fn compute(skill_diff: i32, outcome: i32, ranked: bool) -> Self {
        let outcome_f = outcome as f64;
        let effect = (-(skill_diff as f64) * EFFECT_SCALE).tanh();
        let base_coins = if ranked { 2.0 * BASE_COINS } else { BASE_COINS };

        let rank = if ranked {
            let rank_mod = (1.0 + outcome_f * effect).max(MIN_MODIFIER);
            outcome * (rank_mod * BASE_PROGRESS) as i32
        } else {
            0
        };

        let growth = 2f64.powi(outcome);
        let level_mod = (growth * (1.0 + effect) * 0.5).max(MIN_MODIFIER);
        let money_mod = (growth * (1.0 + effect)).max(MIN_MODIFIER);

        Self {
            rank,
            level: (level_mod * BASE_PROGRESS) as i32,
            money: (money_mod * base_coins) as i32,
        }
    }
}

impl PlayerStats {
    /// Apply a delta; no stat drops below zero
    pub fn apply(self, delta: RewardDelta) -> Self {
        Self {
            level: (self.level + delta.level).max(0),
            rank: (self.rank + delta.rank).max(0),
            money: (self.money + delta.money).max(0),
        }
    }
}
