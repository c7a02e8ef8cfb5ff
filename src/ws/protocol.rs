//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::physics::SCREEN_WIDTH;

/// Character control verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    RunRight,
    RunLeft,
    StopRun,
    StartJump,
    StopJump,
    Attack,
    HeavyAttack,
}

impl Verb {
    /// Attack kind started by this verb, if any
    pub fn attack_kind(self) -> Option<AttackKind> {
        match self {
            Verb::Attack => Some(AttackKind::Light),
            Verb::HeavyAttack => Some(AttackKind::Heavy),
            _ => None,
        }
    }
}

/// The two attack flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    Light,
    Heavy,
}

/// A control command. `id` is dense and strictly increasing per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: u32,
    pub verb: Verb,
}

/// Authoritative character state after a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Server unix time (ms) when the change was processed
    pub t: u64,
    /// Command that caused the change; absent for server-originated changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<u32>,
    pub health: i32,
    pub direction: f32,
    pub x: f32,
    pub y: f32,
    /// Vertical velocity, needed by the client replay
    #[serde(default)]
    pub vy: f32,
    pub is_dying: bool,
    pub is_attacking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<AttackKind>,
    pub is_jumping: bool,
    pub is_running: bool,
}

impl ActionResult {
    /// The same result as seen from the opponent's side of the screen
    pub fn mirrored(&self, frame_width: f32) -> Self {
        Self {
            x: SCREEN_WIDTH - self.x - frame_width,
            direction: -self.direction,
            ..self.clone()
        }
    }
}

/// Whose health changed, from the receiver's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Who {
    Character,
    Opponent,
}

/// Public part of a character definition shown to the opponent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub health: i32,
    pub damage: i32,
    pub cost: i32,
    /// Frame geometry
    pub frame_width: u32,
    pub frame_height: u32,
    /// Height of the character silhouette without weapon
    pub silhouette_height: u32,
    /// Spawn position (top-left of frame)
    pub x_start: f32,
    pub y_start: f32,
    /// Authoritative attack durations
    pub attack_ms: u64,
    pub heavy_attack_ms: u64,
}

/// Battle announcement sent when a pair is formed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartBattleInfo {
    pub server_timestamp: u64,
    /// Unix ms when commands start being accepted
    pub start_time: u64,
    /// Unix ms when the battle ends in a draw
    pub end_time: u64,
    pub opponent_public_id: String,
    pub opponent_name: String,
    pub opponent_rank: i32,
    pub opponent_level: i32,
    pub opponent_character: CharacterInfo,
}

/// Battle outcome from one participant's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleResult {
    /// The battle never became active
    NoBattle,
    Defeat,
    Draw,
    Victory,
}

impl BattleResult {
    /// Numeric outcome used by the reward curve
    pub fn outcome(self) -> Option<i32> {
        match self {
            BattleResult::NoBattle => None,
            BattleResult::Defeat => Some(-1),
            BattleResult::Draw => Some(0),
            BattleResult::Victory => Some(1),
        }
    }
}

/// Final battle report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndBattleInfo {
    pub result: BattleResult,
    pub total_money: i32,
    pub current_rank: i32,
    pub current_level: i32,
    /// Character snapshot after the reset
    pub final_state: ActionResult,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Character control
    Action(Command),

    /// Enter the matchmaking queue
    FindBattle {
        /// Ranked queue pairs by rank, casual queue by level
        ranked: bool,
    },

    /// Leave the matchmaking queue
    CancelSearch,

    /// Readiness acknowledgement after `start_battle_info`
    Ready,

    /// Leave the current battle (forfeit)
    ExitBattle,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        user_id: Uuid,
        public_id: String,
        display_name: String,
        level: i32,
        rank: i32,
        money: i32,
        character: CharacterInfo,
        server_time: u64,
    },

    /// Own character state
    ActionCharacter(ActionResult),

    /// Opponent character state, already mirrored
    ActionOpponent(ActionResult),

    /// Incremental health change
    HealthUpdate { who: Who, health: i32 },

    /// Queued for a battle; carries the reset character state
    WaitingBattle(ActionResult),

    /// Left the matchmaking queue
    SearchCancelled,

    /// A pair was formed
    StartBattleInfo(StartBattleInfo),

    /// The battle is over
    EndBattle(EndBattleInfo),

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ActionResult {
        ActionResult {
            t: 1,
            command_id: Some(4),
            health: 80,
            direction: 1.0,
            x: 100.0,
            y: 400.0,
            vy: -12.5,
            is_dying: false,
            is_attacking: true,
            attack_type: Some(AttackKind::Heavy),
            is_jumping: true,
            is_running: false,
        }
    }

    #[test]
    fn mirroring_flips_x_and_direction_only() {
        let mirrored = sample_result().mirrored(200.0);
        assert_eq!(mirrored.x, SCREEN_WIDTH - 100.0 - 200.0);
        assert_eq!(mirrored.direction, -1.0);
        assert_eq!(mirrored.y, 400.0);
        assert_eq!(mirrored.vy, -12.5);
        assert_eq!(mirrored.command_id, Some(4));
    }

    #[test]
    fn mirroring_twice_is_identity() {
        let result = sample_result();
        assert_eq!(result.mirrored(200.0).mirrored(200.0), result);
    }

    #[test]
    fn client_action_parses_from_tagged_json() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"action","id":7,"verb":"heavy_attack"}"#).unwrap();
        match msg {
            ClientMsg::Action(cmd) => {
                assert_eq!(cmd.id, 7);
                assert_eq!(cmd.verb, Verb::HeavyAttack);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn unknown_verb_is_a_parse_error() {
        let parsed = serde_json::from_str::<ClientMsg>(r#"{"type":"action","id":1,"verb":"fly"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn server_originated_result_omits_command_id() {
        let mut result = sample_result();
        result.command_id = None;
        let json = serde_json::to_string(&ServerMsg::ActionCharacter(result)).unwrap();
        assert!(!json.contains("command_id"));
        assert!(json.contains(r#""type":"action_character""#));
    }

    #[test]
    fn battle_result_outcomes() {
        assert_eq!(BattleResult::NoBattle.outcome(), None);
        assert_eq!(BattleResult::Defeat.outcome(), Some(-1));
        assert_eq!(BattleResult::Draw.outcome(), Some(0));
        assert_eq!(BattleResult::Victory.outcome(), Some(1));
    }
}
