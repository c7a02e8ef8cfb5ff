//! Game simulation modules

pub mod assets;
pub mod battle;
pub mod character;
pub mod collision;
pub mod combat;
pub mod mask;
pub mod physics;
pub mod rewards;
pub mod session;

pub use battle::{BattleController, BattleRegistry};
pub use character::{CharacterDefinition, CharacterRegistry, CharacterState};
pub use collision::CollisionOracle;
pub use combat::CombatSystem;
pub use physics::PhysicsSystem;
pub use session::{PlayerSession, SessionEvent, SessionMailbox};
