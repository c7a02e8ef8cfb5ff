//! Shared application state

pub mod presence;
pub mod state;

pub use presence::{PresenceHandle, PresenceRegistry};
pub use state::AppState;
