//! Matchmaking queues and pairing

pub mod queue;
pub mod service;

pub use queue::QueueKind;
pub use service::MatchmakingService;
