//! Duel Server - authoritative server for real-time one-on-one duels
//!
//! - Combat resolution with per-pixel hit detection
//! - Client prediction and reconciliation over the same physics
//! - Skill-based matchmaking and battle lifecycle with rewards
//! - Supabase persistence for players and battle history

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod matchmaking;
pub mod prediction;
pub mod store;
pub mod util;
pub mod ws;
