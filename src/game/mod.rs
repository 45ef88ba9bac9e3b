//! Gameplay: match flow, player sessions, weapons and combat

pub mod actions;
pub mod combat;
pub mod engine;
pub mod host;
pub mod inventory;
pub mod r#match;
pub mod player;
pub mod progression;
pub mod projectile;
pub mod scheduler;
pub mod weapons;

#[cfg(test)]
pub mod testing;

pub use engine::{EngineHandle, EngineInput, MatchEngine};
pub use r#match::{MatchPhase, MatchStatus};
