//! Strikepoint Server Library
//!
//! Authoritative session core for a team-based first-person-shooter kit:
//! one participant per session owns simulation truth, every other
//! participant applies periodic snapshots and discrete action calls.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
