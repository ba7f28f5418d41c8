//! Soldier sub-systems.
//!
//! Each sub-system owns its runtime block and replicates it in the fixed
//! registration order used by `Soldier::write_snapshot`: movement, look,
//! spawn protection (when present), vitals, weapon manager, bot controller
//! (bots only). Changing this order is a wire-format change.

pub mod movement;
pub mod look;
pub mod vitals;
pub mod weapons;
pub mod protection;
pub mod bot;
