//! Spawn position selection and loadout provisioning.
//!
//! The selection policy is an external collaborator behind a narrow
//! trait: it proposes candidate transforms and may reject them, bounded
//! by a fixed retry budget per attempt. A failed attempt yields no entity
//! and the caller retries on a later tick.

use rand::Rng;

use crate::game::combatant::ActorRef;
use crate::game::constants::spawn;
use crate::game::entity::{PlayerRecord, SpawnPayload};
use crate::game::systems::weapons::WeaponSpec;
use crate::util::vec3::Vec3;

/// Where and which way a soldier enters the world
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnTransform {
    pub position: Vec3,
    pub yaw: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("no acceptable spawn position after {0} attempts")]
    NoPosition(u32),
}

/// Spawn-selection policy
pub trait SpawnSelector {
    /// Propose a candidate transform for `attempt` (0-based)
    fn candidate(&mut self, team: i32, attempt: u32) -> SpawnTransform;

    /// Whether a candidate is usable given living enemy positions
    fn acceptable(&self, candidate: &SpawnTransform, enemy_positions: &[Vec3]) -> bool;
}

/// Run the bounded candidate search against a policy
pub fn select_spawn(
    selector: &mut dyn SpawnSelector,
    team: i32,
    enemy_positions: &[Vec3],
) -> Result<SpawnTransform, SpawnError> {
    for attempt in 0..spawn::MAX_POSITION_ATTEMPTS {
        let candidate = selector.candidate(team, attempt);
        if selector.acceptable(&candidate, enemy_positions) {
            return Ok(candidate);
        }
    }
    Err(SpawnError::NoPosition(spawn::MAX_POSITION_ATTEMPTS))
}

/// Scene-placed spawn pad
#[derive(Debug, Clone, Copy)]
pub struct SpawnPad {
    pub team: i32,
    pub position: Vec3,
    pub yaw: f32,
}

/// Default policy: cycle through the team's pads with a little jitter,
/// rejecting candidates with a living enemy inside the clear radius.
pub struct PadSpawnSelector {
    pads: Vec<SpawnPad>,
}

impl PadSpawnSelector {
    pub fn new(pads: Vec<SpawnPad>) -> Self {
        Self { pads }
    }

    fn pads_for(&self, team: i32) -> Vec<&SpawnPad> {
        let own: Vec<_> = self.pads.iter().filter(|p| p.team == team).collect();
        if own.is_empty() {
            self.pads.iter().collect()
        } else {
            own
        }
    }
}

impl SpawnSelector for PadSpawnSelector {
    fn candidate(&mut self, team: i32, attempt: u32) -> SpawnTransform {
        let pads = self.pads_for(team);
        if pads.is_empty() {
            return SpawnTransform {
                position: Vec3::ZERO,
                yaw: 0.0,
            };
        }
        let pad = pads[attempt as usize % pads.len()];
        let mut rng = rand::thread_rng();
        let jitter = Vec3::new(rng.gen_range(-2.0..2.0), 0.0, rng.gen_range(-2.0..2.0));
        SpawnTransform {
            position: pad.position + jitter,
            yaw: pad.yaw,
        }
    }

    fn acceptable(&self, candidate: &SpawnTransform, enemy_positions: &[Vec3]) -> bool {
        enemy_positions
            .iter()
            .all(|e| e.horizontal_distance_to(candidate.position) >= spawn::CLEAR_RADIUS)
    }
}

/// Loadout provisioning. The game mode's custom-spawn override is just a
/// different implementation installed at setup.
pub trait LoadoutProvider {
    fn loadout(&self, actor: ActorRef, team: i32) -> Vec<WeaponSpec>;
}

/// Stock rifle-and-sidearm loadout
pub struct DefaultLoadout;

impl LoadoutProvider for DefaultLoadout {
    fn loadout(&self, _actor: ActorRef, _team: i32) -> Vec<WeaponSpec> {
        vec![
            WeaponSpec {
                slot: 0,
                id: 1,
                attachments: vec![],
                loaded: 30,
                reserve: 90,
            },
            WeaponSpec {
                slot: 1,
                id: 100,
                attachments: vec![],
                loaded: 12,
                reserve: 36,
            },
        ]
    }
}

/// Assemble the atomic spawn payload for a combatant
pub fn build_payload(
    actor: ActorRef,
    team: i32,
    model_id: i32,
    customization: Vec<i32>,
    weapons: Vec<WeaponSpec>,
) -> SpawnPayload {
    SpawnPayload {
        record: PlayerRecord {
            team,
            is_bot: actor.bot,
            model_id,
            customization,
            bot_id: actor.bot.then_some(actor.id),
        },
        weapons,
    }
}
