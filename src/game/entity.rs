//! Soldier simulation entity - the live, positioned, damageable avatar a
//! combatant gets while alive.
//!
//! Created only from a complete `SpawnPayload` so no holder can observe a
//! partially-initialized entity; destroyed on death or disconnect. The
//! combatant record outlives it.

use serde::{Deserialize, Serialize};

use crate::game::combatant::ActorRef;
use crate::game::systems::bot::BotDriver;
use crate::game::systems::look::Look;
use crate::game::systems::movement::{Movement, MovementEvent};
use crate::game::systems::protection::SpawnProtection;
use crate::game::systems::vitals::{DamageOutcome, Vitals};
use crate::game::systems::weapons::{WeaponManager, WeaponSpec};
use crate::net::protocol::SoldierInput;
use crate::net::replication::{Replicate, SnapshotError, SnapshotReader, SnapshotWriter};
use crate::util::vec3::{Quat, Vec3};

/// Immutable initialization record inside the spawn payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub team: i32,
    pub is_bot: bool,
    pub model_id: i32,
    pub customization: Vec<i32>,
    /// Present only for bots
    pub bot_id: Option<i32>,
}

/// Spawn initialization payload, applied as one unit.
/// Wire order: player record, then the loadout weapons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPayload {
    pub record: PlayerRecord,
    pub weapons: Vec<WeaponSpec>,
}

/// Presentation data captured at the moment of death
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RagdollCause {
    pub force: f32,
    pub direction: Vec3,
    pub collider: i32,
    pub hit_point: Vec3,
    pub sound_category: i32,
    pub sound_id: i32,
}

/// Death-sound categories for `RagdollCause::sound_category`
pub mod death_sound {
    pub const COMBAT: i32 = 0;
    pub const FALL: i32 = 1;
    pub const OUT_OF_BOUNDS: i32 = 2;
}

/// What an entity tick concluded about its own life
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Alive,
    DiedOfFall,
    DiedOutOfBounds,
}

/// Live simulation entity for one combatant
#[derive(Debug, Clone)]
pub struct Soldier {
    pub actor: ActorRef,
    /// Session participant that owns (drives and replicates) this entity
    pub owner: i32,
    pub team: i32,
    pub model_id: i32,
    pub customization: Vec<i32>,
    pub position: Vec3,
    pub orientation: Quat,
    pub ragdoll: RagdollCause,
    pub movement: Movement,
    pub look: Look,
    pub protection: Option<SpawnProtection>,
    pub vitals: Vitals,
    pub weapons: WeaponManager,
    /// Present only on bot-controlled entities
    pub bot_driver: Option<BotDriver>,
    /// Latest controller intent (human relay or bot controller)
    pub input: SoldierInput,
}

impl Soldier {
    /// Create a soldier from its atomic spawn payload and transform.
    /// Every field of the payload is applied before the value exists.
    pub fn spawn(
        actor: ActorRef,
        owner: i32,
        position: Vec3,
        yaw: f32,
        payload: &SpawnPayload,
    ) -> Self {
        let mut look = Look::new();
        look.apply(yaw, 0.0);
        Self {
            actor,
            owner,
            team: payload.record.team,
            model_id: payload.record.model_id,
            customization: payload.record.customization.clone(),
            position,
            orientation: look.orientation(),
            ragdoll: RagdollCause::default(),
            movement: Movement::new(),
            look,
            protection: Some(SpawnProtection::new()),
            vitals: Vitals::new(),
            weapons: WeaponManager::from_specs(&payload.weapons),
            bot_driver: if actor.bot {
                Some(BotDriver::new())
            } else {
                None
            },
            input: SoldierInput::default(),
        }
    }

    pub fn alive(&self) -> bool {
        self.vitals.alive
    }

    pub fn protected(&self) -> bool {
        self.protection.as_ref().is_some_and(|p| p.active())
    }

    /// Store controller intent for the next tick
    pub fn apply_input(&mut self, input: SoldierInput) {
        self.look.apply(input.yaw, input.pitch);
        self.input = input;
    }

    /// Advance one tick: movement, timers, death-plane and fall damage.
    /// Combat damage arrives separately through `apply_damage`.
    pub fn tick(&mut self, dt: f32) -> TickOutcome {
        if !self.alive() {
            return TickOutcome::Alive;
        }

        self.vitals.tick(dt);
        if let Some(protection) = &mut self.protection {
            protection.tick(dt);
        }

        let event = self.movement.tick(&mut self.position, &self.input, dt);
        self.orientation = self.look.orientation();

        match event {
            MovementEvent::OutOfBounds => {
                if self.vitals.kill() {
                    self.ragdoll = RagdollCause {
                        force: 0.0,
                        direction: Vec3::DOWN,
                        collider: 0,
                        hit_point: self.position,
                        sound_category: death_sound::OUT_OF_BOUNDS,
                        sound_id: self.model_id,
                    };
                    return TickOutcome::DiedOutOfBounds;
                }
                TickOutcome::Alive
            }
            MovementEvent::Landed(impact) => {
                let damage = Vitals::fall_damage(impact);
                if damage > 0.0 {
                    let protected = self.protected();
                    if self.vitals.apply_damage(damage, protected) == DamageOutcome::Fatal {
                        self.ragdoll = RagdollCause {
                            force: impact,
                            direction: Vec3::DOWN,
                            collider: 0,
                            hit_point: self.position,
                            sound_category: death_sound::FALL,
                            sound_id: self.model_id,
                        };
                        return TickOutcome::DiedOfFall;
                    }
                }
                TickOutcome::Alive
            }
            MovementEvent::None => TickOutcome::Alive,
        }
    }

    /// Apply a combat damage instance; fills the ragdoll-cause fields at
    /// the fatal moment so presentation can play the death.
    pub fn apply_damage(
        &mut self,
        amount: f32,
        direction: Vec3,
        force: f32,
        hit_position: Vec3,
        collider: i32,
    ) -> DamageOutcome {
        let protected = self.protected();
        let outcome = self.vitals.apply_damage(amount, protected);
        if outcome == DamageOutcome::Fatal {
            self.ragdoll = RagdollCause {
                force,
                direction,
                collider,
                hit_point: hit_position,
                sound_category: death_sound::COMBAT,
                sound_id: self.model_id,
            };
        }
        outcome
    }

    /// Owner-declared suicide
    pub fn suicide(&mut self) -> bool {
        if self.vitals.kill() {
            self.ragdoll = RagdollCause {
                force: 0.0,
                direction: Vec3::DOWN,
                collider: 0,
                hit_point: self.position,
                sound_category: death_sound::COMBAT,
                sound_id: self.model_id,
            };
            true
        } else {
            false
        }
    }
}

impl Replicate for Soldier {
    /// Fixed per-tick field sequence (owner to others): ragdoll block,
    /// transform, then sub-system blocks in registration order. Consumers
    /// must read exactly this sequence.
    fn write_snapshot(&self, w: &mut SnapshotWriter) {
        w.put_f32(self.ragdoll.force);
        w.put_vec3(self.ragdoll.direction);
        w.put_i32(self.ragdoll.collider);
        w.put_vec3(self.ragdoll.hit_point);
        w.put_i32(self.ragdoll.sound_category);
        w.put_i32(self.ragdoll.sound_id);
        w.put_vec3(self.position);
        w.put_quat(self.orientation);

        self.movement.write_block(w);
        self.look.write_block(w);
        w.put_bool(self.protection.is_some());
        if let Some(protection) = &self.protection {
            protection.write_block(w);
        }
        self.vitals.write_block(w);
        self.weapons.write_block(w);
        if let Some(driver) = &self.bot_driver {
            driver.write_block(w);
        }
    }

    fn read_snapshot(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.ragdoll.force = r.take_f32()?;
        self.ragdoll.direction = r.take_vec3()?;
        self.ragdoll.collider = r.take_i32()?;
        self.ragdoll.hit_point = r.take_vec3()?;
        self.ragdoll.sound_category = r.take_i32()?;
        self.ragdoll.sound_id = r.take_i32()?;
        self.position = r.take_vec3()?;
        self.orientation = r.take_quat()?;

        self.movement.read_block(r)?;
        self.look.read_block(r)?;
        if r.take_bool()? {
            let mut protection = self.protection.take().unwrap_or_default();
            protection.read_block(r)?;
            self.protection = Some(protection);
        } else {
            self.protection = None;
        }
        self.vitals.read_block(r)?;
        self.weapons.read_block(r)?;
        if self.actor.bot {
            let mut driver = self.bot_driver.take().unwrap_or_default();
            driver.read_block(r)?;
            self.bot_driver = Some(driver);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::{bounds, tick};
    use crate::net::replication::{apply_snapshot, emit_snapshot};

    pub(crate) fn test_payload(team: i32, is_bot: bool) -> SpawnPayload {
        SpawnPayload {
            record: PlayerRecord {
                team,
                is_bot,
                model_id: 2,
                customization: vec![1, 0, 3],
                bot_id: if is_bot { Some(1) } else { None },
            },
            weapons: vec![
                WeaponSpec {
                    slot: 0,
                    id: 17,
                    attachments: vec![4],
                    loaded: 30,
                    reserve: 90,
                },
                WeaponSpec {
                    slot: 1,
                    id: 3,
                    attachments: vec![],
                    loaded: 12,
                    reserve: 24,
                },
            ],
        }
    }

    #[test]
    fn test_spawn_applies_whole_payload() {
        let payload = test_payload(1, false);
        let soldier = Soldier::spawn(
            ActorRef::human(7),
            7,
            Vec3::new(5.0, 0.0, -3.0),
            1.5,
            &payload,
        );

        assert_eq!(soldier.team, 1);
        assert_eq!(soldier.model_id, 2);
        assert_eq!(soldier.customization, vec![1, 0, 3]);
        assert_eq!(soldier.weapons.slot_count(), 2);
        assert!(soldier.alive());
        assert!(soldier.protected());
        assert!(soldier.bot_driver.is_none());
    }

    #[test]
    fn test_bot_spawn_gets_driver() {
        let soldier = Soldier::spawn(
            ActorRef::bot(1),
            0,
            Vec3::ZERO,
            0.0,
            &test_payload(0, true),
        );
        assert!(soldier.bot_driver.is_some());
    }

    #[test]
    fn test_fatal_damage_fills_ragdoll() {
        let mut soldier =
            Soldier::spawn(ActorRef::human(7), 7, Vec3::ZERO, 0.0, &test_payload(0, false));
        soldier.protection = None;

        let outcome = soldier.apply_damage(
            150.0,
            Vec3::FORWARD,
            300.0,
            Vec3::new(0.0, 1.6, 0.2),
            3,
        );
        assert_eq!(outcome, DamageOutcome::Fatal);
        assert!(!soldier.alive());
        assert_eq!(soldier.ragdoll.collider, 3);
        assert_eq!(soldier.ragdoll.force, 300.0);
        assert_eq!(soldier.ragdoll.sound_category, death_sound::COMBAT);
    }

    #[test]
    fn test_spawn_protection_blocks_damage() {
        let mut soldier =
            Soldier::spawn(ActorRef::human(7), 7, Vec3::ZERO, 0.0, &test_payload(0, false));
        assert_eq!(
            soldier.apply_damage(90.0, Vec3::FORWARD, 10.0, Vec3::ZERO, 0),
            DamageOutcome::Ignored
        );
        assert!(soldier.alive());
    }

    #[test]
    fn test_death_plane_kills() {
        let mut soldier =
            Soldier::spawn(ActorRef::human(7), 7, Vec3::ZERO, 0.0, &test_payload(0, false));
        soldier.position.y = bounds::DEATH_PLANE_Y + 0.1;
        soldier.movement.grounded = false;
        soldier.movement.velocity.y = -50.0;

        assert_eq!(soldier.tick(tick::DT), TickOutcome::DiedOutOfBounds);
        assert!(!soldier.alive());
        assert_eq!(soldier.ragdoll.sound_category, death_sound::OUT_OF_BOUNDS);
    }

    #[test]
    fn test_suicide_reports_once() {
        let mut soldier =
            Soldier::spawn(ActorRef::human(7), 7, Vec3::ZERO, 0.0, &test_payload(0, false));
        assert!(soldier.suicide());
        assert!(!soldier.suicide());
    }

    #[test]
    fn test_snapshot_roundtrip_human() {
        let mut src =
            Soldier::spawn(ActorRef::human(7), 7, Vec3::new(4.0, 0.0, 9.0), 0.8, &test_payload(1, false));
        src.apply_input(SoldierInput {
            yaw: 0.8,
            pitch: -0.2,
            ..Default::default()
        });
        src.tick(tick::DT);

        let mut dst = Soldier::spawn(ActorRef::human(7), 7, Vec3::ZERO, 0.0, &test_payload(1, false));
        apply_snapshot(&mut dst, &emit_snapshot(&src)).unwrap();

        assert_eq!(dst.position, src.position);
        assert_eq!(dst.orientation, src.orientation);
        assert_eq!(dst.vitals.health, src.vitals.health);
        assert_eq!(dst.look.yaw, src.look.yaw);
        assert_eq!(
            dst.protection.map(|p| p.remaining),
            src.protection.map(|p| p.remaining)
        );
    }

    #[test]
    fn test_snapshot_roundtrip_bot() {
        let mut src =
            Soldier::spawn(ActorRef::bot(2), 0, Vec3::new(1.0, 0.0, 1.0), 0.0, &test_payload(0, true));
        src.bot_driver.as_mut().unwrap().objective = Some(1);

        let mut dst = Soldier::spawn(ActorRef::bot(2), 0, Vec3::ZERO, 0.0, &test_payload(0, true));
        apply_snapshot(&mut dst, &emit_snapshot(&src)).unwrap();
        assert_eq!(dst.bot_driver.unwrap().objective, Some(1));
    }

    #[test]
    fn test_bot_snapshot_rejected_by_human_reader() {
        // A bot entity writes a bot-controller block a human entity will
        // not read: the stream must fail loudly, not desync silently.
        let src = Soldier::spawn(ActorRef::bot(2), 0, Vec3::ZERO, 0.0, &test_payload(0, true));
        let mut dst =
            Soldier::spawn(ActorRef::human(2), 2, Vec3::ZERO, 0.0, &test_payload(0, false));
        assert!(apply_snapshot(&mut dst, &emit_snapshot(&src)).is_err());
    }

    #[test]
    fn test_expired_protection_still_replicates() {
        let mut src =
            Soldier::spawn(ActorRef::human(7), 7, Vec3::ZERO, 0.0, &test_payload(0, false));
        src.protection = None;

        let mut dst = Soldier::spawn(ActorRef::human(7), 7, Vec3::ZERO, 0.0, &test_payload(0, false));
        apply_snapshot(&mut dst, &emit_snapshot(&src)).unwrap();
        assert!(dst.protection.is_none());
    }
}
