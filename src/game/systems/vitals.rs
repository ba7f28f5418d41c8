//! Health, blind effect and death detection.
//!
//! Damage accumulates until health reaches zero; the order two attackers'
//! calls arrive in does not change the outcome. Handlers stay correct
//! under redelivery because a dead soldier ignores further damage.

use crate::game::constants::vitals;
use crate::net::replication::{SnapshotError, SnapshotReader, SnapshotWriter};

/// Result of applying one damage instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Victim already dead or protected; nothing changed
    Ignored,
    /// Damage applied, victim survives
    Applied { remaining: f32 },
    /// This instance brought health to zero
    Fatal,
}

/// Per-entity vitals runtime
#[derive(Debug, Clone)]
pub struct Vitals {
    pub health: f32,
    pub alive: bool,
    /// Remaining screen-blind time; presentation reads it, the core only
    /// times it out
    pub blind_remaining: f32,
}

impl Vitals {
    pub fn new() -> Self {
        Self {
            health: vitals::MAX_HEALTH,
            alive: true,
            blind_remaining: 0.0,
        }
    }

    pub fn tick(&mut self, dt: f32) {
        if self.blind_remaining > 0.0 {
            self.blind_remaining = (self.blind_remaining - dt).max(0.0);
        }
    }

    /// Apply a damage instance. `protected` suppresses it entirely
    /// (spawn protection).
    pub fn apply_damage(&mut self, amount: f32, protected: bool) -> DamageOutcome {
        if !self.alive || protected || amount <= 0.0 {
            return DamageOutcome::Ignored;
        }
        self.health -= amount;
        if self.health <= 0.0 {
            self.health = 0.0;
            self.alive = false;
            DamageOutcome::Fatal
        } else {
            DamageOutcome::Applied {
                remaining: self.health,
            }
        }
    }

    /// Damage from a landing impact, if the speed warrants any
    pub fn fall_damage(impact_speed: f32) -> f32 {
        if impact_speed <= vitals::SAFE_FALL_SPEED {
            0.0
        } else {
            (impact_speed - vitals::SAFE_FALL_SPEED) * vitals::FALL_DAMAGE_PER_SPEED
        }
    }

    pub fn heal(&mut self, amount: f32) {
        if self.alive {
            self.health = (self.health + amount).min(vitals::MAX_HEALTH);
        }
    }

    pub fn apply_blind(&mut self, duration: f32) {
        if self.alive {
            self.blind_remaining = self
                .blind_remaining
                .max(duration)
                .min(vitals::BLIND_MAX_DURATION);
        }
    }

    /// Immediate death (suicide, out of bounds)
    pub fn kill(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        self.health = 0.0;
        self.alive = false;
        true
    }

    pub fn write_block(&self, w: &mut SnapshotWriter) {
        w.put_f32(self.health);
        w.put_bool(self.alive);
        w.put_f32(self.blind_remaining);
    }

    pub fn read_block(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.health = r.take_f32()?;
        self.alive = r.take_bool()?;
        self.blind_remaining = r.take_f32()?;
        Ok(())
    }
}

impl Default for Vitals {
    fn default() -> Self {
        Self::new()
    }
}
