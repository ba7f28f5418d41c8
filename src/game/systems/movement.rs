//! Kinematic movement for soldier entities.
//!
//! Scene collision is an external collaborator; the core integrates
//! against a flat walkable plane at y = 0 and reports landing impacts so
//! vitals can assess fall damage.

use crate::game::constants::{bounds, movement};
use crate::net::replication::{SnapshotError, SnapshotReader, SnapshotWriter};
use crate::net::protocol::SoldierInput;
use crate::util::vec3::Vec3;

/// Per-entity movement runtime
#[derive(Debug, Clone, Default)]
pub struct Movement {
    pub velocity: Vec3,
    pub grounded: bool,
    pub sprinting: bool,
}

/// What the integration step observed this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementEvent {
    None,
    /// Landed with this downward speed (m/s)
    Landed(f32),
    /// Fell below the death plane
    OutOfBounds,
}

impl Movement {
    pub fn new() -> Self {
        Self {
            velocity: Vec3::ZERO,
            grounded: true,
            sprinting: false,
        }
    }

    /// Integrate one tick of intent into `position`
    pub fn tick(&mut self, position: &mut Vec3, input: &SoldierInput, dt: f32) -> MovementEvent {
        self.sprinting = input.sprint && input.move_z > 0.0;

        let speed = if self.sprinting {
            movement::RUN_SPEED * movement::SPRINT_MULTIPLIER
        } else {
            movement::RUN_SPEED
        };

        // Move axes are in view space; rotate into world space by yaw
        let forward = Vec3::from_yaw(input.yaw);
        let right = Vec3::new(forward.z, 0.0, -forward.x);
        let wish = (forward * input.move_z + right * input.move_x).clamp_length(1.0);

        self.velocity.x = wish.x * speed;
        self.velocity.z = wish.z * speed;

        if self.grounded && input.jump {
            self.velocity.y = movement::JUMP_SPEED;
            self.grounded = false;
        }

        if !self.grounded {
            self.velocity.y -= movement::GRAVITY * dt;
        }

        *position += self.velocity * dt;

        if position.y < bounds::DEATH_PLANE_Y {
            return MovementEvent::OutOfBounds;
        }

        // Walkable plane at y = 0
        if position.y <= 0.0 && self.velocity.y <= 0.0 {
            let impact = -self.velocity.y;
            position.y = 0.0;
            self.velocity.y = 0.0;
            if !self.grounded {
                self.grounded = true;
                return MovementEvent::Landed(impact);
            }
        }

        MovementEvent::None
    }

    pub fn write_block(&self, w: &mut SnapshotWriter) {
        w.put_vec3(self.velocity);
        w.put_bool(self.grounded);
        w.put_bool(self.sprinting);
    }

    pub fn read_block(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.velocity = r.take_vec3()?;
        self.grounded = r.take_bool()?;
        self.sprinting = r.take_bool()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::tick;

    fn forward_input() -> SoldierInput {
        SoldierInput {
            move_z: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_forward_movement_follows_yaw() {
        let mut movement = Movement::new();
        let mut pos = Vec3::ZERO;
        let mut input = forward_input();
        input.yaw = 0.0;

        movement.tick(&mut pos, &input, tick::DT);
        assert!(pos.z > 0.0);
        assert!(pos.x.abs() < 1e-4);
    }

    #[test]
    fn test_sprint_is_faster() {
        let mut walk = Movement::new();
        let mut run = Movement::new();
        let mut walk_pos = Vec3::ZERO;
        let mut run_pos = Vec3::ZERO;

        let input = forward_input();
        let mut sprint_input = forward_input();
        sprint_input.sprint = true;

        walk.tick(&mut walk_pos, &input, tick::DT);
        run.tick(&mut run_pos, &sprint_input, tick::DT);
        assert!(run_pos.z > walk_pos.z);
    }

    #[test]
    fn test_jump_then_land_reports_impact() {
        let mut movement = Movement::new();
        let mut pos = Vec3::ZERO;

        let mut input = SoldierInput::default();
        input.jump = true;
        assert_eq!(movement.tick(&mut pos, &input, tick::DT), MovementEvent::None);
        assert!(!movement.grounded);

        input.jump = false;
        let mut landed = None;
        for _ in 0..120 {
            if let MovementEvent::Landed(impact) = movement.tick(&mut pos, &input, tick::DT) {
                landed = Some(impact);
                break;
            }
        }
        let impact = landed.expect("should land within a few seconds");
        assert!(impact > 0.0);
        assert!(movement.grounded);
        assert_eq!(pos.y, 0.0);
    }

    #[test]
    fn test_death_plane_detection() {
        let mut movement = Movement::new();
        let mut pos = Vec3::new(0.0, bounds::DEATH_PLANE_Y + 0.5, 0.0);
        movement.grounded = false;
        movement.velocity.y = -60.0;

        let event = movement.tick(&mut pos, &SoldierInput::default(), tick::DT);
        assert_eq!(event, MovementEvent::OutOfBounds);
    }

    #[test]
    fn test_block_roundtrip() {
        let mut movement = Movement::new();
        movement.velocity = Vec3::new(1.0, -2.0, 3.0);
        movement.grounded = false;
        movement.sprinting = true;

        let mut w = SnapshotWriter::new();
        movement.write_block(&mut w);
        let bytes = w.into_bytes();

        let mut decoded = Movement::new();
        let mut r = SnapshotReader::new(&bytes);
        decoded.read_block(&mut r).unwrap();
        r.finish().unwrap();

        assert_eq!(decoded.velocity, movement.velocity);
        assert_eq!(decoded.grounded, false);
        assert!(decoded.sprinting);
    }
}
