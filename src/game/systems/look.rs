//! View direction for soldier entities.

use crate::net::replication::{SnapshotError, SnapshotReader, SnapshotWriter};
use crate::util::vec3::Quat;

/// Pitch clamp just short of straight up/down
const PITCH_LIMIT: f32 = 1.55;

/// Per-entity look runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct Look {
    pub yaw: f32,
    pub pitch: f32,
}

impl Look {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw;
        self.pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_yaw_pitch(self.yaw, self.pitch)
    }

    pub fn write_block(&self, w: &mut SnapshotWriter) {
        w.put_f32(self.yaw);
        w.put_f32(self.pitch);
    }

    pub fn read_block(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.yaw = r.take_f32()?;
        self.pitch = r.take_f32()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_clamped() {
        let mut look = Look::new();
        look.apply(0.0, 3.0);
        assert!(look.pitch <= PITCH_LIMIT);
        look.apply(0.0, -3.0);
        assert!(look.pitch >= -PITCH_LIMIT);
    }

    #[test]
    fn test_block_roundtrip() {
        let mut look = Look::new();
        look.apply(1.25, -0.5);

        let mut w = SnapshotWriter::new();
        look.write_block(&mut w);
        let bytes = w.into_bytes();

        let mut decoded = Look::new();
        let mut r = SnapshotReader::new(&bytes);
        decoded.read_block(&mut r).unwrap();
        r.finish().unwrap();

        assert_eq!(decoded.yaw, 1.25);
        assert_eq!(decoded.pitch, -0.5);
    }
}
