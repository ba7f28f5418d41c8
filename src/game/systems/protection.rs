//! Post-spawn damage immunity window.

use crate::game::constants::spawn;
use crate::net::replication::{SnapshotError, SnapshotReader, SnapshotWriter};

/// Per-entity spawn protection runtime
#[derive(Debug, Clone, Copy)]
pub struct SpawnProtection {
    pub remaining: f32,
}

impl SpawnProtection {
    pub fn new() -> Self {
        Self {
            remaining: spawn::PROTECTION_DURATION,
        }
    }

    pub fn tick(&mut self, dt: f32) {
        if self.remaining > 0.0 {
            self.remaining = (self.remaining - dt).max(0.0);
        }
    }

    pub fn active(&self) -> bool {
        self.remaining > 0.0
    }

    /// Firing a weapon forfeits the remaining protection
    pub fn forfeit(&mut self) {
        self.remaining = 0.0;
    }

    pub fn write_block(&self, w: &mut SnapshotWriter) {
        w.put_f32(self.remaining);
    }

    pub fn read_block(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.remaining = r.take_f32()?;
        Ok(())
    }
}

impl Default for SpawnProtection {
    fn default() -> Self {
        Self::new()
    }
}
