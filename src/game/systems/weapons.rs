//! Weapon slots and ammunition.
//!
//! Ballistics are an external collaborator; the manager tracks what is
//! held and how much ammo it has, and gates fire/reload so confirmations
//! only go out when the action actually happened.

use serde::{Deserialize, Serialize};

use crate::net::replication::{SnapshotError, SnapshotReader, SnapshotWriter};

/// One weapon in the spawn loadout (wire order: slot, id, attachments,
/// loaded, reserve)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponSpec {
    pub slot: u8,
    pub id: i32,
    pub attachments: Vec<i32>,
    pub loaded: u16,
    pub reserve: u16,
}

impl WeaponSpec {
    pub fn write(&self, w: &mut SnapshotWriter) {
        w.put_u8(self.slot);
        w.put_i32(self.id);
        w.put_i32_list(&self.attachments);
        w.put_u32(self.loaded as u32);
        w.put_u32(self.reserve as u32);
    }

    pub fn read(r: &mut SnapshotReader<'_>) -> Result<Self, SnapshotError> {
        Ok(Self {
            slot: r.take_u8()?,
            id: r.take_i32()?,
            attachments: r.take_i32_list()?,
            loaded: r.take_u32()? as u16,
            reserve: r.take_u32()? as u16,
        })
    }
}

/// Held weapon state
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponSlot {
    pub id: i32,
    pub attachments: Vec<i32>,
    pub loaded: u16,
    pub reserve: u16,
    /// Magazine capacity; loadouts spawn with a full magazine
    pub magazine: u16,
}

impl WeaponSlot {
    fn from_spec(spec: &WeaponSpec) -> Self {
        Self {
            id: spec.id,
            attachments: spec.attachments.clone(),
            loaded: spec.loaded,
            reserve: spec.reserve,
            magazine: spec.loaded.max(1),
        }
    }
}

/// Per-entity weapon runtime
#[derive(Debug, Clone, Default)]
pub struct WeaponManager {
    slots: Vec<WeaponSlot>,
    active: u8,
}

impl WeaponManager {
    /// Build from the spawn loadout. Slot indices in the specs are
    /// positions in the carry order.
    pub fn from_specs(specs: &[WeaponSpec]) -> Self {
        Self {
            slots: specs.iter().map(WeaponSlot::from_spec).collect(),
            active: 0,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn active_slot(&self) -> u8 {
        self.active
    }

    pub fn active_weapon(&self) -> Option<&WeaponSlot> {
        self.slots.get(self.active as usize)
    }

    pub fn weapon(&self, slot: u8) -> Option<&WeaponSlot> {
        self.slots.get(slot as usize)
    }

    pub fn select(&mut self, slot: u8) -> bool {
        if (slot as usize) < self.slots.len() {
            self.active = slot;
            true
        } else {
            false
        }
    }

    /// Consume one round from the active weapon. Returns false with an
    /// empty magazine; the caller sends no fire confirmation then.
    pub fn try_fire(&mut self) -> bool {
        match self.slots.get_mut(self.active as usize) {
            Some(slot) if slot.loaded > 0 => {
                slot.loaded -= 1;
                true
            }
            _ => false,
        }
    }

    /// Refill the active magazine from reserve. Returns the refilled
    /// slot index, or None when nothing changed (full magazine or dry
    /// reserve) so redelivered reload confirmations stay harmless.
    pub fn reload(&mut self) -> Option<u8> {
        let active = self.active;
        let slot = self.slots.get_mut(active as usize)?;
        if slot.reserve == 0 || slot.loaded >= slot.magazine {
            return None;
        }
        let needed = slot.magazine - slot.loaded;
        let taken = needed.min(slot.reserve);
        slot.loaded += taken;
        slot.reserve -= taken;
        Some(active)
    }

    /// Swap a slot for a new weapon as one unit
    pub fn replace(&mut self, slot: u8, spec: &WeaponSpec) -> bool {
        match self.slots.get_mut(slot as usize) {
            Some(held) => {
                *held = WeaponSlot::from_spec(spec);
                true
            }
            None => false,
        }
    }

    pub fn write_block(&self, w: &mut SnapshotWriter) {
        w.put_u8(self.active);
        w.put_u8(self.slots.len() as u8);
        for slot in &self.slots {
            w.put_i32(slot.id);
            w.put_i32_list(&slot.attachments);
            w.put_u32(slot.loaded as u32);
            w.put_u32(slot.reserve as u32);
            w.put_u32(slot.magazine as u32);
        }
    }

    pub fn read_block(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.active = r.take_u8()?;
        let count = r.take_u8()? as usize;
        self.slots.clear();
        for _ in 0..count {
            self.slots.push(WeaponSlot {
                id: r.take_i32()?,
                attachments: r.take_i32_list()?,
                loaded: r.take_u32()? as u16,
                reserve: r.take_u32()? as u16,
                magazine: r.take_u32()? as u16,
            });
        }
        Ok(())
    }
}
