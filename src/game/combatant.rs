//! Combatant records - the logical participant roster.
//!
//! A combatant exists from registration until the participant leaves the
//! session, independent of whether a live simulation entity currently
//! exists for it. Scores and team assignment are mutated only by the
//! authority and replicated to everyone else.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::team;
use crate::net::replication::{SnapshotError, SnapshotReader, SnapshotWriter};

/// Wire reference to a participant: id plus bot flag.
///
/// Human ids are session connection ids; bot ids are an authority-assigned
/// sequence. The two spaces can collide numerically, so every reference on
/// the wire carries the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: i32,
    pub bot: bool,
}

impl ActorRef {
    pub fn human(id: i32) -> Self {
        Self { id, bot: false }
    }

    pub fn bot(id: i32) -> Self {
        Self { id, bot: true }
    }

    pub fn write(&self, w: &mut SnapshotWriter) {
        w.put_i32(self.id);
        w.put_bool(self.bot);
    }

    pub fn read(r: &mut SnapshotReader<'_>) -> Result<Self, SnapshotError> {
        Ok(Self {
            id: r.take_i32()?,
            bot: r.take_bool()?,
        })
    }
}

impl std::fmt::Display for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.bot {
            write!(f, "bot#{}", self.id)
        } else {
            write!(f, "player#{}", self.id)
        }
    }
}

/// True when a team index participates in team logic (assists, team-scoped
/// fill, flag ownership). Both sentinels are excluded.
#[inline]
pub fn team_valid(t: i32) -> bool {
    t >= 0
}

/// Typed extension state game-mode plugins attach to a combatant.
///
/// Slots are owned by the record and live exactly as long as it does;
/// they replicate after the fixed roster fields in registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PluginData {
    /// Consecutive kills without dying
    KillStreak(u32),
    /// Selected voice-line pack
    VoicePack(u8),
    /// Name-tag tint override
    NameColor([u8; 3]),
}

impl PluginData {
    pub fn write(&self, w: &mut SnapshotWriter) {
        match self {
            PluginData::KillStreak(n) => {
                w.put_u8(0);
                w.put_u32(*n);
            }
            PluginData::VoicePack(p) => {
                w.put_u8(1);
                w.put_u8(*p);
            }
            PluginData::NameColor(rgb) => {
                w.put_u8(2);
                w.put_u8(rgb[0]);
                w.put_u8(rgb[1]);
                w.put_u8(rgb[2]);
            }
        }
    }

    pub fn read(r: &mut SnapshotReader<'_>) -> Result<Self, SnapshotError> {
        Ok(match r.take_u8()? {
            0 => PluginData::KillStreak(r.take_u32()?),
            1 => PluginData::VoicePack(r.take_u8()?),
            _ => PluginData::NameColor([r.take_u8()?, r.take_u8()?, r.take_u8()?]),
        })
    }
}

/// Logical participant record (human or bot)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Combatant {
    pub actor: ActorRef,
    pub name: String,
    pub team: i32,
    pub kills: u32,
    pub assists: u32,
    pub deaths: u32,
    /// Game-mode gate: when false, respawn scheduling skips this record
    pub can_spawn: bool,
    /// Everyone who damaged the current life, for assist credit
    pub damage_sources: SmallVec<[ActorRef; 8]>,
    pub plugin_data: Vec<PluginData>,
}

impl Combatant {
    pub fn new(actor: ActorRef, name: String, team: i32) -> Self {
        Self {
            actor,
            name,
            team,
            kills: 0,
            assists: 0,
            deaths: 0,
            can_spawn: true,
            damage_sources: SmallVec::new(),
            plugin_data: Vec::new(),
        }
    }

    /// Record a damage source for the current life. Self-damage and
    /// duplicates are not recorded; redelivered damage calls therefore
    /// cannot double-credit.
    pub fn note_damage_source(&mut self, source: ActorRef) {
        if source == self.actor {
            return;
        }
        if !self.damage_sources.contains(&source) {
            self.damage_sources.push(source);
        }
    }

    /// Roster-entry field sequence: id, name, team, kills, assists,
    /// deaths, then plugin blocks (fixed order, see autofill roster
    /// replication).
    pub fn write_roster_entry(&self, w: &mut SnapshotWriter) {
        w.put_i32(self.actor.id);
        w.put_str(&self.name);
        w.put_i32(self.team);
        w.put_u32(self.kills);
        w.put_u32(self.assists);
        w.put_u32(self.deaths);
        w.put_u8(self.plugin_data.len() as u8);
        for slot in &self.plugin_data {
            slot.write(w);
        }
    }

    pub fn read_roster_entry(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.actor.id = r.take_i32()?;
        self.name = r.take_str()?;
        self.team = r.take_i32()?;
        self.kills = r.take_u32()?;
        self.assists = r.take_u32()?;
        self.deaths = r.take_u32()?;
        let slots = r.take_u8()? as usize;
        self.plugin_data.clear();
        for _ in 0..slots {
            self.plugin_data.push(PluginData::read(r)?);
        }
        Ok(())
    }
}

/// All registered combatants, keyed by (id, bot)
#[derive(Debug, Clone, Default)]
pub struct Roster {
    records: HashMap<ActorRef, Combatant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a combatant. Returns false (and leaves the roster
    /// untouched) if a record for this actor already exists - exactly one
    /// record per participant.
    pub fn register(&mut self, combatant: Combatant) -> bool {
        match self.records.entry(combatant.actor) {
            hashbrown::hash_map::Entry::Occupied(_) => false,
            hashbrown::hash_map::Entry::Vacant(e) => {
                e.insert(combatant);
                true
            }
        }
    }

    pub fn remove(&mut self, actor: ActorRef) -> Option<Combatant> {
        self.records.remove(&actor)
    }

    pub fn get(&self, actor: ActorRef) -> Option<&Combatant> {
        self.records.get(&actor)
    }

    pub fn get_mut(&mut self, actor: ActorRef) -> Option<&mut Combatant> {
        self.records.get_mut(&actor)
    }

    pub fn contains(&self, actor: ActorRef) -> bool {
        self.records.contains_key(&actor)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Combatant> {
        self.records.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Combatant> {
        self.records.values_mut()
    }

    pub fn humans(&self) -> impl Iterator<Item = &Combatant> {
        self.records.values().filter(|c| !c.actor.bot)
    }

    pub fn bots(&self) -> impl Iterator<Item = &Combatant> {
        self.records.values().filter(|c| c.actor.bot)
    }

    /// Bots ordered by id, the order the roster snapshot uses
    pub fn bots_sorted(&self) -> Vec<&Combatant> {
        let mut bots: Vec<_> = self.bots().collect();
        bots.sort_by_key(|c| c.actor.id);
        bots
    }

    /// Humans plus bots currently assigned to `team`
    pub fn team_population(&self, team_index: i32) -> usize {
        self.records
            .values()
            .filter(|c| c.team == team_index)
            .count()
    }

    /// Settle scoring for a death: victim's death counter, killer's kill
    /// counter (suicides score no kill), and assists for every recorded
    /// damage source on the killer's team other than the killer.
    ///
    /// Returns the actors credited with an assist so the death record can
    /// carry them to replicas. Idempotence against redelivery is the
    /// caller's job (the vitals system only reports a death once per
    /// life).
    pub fn record_death(&mut self, victim: ActorRef, killer: ActorRef) -> Vec<ActorRef> {
        let sources = match self.records.get_mut(&victim) {
            Some(record) => {
                record.deaths += 1;
                std::mem::take(&mut record.damage_sources)
            }
            None => return Vec::new(),
        };

        let killer_team = match self.records.get(&killer) {
            Some(k) => k.team,
            None => team::NONE,
        };

        if killer != victim {
            if let Some(k) = self.records.get_mut(&killer) {
                k.kills += 1;
            }
        }

        // Assist credit only while team play is active for the killer
        if !team_valid(killer_team) {
            return Vec::new();
        }

        let mut credited = Vec::new();
        for source in sources {
            if source == killer {
                continue;
            }
            if let Some(record) = self.records.get_mut(&source) {
                if record.team == killer_team {
                    record.assists += 1;
                    credited.push(source);
                }
            }
        }
        credited
    }

    /// Replica-side counterpart of `record_death`: apply the counters an
    /// authority-published death record names, without local bookkeeping.
    pub fn apply_death_record(&mut self, victim: ActorRef, killer: ActorRef, assists: &[ActorRef]) {
        if let Some(record) = self.records.get_mut(&victim) {
            record.deaths += 1;
            record.damage_sources.clear();
        }
        if killer != victim {
            if let Some(record) = self.records.get_mut(&killer) {
                record.kills += 1;
            }
        }
        for assist in assists {
            if let Some(record) = self.records.get_mut(assist) {
                record.assists += 1;
            }
        }
    }
}
