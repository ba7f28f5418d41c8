//! Bot population manager.
//!
//! Runs only on the authority, on a fixed interval rather than every
//! tick. Keeps humans+bots within the configured band per scope: each
//! team gets `capacity / team_count` in team modes, the whole room gets
//! `capacity` otherwise. Every balancing loop is bounded by a retry cap
//! because external conditions can make the target unreachable.

use tracing::{debug, warn};

use crate::game::combatant::{ActorRef, Combatant, Roster};
use crate::game::constants::{autofill, team};
use crate::game::systems::bot::generate_bot_name;
use crate::net::replication::{SnapshotError, SnapshotReader, SnapshotWriter};

/// Roster change produced by a balancing pass. The caller announces the
/// change and handles entity lifecycle (a removed bot's live soldier must
/// be destroyed; an added bot spawns through the normal lifecycle on the
/// next scheduling pass).
#[derive(Debug, Clone, PartialEq)]
pub enum FillChange {
    BotAdded {
        actor: ActorRef,
        name: String,
        team: i32,
    },
    BotRemoved {
        actor: ActorRef,
        name: String,
    },
}

/// Authority-side bot population scheduler
#[derive(Debug, Clone)]
pub struct Autofill {
    capacity: usize,
    team_count: usize,
    enabled: bool,
    last_bot_id: i32,
    interval_timer: f32,
}

impl Autofill {
    pub fn new(capacity: usize, team_count: usize, enabled: bool) -> Self {
        Self {
            capacity,
            team_count,
            enabled,
            last_bot_id: 0,
            interval_timer: 0.0,
        }
    }

    pub fn last_bot_id(&self) -> i32 {
        self.last_bot_id
    }

    /// Authority handoff: no continuity is assumed for the schedule, the
    /// new authority balances immediately.
    pub fn rearm(&mut self) {
        self.interval_timer = autofill::INTERVAL;
    }

    /// Scheduled pass; runs `maintain` when the interval elapses
    pub fn tick(&mut self, dt: f32, roster: &mut Roster) -> Vec<FillChange> {
        self.interval_timer += dt;
        if self.interval_timer < autofill::INTERVAL {
            return Vec::new();
        }
        self.interval_timer = 0.0;
        self.maintain(roster)
    }

    /// One balancing pass over every scope. Called on manager start,
    /// after a human joins a team and after a human leaves a team; each
    /// call starts with a fresh retry counter.
    pub fn maintain(&mut self, roster: &mut Roster) -> Vec<FillChange> {
        let mut changes = Vec::new();
        if !self.enabled {
            return changes;
        }

        if self.team_count >= 2 {
            let target = self.capacity / self.team_count;
            for team_index in 0..self.team_count as i32 {
                self.maintain_scope(roster, Some(team_index), target, &mut changes);
            }
        } else {
            self.maintain_scope(roster, None, self.capacity, &mut changes);
        }
        changes
    }

    fn scope_population(roster: &Roster, scope: Option<i32>) -> usize {
        match scope {
            Some(team_index) => roster.team_population(team_index),
            None => roster.len(),
        }
    }

    fn maintain_scope(
        &mut self,
        roster: &mut Roster,
        scope: Option<i32>,
        target: usize,
        changes: &mut Vec<FillChange>,
    ) {
        let mut retries = 0u32;
        loop {
            let current = Self::scope_population(roster, scope);

            if current < target {
                if retries >= autofill::RETRY_CAP {
                    warn!(
                        "Autofill gave up filling scope {:?} at {}/{} after {} tries",
                        scope, current, target, retries
                    );
                    break;
                }
                retries += 1;
                if let Some(change) = self.create_bot(roster, scope) {
                    changes.push(change);
                } else {
                    break;
                }
            } else if current > target {
                if retries >= autofill::RETRY_CAP {
                    warn!(
                        "Autofill gave up draining scope {:?} at {}/{} after {} tries",
                        scope, current, target, retries
                    );
                    break;
                }
                retries += 1;
                match self.remove_bot(roster, scope) {
                    Some(change) => changes.push(change),
                    // Over target with humans only; nothing to remove
                    None => break,
                }
            } else {
                break;
            }
        }
    }

    fn create_bot(&mut self, roster: &mut Roster, scope: Option<i32>) -> Option<FillChange> {
        self.last_bot_id += 1;
        let actor = ActorRef::bot(self.last_bot_id);
        let name = generate_bot_name();
        let bot_team = scope.unwrap_or(team::UNDECIDED);

        if !roster.register(Combatant::new(actor, name.clone(), bot_team)) {
            warn!("Bot id {} already registered, skipping", actor.id);
            return None;
        }
        debug!("Autofill added {} ({}) to team {}", name, actor, bot_team);
        Some(FillChange::BotAdded {
            actor,
            name,
            team: bot_team,
        })
    }

    /// Pick a concrete existing bot in scope, newest id first so
    /// long-lived bots persist. Never treats an index as an id.
    fn remove_bot(&mut self, roster: &mut Roster, scope: Option<i32>) -> Option<FillChange> {
        let victim = roster
            .bots()
            .filter(|c| scope.map_or(true, |team_index| c.team == team_index))
            .map(|c| c.actor)
            .max_by_key(|a| a.id)?;

        let record = roster.remove(victim)?;
        debug!("Autofill removed {} ({})", record.name, victim);
        Some(FillChange::BotRemoved {
            actor: victim,
            name: record.name,
        })
    }
}

/// Bot roster snapshot, authority to others.
/// Wire order: last-assigned id, count, then one roster entry per bot in
/// ascending id order.
pub fn write_bot_roster(roster: &Roster, last_bot_id: i32, w: &mut SnapshotWriter) {
    let bots = roster.bots_sorted();
    w.put_i32(last_bot_id);
    w.put_u32(bots.len() as u32);
    for bot in bots {
        bot.write_roster_entry(w);
    }
}

/// Apply a bot roster snapshot: resize the local bot set to the received
/// count, creating placeholder records for newly-appeared bots and
/// discarding records beyond the new set. Returns the last-assigned id.
pub fn apply_bot_roster(
    roster: &mut Roster,
    r: &mut SnapshotReader<'_>,
) -> Result<i32, SnapshotError> {
    let last_bot_id = r.take_i32()?;
    let count = r.take_u32()? as usize;

    let mut received: Vec<Combatant> = Vec::with_capacity(count);
    for _ in 0..count {
        let mut entry = Combatant::new(ActorRef::bot(0), String::new(), team::NONE);
        entry.read_roster_entry(r)?;
        entry.actor.bot = true;
        received.push(entry);
    }

    // Discard bots the authority no longer knows
    let known: Vec<ActorRef> = roster.bots().map(|c| c.actor).collect();
    for actor in known {
        if !received.iter().any(|e| e.actor == actor) {
            roster.remove(actor);
        }
    }

    // Upsert the received set
    for entry in received {
        match roster.get_mut(entry.actor) {
            Some(record) => *record = entry,
            None => {
                roster.register(entry);
            }
        }
    }

    Ok(last_bot_id)
}
