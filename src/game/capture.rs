//! Capture point (domination flag) state machine.
//!
//! One instance per scene objective. The authority derives ownership and
//! progress from the set of live soldiers overlapping the volume; every
//! other holder applies the replicated result. Trigger membership is
//! authority-local state and is rebuilt from entity positions after an
//! authority handoff - stale per-client trigger events are never trusted.

use rustc_hash::FxHashMap;

use crate::game::combatant::{team_valid, ActorRef};
use crate::game::constants::{capture, team};
use crate::net::replication::{Replicate, SnapshotError, SnapshotReader, SnapshotWriter};
use crate::util::vec3::Vec3;

/// Flag ownership/capture state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Neutral,
    /// Two or more teams inside the volume; progress is frozen
    Contested,
    Capturing(i32),
    Owned(i32),
}

impl CaptureState {
    fn to_wire(self) -> (u8, i32) {
        match self {
            CaptureState::Neutral => (0, team::NONE),
            CaptureState::Contested => (1, team::NONE),
            CaptureState::Capturing(t) => (2, t),
            CaptureState::Owned(t) => (3, t),
        }
    }

    fn from_wire(discriminant: u8, team_index: i32) -> Self {
        match discriminant {
            1 => CaptureState::Contested,
            2 => CaptureState::Capturing(team_index),
            3 => CaptureState::Owned(team_index),
            _ => CaptureState::Neutral,
        }
    }
}

/// Notifications for the game mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A team reached full progress and owns the flag
    Captured { point: u8, team: i32 },
    /// An owned flag was abandoned and dropped below full progress
    Neutralized { point: u8, previous_owner: i32 },
    /// Periodic score award while owned
    ScoreTick { point: u8, team: i32 },
}

/// One scene objective
#[derive(Debug, Clone)]
pub struct CapturePoint {
    pub id: u8,
    pub position: Vec3,
    pub radius: f32,
    /// Live soldiers currently inside the volume, with their teams
    occupants: FxHashMap<ActorRef, i32>,
    /// Owning team, `team::NONE` when neutral
    pub owner: i32,
    pub state: CaptureState,
    /// Team the current progress belongs to
    progress_team: i32,
    /// Authoritative progress, 0..=FULL_PROGRESS
    pub progress: f32,
    /// Smoothed presentation value pursuing `progress`; never feeds back
    /// into the transition logic
    pub displayed: f32,
    score_timer: f32,
}

impl CapturePoint {
    pub fn new(id: u8, position: Vec3, radius: f32) -> Self {
        Self {
            id,
            position,
            radius,
            occupants: FxHashMap::default(),
            owner: team::NONE,
            state: CaptureState::Neutral,
            progress_team: team::NONE,
            progress: 0.0,
            displayed: 0.0,
            score_timer: 0.0,
        }
    }

    /// Round start / mid-round reset
    pub fn reset(&mut self) {
        self.occupants.clear();
        self.owner = team::NONE;
        self.state = CaptureState::Neutral;
        self.progress_team = team::NONE;
        self.progress = 0.0;
        self.displayed = 0.0;
        self.score_timer = 0.0;
    }

    /// Cylindrical volume test
    pub fn contains(&self, position: Vec3) -> bool {
        self.position.horizontal_distance_to(position) <= self.radius
    }

    pub fn enter(&mut self, actor: ActorRef, actor_team: i32) {
        if team_valid(actor_team) {
            self.occupants.insert(actor, actor_team);
        }
    }

    /// Exit covers leaving the volume, dying inside it, or disconnecting
    pub fn exit(&mut self, actor: ActorRef) {
        self.occupants.remove(&actor);
    }

    pub fn occupant_count(&self) -> usize {
        self.occupants.len()
    }

    /// Rebuild trigger membership from scratch (authority handoff, or the
    /// per-tick poll on the authority).
    pub fn rebuild_membership(&mut self, occupants: impl Iterator<Item = (ActorRef, i32)>) {
        self.occupants.clear();
        for (actor, actor_team) in occupants {
            self.enter(actor, actor_team);
        }
    }

    /// Distinct teams currently inside the volume
    fn teams_present(&self) -> Vec<i32> {
        let mut teams: Vec<i32> = Vec::with_capacity(4);
        for &t in self.occupants.values() {
            if !teams.contains(&t) {
                teams.push(t);
            }
        }
        teams
    }

    /// Advance the state machine one tick
    pub fn step(&mut self, dt: f32, events: &mut Vec<CaptureEvent>) {
        let teams = self.teams_present();

        match teams.len() {
            0 => self.step_empty(dt, events),
            1 => self.step_single(teams[0], dt, events),
            _ => {
                // Fighting over the flag: progress moves for nobody
                self.state = CaptureState::Contested;
            }
        }

        // Presentation smoothing on top of the authoritative value
        let pursuit = (capture::DISPLAY_PURSUIT * dt).min(1.0);
        self.displayed += (self.progress - self.displayed) * pursuit;

        if let CaptureState::Owned(owning_team) = self.state {
            self.score_timer += dt;
            if self.score_timer >= capture::SCORE_INTERVAL {
                self.score_timer -= capture::SCORE_INTERVAL;
                events.push(CaptureEvent::ScoreTick {
                    point: self.id,
                    team: owning_team,
                });
            }
        } else {
            self.score_timer = 0.0;
        }
    }

    fn step_empty(&mut self, dt: f32, events: &mut Vec<CaptureEvent>) {
        if self.progress > 0.0 {
            self.progress = (self.progress - capture::DECAY_RATE * dt).max(0.0);
        }

        if self.progress >= capture::FULL_PROGRESS {
            self.state = CaptureState::Owned(self.owner);
            return;
        }

        // An owned flag dropping below full progress is abandoned
        if team_valid(self.owner) {
            let previous = self.owner;
            self.owner = team::NONE;
            events.push(CaptureEvent::Neutralized {
                point: self.id,
                previous_owner: previous,
            });
        }

        if self.progress <= 0.0 {
            self.progress_team = team::NONE;
        }
        self.state = CaptureState::Neutral;
    }

    fn step_single(&mut self, active_team: i32, dt: f32, events: &mut Vec<CaptureEvent>) {
        if self.progress_team != active_team && self.progress > 0.0 {
            // Drain another team's progress before building our own
            self.progress = (self.progress - capture::CAPTURE_RATE * dt).max(0.0);
            if team_valid(self.owner) && self.progress < capture::FULL_PROGRESS {
                let previous = self.owner;
                self.owner = team::NONE;
                events.push(CaptureEvent::Neutralized {
                    point: self.id,
                    previous_owner: previous,
                });
            }
            if self.progress <= 0.0 {
                self.progress_team = active_team;
            }
            self.state = CaptureState::Capturing(active_team);
            return;
        }

        self.progress_team = active_team;
        if self.progress < capture::FULL_PROGRESS {
            self.progress = (self.progress + capture::CAPTURE_RATE * dt).min(capture::FULL_PROGRESS);
        }

        if self.progress >= capture::FULL_PROGRESS {
            if self.owner != active_team {
                self.owner = active_team;
                events.push(CaptureEvent::Captured {
                    point: self.id,
                    team: active_team,
                });
            }
            self.state = CaptureState::Owned(active_team);
        } else {
            self.state = CaptureState::Capturing(active_team);
        }
    }
}

impl Replicate for CapturePoint {
    /// Wire order: owner team, state discriminant, state team, raw
    /// progress, smoothed progress.
    fn write_snapshot(&self, w: &mut SnapshotWriter) {
        let (discriminant, state_team) = self.state.to_wire();
        w.put_i32(self.owner);
        w.put_u8(discriminant);
        w.put_i32(state_team);
        w.put_f32(self.progress);
        w.put_f32(self.displayed);
    }

    fn read_snapshot(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.owner = r.take_i32()?;
        let discriminant = r.take_u8()?;
        let state_team = r.take_i32()?;
        self.state = CaptureState::from_wire(discriminant, state_team);
        self.progress = r.take_f32()?;
        self.displayed = r.take_f32()?;
        Ok(())
    }
}
