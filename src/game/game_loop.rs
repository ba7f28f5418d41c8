//! Authority tick loop and replica apply loop.
//!
//! The authority runs the fixed-rate tick: bot population balancing,
//! controllers, intent integration, capture point recomputation, then
//! snapshot emission. Every other participant only applies snapshots and
//! discrete calls, and never mutates authoritative fields directly.

use hashbrown::HashMap;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::game::autofill::{apply_bot_roster, write_bot_roster, Autofill, FillChange};
use crate::game::capture::{CaptureEvent, CapturePoint};
use crate::game::combatant::{team_valid, ActorRef, Combatant, Roster};
use crate::game::constants::{capture, net as cadence, spawn, team, tick};
use crate::game::entity::{Soldier, TickOutcome};
use crate::game::spawn::{build_payload, select_spawn, LoadoutProvider, SpawnSelector};
use crate::game::systems::bot::{BotControl, FlagObservation, SoldierObservation};
use crate::game::systems::vitals::DamageOutcome;
use crate::net::protocol::{
    ActionCall, ClientMessage, DamageCause, DeathRecord, GameEvent, ServerMessage,
};
use crate::net::replication::{apply_snapshot, emit_snapshot, SnapshotReader, Target};
use crate::net::session::Session;

/// Session-mode parameters for one game loop
#[derive(Debug, Clone)]
pub struct GameLoopConfig {
    /// Room capacity, humans plus bots
    pub capacity: usize,
    /// Active team count; below 2 the session is free-for-all
    pub team_count: usize,
    /// Whether the bot population manager runs
    pub bot_fill: bool,
    /// Selectable character models
    pub model_pool: Vec<i32>,
}

impl Default for GameLoopConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            team_count: 2,
            bot_fill: true,
            model_pool: vec![0, 1, 2, 3],
        }
    }
}

/// Per-session simulation state, authority or replica
pub struct GameLoop {
    config: GameLoopConfig,
    tick: u64,
    roster: Roster,
    soldiers: HashMap<ActorRef, Soldier>,
    flags: Vec<CapturePoint>,
    autofill: Autofill,
    bots: BotControl,
    selector: Box<dyn SpawnSelector + Send + Sync>,
    loadouts: Box<dyn LoadoutProvider + Send + Sync>,
    /// Dead (or newly registered) combatants waiting to spawn; counts
    /// down to the next attempt. Removing the entry abandons the spawn.
    respawn_timers: HashMap<ActorRef, f32>,
    team_scores: HashMap<i32, u32>,
    last_snapshot_tick: u64,
    /// Replica side: snapshots for entities whose creation message has
    /// not arrived yet
    pending_snapshots: HashMap<ActorRef, Vec<u8>>,
}

impl GameLoop {
    pub fn new(
        config: GameLoopConfig,
        flags: Vec<CapturePoint>,
        selector: Box<dyn SpawnSelector + Send + Sync>,
        loadouts: Box<dyn LoadoutProvider + Send + Sync>,
    ) -> Self {
        let autofill = Autofill::new(config.capacity, config.team_count, config.bot_fill);
        Self {
            config,
            tick: 0,
            roster: Roster::new(),
            soldiers: HashMap::new(),
            flags,
            autofill,
            bots: BotControl::new(),
            selector,
            loadouts,
            respawn_timers: HashMap::new(),
            team_scores: HashMap::new(),
            last_snapshot_tick: 0,
            pending_snapshots: HashMap::new(),
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn soldier(&self, actor: ActorRef) -> Option<&Soldier> {
        self.soldiers.get(&actor)
    }

    pub fn soldier_mut(&mut self, actor: ActorRef) -> Option<&mut Soldier> {
        self.soldiers.get_mut(&actor)
    }

    pub fn soldier_count(&self) -> usize {
        self.soldiers.len()
    }

    pub fn flags(&self) -> &[CapturePoint] {
        &self.flags
    }

    pub fn team_score(&self, team_index: i32) -> u32 {
        self.team_scores.get(&team_index).copied().unwrap_or(0)
    }

    fn team_play_active(&self) -> bool {
        self.config.team_count >= 2
    }

    fn broadcast(&self, session: &mut Session, event: GameEvent) {
        session.send(Target::Everyone, ServerMessage::Event(event));
    }

    /// Authority start: register nothing, just run the first balancing
    /// pass (the manager-start invocation point).
    pub fn start(&mut self, session: &mut Session) {
        let changes = self.autofill.maintain(&mut self.roster);
        self.apply_fill_changes(session, changes);
    }

    /// Admit a human through the session and register its combatant
    pub fn handle_join(&mut self, session: &mut Session, name: &str) -> Result<i32, String> {
        let actor_id = session.try_join(name)?;
        self.register_human(session, actor_id, name.to_string());
        Ok(actor_id)
    }

    /// Register a combatant record for a connected human
    pub fn register_human(&mut self, session: &mut Session, actor_id: i32, name: String) {
        let actor = ActorRef::human(actor_id);
        if !self.roster.register(Combatant::new(actor, name.clone(), team::UNDECIDED)) {
            warn!("Combatant for {} already registered", actor);
            return;
        }
        self.broadcast(session, GameEvent::CombatantJoined { actor, name });

        if !self.team_play_active() {
            // Free-for-all spawns without a team pick
            self.respawn_timers.insert(actor, 0.0);
        }
    }

    /// A human picked a team: one of the autofill invocation points
    pub fn select_team(&mut self, session: &mut Session, actor_id: i32, team_index: i32) {
        if self.team_play_active()
            && (team_index < 0 || team_index >= self.config.team_count as i32)
        {
            warn!("Rejecting invalid team {} for actor {}", team_index, actor_id);
            return;
        }

        let actor = ActorRef::human(actor_id);
        match self.roster.get_mut(actor) {
            Some(record) => record.team = team_index,
            None => {
                warn!("Team pick from unregistered {}", actor);
                return;
            }
        }
        self.broadcast(
            session,
            GameEvent::TeamChanged {
                actor,
                team: team_index,
            },
        );
        self.respawn_timers.entry(actor).or_insert(0.0);

        let changes = self.autofill.maintain(&mut self.roster);
        self.apply_fill_changes(session, changes);
    }

    /// A human left: despawn, unregister, rebalance. Also cancels any
    /// spawn in progress so no orphan entity appears later.
    pub fn remove_human(&mut self, session: &mut Session, actor_id: i32) {
        let actor = ActorRef::human(actor_id);
        self.despawn(actor);
        self.respawn_timers.remove(&actor);
        self.pending_snapshots.remove(&actor);

        if let Some(record) = self.roster.remove(actor) {
            self.broadcast(
                session,
                GameEvent::CombatantLeft {
                    actor,
                    name: record.name,
                },
            );
        }

        let changes = self.autofill.maintain(&mut self.roster);
        self.apply_fill_changes(session, changes);
    }

    fn apply_fill_changes(&mut self, session: &mut Session, changes: Vec<FillChange>) {
        for change in changes {
            match change {
                FillChange::BotAdded { actor, name, team } => {
                    self.bots.register_bot(actor.id);
                    // Entity spawns through the normal lifecycle on the
                    // next scheduling pass, not synchronously
                    self.respawn_timers.insert(actor, 0.0);
                    self.broadcast(session, GameEvent::CombatantJoined { actor, name: name.clone() });
                    self.broadcast(session, GameEvent::TeamChanged { actor, team });
                }
                FillChange::BotRemoved { actor, name } => {
                    self.despawn(actor);
                    self.bots.unregister_bot(actor.id);
                    self.respawn_timers.remove(&actor);
                    self.broadcast(session, GameEvent::CombatantLeft { actor, name });
                }
            }
        }
    }

    /// Destroy a simulation entity, keeping the combatant record
    fn despawn(&mut self, actor: ActorRef) {
        self.soldiers.remove(&actor);
        for flag in &mut self.flags {
            flag.exit(actor);
        }
    }

    /// Dispatch one participant message on the authority
    pub fn handle_client_message(
        &mut self,
        session: &mut Session,
        from: i32,
        message: ClientMessage,
    ) {
        match message {
            ClientMessage::JoinRequest { .. } => {
                // Joins go through handle_join before a sender id exists
                warn!("Unexpected JoinRequest from registered actor {}", from);
            }
            ClientMessage::SelectTeam { team: team_index } => {
                self.select_team(session, from, team_index)
            }
            ClientMessage::Input(input) => {
                if let Some(soldier) = self.soldiers.get_mut(&ActorRef::human(from)) {
                    soldier.apply_input(input);
                }
            }
            ClientMessage::Action { entity, call } => {
                self.handle_action(session, from, entity, call)
            }
            ClientMessage::Leave => {
                let (_, promoted) = session.leave(from);
                self.remove_human(session, from);
                if promoted == Some(session.local_actor()) {
                    self.become_authority(session);
                }
            }
            ClientMessage::Ping { timestamp } => {
                session.send(
                    Target::Actor(from),
                    ServerMessage::Pong {
                        client_timestamp: timestamp,
                        server_timestamp: self.tick * tick::DURATION_MS,
                    },
                );
            }
        }
    }

    /// Apply or relay a discrete action. Handlers ignore actions that no
    /// longer apply instead of raising: the reliable channel may
    /// redeliver, and entities die between send and receipt.
    pub fn handle_action(
        &mut self,
        session: &mut Session,
        sender: i32,
        entity: ActorRef,
        call: ActionCall,
    ) {
        let Some(soldier) = self.soldiers.get(&entity) else {
            debug!("Dropping {:?} for missing entity {}", call, entity);
            return;
        };
        let owner = soldier.owner;
        let locally_owned = owner == session.local_actor();

        match call {
            ActionCall::DamageApply {
                amount,
                attacker,
                cause,
                origin,
                direction,
                force,
                hit_position,
                collider,
            } => {
                if !locally_owned {
                    // Only the owner may resolve damage on its entity
                    session.send(
                        Target::Actor(owner),
                        ServerMessage::Action {
                            target: Target::Actor(owner),
                            entity,
                            call: ActionCall::DamageApply {
                                amount,
                                attacker,
                                cause,
                                origin,
                                direction,
                                force,
                                hit_position,
                                collider,
                            },
                        },
                    );
                    return;
                }

                if self.team_play_active() {
                    if let Some(record) = self.roster.get_mut(entity) {
                        record.note_damage_source(attacker);
                    }
                }

                let soldier = match self.soldiers.get_mut(&entity) {
                    Some(s) => s,
                    None => return,
                };
                if soldier.apply_damage(amount, direction, force, hit_position, collider)
                    == DamageOutcome::Fatal
                {
                    self.publish_death(session, entity, attacker, cause);
                }
            }
            ActionCall::Suicide => {
                if sender != owner {
                    warn!(
                        "Rejecting suicide for {} from non-owner {}",
                        entity, sender
                    );
                    return;
                }
                let died = self
                    .soldiers
                    .get_mut(&entity)
                    .is_some_and(|soldier| soldier.suicide());
                if died {
                    self.publish_death(session, entity, entity, DamageCause::suicide());
                }
            }
            ActionCall::BlindApply { duration } => {
                if locally_owned {
                    if let Some(soldier) = self.soldiers.get_mut(&entity) {
                        soldier.vitals.apply_blind(duration);
                    }
                } else {
                    session.send(
                        Target::Actor(owner),
                        ServerMessage::Action {
                            target: Target::Actor(owner),
                            entity,
                            call: ActionCall::BlindApply { duration },
                        },
                    );
                }
            }
            ActionCall::WeaponReplace { slot, weapon } => {
                if sender != owner {
                    warn!("Rejecting weapon replace for {} from {}", entity, sender);
                    return;
                }
                if let Some(soldier) = self.soldiers.get_mut(&entity) {
                    if !soldier.weapons.replace(slot, &weapon) {
                        debug!("Weapon replace on missing slot {} of {}", slot, entity);
                    }
                }
            }
            // Pure confirmations carry no authoritative state; relay to
            // everyone for presentation
            call @ (ActionCall::FireConfirm { .. }
            | ActionCall::ReloadConfirm { .. }
            | ActionCall::MeleeConfirm { .. }
            | ActionCall::GrenadePull { .. }
            | ActionCall::GrenadeThrow { .. }
            | ActionCall::VoiceLine { .. }) => {
                session.send(
                    Target::Everyone,
                    ServerMessage::Action {
                        target: Target::Everyone,
                        entity,
                        call,
                    },
                );
            }
        }
    }

    /// Publish the death record, settle scores, destroy the entity and
    /// schedule the respawn. The combatant record survives.
    fn publish_death(
        &mut self,
        session: &mut Session,
        victim: ActorRef,
        killer: ActorRef,
        cause: DamageCause,
    ) {
        let (model_id, ragdoll_collider) = match self.soldiers.get(&victim) {
            Some(s) => (s.model_id, s.ragdoll.collider),
            None => return,
        };

        let assists = self.roster.record_death(victim, killer);
        self.broadcast(
            session,
            GameEvent::SoldierDied(DeathRecord {
                victim,
                killer,
                cause,
                model_id,
                ragdoll_collider,
                assists,
            }),
        );
        self.despawn(victim);
        self.respawn_timers.insert(victim, spawn::RESPAWN_DELAY);
    }

    /// One fixed-rate authority tick
    pub fn authority_tick(&mut self, session: &mut Session) {
        debug_assert!(session.is_authority());
        let dt = tick::DT;

        self.sanitize_entities();

        // 1. Bot population balancing on its own interval
        let changes = self.autofill.tick(dt, &mut self.roster);
        self.apply_fill_changes(session, changes);

        // 2. Spawn scheduling for combatants without an entity
        self.run_spawn_pass(session, dt);

        // 3. Bot controllers produce intent through the human input path
        self.run_bot_controllers(session, dt);

        // 4. Integrate intent, weapons and timers for owned entities
        self.run_entity_ticks(session, dt);

        // 5. Capture points recompute from current membership
        self.run_capture_step(session, dt);

        // 6. Snapshot emission at the broadcast cadence
        if self.tick.saturating_sub(self.last_snapshot_tick) >= cadence::TICKS_PER_SNAPSHOT {
            self.emit_snapshots(session);
            self.last_snapshot_tick = self.tick;
        }

        self.tick += 1;
    }

    /// NaN/Infinity scrub before integrating (bad input or bad math must
    /// not propagate into snapshots)
    fn sanitize_entities(&mut self) {
        for soldier in self.soldiers.values_mut() {
            if !soldier.position.is_finite() {
                warn!("Fixed non-finite position for {}", soldier.actor);
                soldier.position = crate::util::vec3::Vec3::ZERO;
            }
            if !soldier.movement.velocity.is_finite() {
                warn!("Fixed non-finite velocity for {}", soldier.actor);
                soldier.movement.velocity = crate::util::vec3::Vec3::ZERO;
            }
        }
    }

    fn run_spawn_pass(&mut self, session: &mut Session, dt: f32) {
        for timer in self.respawn_timers.values_mut() {
            *timer -= dt;
        }

        let due: Vec<ActorRef> = self
            .respawn_timers
            .iter()
            .filter(|(_, timer)| **timer <= 0.0)
            .map(|(actor, _)| *actor)
            .collect();

        for actor in due {
            if self.soldiers.contains_key(&actor) {
                self.respawn_timers.remove(&actor);
                continue;
            }
            let Some(record) = self.roster.get(actor) else {
                // Left while waiting to spawn; abandon cleanly
                self.respawn_timers.remove(&actor);
                continue;
            };
            if !record.can_spawn {
                continue;
            }
            if self.team_play_active() && !team_valid(record.team) {
                continue;
            }
            self.try_spawn(session, actor);
        }
    }

    fn try_spawn(&mut self, session: &mut Session, actor: ActorRef) {
        let Some(record) = self.roster.get(actor) else {
            return;
        };
        let spawn_team = record.team;

        let enemy_positions: Vec<_> = self
            .soldiers
            .values()
            .filter(|s| s.alive() && (!team_valid(spawn_team) || s.team != spawn_team))
            .map(|s| s.position)
            .collect();

        let transform = match select_spawn(self.selector.as_mut(), spawn_team, &enemy_positions) {
            Ok(t) => t,
            Err(e) => {
                // Not fatal: the timer stays due and the next tick retries
                debug!("Spawn for {} deferred: {}", actor, e);
                return;
            }
        };

        let model_id = match self.config.model_pool.as_slice() {
            [] => 0,
            pool => pool[rand::thread_rng().gen_range(0..pool.len())],
        };
        let payload = build_payload(
            actor,
            spawn_team,
            model_id,
            Vec::new(),
            self.loadouts.loadout(actor, spawn_team),
        );

        // Bots are driven (and owned) by the authority; humans own their
        // own soldier
        let owner = if actor.bot {
            session.local_actor()
        } else {
            actor.id
        };

        let soldier = Soldier::spawn(actor, owner, transform.position, transform.yaw, &payload);
        self.soldiers.insert(actor, soldier);
        self.respawn_timers.remove(&actor);

        session.send(
            Target::Everyone,
            ServerMessage::SoldierSpawned {
                actor,
                owner,
                position: transform.position,
                yaw: transform.yaw,
                payload,
            },
        );
        debug!("Spawned {} for team {}", actor, spawn_team);
    }

    fn run_bot_controllers(&mut self, session: &mut Session, dt: f32) {
        if self.bots.is_empty() {
            return;
        }

        let observations: Vec<SoldierObservation> = self
            .soldiers
            .values()
            .map(|s| SoldierObservation {
                actor: s.actor,
                team: s.team,
                position: s.position,
                alive: s.alive(),
            })
            .collect();
        let flag_observations: Vec<FlagObservation> = self
            .flags
            .iter()
            .map(|f| FlagObservation {
                id: f.id,
                position: f.position,
                owner: f.owner,
            })
            .collect();

        self.bots.update(&observations, &flag_observations, dt);

        let current_tick = self.tick;
        let local = session.local_actor();
        for soldier in self.soldiers.values_mut() {
            if !soldier.actor.bot || soldier.owner != local {
                continue;
            }
            if let Some(input) = self.bots.input_for(soldier.actor.id, current_tick) {
                soldier.apply_input(input);
            }
            if let (Some(bot_driver), Some(driver)) =
                (soldier.bot_driver.as_mut(), self.bots.get(soldier.actor.id))
            {
                *bot_driver = driver.clone();
            }
        }
    }

    fn run_entity_ticks(&mut self, session: &mut Session, dt: f32) {
        let local = session.local_actor();
        let mut deaths: Vec<(ActorRef, DamageCause)> = Vec::new();
        let mut confirmations: Vec<(ActorRef, ActionCall)> = Vec::new();

        for soldier in self.soldiers.values_mut() {
            if soldier.owner != local || !soldier.alive() {
                continue;
            }

            if let Some(slot) = soldier.input.select_slot {
                soldier.weapons.select(slot);
            }
            if soldier.input.fire && soldier.weapons.try_fire() {
                if let Some(protection) = &mut soldier.protection {
                    protection.forfeit();
                }
                confirmations.push((
                    soldier.actor,
                    ActionCall::FireConfirm {
                        slot: soldier.weapons.active_slot(),
                        origin: soldier.position,
                        direction: crate::util::vec3::Vec3::from_yaw(soldier.look.yaw),
                    },
                ));
            }
            if soldier.input.reload {
                if let Some(slot) = soldier.weapons.reload() {
                    confirmations.push((soldier.actor, ActionCall::ReloadConfirm { slot }));
                }
            }

            match soldier.tick(dt) {
                TickOutcome::Alive => {}
                TickOutcome::DiedOfFall => deaths.push((soldier.actor, DamageCause::fall())),
                TickOutcome::DiedOutOfBounds => {
                    deaths.push((soldier.actor, DamageCause::out_of_bounds()))
                }
            }
        }

        for (actor, call) in confirmations {
            session.send(
                Target::Everyone,
                ServerMessage::Action {
                    target: Target::Everyone,
                    entity: actor,
                    call,
                },
            );
        }
        for (actor, cause) in deaths {
            self.publish_death(session, actor, actor, cause);
        }
    }

    fn run_capture_step(&mut self, session: &mut Session, dt: f32) {
        let mut events = Vec::new();
        for flag in &mut self.flags {
            let occupants = self
                .soldiers
                .values()
                .filter(|s| s.alive() && team_valid(s.team) && flag.contains(s.position))
                .map(|s| (s.actor, s.team))
                .collect::<Vec<_>>();
            flag.rebuild_membership(occupants.into_iter());
            flag.step(dt, &mut events);
        }

        for event in events {
            match event {
                CaptureEvent::Captured { point, team: winner } => {
                    info!("Flag {} captured by team {}", point, winner);
                    self.broadcast(session, GameEvent::FlagOwnerChanged { point, team: winner });
                }
                CaptureEvent::Neutralized { point, .. } => {
                    info!("Flag {} back to neutral", point);
                    self.broadcast(
                        session,
                        GameEvent::FlagOwnerChanged {
                            point,
                            team: team::NONE,
                        },
                    );
                }
                CaptureEvent::ScoreTick { team: scorer, .. } => {
                    *self.team_scores.entry(scorer).or_insert(0) += capture::SCORE_PER_INTERVAL;
                    self.broadcast(
                        session,
                        GameEvent::TeamScored {
                            team: scorer,
                            amount: capture::SCORE_PER_INTERVAL,
                        },
                    );
                }
            }
        }
    }

    fn emit_snapshots(&mut self, session: &mut Session) {
        let local = session.local_actor();

        for soldier in self.soldiers.values() {
            if soldier.owner != local {
                continue;
            }
            session.send(
                Target::Everyone,
                ServerMessage::SoldierSnapshot {
                    actor: soldier.actor,
                    data: emit_snapshot(soldier),
                },
            );
        }

        let mut w = crate::net::replication::SnapshotWriter::new();
        write_bot_roster(&self.roster, self.autofill.last_bot_id(), &mut w);
        session.send(
            Target::Everyone,
            ServerMessage::BotRoster {
                data: w.into_bytes(),
            },
        );

        for flag in &self.flags {
            session.send(
                Target::Everyone,
                ServerMessage::FlagSnapshot {
                    point: flag.id,
                    data: emit_snapshot(flag),
                },
            );
        }
    }

    /// Replica apply loop: consume one authority/owner message
    pub fn apply_server_message(&mut self, session: &mut Session, message: ServerMessage) {
        match message {
            ServerMessage::SoldierSpawned {
                actor,
                owner,
                position,
                yaw,
                payload,
            } => {
                if self.soldiers.contains_key(&actor) {
                    debug!("Duplicate spawn for {}, ignoring", actor);
                    return;
                }
                if !self.roster.contains(actor) {
                    // Roster event may still be in flight; placeholder
                    self.roster
                        .register(Combatant::new(actor, String::new(), payload.record.team));
                }
                let mut soldier = Soldier::spawn(actor, owner, position, yaw, &payload);
                if let Some(pending) = self.pending_snapshots.remove(&actor) {
                    if let Err(e) = apply_snapshot(&mut soldier, &pending) {
                        warn!("Deferred snapshot for {} rejected: {}", actor, e);
                        debug_assert!(false, "deferred snapshot desync for {actor}");
                    }
                }
                self.soldiers.insert(actor, soldier);
            }
            ServerMessage::SoldierSnapshot { actor, data } => {
                match self.soldiers.get_mut(&actor) {
                    Some(soldier) => {
                        if let Err(e) = apply_snapshot(soldier, &data) {
                            warn!("Snapshot for {} rejected: {}", actor, e);
                            debug_assert!(false, "snapshot desync for {actor}");
                        }
                    }
                    // Entity creation not yet processed: defer,
                    // latest-wins
                    None => {
                        self.pending_snapshots.insert(actor, data);
                    }
                }
            }
            ServerMessage::BotRoster { data } => {
                let mut r = SnapshotReader::new(&data);
                let applied = apply_bot_roster(&mut self.roster, &mut r);
                if let Err(e) = applied.and_then(|_| r.finish()) {
                    warn!("Bot roster snapshot rejected: {}", e);
                    debug_assert!(false, "bot roster desync");
                }
            }
            ServerMessage::FlagSnapshot { point, data } => {
                match self.flags.iter_mut().find(|f| f.id == point) {
                    Some(flag) => {
                        if let Err(e) = apply_snapshot(flag, &data) {
                            warn!("Flag {} snapshot rejected: {}", point, e);
                            debug_assert!(false, "flag snapshot desync");
                        }
                    }
                    None => warn!("Snapshot for unknown flag {}", point),
                }
            }
            ServerMessage::Event(event) => self.apply_event(event),
            ServerMessage::Action { entity, call, .. } => {
                // Replica-side discrete call (e.g. damage relayed to an
                // entity this process owns)
                let local = session.local_actor();
                if self
                    .soldiers
                    .get(&entity)
                    .is_some_and(|s| s.owner == local)
                {
                    self.handle_action(session, local, entity, call);
                }
            }
            ServerMessage::AuthorityChanged { actor_id } => {
                session.set_authority(actor_id);
                if actor_id == session.local_actor() {
                    self.become_authority(session);
                }
            }
            ServerMessage::JoinAccepted { .. }
            | ServerMessage::JoinRejected { .. }
            | ServerMessage::Pong { .. }
            | ServerMessage::Kicked { .. } => {}
        }
    }

    fn apply_event(&mut self, event: GameEvent) {
        match event {
            GameEvent::CombatantJoined { actor, name } => {
                if !self.roster.contains(actor) {
                    self.roster
                        .register(Combatant::new(actor, name, team::UNDECIDED));
                } else if let Some(record) = self.roster.get_mut(actor) {
                    if record.name.is_empty() {
                        record.name = name;
                    }
                }
            }
            GameEvent::CombatantLeft { actor, .. } => {
                self.despawn(actor);
                self.roster.remove(actor);
                self.pending_snapshots.remove(&actor);
            }
            GameEvent::TeamChanged { actor, team: team_index } => {
                if let Some(record) = self.roster.get_mut(actor) {
                    record.team = team_index;
                }
            }
            GameEvent::SoldierDied(record) => {
                self.roster
                    .apply_death_record(record.victim, record.killer, &record.assists);
                self.despawn(record.victim);
                self.pending_snapshots.remove(&record.victim);
            }
            GameEvent::FlagOwnerChanged { .. } | GameEvent::TeamScored { .. } => {
                // Presentation notifications; flag state arrives via its
                // snapshot
            }
        }
    }

    /// This process was promoted. Authority-only derived state is
    /// recomputed from first principles rather than trusted: the fill
    /// schedule re-arms, trigger membership is rebuilt from entity
    /// positions, bot entities are adopted, and pending spawns for
    /// departed humans are dropped.
    pub fn become_authority(&mut self, session: &mut Session) {
        info!("Taking over as session authority");

        let local = session.local_actor();
        for soldier in self.soldiers.values_mut() {
            if soldier.actor.bot {
                soldier.owner = local;
                self.bots.register_bot(soldier.actor.id);
            }
        }
        for record in self.roster.bots() {
            if !self.soldiers.contains_key(&record.actor) {
                // Dead bots respawn under the new authority
                self.respawn_timers.entry(record.actor).or_insert(0.0);
            }
        }
        self.bots_retain_known();

        let stale: Vec<ActorRef> = self
            .respawn_timers
            .keys()
            .filter(|actor| !actor.bot && session.participant(actor.id).is_none())
            .copied()
            .collect();
        for actor in stale {
            self.respawn_timers.remove(&actor);
        }

        for flag in &mut self.flags {
            let occupants = self
                .soldiers
                .values()
                .filter(|s| s.alive() && team_valid(s.team) && flag.contains(s.position))
                .map(|s| (s.actor, s.team))
                .collect::<Vec<_>>();
            flag.rebuild_membership(occupants.into_iter());
        }

        self.autofill.rearm();
        let changes = self.autofill.maintain(&mut self.roster);
        self.apply_fill_changes(session, changes);
    }

    fn bots_retain_known(&mut self) {
        let known: Vec<i32> = self.roster.bots().map(|c| c.actor.id).collect();
        for id in self.bots.ids() {
            if !known.contains(&id) {
                self.bots.unregister_bot(id);
            }
        }
    }

    /// Periodic operator stats line
    pub fn log_stats(&self, session: &Session) {
        let humans = self.roster.humans().count();
        let bots = self.roster.bots().count();
        let alive = self.soldiers.values().filter(|s| s.alive()).count();
        let owned_flags = self
            .flags
            .iter()
            .filter(|f| team_valid(f.owner))
            .count();
        info!(
            "Tick {}: {} humans + {} bots ({} alive), {}/{} flags owned, authority={:?}",
            self.tick,
            humans,
            bots,
            alive,
            owned_flags,
            self.flags.len(),
            session.authority()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::spawn::{DefaultLoadout, PadSpawnSelector, SpawnPad};
    use crate::net::protocol::SoldierInput;
    use crate::util::vec3::Vec3;

    fn pads() -> Vec<SpawnPad> {
        vec![
            SpawnPad {
                team: 0,
                position: Vec3::new(-60.0, 0.0, 0.0),
                yaw: 0.0,
            },
            SpawnPad {
                team: 1,
                position: Vec3::new(60.0, 0.0, 0.0),
                yaw: std::f32::consts::PI,
            },
        ]
    }

    fn make_loop(config: GameLoopConfig) -> GameLoop {
        GameLoop::new(
            config,
            vec![CapturePoint::new(0, Vec3::ZERO, 6.0)],
            Box::new(PadSpawnSelector::new(pads())),
            Box::new(DefaultLoadout),
        )
    }

    fn authority_setup(capacity: usize, team_count: usize) -> (Session, GameLoop) {
        let mut session = Session::host("Host", capacity);
        let mut game = make_loop(GameLoopConfig {
            capacity,
            team_count,
            bot_fill: true,
            model_pool: vec![0, 1],
        });
        game.register_human(&mut session, 1, "Host".into());
        game.select_team(&mut session, 1, 0);
        game.start(&mut session);
        (session, game)
    }

    fn run_ticks(session: &mut Session, game: &mut GameLoop, n: usize) {
        for _ in 0..n {
            game.authority_tick(session);
        }
    }

    #[test]
    fn test_start_balances_both_teams() {
        let (_session, game) = authority_setup(10, 2);
        assert_eq!(game.roster().team_population(0), 5);
        assert_eq!(game.roster().team_population(1), 5);
    }

    #[test]
    fn test_entities_spawn_on_scheduling_pass() {
        let (mut session, mut game) = authority_setup(10, 2);
        assert_eq!(game.soldier_count(), 0);
        run_ticks(&mut session, &mut game, 2);
        assert_eq!(game.soldier_count(), 10);
    }

    #[test]
    fn test_at_most_one_entity_per_combatant() {
        let (mut session, mut game) = authority_setup(10, 2);
        run_ticks(&mut session, &mut game, 30);

        let mut seen = Vec::new();
        for soldier in game.soldiers.values() {
            assert!(!seen.contains(&soldier.actor), "duplicate entity");
            seen.push(soldier.actor);
            assert!(game.roster().contains(soldier.actor));
        }
    }

    #[test]
    fn test_death_keeps_record_and_respawns() {
        let (mut session, mut game) = authority_setup(10, 2);
        run_ticks(&mut session, &mut game, 2);

        let victim = ActorRef::human(1);
        game.soldier_mut(victim).unwrap().protection = None;
        let attacker = game
            .roster()
            .bots()
            .find(|c| c.team == 1)
            .map(|c| c.actor)
            .unwrap();

        let local = session.local_actor();
        game.handle_action(
            &mut session,
            local,
            victim,
            ActionCall::DamageApply {
                amount: 500.0,
                attacker,
                cause: DamageCause::Weapon(1),
                origin: Vec3::ZERO,
                direction: Vec3::FORWARD,
                force: 100.0,
                hit_position: Vec3::ZERO,
                collider: 0,
            },
        );

        assert!(game.soldier(victim).is_none());
        let record = game.roster().get(victim).unwrap();
        assert_eq!(record.deaths, 1);
        assert!(game.roster().get(attacker).unwrap().kills == 1);

        // Respawns after the delay
        let delay_ticks = (spawn::RESPAWN_DELAY / tick::DT) as usize + 2;
        run_ticks(&mut session, &mut game, delay_ticks);
        assert!(game.soldier(victim).is_some());
    }

    #[test]
    fn test_death_record_broadcast_carries_assists() {
        let (mut session, mut game) = authority_setup(10, 2);
        run_ticks(&mut session, &mut game, 2);
        session.drain_outbox();

        let victim = ActorRef::human(1);
        game.soldier_mut(victim).unwrap().protection = None;
        let mut team1 = game
            .roster()
            .bots()
            .filter(|c| c.team == 1)
            .map(|c| c.actor)
            .collect::<Vec<_>>()
            .into_iter();
        let softener = team1.next().unwrap();
        let killer = team1.next().unwrap();

        let hit = |attacker: ActorRef, amount: f32| ActionCall::DamageApply {
            amount,
            attacker,
            cause: DamageCause::Weapon(1),
            origin: Vec3::ZERO,
            direction: Vec3::FORWARD,
            force: 100.0,
            hit_position: Vec3::ZERO,
            collider: 0,
        };
        let local = session.local_actor();
        game.handle_action(&mut session, local, victim, hit(softener, 30.0));
        game.handle_action(&mut session, local, victim, hit(killer, 500.0));

        let died = session
            .drain_outbox()
            .into_iter()
            .find_map(|(_, msg)| match msg {
                ServerMessage::Event(GameEvent::SoldierDied(record)) => Some(record),
                _ => None,
            })
            .expect("death record broadcast");
        assert_eq!(died.killer, killer);
        assert_eq!(died.assists, vec![softener]);
        assert_eq!(game.roster().get(softener).unwrap().assists, 1);
    }

    #[test]
    fn test_damage_for_remote_entity_is_relayed_to_owner() {
        let (mut session, mut game) = authority_setup(10, 2);
        let remote = game.handle_join(&mut session, "Remote").unwrap();
        game.select_team(&mut session, remote, 1);
        run_ticks(&mut session, &mut game, 2);
        session.drain_outbox();

        let entity = ActorRef::human(remote);
        let health_before = game.soldier(entity).unwrap().vitals.health;
        let local = session.local_actor();
        game.handle_action(
            &mut session,
            local,
            entity,
            ActionCall::DamageApply {
                amount: 40.0,
                attacker: ActorRef::human(1),
                cause: DamageCause::Weapon(2),
                origin: Vec3::ZERO,
                direction: Vec3::FORWARD,
                force: 50.0,
                hit_position: Vec3::ZERO,
                collider: 1,
            },
        );

        // Not applied locally; relayed to the owner instead
        assert_eq!(game.soldier(entity).unwrap().vitals.health, health_before);
        let outbox = session.drain_outbox();
        assert!(outbox.iter().any(|(target, msg)| matches!(
            (target, msg),
            (
                Target::Actor(to),
                ServerMessage::Action {
                    call: ActionCall::DamageApply { .. },
                    ..
                }
            ) if *to == remote
        )));
    }

    #[test]
    fn test_suicide_rejected_from_non_owner() {
        let (mut session, mut game) = authority_setup(10, 2);
        run_ticks(&mut session, &mut game, 2);

        let victim = ActorRef::human(1);
        game.handle_action(&mut session, 99, victim, ActionCall::Suicide);
        assert!(game.soldier(victim).unwrap().alive());

        game.handle_action(&mut session, 1, victim, ActionCall::Suicide);
        assert!(game.soldier(victim).is_none());
    }

    #[test]
    fn test_fire_consumes_ammo_and_confirms() {
        let (mut session, mut game) = authority_setup(10, 2);
        run_ticks(&mut session, &mut game, 2);
        session.drain_outbox();

        let actor = ActorRef::human(1);
        let mut input = SoldierInput::default();
        input.fire = true;
        game.soldier_mut(actor).unwrap().apply_input(input);
        game.authority_tick(&mut session);

        let soldier = game.soldier(actor).unwrap();
        assert_eq!(soldier.weapons.active_weapon().unwrap().loaded, 29);
        assert!(!soldier.protected());

        let outbox = session.drain_outbox();
        assert!(outbox.iter().any(|(_, msg)| matches!(
            msg,
            ServerMessage::Action {
                entity,
                call: ActionCall::FireConfirm { .. },
                ..
            } if *entity == actor
        )));
    }

    #[test]
    fn test_capture_point_flow_and_scoring() {
        let (mut session, mut game) = authority_setup(10, 2);
        run_ticks(&mut session, &mut game, 2);

        // Park the whole of team 0 on the flag and everyone else far away
        let positions: Vec<(ActorRef, i32)> = game
            .soldiers
            .values()
            .map(|s| (s.actor, s.team))
            .collect();
        for (actor, team_index) in positions {
            let soldier = game.soldier_mut(actor).unwrap();
            soldier.position = if team_index == 0 {
                Vec3::new(1.0, 0.0, 1.0)
            } else {
                Vec3::new(200.0, 0.0, 200.0)
            };
        }

        // Bots keep steering, so pin them off for the assertion by
        // checking capture progress over a short window
        let capture_ticks =
            ((capture::FULL_PROGRESS / capture::CAPTURE_RATE) / tick::DT) as usize + 5;
        let mut owned = false;
        for _ in 0..capture_ticks {
            // Re-pin positions: intent integration moves soldiers
            let pinned: Vec<ActorRef> = game.soldiers.keys().copied().collect();
            for actor in pinned {
                let soldier = game.soldier_mut(actor).unwrap();
                soldier.position = if soldier.team == 0 {
                    Vec3::new(1.0, 0.0, 1.0)
                } else {
                    Vec3::new(200.0, 0.0, 200.0)
                };
            }
            game.authority_tick(&mut session);
            if game.flags()[0].owner == 0 {
                owned = true;
                break;
            }
        }
        assert!(owned, "team 0 should capture the flag");

        let outbox = session.drain_outbox();
        assert!(outbox.iter().any(|(_, msg)| matches!(
            msg,
            ServerMessage::Event(GameEvent::FlagOwnerChanged { team: 0, .. })
        )));
    }

    #[test]
    fn test_leave_cancels_pending_spawn() {
        let (mut session, mut game) = authority_setup(10, 2);
        let remote = game.handle_join(&mut session, "Remote").unwrap();
        game.select_team(&mut session, remote, 1);
        // Leave before any tick processes the pending spawn
        game.handle_client_message(&mut session, remote, ClientMessage::Leave);

        run_ticks(&mut session, &mut game, 5);
        assert!(game.soldier(ActorRef::human(remote)).is_none());
        assert!(!game.roster().contains(ActorRef::human(remote)));
    }

    #[test]
    fn test_replica_defers_snapshot_until_spawn() {
        let mut session = Session::replica(2, 1, 10);
        let mut game = make_loop(GameLoopConfig::default());

        // Build the authoritative source of the messages
        let (mut auth_session, mut auth_game) = authority_setup(10, 2);
        run_ticks(&mut auth_session, &mut auth_game, cadence::TICKS_PER_SNAPSHOT as usize + 1);

        let outbox = auth_session.drain_outbox();
        let spawn_msgs: Vec<_> = outbox
            .iter()
            .filter(|(_, m)| matches!(m, ServerMessage::SoldierSpawned { .. }))
            .collect();
        let snapshot_msgs: Vec<_> = outbox
            .iter()
            .filter(|(_, m)| matches!(m, ServerMessage::SoldierSnapshot { .. }))
            .collect();
        assert!(!spawn_msgs.is_empty());
        assert!(!snapshot_msgs.is_empty());

        // Snapshots first (out of order): all deferred
        for (_, msg) in &snapshot_msgs {
            game.apply_server_message(&mut session, (*msg).clone());
        }
        assert_eq!(game.soldier_count(), 0);

        // Creation arrives: entities appear with the deferred state
        for (_, msg) in &spawn_msgs {
            game.apply_server_message(&mut session, (*msg).clone());
        }
        assert_eq!(game.soldier_count(), auth_game.soldier_count());

        let sample = snapshot_msgs
            .iter()
            .find_map(|(_, m)| match m {
                ServerMessage::SoldierSnapshot { actor, .. } => Some(*actor),
                _ => None,
            })
            .unwrap();
        let authoritative = auth_game.soldier(sample).unwrap();
        let replicated = game.soldier(sample).unwrap();
        assert_eq!(replicated.position, authoritative.position);
    }

    #[test]
    fn test_replica_roster_follows_authority() {
        let mut session = Session::replica(2, 1, 10);
        let mut game = make_loop(GameLoopConfig::default());

        let (mut auth_session, mut auth_game) = authority_setup(10, 2);
        run_ticks(&mut auth_session, &mut auth_game, cadence::TICKS_PER_SNAPSHOT as usize + 1);

        for (_, msg) in auth_session.drain_outbox() {
            game.apply_server_message(&mut session, msg);
        }
        assert_eq!(
            game.roster().bots().count(),
            auth_game.roster().bots().count()
        );
        assert_eq!(game.flags()[0].state, auth_game.flags()[0].state);
    }

    #[test]
    fn test_authority_handoff_rearms_from_scratch() {
        // Replica that has been mirroring an authority
        let mut session = Session::replica(2, 1, 10);
        let mut game = make_loop(GameLoopConfig::default());

        let (mut auth_session, mut auth_game) = authority_setup(10, 2);
        run_ticks(&mut auth_session, &mut auth_game, cadence::TICKS_PER_SNAPSHOT as usize + 1);
        for (_, msg) in auth_session.drain_outbox() {
            game.apply_server_message(&mut session, msg);
        }
        let bots_before = game.roster().bots().count();
        assert!(bots_before > 0);

        // Old authority gone; this process is promoted
        game.apply_server_message(&mut session, ServerMessage::AuthorityChanged { actor_id: 2 });

        assert!(session.is_authority());
        for soldier in game.soldiers.values() {
            if soldier.actor.bot {
                assert_eq!(soldier.owner, 2);
            }
        }

        // The new authority keeps simulating: bots move and flags step
        run_ticks(&mut session, &mut game, 5);
        assert!(game.roster().bots().count() >= bots_before);
    }

    #[test]
    fn test_redelivered_damage_after_death_is_ignored() {
        let (mut session, mut game) = authority_setup(10, 2);
        run_ticks(&mut session, &mut game, 2);

        let victim = ActorRef::human(1);
        game.soldier_mut(victim).unwrap().protection = None;
        let attacker = game.roster().bots().next().unwrap().actor;
        let call = ActionCall::DamageApply {
            amount: 500.0,
            attacker,
            cause: DamageCause::Weapon(1),
            origin: Vec3::ZERO,
            direction: Vec3::FORWARD,
            force: 100.0,
            hit_position: Vec3::ZERO,
            collider: 0,
        };

        let local = session.local_actor();
        game.handle_action(&mut session, local, victim, call.clone());
        let deaths_after_first = game.roster().get(victim).unwrap().deaths;
        // Reliable channel redelivery: entity already gone, call dropped
        game.handle_action(&mut session, local, victim, call);
        assert_eq!(game.roster().get(victim).unwrap().deaths, deaths_after_first);
    }
}
