//! Bot controller - drives bot soldiers through the same input path a
//! human controller uses, so the entity lifecycle cannot tell them apart.

use hashbrown::HashMap;
use rand::Rng;
use rayon::prelude::*;

use crate::game::combatant::{team_valid, ActorRef};
use crate::game::constants::bot::*;
use crate::net::protocol::SoldierInput;
use crate::net::replication::{SnapshotError, SnapshotReader, SnapshotWriter};
use crate::util::vec3::Vec3;

/// Bot behavior mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotBehavior {
    /// Hold position and scan
    Hold,
    /// Move toward a capture point
    PushObjective,
    /// Fight a target
    Engage,
    /// Break contact from a threat
    Fallback,
}

impl BotBehavior {
    fn to_wire(self) -> u8 {
        match self {
            BotBehavior::Hold => 0,
            BotBehavior::PushObjective => 1,
            BotBehavior::Engage => 2,
            BotBehavior::Fallback => 3,
        }
    }

    fn from_wire(v: u8) -> Self {
        match v {
            1 => BotBehavior::PushObjective,
            2 => BotBehavior::Engage,
            3 => BotBehavior::Fallback,
            _ => BotBehavior::Hold,
        }
    }
}

/// Bot personality traits
#[derive(Debug, Clone)]
pub struct BotPersonality {
    /// How likely to engage on contact (0.0-1.0)
    pub aggression: f32,
    /// How accurate the aim is (0.0-1.0)
    pub accuracy: f32,
    /// Distance the bot tries to keep while fighting
    pub preferred_range: f32,
    /// Decision timing variance
    pub reaction_variance: f32,
}

impl BotPersonality {
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            aggression: rng.gen_range(0.3..0.9),
            accuracy: rng.gen_range(0.4..0.9),
            preferred_range: rng.gen_range(10.0..25.0),
            reaction_variance: rng.gen_range(0.1..0.4),
        }
    }
}

impl Default for BotPersonality {
    fn default() -> Self {
        Self {
            aggression: 0.6,
            accuracy: 0.7,
            preferred_range: 15.0,
            reaction_variance: 0.2,
        }
    }
}

/// Per-bot controller runtime
#[derive(Debug, Clone)]
pub struct BotDriver {
    pub behavior: BotBehavior,
    pub target: Option<ActorRef>,
    /// Capture point currently being pushed
    pub objective: Option<u8>,
    pub decision_timer: f32,
    pub move_dir: Vec3,
    pub face_yaw: f32,
    pub wants_fire: bool,
    pub personality: BotPersonality,
}

impl Default for BotDriver {
    fn default() -> Self {
        Self {
            behavior: BotBehavior::Hold,
            target: None,
            objective: None,
            decision_timer: 0.0,
            move_dir: Vec3::ZERO,
            face_yaw: 0.0,
            wants_fire: false,
            personality: BotPersonality::default(),
        }
    }
}

impl BotDriver {
    pub fn new() -> Self {
        Self {
            personality: BotPersonality::random(),
            ..Default::default()
        }
    }

    /// Snapshot block for the bot-controller slot of an entity snapshot
    pub fn write_block(&self, w: &mut SnapshotWriter) {
        w.put_u8(self.behavior.to_wire());
        w.put_i32(self.objective.map_or(-1, i32::from));
    }

    pub fn read_block(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.behavior = BotBehavior::from_wire(r.take_u8()?);
        let objective = r.take_i32()?;
        self.objective = u8::try_from(objective).ok();
        Ok(())
    }
}

/// What a bot can see of another soldier this tick
#[derive(Debug, Clone, Copy)]
pub struct SoldierObservation {
    pub actor: ActorRef,
    pub team: i32,
    pub position: Vec3,
    pub alive: bool,
}

/// What a bot can see of a capture point this tick
#[derive(Debug, Clone, Copy)]
pub struct FlagObservation {
    pub id: u8,
    pub position: Vec3,
    pub owner: i32,
}

/// Controller state for all bots in the session (authority only)
pub struct BotControl {
    drivers: HashMap<i32, BotDriver>,
}

impl BotControl {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    pub fn register_bot(&mut self, bot_id: i32) {
        self.drivers.insert(bot_id, BotDriver::new());
    }

    pub fn unregister_bot(&mut self, bot_id: i32) {
        self.drivers.remove(&bot_id);
    }

    pub fn get(&self, bot_id: i32) -> Option<&BotDriver> {
        self.drivers.get(&bot_id)
    }

    pub fn get_mut(&mut self, bot_id: i32) -> Option<&mut BotDriver> {
        self.drivers.get_mut(&bot_id)
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Bot ids with a registered driver
    pub fn ids(&self) -> Vec<i32> {
        self.drivers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Update all bot decisions.
    /// Decisions are computed in parallel, then applied sequentially.
    pub fn update(
        &mut self,
        soldiers: &[SoldierObservation],
        flags: &[FlagObservation],
        dt: f32,
    ) {
        let snapshot: Vec<(i32, BotDriver)> = self
            .drivers
            .iter()
            .map(|(&id, driver)| (id, driver.clone()))
            .collect();

        let decisions: Vec<(i32, BotDriver)> = snapshot
            .into_par_iter()
            .map(|(bot_id, mut driver)| {
                update_decision(&mut driver, bot_id, soldiers, flags, dt);
                (bot_id, driver)
            })
            .collect();

        for (bot_id, new_driver) in decisions {
            if let Some(driver) = self.drivers.get_mut(&bot_id) {
                *driver = new_driver;
            }
        }
    }

    /// Generate input for a bot - the same structure a human relay sends
    pub fn input_for(&self, bot_id: i32, tick: u64) -> Option<SoldierInput> {
        let driver = self.drivers.get(&bot_id)?;

        let moving = driver.move_dir.length_sq() > 0.01;
        Some(SoldierInput {
            sequence: tick,
            tick,
            move_x: 0.0,
            move_z: if moving { 1.0 } else { 0.0 },
            yaw: driver.face_yaw,
            pitch: 0.0,
            jump: false,
            sprint: driver.behavior == BotBehavior::PushObjective,
            fire: driver.wants_fire,
            reload: false,
            select_slot: None,
        })
    }
}

impl Default for BotControl {
    fn default() -> Self {
        Self::new()
    }
}

fn update_decision(
    driver: &mut BotDriver,
    bot_id: i32,
    soldiers: &[SoldierObservation],
    flags: &[FlagObservation],
    dt: f32,
) {
    driver.decision_timer -= dt;

    if driver.decision_timer <= 0.0 {
        let jitter = driver.personality.reaction_variance;
        driver.decision_timer =
            DECISION_INTERVAL * (1.0 + rand::thread_rng().gen_range(-jitter..=jitter));
        decide_behavior(driver, bot_id, soldiers, flags);
    }

    steer(driver, bot_id, soldiers, flags);
}

fn me<'a>(bot_id: i32, soldiers: &'a [SoldierObservation]) -> Option<&'a SoldierObservation> {
    soldiers
        .iter()
        .find(|s| s.actor == ActorRef::bot(bot_id) && s.alive)
}

fn is_enemy(mine: i32, theirs: i32) -> bool {
    if team_valid(mine) && team_valid(theirs) {
        mine != theirs
    } else {
        // Free-for-all until teams are decided
        true
    }
}

fn nearest_enemy<'a>(
    own: &SoldierObservation,
    soldiers: &'a [SoldierObservation],
) -> Option<(&'a SoldierObservation, f32)> {
    soldiers
        .iter()
        .filter(|s| s.alive && s.actor != own.actor && is_enemy(own.team, s.team))
        .map(|s| (s, s.position.distance_to(own.position)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

fn nearest_uncaptured_flag<'a>(
    own: &SoldierObservation,
    flags: &'a [FlagObservation],
) -> Option<&'a FlagObservation> {
    flags
        .iter()
        .filter(|f| f.owner != own.team)
        .min_by(|a, b| {
            let da = a.position.distance_sq_to(own.position);
            let db = b.position.distance_sq_to(own.position);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn decide_behavior(
    driver: &mut BotDriver,
    bot_id: i32,
    soldiers: &[SoldierObservation],
    flags: &[FlagObservation],
) {
    let Some(own) = me(bot_id, soldiers) else {
        driver.behavior = BotBehavior::Hold;
        driver.wants_fire = false;
        return;
    };

    let mut rng = rand::thread_rng();

    if let Some((enemy, dist)) = nearest_enemy(own, soldiers) {
        if dist < ENGAGE_RANGE && rng.gen::<f32>() < driver.personality.aggression {
            driver.behavior = BotBehavior::Engage;
            driver.target = Some(enemy.actor);
            return;
        }
        // Outnumbered right on top of us: break contact
        if dist < driver.personality.preferred_range * 0.5 {
            driver.behavior = BotBehavior::Fallback;
            driver.target = Some(enemy.actor);
            return;
        }
    }

    if let Some(flag) = nearest_uncaptured_flag(own, flags) {
        driver.behavior = BotBehavior::PushObjective;
        driver.objective = Some(flag.id);
        driver.target = None;
        return;
    }

    driver.behavior = BotBehavior::Hold;
    driver.target = None;
}

fn steer(
    driver: &mut BotDriver,
    bot_id: i32,
    soldiers: &[SoldierObservation],
    flags: &[FlagObservation],
) {
    let Some(own) = me(bot_id, soldiers) else {
        driver.move_dir = Vec3::ZERO;
        driver.wants_fire = false;
        return;
    };

    match driver.behavior {
        BotBehavior::Engage => {
            let target = driver
                .target
                .and_then(|t| soldiers.iter().find(|s| s.actor == t && s.alive));
            let Some(target) = target else {
                driver.behavior = BotBehavior::Hold;
                driver.wants_fire = false;
                return;
            };

            let to_target = target.position - own.position;
            let dist = to_target.length();
            driver.face_yaw = to_target.x.atan2(to_target.z);
            driver.move_dir = if dist > driver.personality.preferred_range {
                to_target.normalize()
            } else {
                Vec3::ZERO
            };
            driver.wants_fire =
                dist < FIRE_RANGE && rand::thread_rng().gen::<f32>() < driver.personality.accuracy;
        }
        BotBehavior::Fallback => {
            let threat = driver
                .target
                .and_then(|t| soldiers.iter().find(|s| s.actor == t && s.alive));
            let Some(threat) = threat else {
                driver.behavior = BotBehavior::Hold;
                return;
            };
            let away = (own.position - threat.position).normalize();
            driver.move_dir = away;
            driver.face_yaw = (-away.x).atan2(-away.z); // face the threat while backing off
            driver.wants_fire = rand::thread_rng().gen::<f32>() < driver.personality.accuracy * 0.5;
        }
        BotBehavior::PushObjective => {
            let flag = driver
                .objective
                .and_then(|id| flags.iter().find(|f| f.id == id));
            let Some(flag) = flag else {
                driver.behavior = BotBehavior::Hold;
                return;
            };
            let to_flag = flag.position - own.position;
            if to_flag.horizontal_length() < 1.0 {
                driver.move_dir = Vec3::ZERO;
            } else {
                driver.move_dir = to_flag.normalize();
                driver.face_yaw = to_flag.x.atan2(to_flag.z);
            }
            driver.wants_fire = false;
        }
        BotBehavior::Hold => {
            driver.move_dir = Vec3::ZERO;
            driver.wants_fire = false;
        }
    }
}

/// Generate bot names
pub fn generate_bot_name() -> String {
    let prefixes = ["Viper", "Ghost", "Raven", "Fang", "Bullet", "Havoc", "Slate", "Torque"];
    let suffixes = ["One", "Two", "Six", "Actual", "Echo", "Zero", "Prime", "X"];

    let mut rng = rand::thread_rng();
    format!(
        "{}{}",
        prefixes[rng.gen_range(0..prefixes.len())],
        suffixes[rng.gen_range(0..suffixes.len())]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot_obs(id: i32, team_index: i32, position: Vec3) -> SoldierObservation {
        SoldierObservation {
            actor: ActorRef::bot(id),
            team: team_index,
            position,
            alive: true,
        }
    }

    fn human_obs(id: i32, team_index: i32, position: Vec3) -> SoldierObservation {
        SoldierObservation {
            actor: ActorRef::human(id),
            team: team_index,
            position,
            alive: true,
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let mut control = BotControl::new();
        control.register_bot(1);
        assert!(control.get(1).is_some());
        control.unregister_bot(1);
        assert!(control.get(1).is_none());
    }

    #[test]
    fn test_input_matches_human_shape() {
        let mut control = BotControl::new();
        control.register_bot(1);
        let input = control.input_for(1, 77).unwrap();
        assert_eq!(input.tick, 77);
        assert_eq!(input.sequence, 77);
    }

    #[test]
    fn test_no_input_for_unknown_bot() {
        let control = BotControl::new();
        assert!(control.input_for(9, 1).is_none());
    }

    #[test]
    fn test_pushes_uncaptured_flag() {
        let mut driver = BotDriver::default();
        let soldiers = [bot_obs(1, 0, Vec3::ZERO)];
        let flags = [FlagObservation {
            id: 2,
            position: Vec3::new(20.0, 0.0, 0.0),
            owner: 1,
        }];

        decide_behavior(&mut driver, 1, &soldiers, &flags);
        assert_eq!(driver.behavior, BotBehavior::PushObjective);
        assert_eq!(driver.objective, Some(2));

        steer(&mut driver, 1, &soldiers, &flags);
        assert!(driver.move_dir.x > 0.9);
    }

    #[test]
    fn test_ignores_owned_flag() {
        let mut driver = BotDriver::default();
        let soldiers = [bot_obs(1, 0, Vec3::ZERO)];
        let flags = [FlagObservation {
            id: 2,
            position: Vec3::new(20.0, 0.0, 0.0),
            owner: 0,
        }];

        decide_behavior(&mut driver, 1, &soldiers, &flags);
        assert_eq!(driver.behavior, BotBehavior::Hold);
    }

    #[test]
    fn test_engages_close_enemy() {
        let mut driver = BotDriver::default();
        driver.personality.aggression = 1.0;
        let soldiers = [
            bot_obs(1, 0, Vec3::ZERO),
            human_obs(7, 1, Vec3::new(10.0, 0.0, 0.0)),
        ];

        decide_behavior(&mut driver, 1, &soldiers, &[]);
        assert_eq!(driver.behavior, BotBehavior::Engage);
        assert_eq!(driver.target, Some(ActorRef::human(7)));
    }

    #[test]
    fn test_engage_faces_target() {
        let mut driver = BotDriver::default();
        driver.behavior = BotBehavior::Engage;
        driver.target = Some(ActorRef::human(7));
        let soldiers = [
            bot_obs(1, 0, Vec3::ZERO),
            human_obs(7, 1, Vec3::new(0.0, 0.0, 12.0)),
        ];

        steer(&mut driver, 1, &soldiers, &[]);
        assert!(driver.face_yaw.abs() < 1e-4); // straight down +z
    }

    #[test]
    fn test_dead_target_drops_engagement() {
        let mut driver = BotDriver::default();
        driver.behavior = BotBehavior::Engage;
        driver.target = Some(ActorRef::human(7));
        let mut enemy = human_obs(7, 1, Vec3::new(10.0, 0.0, 0.0));
        enemy.alive = false;
        let soldiers = [bot_obs(1, 0, Vec3::ZERO), enemy];

        steer(&mut driver, 1, &soldiers, &[]);
        assert_eq!(driver.behavior, BotBehavior::Hold);
        assert!(!driver.wants_fire);
    }

    #[test]
    fn test_decision_timer_decrements() {
        let mut control = BotControl::new();
        control.register_bot(1);
        control.get_mut(1).unwrap().decision_timer = 1.0;

        let soldiers = [bot_obs(1, 0, Vec3::ZERO)];
        control.update(&soldiers, &[], 0.1);
        let timer = control.get(1).unwrap().decision_timer;
        assert!((timer - 0.9).abs() < 0.01);
    }

    #[test]
    fn test_block_roundtrip() {
        let mut driver = BotDriver::default();
        driver.behavior = BotBehavior::Engage;
        driver.objective = Some(3);

        let mut w = SnapshotWriter::new();
        driver.write_block(&mut w);
        let bytes = w.into_bytes();

        let mut decoded = BotDriver::default();
        let mut r = SnapshotReader::new(&bytes);
        decoded.read_block(&mut r).unwrap();
        r.finish().unwrap();

        assert_eq!(decoded.behavior, BotBehavior::Engage);
        assert_eq!(decoded.objective, Some(3));
    }

    #[test]
    fn test_bot_name_generation() {
        let name = generate_bot_name();
        assert!(!name.is_empty());
    }
}
