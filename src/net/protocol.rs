use serde::{Deserialize, Serialize};

use crate::game::combatant::ActorRef;
use crate::game::entity::SpawnPayload;
use crate::game::systems::weapons::WeaponSpec;
use crate::net::replication::Target;
use crate::util::vec3::Vec3;

/// Messages from a participant to the authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Request to join the session
    JoinRequest { player_name: String },
    /// Pick (or switch) a team
    SelectTeam { team: i32 },
    /// Controller input for the participant's own soldier
    Input(SoldierInput),
    /// Discrete action invoked on an entity
    Action { entity: ActorRef, call: ActionCall },
    /// Request to leave the session
    Leave,
    /// Ping for latency measurement
    Ping { timestamp: u64 },
}

/// Messages from the authority to participants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Confirmation of joining with assigned actor id and session token
    JoinAccepted {
        actor_id: i32,
        session_token: Vec<u8>,
    },
    /// Join was rejected
    JoinRejected { reason: String },
    /// The session promoted a new authority
    AuthorityChanged { actor_id: i32 },
    /// A soldier entity was created; the payload is applied as one unit
    SoldierSpawned {
        actor: ActorRef,
        owner: i32,
        position: Vec3,
        yaw: f32,
        payload: SpawnPayload,
    },
    /// Owner-emitted entity snapshot (ordered field stream)
    SoldierSnapshot { actor: ActorRef, data: Vec<u8> },
    /// Authority-emitted bot roster snapshot
    BotRoster { data: Vec<u8> },
    /// Authority-emitted capture point snapshot
    FlagSnapshot { point: u8, data: Vec<u8> },
    /// Discrete action relayed toward its delivery scope
    Action {
        target: Target,
        entity: ActorRef,
        call: ActionCall,
    },
    /// Game event notification
    Event(GameEvent),
    /// Pong response with authority timestamp
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
    /// The authority is removing the participant
    Kicked { reason: String },
}

/// Controller input for one tick (human relay or bot controller output)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoldierInput {
    /// Input sequence number
    pub sequence: u64,
    /// Authority tick this input is for
    pub tick: u64,
    /// Strafe axis, -1..1
    pub move_x: f32,
    /// Forward axis, -1..1
    pub move_z: f32,
    /// View yaw in radians
    pub yaw: f32,
    /// View pitch in radians
    pub pitch: f32,
    pub jump: bool,
    pub sprint: bool,
    pub fire: bool,
    pub reload: bool,
    /// Weapon slot switch request
    pub select_slot: Option<u8>,
}

impl SoldierInput {
    pub fn new(sequence: u64, tick: u64) -> Self {
        Self {
            sequence,
            tick,
            ..Default::default()
        }
    }
}

/// What killed or hurt a soldier: a weapon id, or a categorical cause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageCause {
    Weapon(i32),
    Category(String),
}

impl DamageCause {
    pub fn fall() -> Self {
        DamageCause::Category("fall".to_string())
    }

    pub fn out_of_bounds() -> Self {
        DamageCause::Category("out_of_bounds".to_string())
    }

    pub fn suicide() -> Self {
        DamageCause::Category("suicide".to_string())
    }
}

/// Discrete state-changing calls.
///
/// Delivered at-least-once on the reliable channel; every handler is
/// idempotent or guarded (an already-dead victim ignores damage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActionCall {
    /// Owner confirms a shot was fired from `origin` along `direction`
    FireConfirm {
        slot: u8,
        origin: Vec3,
        direction: Vec3,
    },
    /// Owner confirms a reload completed for `slot`
    ReloadConfirm { slot: u8 },
    /// Owner confirms a melee swing
    MeleeConfirm { direction: Vec3 },
    /// Grenade pin pulled (cook start)
    GrenadePull { slot: u8 },
    /// Grenade released
    GrenadeThrow {
        origin: Vec3,
        direction: Vec3,
        force: f32,
    },
    /// Damage delivered to the target entity's owner
    DamageApply {
        amount: f32,
        attacker: ActorRef,
        cause: DamageCause,
        origin: Vec3,
        direction: Vec3,
        force: f32,
        hit_position: Vec3,
        collider: i32,
    },
    /// Flash/blind effect on the target entity's owner
    BlindApply { duration: f32 },
    /// Swap the weapon in `slot` for a new one (pickup/buy)
    WeaponReplace { slot: u8, weapon: WeaponSpec },
    /// Play a voice line; carries no state
    VoiceLine { line: u16 },
    /// Owner kills its own soldier
    Suicide,
}

/// Death record published to everyone before the entity is destroyed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeathRecord {
    pub victim: ActorRef,
    pub killer: ActorRef,
    pub cause: DamageCause,
    pub model_id: i32,
    pub ragdoll_collider: i32,
    /// Actors the authority credited with an assist for this death
    pub assists: Vec<ActorRef>,
}

/// Game events participants should be notified about
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameEvent {
    /// A combatant registered with the session
    CombatantJoined { actor: ActorRef, name: String },
    /// A combatant left the session
    CombatantLeft { actor: ActorRef, name: String },
    /// A combatant was assigned to a team
    TeamChanged { actor: ActorRef, team: i32 },
    /// A soldier died
    SoldierDied(DeathRecord),
    /// A capture point changed owner (-1 = back to neutral)
    FlagOwnerChanged { point: u8, team: i32 },
    /// Periodic score award for owned flags
    TeamScored { team: i32, amount: u32 },
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers (stable wire layout)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
/// Uses legacy config for fixed-size integers (stable wire layout)
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
