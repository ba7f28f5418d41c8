/// Simulation tick constants
pub mod tick {
    /// Authority tick rate in Hz
    pub const RATE: u32 = 30;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / 30.0;
    /// Tick duration in milliseconds
    pub const DURATION_MS: u64 = 1000 / RATE as u64;
}

/// Team sentinels (see DESIGN.md for the -1/-2 semantics)
pub mod team {
    /// Actor has no team (spectator-like); also "neutral" for flag owners
    pub const NONE: i32 = -1;
    /// Team play not yet decided globally; team logic is inactive
    pub const UNDECIDED: i32 = -2;
}

/// Vitals constants
pub mod vitals {
    /// Full health on spawn
    pub const MAX_HEALTH: f32 = 100.0;
    /// Vertical speed below which a landing does no damage (m/s)
    pub const SAFE_FALL_SPEED: f32 = 12.0;
    /// Damage per m/s of impact speed beyond the safe threshold
    pub const FALL_DAMAGE_PER_SPEED: f32 = 8.0;
    /// Longest a blind effect may run (seconds)
    pub const BLIND_MAX_DURATION: f32 = 6.0;
}

/// Movement constants
pub mod movement {
    /// Ground run speed (m/s)
    pub const RUN_SPEED: f32 = 5.5;
    /// Sprint speed multiplier
    pub const SPRINT_MULTIPLIER: f32 = 1.45;
    /// Downward acceleration (m/s^2)
    pub const GRAVITY: f32 = 19.6;
    /// Upward velocity applied on jump (m/s)
    pub const JUMP_SPEED: f32 = 6.5;
}

/// World bounds
pub mod bounds {
    /// Entities falling below this height die from "out of bounds"
    pub const DEATH_PLANE_Y: f32 = -90.0;
}

/// Spawn constants
pub mod spawn {
    /// Candidate positions the selection policy may reject before the
    /// spawn attempt gives up for this tick
    pub const MAX_POSITION_ATTEMPTS: u32 = 10;
    /// Delay before a dead combatant may respawn (seconds)
    pub const RESPAWN_DELAY: f32 = 3.0;
    /// Duration of post-spawn damage immunity (seconds)
    pub const PROTECTION_DURATION: f32 = 4.0;
    /// Minimum distance from living enemies for a candidate point
    pub const CLEAR_RADIUS: f32 = 8.0;
}

/// Capture point constants
pub mod capture {
    /// Progress value at which a team takes ownership
    pub const FULL_PROGRESS: f32 = 100.0;
    /// Progress gained per second with exactly one team present
    pub const CAPTURE_RATE: f32 = 20.0;
    /// Progress lost per second with the volume empty
    pub const DECAY_RATE: f32 = 10.0;
    /// Pursuit rate of the smoothed display value (fraction/second)
    pub const DISPLAY_PURSUIT: f32 = 6.0;
    /// Seconds between score awards while a flag is owned
    pub const SCORE_INTERVAL: f32 = 5.0;
    /// Team score granted per owned flag per interval
    pub const SCORE_PER_INTERVAL: u32 = 1;
}

/// Bot population constants
pub mod autofill {
    /// Hard cap on create/remove iterations per balancing pass; the
    /// target can be unreachable if capacity shifts mid-loop
    pub const RETRY_CAP: u32 = 20;
    /// Seconds between scheduled balancing passes
    pub const INTERVAL: f32 = 2.0;
}

/// Bot controller constants
pub mod bot {
    /// Time between bot decision updates in seconds
    pub const DECISION_INTERVAL: f32 = 0.6;
    /// Distance at which a bot considers engaging an enemy
    pub const ENGAGE_RANGE: f32 = 40.0;
    /// Distance within which a bot will open fire
    pub const FIRE_RANGE: f32 = 30.0;
}

/// Networking cadence
pub mod net {
    /// Snapshot broadcast rate in Hz (lower than the tick rate)
    pub const SNAPSHOT_RATE: u32 = 10;
    /// Ticks between snapshot broadcasts
    pub const TICKS_PER_SNAPSHOT: u64 = (super::tick::RATE / SNAPSHOT_RATE) as u64;
}
