pub mod constants;
pub mod combatant;
pub mod entity;
pub mod systems;
pub mod spawn;
pub mod autofill;
pub mod capture;
pub mod game_loop;
