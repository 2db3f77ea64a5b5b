//! Rhythm Rumble - a multiplayer rhythm-chain battle simulation
//!
//! Core modules:
//! - `sim`: Deterministic simulation (chain physics, lifecycle, arena)
//! - `tuning`: Data-driven battle balance
//!
//! Up to four closed polygon chains, each built from a rhythmic subdivision
//! pattern, fight inside a shared arena. Chains are simulated as hinge
//! structures (Verlet nodes + distance constraints), pushed around by
//! per-layer directional forces and a time-ramped gravity well, and mutated
//! by external hit events that destroy a segment and trigger an animated
//! fusion repair.

pub mod sim;
pub mod tuning;

pub use sim::{BattleArena, BattlePhase, Chain, ChainPhase, Outcome};
pub use tuning::BattleTuning;

use glam::Vec2;

/// Simulation constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz, one tick per rendered frame)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 4;

    /// Maximum number of combatant chains per arena
    pub const MAX_CHAINS: usize = 4;
    /// Population the gravity curve is normalized against
    pub const POPULATION_REFERENCE: u32 = 4;
    /// Number of subdivision layers in the upstream rhythmic composite
    pub const LAYER_COUNT: usize = 4;
}

/// Symmetric ease (smoothstep) over [0, 1]
#[inline]
pub fn ease_in_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Quadratic bezier interpolation
#[inline]
pub fn quad_bezier(p0: Vec2, ctrl: Vec2, p2: Vec2, t: f32) -> Vec2 {
    let u = 1.0 - t;
    p0 * (u * u) + ctrl * (2.0 * u * t) + p2 * (t * t)
}

/// Rotate a vector by `quarters` counterclockwise quarter turns
#[inline]
pub fn rotate_quarters(v: Vec2, quarters: usize) -> Vec2 {
    match quarters % 4 {
        0 => v,
        1 => Vec2::new(-v.y, v.x),
        2 => -v,
        _ => Vec2::new(v.y, -v.x),
    }
}
