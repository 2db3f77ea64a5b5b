//! Data-driven battle balance
//!
//! Every empirically-tuned constant of the simulation lives here so that an
//! external shell can load alternate balance from JSON. Defaults match the
//! values the battle was tuned at (60 fps frame pacing).

use serde::{Deserialize, Serialize};

/// Tunable simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleTuning {
    // === Chain layout ===
    /// World length of one grid unit when the arena derives chain perimeters
    pub grid_world_scale: f32,

    // === Constraint solver ===
    /// Fraction of the length error corrected per relaxation pass (<1 = soft)
    pub tension: f32,
    /// Relaxation passes per tick while settling
    pub settle_iterations: u32,
    /// Relaxation passes per tick during closing/fusion animations
    pub animate_iterations: u32,
    /// Verlet velocity damping per tick (1 = no damping)
    pub damping: f32,

    // === Lifecycle timing (seconds) ===
    /// How long a freshly built chain holds its hanging shape
    pub hang_dwell: f32,
    /// Duration of the loop-closing bezier travel
    pub connect_duration: f32,
    /// How long the anchor stays pinned after the loop closes
    pub anchor_grace: f32,
    /// Bow of the closing curve, as a fraction of the travel distance
    pub connect_arc_ratio: f32,

    // === Rhythm ===
    /// Grid units of subdivision consumed per second of master-clock time
    pub grid_rate: f32,

    // === Layer forces ===
    /// Acceleration per grid unit of subdivision value
    pub layer_force_scale: f32,
    /// Multiplier for the center-pointing (fastest) layer
    pub center_layer_boost: f32,
    /// Staleness threshold for the cached per-segment forces (seconds)
    pub force_recompute_interval: f32,

    // === Gravity well ===
    /// Activation delay at reference population (scaled down as chains die)
    pub gravity_base_delay: f32,
    /// Ramp duration at reference population
    pub gravity_base_ramp: f32,
    /// Peak pull at reference population (scaled up as chains die)
    pub gravity_base_strength: f32,
    /// Staleness threshold for the cached gravity pull (seconds)
    pub gravity_recompute_interval: f32,

    // === Fusion repair ===
    /// Duration of the node-merging bezier travel
    pub fusion_duration: f32,
    /// Bow of the fusion curve, as a fraction of the travel distance
    pub fusion_arc_ratio: f32,
    /// Initial speed of the rigid whole-chain rebound on impact
    pub rebound_speed: f32,
    /// Geometric decay applied to the rebound each tick
    pub rebound_decay: f32,
    /// Glow decay per tick (presentation only)
    pub glow_decay: f32,

    // === Self-validation ===
    /// How often chain topology is checked and repaired (seconds)
    pub validate_interval: f32,
}

impl Default for BattleTuning {
    fn default() -> Self {
        Self {
            grid_world_scale: 14.0,

            tension: 0.35,
            settle_iterations: 8,
            animate_iterations: 3,
            damping: 0.985,

            hang_dwell: 1.2,
            connect_duration: 0.9,
            anchor_grace: 0.35,
            connect_arc_ratio: 0.5,

            grid_rate: 4.0,

            layer_force_scale: 18.0,
            center_layer_boost: 2.0,
            force_recompute_interval: 0.033,

            gravity_base_delay: 8.0,
            gravity_base_ramp: 6.0,
            gravity_base_strength: 30.0,
            gravity_recompute_interval: 0.05,

            fusion_duration: 0.45,
            fusion_arc_ratio: 0.35,
            rebound_speed: 26.0,
            rebound_decay: 0.88,
            glow_decay: 0.93,

            validate_interval: 1.0,
        }
    }
}

impl BattleTuning {
    /// Load tuning from a JSON string, falling back to defaults on any error
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str(json) {
            Ok(tuning) => tuning,
            Err(err) => {
                log::warn!("Bad tuning JSON ({err}), using defaults");
                Self::default()
            }
        }
    }

    /// Serialize tuning to JSON (for editing/export)
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip() {
        let tuning = BattleTuning::default();
        let json = tuning.to_json();
        let back = BattleTuning::from_json(&json);
        assert_eq!(back.settle_iterations, tuning.settle_iterations);
        assert!((back.tension - tuning.tension).abs() < f32::EPSILON);
    }

    #[test]
    fn test_bad_json_falls_back() {
        let tuning = BattleTuning::from_json("{not json");
        assert_eq!(tuning.settle_iterations, BattleTuning::default().settle_iterations);
    }
}
