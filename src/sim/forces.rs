//! Layer forces and the arena gravity well
//!
//! Both models are throttled: results are cached on the chain with the
//! master-clock time they were computed at, and consumers recompute only once
//! the cache is older than the tuning's staleness threshold. The intervals
//! are balance knobs, not load-bearing semantics.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::{LAYER_COUNT, POPULATION_REFERENCE};
use crate::tuning::BattleTuning;
use crate::{ease_in_out, rotate_quarters};

use super::state::Chain;

/// Directional force for one subdivision element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerForce {
    /// One of four arena-relative quadrant headings
    pub dir: Vec2,
    /// Acceleration applied to the segment's endpoints while active
    pub magnitude: f32,
}

/// Layer identity of a subdivision element, from its position in the
/// original four-layer rhythmic composite
#[inline]
pub fn layer_of(index: usize) -> usize {
    index % LAYER_COUNT
}

/// The fastest subdivision layer: smallest mean value, lower layer wins ties.
/// Its force heading points straight at the arena center; the other layers
/// are offset by quarter turns.
pub fn fastest_layer(subdivisions: &[u32]) -> usize {
    let mut sums = [0u32; LAYER_COUNT];
    let mut counts = [0u32; LAYER_COUNT];
    for (i, &value) in subdivisions.iter().enumerate() {
        sums[layer_of(i)] += value;
        counts[layer_of(i)] += 1;
    }
    let mut best = 0;
    let mut best_mean = f32::INFINITY;
    for layer in 0..LAYER_COUNT {
        if counts[layer] == 0 {
            continue;
        }
        let mean = sums[layer] as f32 / counts[layer] as f32;
        if mean < best_mean {
            best_mean = mean;
            best = layer;
        }
    }
    best
}

/// Recompute the per-subdivision force table for a chain.
///
/// One entry per subdivision element, parallel to the sequence. Headings are
/// taken from each segment's midpoint toward the shared arena center and
/// rotated by the element's layer offset; the center-pointing layer is
/// boosted. Elements whose segment is missing (mid-mutation) degrade to zero
/// force instead of indexing out of bounds.
pub fn rebuild_layer_forces(chain: &Chain, center: Vec2, tuning: &BattleTuning) -> Vec<LayerForce> {
    let fastest = fastest_layer(&chain.subdivisions);

    chain
        .subdivisions
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let seg = chain.segments.iter().find(|s| s.rhythm_index == Some(i));
            let Some(seg) = seg else {
                return LayerForce { dir: Vec2::ZERO, magnitude: 0.0 };
            };
            if seg.a >= chain.nodes.len() || seg.b >= chain.nodes.len() {
                return LayerForce { dir: Vec2::ZERO, magnitude: 0.0 };
            }

            let midpoint = (chain.nodes[seg.a].pos + chain.nodes[seg.b].pos) * 0.5;
            let to_center = (center - midpoint).normalize_or_zero();
            let layer = layer_of(i);
            let quarters = (layer + LAYER_COUNT - fastest) % LAYER_COUNT;
            let boost = if layer == fastest {
                tuning.center_layer_boost
            } else {
                1.0
            };

            LayerForce {
                dir: rotate_quarters(to_center, quarters),
                magnitude: value as f32 * tuning.layer_force_scale * boost,
            }
        })
        .collect()
}

/// Index of the subdivision element the chain is currently sounding.
///
/// Elapsed master-clock time since the chain's cycle was zeroed is converted
/// to grid units and wrapped modulo the chain's grid total; the element whose
/// cumulative span contains that position is active.
pub fn active_rhythm_index(chain: &Chain, now: f32, grid_rate: f32) -> Option<usize> {
    if chain.hp == 0 || chain.subdivisions.is_empty() {
        return None;
    }
    let cycle = chain.hp as f32;
    let grid_pos = ((now - chain.clock_offset) * grid_rate).rem_euclid(cycle);

    let mut cumulative = 0.0;
    for (i, &value) in chain.subdivisions.iter().enumerate() {
        cumulative += value as f32;
        if grid_pos < cumulative {
            return Some(i);
        }
    }
    Some(chain.subdivisions.len() - 1)
}

/// Population-scaled gravity well parameters
///
/// Recomputed whenever the surviving population changes: fewer survivors
/// means the well activates sooner, ramps faster, and pulls harder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GravityParams {
    /// Seconds of arena-active time before any pull
    pub activation_delay: f32,
    /// Seconds from activation to full strength
    pub ramp_duration: f32,
    /// Peak acceleration toward the arena center
    pub max_strength: f32,
}

impl GravityParams {
    pub fn for_population(population: u32, tuning: &BattleTuning) -> Self {
        let fraction = population.max(1) as f32 / POPULATION_REFERENCE as f32;
        Self {
            activation_delay: tuning.gravity_base_delay * fraction,
            ramp_duration: tuning.gravity_base_ramp * fraction,
            max_strength: tuning.gravity_base_strength / fraction,
        }
    }

    /// Pull strength at a given arena-active elapsed time (eased ramp)
    pub fn strength_at(&self, elapsed: f32) -> f32 {
        let past = elapsed - self.activation_delay;
        if past <= 0.0 {
            return 0.0;
        }
        if self.ramp_duration <= 0.0 {
            return self.max_strength;
        }
        self.max_strength * ease_in_out(past / self.ramp_duration)
    }
}

/// Gravity acceleration for a chain: from its center of mass toward the
/// shared arena center. Zero-length directions degrade to zero force.
pub fn gravity_pull(com: Vec2, center: Vec2, params: &GravityParams, elapsed: f32) -> Vec2 {
    (center - com).normalize_or_zero() * params.strength_at(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> BattleTuning {
        BattleTuning::default()
    }

    #[test]
    fn test_fastest_layer_smallest_mean() {
        // Layer 0 holds the 1s: fastest
        assert_eq!(fastest_layer(&[1, 8, 8, 8, 1, 8, 8, 8]), 0);
        // Layer 2 holds the small values here
        assert_eq!(fastest_layer(&[8, 8, 1, 8, 8, 8, 1, 8]), 2);
        // Ties resolve to the lower layer
        assert_eq!(fastest_layer(&[2, 2, 2, 2]), 0);
    }

    #[test]
    fn test_layer_forces_headings() {
        let mut chain = Chain::from_subdivisions(0, &[2, 2, 2, 2], 8.0, Vec2::new(0.0, 100.0));
        chain.rebuild_closed_segments();
        let center = Vec2::ZERO;
        let forces = rebuild_layer_forces(&chain, center, &tuning());
        assert_eq!(forces.len(), 4);

        // Fastest layer (0, by tie) points at the center and is boosted
        let seg = &chain.segments[0];
        let midpoint = (chain.nodes[seg.a].pos + chain.nodes[seg.b].pos) * 0.5;
        let expected = (center - midpoint).normalize_or_zero();
        assert!((forces[0].dir - expected).length() < 1e-5);
        assert!(forces[0].magnitude > forces[1].magnitude);

        // Other layers are quarter-turn offsets: all unit length
        for force in &forces {
            assert!((force.dir.length() - 1.0).abs() < 1e-5);
        }
        // Opposite layer heads away from the center
        assert!((forces[2].dir + expected).length() < 1e-3);
    }

    #[test]
    fn test_active_index_walks_cumulative_spans() {
        let mut chain = Chain::from_subdivisions(0, &[4, 3, 2, 1], 10.0, Vec2::ZERO);
        chain.clock_offset = 0.0;
        // grid_rate 1: master time is grid position directly
        assert_eq!(active_rhythm_index(&chain, 0.0, 1.0), Some(0));
        assert_eq!(active_rhythm_index(&chain, 3.9, 1.0), Some(0));
        assert_eq!(active_rhythm_index(&chain, 4.5, 1.0), Some(1));
        assert_eq!(active_rhythm_index(&chain, 8.5, 1.0), Some(2));
        assert_eq!(active_rhythm_index(&chain, 9.5, 1.0), Some(3));
        // Wraps modulo the grid total
        assert_eq!(active_rhythm_index(&chain, 10.5, 1.0), Some(0));

        chain.subdivisions.clear();
        chain.hp = 0;
        assert_eq!(active_rhythm_index(&chain, 1.0, 1.0), None);
    }

    #[test]
    fn test_gravity_silent_before_activation() {
        let params = GravityParams::for_population(4, &tuning());
        assert_eq!(params.strength_at(0.0), 0.0);
        assert_eq!(params.strength_at(params.activation_delay), 0.0);
        assert!(params.strength_at(params.activation_delay + 0.5) > 0.0);
    }

    #[test]
    fn test_gravity_stronger_for_fewer_survivors() {
        let t = tuning();
        let crowded = GravityParams::for_population(4, &t);
        let duel = GravityParams::for_population(1, &t);

        assert!(duel.activation_delay < crowded.activation_delay);
        assert!(duel.ramp_duration < crowded.ramp_duration);
        assert!(duel.max_strength > crowded.max_strength);

        // Equal elapsed time past each population's own threshold
        for past in [0.5, 2.0, 10.0, 100.0] {
            let g4 = crowded.strength_at(crowded.activation_delay + past);
            let g1 = duel.strength_at(duel.activation_delay + past);
            assert!(g4 < g1, "pop4 {g4} should be < pop1 {g1} at +{past}s");
        }
    }

    #[test]
    fn test_gravity_degenerate_direction_is_zero() {
        let params = GravityParams::for_population(1, &tuning());
        let pull = gravity_pull(Vec2::ZERO, Vec2::ZERO, &params, 1000.0);
        assert_eq!(pull, Vec2::ZERO);
        assert!(pull.is_finite());
    }
}
