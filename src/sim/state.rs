//! Chain state and core simulation types
//!
//! All state that must be persisted for snapshot/determinism lives here.
//! Nodes are owned exclusively by their chain and referenced by index from
//! segments, never by direct reference, so the arrays survive mutation
//! during fusion. Removing a node renumbers every referencing segment in the
//! same operation.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::forces::LayerForce;

/// A point mass in the chain hinge structure
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Node {
    /// Current position
    pub pos: Vec2,
    /// Previous position (velocity-by-difference integration)
    pub prev_pos: Vec2,
    /// Pinned nodes ignore integration and one side of each constraint
    pub pinned: bool,
}

impl Node {
    pub fn at(pos: Vec2) -> Self {
        Self {
            pos,
            prev_pos: pos,
            pinned: false,
        }
    }

    pub fn pinned_at(pos: Vec2) -> Self {
        Self {
            pos,
            prev_pos: pos,
            pinned: true,
        }
    }
}

/// A distance constraint between two nodes of the same chain
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Segment {
    /// Lower endpoint node index
    pub a: usize,
    /// Upper endpoint node index
    pub b: usize,
    /// Rest length the solver relaxes toward
    pub rest_length: f32,
    /// Subdivision value this segment represents (0 for the closing segment)
    pub subdivision: u32,
    /// Index into the chain's subdivision sequence; `None` marks the
    /// non-rhythmic closing segment that exists purely to close the loop
    pub rhythm_index: Option<usize>,
}

/// Lifecycle phase of a chain
///
/// Transitions: dormant chains never start; hanging → connecting → settling;
/// settling → reconnecting → settling (hit events); eliminated is terminal and can be
/// entered from any phase once the chain drops to ≤1 node or runs out of
/// subdivisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChainPhase {
    /// Built from an empty subdivision sequence; never participates
    Dormant,
    /// Holding the freshly built hanging shape for a dwell period
    Hanging { elapsed: f32 },
    /// Last node travels a bezier arc to the anchor, closing the loop
    Connecting { elapsed: f32, from: Vec2, ctrl: Vec2 },
    /// Forces, gravity and the constraint solver are all active
    Settling,
    /// Post-hit fusion animation; forces and gravity are suspended
    Reconnecting {
        elapsed: f32,
        /// Lower-indexed dangling node, travels toward `target`
        mover: usize,
        /// Higher-indexed dangling node, absorbs the mover on completion
        target: usize,
        from: Vec2,
        ctrl: Vec2,
        /// Rigid whole-chain impact velocity, decays geometrically
        rebound: Vec2,
    },
    /// Terminal
    Eliminated,
}

/// One combatant chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub id: u32,
    /// Anchor start position the chain was built at
    pub origin: Vec2,
    pub nodes: Vec<Node>,
    pub segments: Vec<Segment>,
    /// Remaining rhythmic subdivision values
    pub subdivisions: Vec<u32>,
    /// World length per grid unit of subdivision
    pub scale: f32,
    /// Remaining grid total; always equals the sum of `subdivisions`
    pub hp: u32,
    pub phase: ChainPhase,
    /// Master-clock time the rhythmic cycle was last zeroed at
    pub clock_offset: f32,
    pub alive: bool,
    /// Set for the duration of a fusion repair; hits are dropped while set
    pub invulnerable: bool,
    /// Hit flash intensity, decays each tick (presentation only)
    #[serde(default)]
    pub glow: f32,
    /// Master-clock time the anchor unpins at after the loop closes
    #[serde(default)]
    pub anchor_release: Option<f32>,

    // Cached values, re-derived after restore
    /// Per-subdivision directional forces (parallel to `subdivisions`)
    #[serde(skip)]
    pub forces: Vec<LayerForce>,
    /// Master-clock time `forces` was computed at
    #[serde(skip)]
    pub forces_stamp: Option<f32>,
    /// Gravity acceleration applied to every node this tick
    #[serde(skip)]
    pub gravity_pull: Vec2,
    /// Master-clock time `gravity_pull` was computed at
    #[serde(skip)]
    pub gravity_stamp: Option<f32>,
}

impl Chain {
    /// Build a chain from a rhythmic subdivision sequence.
    ///
    /// Lays out one pinned anchor node at `origin` followed by one node per
    /// subdivision value along a vertical hanging line. Segment rest lengths
    /// are each value scaled so their sum equals `target_length`. The loop is
    /// not closed here; that happens during the connecting phase.
    ///
    /// Zero values are skipped as malformed. An empty (or all-zero) sequence
    /// yields a dormant chain.
    pub fn from_subdivisions(
        id: u32,
        subdivisions: &[u32],
        target_length: f32,
        origin: Vec2,
    ) -> Self {
        let subdivisions: Vec<u32> = subdivisions.iter().copied().filter(|&v| v > 0).collect();
        let total: u32 = subdivisions.iter().sum();

        if subdivisions.is_empty() || target_length <= 0.0 {
            return Self::dormant(id, origin);
        }

        let scale = target_length / total as f32;

        let mut nodes = Vec::with_capacity(subdivisions.len() + 1);
        nodes.push(Node::pinned_at(origin));
        let mut depth = 0.0;
        for &value in &subdivisions {
            depth += value as f32 * scale;
            nodes.push(Node::at(origin + Vec2::new(0.0, -depth)));
        }

        let segments = subdivisions
            .iter()
            .enumerate()
            .map(|(i, &value)| Segment {
                a: i,
                b: i + 1,
                rest_length: value as f32 * scale,
                subdivision: value,
                rhythm_index: Some(i),
            })
            .collect();

        Self {
            id,
            origin,
            nodes,
            segments,
            hp: total,
            subdivisions,
            scale,
            phase: ChainPhase::Hanging { elapsed: 0.0 },
            clock_offset: 0.0,
            alive: true,
            invulnerable: false,
            glow: 0.0,
            anchor_release: None,
            forces: Vec::new(),
            forces_stamp: None,
            gravity_pull: Vec2::ZERO,
            gravity_stamp: None,
        }
    }

    fn dormant(id: u32, origin: Vec2) -> Self {
        Self {
            id,
            origin,
            nodes: Vec::new(),
            segments: Vec::new(),
            subdivisions: Vec::new(),
            scale: 1.0,
            hp: 0,
            phase: ChainPhase::Dormant,
            clock_offset: 0.0,
            alive: false,
            invulnerable: false,
            glow: 0.0,
            anchor_release: None,
            forces: Vec::new(),
            forces_stamp: None,
            gravity_pull: Vec2::ZERO,
            gravity_stamp: None,
        }
    }

    /// Mean of all node positions (the chain origin when empty)
    pub fn center_of_mass(&self) -> Vec2 {
        if self.nodes.is_empty() {
            return self.origin;
        }
        let sum: Vec2 = self.nodes.iter().map(|n| n.pos).sum();
        sum / self.nodes.len() as f32
    }

    /// Whether the loop has been closed with a closing segment
    pub fn is_closed(&self) -> bool {
        self.segments.iter().any(|s| s.rhythm_index.is_none())
    }

    /// Recompute `hp` from the current subdivision sequence
    pub fn recompute_hp(&mut self) {
        self.hp = self.subdivisions.iter().sum();
    }

    /// Eliminate the chain. Idempotent.
    pub fn eliminate(&mut self) {
        if self.phase == ChainPhase::Eliminated {
            return;
        }
        self.alive = false;
        self.invulnerable = false;
        self.phase = ChainPhase::Eliminated;
        log::info!("Chain {} eliminated", self.id);
    }

    /// Remove one node and renumber every segment index in the same
    /// operation. Indices above the removed slot shift down by one; segments
    /// referencing the removed slot are redirected to `absorb`.
    pub fn remove_node_renumbering(&mut self, removed: usize, absorb: usize) {
        if removed >= self.nodes.len() {
            return;
        }
        self.nodes.remove(removed);
        let fix = |idx: usize| {
            if idx == removed {
                if absorb > removed { absorb - 1 } else { absorb }
            } else if idx > removed {
                idx - 1
            } else {
                idx
            }
        };
        for seg in &mut self.segments {
            seg.a = fix(seg.a);
            seg.b = fix(seg.b);
        }
        // A segment whose endpoints collapsed together is gone, not nulled
        self.segments.retain(|s| s.a != s.b);
    }

    /// Rebuild every segment from the subdivision sequence plus one closing
    /// segment. The safety net for fusion completion and drift repair: state
    /// is re-derived rather than patched.
    ///
    /// Requires `nodes.len() == subdivisions.len() + 1`; anything else means
    /// the chain is beyond repair and the caller should eliminate it.
    pub fn rebuild_closed_segments(&mut self) -> bool {
        let n = self.subdivisions.len();
        if n == 0 || self.nodes.len() != n + 1 {
            return false;
        }
        self.segments = self
            .subdivisions
            .iter()
            .enumerate()
            .map(|(i, &value)| Segment {
                a: i,
                b: i + 1,
                rest_length: value as f32 * self.scale,
                subdivision: value,
                rhythm_index: Some(i),
            })
            .collect();
        let total: u32 = self.subdivisions.iter().sum();
        let mean_rest = total as f32 * self.scale / n as f32;
        self.segments.push(Segment {
            a: n,
            b: 0,
            rest_length: mean_rest,
            subdivision: 0,
            rhythm_index: None,
        });
        self.forces_stamp = None;
        true
    }

    /// Detect structural drift and repair by recomputation.
    ///
    /// Checks that segment endpoints are in bounds and distinct, that rhythm
    /// back-references match the subdivision sequence, and that the segment
    /// count matches the topology. Returns true if a repair was performed.
    pub fn validate_and_repair(&mut self) -> bool {
        if !self.alive || self.phase != ChainPhase::Settling {
            return false;
        }
        let n = self.subdivisions.len();
        let node_count = self.nodes.len();

        let healthy = self.segments.len() == n + 1
            && node_count == n + 1
            && self.hp == self.subdivisions.iter().sum::<u32>()
            && self.segments.iter().all(|s| {
                s.a < node_count
                    && s.b < node_count
                    && s.a != s.b
                    && s.rhythm_index.is_none_or(|i| i < n)
            });
        if healthy {
            return false;
        }

        log::warn!("Chain {} topology drifted, rebuilding", self.id);
        self.recompute_hp();
        if self.nodes.len() == n + 1 && n > 0 && self.rebuild_closed_segments() {
            true
        } else {
            // Beyond recomputation; a broken chain never corrupts the arena
            self.eliminate();
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_counts_and_lengths() {
        let chain = Chain::from_subdivisions(0, &[4, 3, 2, 1], 10.0, Vec2::ZERO);
        assert_eq!(chain.nodes.len(), 5);
        assert_eq!(chain.segments.len(), 4);
        assert_eq!(chain.hp, 10);
        assert!(chain.nodes[0].pinned);
        assert!(chain.alive);

        // Scale factor 1: rest lengths are the subdivision values
        let rests: Vec<f32> = chain.segments.iter().map(|s| s.rest_length).collect();
        assert_eq!(rests, vec![4.0, 3.0, 2.0, 1.0]);
        let total: f32 = rests.iter().sum();
        assert!((total - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_builder_scales_to_target() {
        let chain = Chain::from_subdivisions(0, &[2, 2, 4], 24.0, Vec2::ZERO);
        let total: f32 = chain.segments.iter().map(|s| s.rest_length).sum();
        assert!((total - 24.0).abs() < 1e-4);
        assert!((chain.scale - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_builder_hangs_vertically() {
        let origin = Vec2::new(50.0, 80.0);
        let chain = Chain::from_subdivisions(0, &[1, 1], 6.0, origin);
        assert_eq!(chain.nodes[0].pos, origin);
        for pair in chain.nodes.windows(2) {
            assert!((pair[1].pos.x - pair[0].pos.x).abs() < 1e-6);
            assert!(pair[1].pos.y < pair[0].pos.y);
        }
    }

    #[test]
    fn test_empty_sequence_is_dormant() {
        let chain = Chain::from_subdivisions(0, &[], 10.0, Vec2::ZERO);
        assert_eq!(chain.phase, ChainPhase::Dormant);
        assert!(!chain.alive);
        assert!(chain.nodes.is_empty());

        // All-zero values are malformed input, skipped silently
        let chain = Chain::from_subdivisions(1, &[0, 0], 10.0, Vec2::ZERO);
        assert_eq!(chain.phase, ChainPhase::Dormant);
    }

    #[test]
    fn test_eliminate_idempotent() {
        let mut chain = Chain::from_subdivisions(0, &[1, 2], 6.0, Vec2::ZERO);
        chain.eliminate();
        let snapshot = (chain.alive, chain.phase);
        chain.eliminate();
        assert_eq!((chain.alive, chain.phase), snapshot);
        assert_eq!(chain.phase, ChainPhase::Eliminated);
    }

    #[test]
    fn test_remove_node_renumbers_segments() {
        let mut chain = Chain::from_subdivisions(0, &[1, 1, 1], 9.0, Vec2::ZERO);
        // Remove node 1; its segments redirect to node 2, which shifts to 1
        chain.remove_node_renumbering(1, 2);
        assert_eq!(chain.nodes.len(), 3);
        for seg in &chain.segments {
            assert!(seg.a < 3 && seg.b < 3);
            assert_ne!(seg.a, seg.b);
        }
        // Segment 0 was (0,1)->(0,1): endpoint absorbed, stays distinct
        // Segment (1,2) collapsed into (1,1) and must be gone
        assert_eq!(chain.segments.len(), 2);
    }

    #[test]
    fn test_rebuild_closed_segments() {
        let mut chain = Chain::from_subdivisions(0, &[3, 2, 1], 6.0, Vec2::ZERO);
        assert!(chain.rebuild_closed_segments());
        assert_eq!(chain.segments.len(), 4);
        assert!(chain.is_closed());
        let closing = chain.segments.last().unwrap();
        assert_eq!(closing.rhythm_index, None);
        assert_eq!((closing.a, closing.b), (3, 0));
        assert!(closing.rest_length > 0.0);
    }

    #[test]
    fn test_validate_repairs_drift() {
        let mut chain = Chain::from_subdivisions(0, &[2, 2], 8.0, Vec2::ZERO);
        chain.rebuild_closed_segments();
        chain.phase = ChainPhase::Settling;

        // Corrupt a segment endpoint out of bounds
        chain.segments[0].b = 99;
        assert!(chain.validate_and_repair());
        assert!(chain.segments.iter().all(|s| s.a < 3 && s.b < 3));
        assert!(chain.alive);

        // Healthy chain: validation is a no-op
        assert!(!chain.validate_and_repair());
    }

    #[test]
    fn test_validate_eliminates_unreparable() {
        let mut chain = Chain::from_subdivisions(0, &[2, 2], 8.0, Vec2::ZERO);
        chain.rebuild_closed_segments();
        chain.phase = ChainPhase::Settling;
        // Node count can no longer match the subdivision sequence
        chain.nodes.truncate(1);
        assert!(chain.validate_and_repair());
        assert_eq!(chain.phase, ChainPhase::Eliminated);
    }
}
