//! Iterative distance-constraint relaxation
//!
//! The foundational primitive every animation phase builds on. Classic
//! Gauss-Seidel: each pass walks the segments and nudges both endpoints
//! toward the rest length, correction split evenly and scaled by a tension
//! coefficient below 1, so motion reads as elastic rather than rigid. This is
//! not an exact solve and is intentionally under-damped.

use super::state::{Node, Segment};

/// Relax all segments toward their rest lengths for a fixed pass count.
///
/// Corrections never push toward a pinned endpoint; if one end is pinned the
/// free end absorbs the full correction. Malformed segments (out-of-bounds or
/// coincident indices) and degenerate zero-length spans are skipped rather
/// than allowed to produce NaN.
pub fn relax(nodes: &mut [Node], segments: &[Segment], tension: f32, iterations: u32) {
    for _ in 0..iterations {
        for seg in segments {
            let (a, b) = (seg.a, seg.b);
            if a >= nodes.len() || b >= nodes.len() || a == b {
                continue;
            }

            let delta = nodes[b].pos - nodes[a].pos;
            let dist = delta.length();
            if dist <= f32::EPSILON {
                continue;
            }

            let correction = delta / dist * ((dist - seg.rest_length) * tension);
            match (nodes[a].pinned, nodes[b].pinned) {
                (true, true) => {}
                (true, false) => nodes[b].pos -= correction,
                (false, true) => nodes[a].pos += correction,
                (false, false) => {
                    nodes[a].pos += correction * 0.5;
                    nodes[b].pos -= correction * 0.5;
                }
            }
        }
    }
}

/// Total absolute deviation of segment lengths from their rest lengths
pub fn length_error(nodes: &[Node], segments: &[Segment]) -> f32 {
    segments
        .iter()
        .filter(|s| s.a < nodes.len() && s.b < nodes.len() && s.a != s.b)
        .map(|s| ((nodes[s.b].pos - nodes[s.a].pos).length() - s.rest_length).abs())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::state::Chain;
    use glam::Vec2;

    fn stretched_chain() -> Chain {
        let mut chain = Chain::from_subdivisions(0, &[2, 3, 2], 14.0, Vec2::ZERO);
        // Pull the free nodes sideways so every segment is off rest length
        for (i, node) in chain.nodes.iter_mut().enumerate().skip(1) {
            node.pos += Vec2::new(3.0 * i as f32, 1.5);
            node.prev_pos = node.pos;
        }
        chain
    }

    #[test]
    fn test_relaxation_converges() {
        let mut chain = stretched_chain();
        let mut prev_error = length_error(&chain.nodes, &chain.segments);
        assert!(prev_error > 1.0);

        for _ in 0..50 {
            relax(&mut chain.nodes, &chain.segments, 0.35, 1);
            let error = length_error(&chain.nodes, &chain.segments);
            assert!(error <= prev_error + 1e-4, "error increased: {prev_error} -> {error}");
            prev_error = error;
        }
        assert!(prev_error < 0.2);
    }

    #[test]
    fn test_pinned_node_never_moves() {
        let mut chain = stretched_chain();
        let anchor = chain.nodes[0].pos;
        relax(&mut chain.nodes, &chain.segments, 0.5, 20);
        assert_eq!(chain.nodes[0].pos, anchor);
    }

    #[test]
    fn test_degenerate_span_is_skipped() {
        let mut chain = Chain::from_subdivisions(0, &[1], 2.0, Vec2::ZERO);
        // Collapse both endpoints onto the same point
        chain.nodes[1].pos = chain.nodes[0].pos;
        relax(&mut chain.nodes, &chain.segments, 0.5, 4);
        assert!(chain.nodes[1].pos.is_finite());
    }

    #[test]
    fn test_out_of_bounds_segment_is_skipped() {
        let mut chain = Chain::from_subdivisions(0, &[1, 1], 4.0, Vec2::ZERO);
        chain.segments[1].b = 42;
        let before: Vec<Vec2> = chain.nodes.iter().map(|n| n.pos).collect();
        relax(&mut chain.nodes, &chain.segments, 0.5, 1);
        // Segment 0 still relaxes; nothing panics, nothing NaNs
        assert!(chain.nodes.iter().all(|n| n.pos.is_finite()));
        assert_eq!(before.len(), chain.nodes.len());
    }
}
