//! Hit events and the fusion repair sequence
//!
//! An external collision detector decides *when* a segment is hit; the
//! contract here begins at "segment S of chain P has been destroyed". The
//! destroyed segment and its subdivision value are removed synchronously
//! within the tick boundary, then the two dangling nodes fuse over a short
//! invulnerable bezier animation before the chain's topology is rebuilt and
//! its rhythmic clock resynchronized.

use glam::Vec2;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use crate::tuning::BattleTuning;
use crate::{ease_in_out, quad_bezier};

use super::solver::relax;
use super::state::{Chain, ChainPhase};
use super::tick::{TickCtx, arc_control, integrate};

/// Destroy a segment and start the fusion repair.
///
/// Returns false when the event is dropped: dead or invulnerable chain,
/// chain not in its settling phase, out-of-range index, the non-rhythmic
/// closing segment, or a stale subdivision back-reference. Dropped events
/// have no observable effect.
pub fn apply_hit(
    chain: &mut Chain,
    segment_index: usize,
    now: f32,
    seed: u64,
    tuning: &BattleTuning,
) -> bool {
    if !chain.alive || chain.invulnerable || chain.phase != ChainPhase::Settling {
        return false;
    }
    let Some(seg) = chain.segments.get(segment_index).copied() else {
        return false;
    };
    // The closing segment exists purely to close the loop; it carries no
    // subdivision value and is not a valid target
    let Some(rhythm) = seg.rhythm_index else {
        return false;
    };
    if rhythm >= chain.subdivisions.len() {
        // Stale back-reference; periodic validation will rebuild
        return false;
    }

    // Remove the segment and its subdivision value, fixing up every other
    // back-reference in the same operation
    chain.segments.remove(segment_index);
    let value = chain.subdivisions.remove(rhythm);
    for s in &mut chain.segments {
        if let Some(i) = s.rhythm_index
            && i > rhythm
        {
            s.rhythm_index = Some(i - 1);
        }
    }
    chain.recompute_hp();
    chain.glow = 1.0;
    log::debug!(
        "Chain {} lost segment {segment_index} (value {value}), hp {}",
        chain.id,
        chain.hp
    );

    if chain.subdivisions.is_empty() || chain.segments.is_empty() {
        chain.eliminate();
        return true;
    }

    // The lower-indexed dangling node travels; the other absorbs it
    let mover = seg.a.min(seg.b);
    let target = seg.a.max(seg.b);
    if target >= chain.nodes.len() {
        chain.eliminate();
        return true;
    }

    let midpoint = (chain.nodes[mover].pos + chain.nodes[target].pos) * 0.5;
    let mut dir = (chain.center_of_mass() - midpoint).normalize_or_zero();
    if dir == Vec2::ZERO {
        dir = Vec2::new(0.0, 1.0);
    }
    // Deterministic jitter so repeated repairs don't read identically
    let mut rng = Pcg32::seed_from_u64(seed ^ ((chain.id as u64) << 32) ^ now.to_bits() as u64);
    let jitter: f32 = rng.random_range(-0.35..0.35);
    let (sin, cos) = jitter.sin_cos();
    let dir = Vec2::new(dir.x * cos - dir.y * sin, dir.x * sin + dir.y * cos);

    let from = chain.nodes[mover].pos;
    let ctrl = arc_control(
        from,
        chain.nodes[target].pos,
        chain.center_of_mass(),
        tuning.fusion_arc_ratio,
    );
    chain.nodes[mover].pinned = true;
    chain.invulnerable = true;
    chain.phase = ChainPhase::Reconnecting {
        elapsed: 0.0,
        mover,
        target,
        from,
        ctrl,
        rebound: dir * tuning.rebound_speed,
    };
    true
}

/// Advance the fusion animation by one tick. Normal force and gravity
/// updates are suspended for the duration.
pub(super) fn step_fusion(chain: &mut Chain, ctx: &TickCtx) {
    let ChainPhase::Reconnecting {
        elapsed,
        mover,
        target,
        from,
        ctrl,
        rebound,
    } = chain.phase
    else {
        return;
    };
    let elapsed = elapsed + ctx.dt;

    // Rigid whole-chain rebound selling the impact, decaying geometrically
    let shift = rebound * ctx.dt;
    for node in &mut chain.nodes {
        node.pos += shift;
        node.prev_pos += shift;
    }
    let rebound = rebound * ctx.tuning.rebound_decay;

    if mover >= chain.nodes.len() || target >= chain.nodes.len() || mover == target {
        // Suspect indices: abandon the animation, re-derive topology
        finish_fusion(chain, ctx.now);
        return;
    }

    integrate(&mut chain.nodes, &[], ctx.dt, ctx.tuning.damping);

    let t = (elapsed / ctx.tuning.fusion_duration).clamp(0.0, 1.0);
    let guided = quad_bezier(from, ctrl, chain.nodes[target].pos, ease_in_out(t));
    chain.nodes[mover].pos = guided;
    chain.nodes[mover].prev_pos = guided;

    relax(
        &mut chain.nodes,
        &chain.segments,
        ctx.tuning.tension,
        ctx.tuning.animate_iterations,
    );

    if t >= 1.0 {
        finish_fusion(chain, ctx.now);
    } else {
        chain.phase = ChainPhase::Reconnecting {
            elapsed,
            mover,
            target,
            from,
            ctrl,
            rebound,
        };
    }
}

/// Complete (or safely discard) a fusion: merge the dangling nodes, rebuild
/// every segment from the shortened subdivision sequence plus one closing
/// segment, and resynchronize the rhythmic clock. Also invoked when the
/// battle stops mid-animation, so a half-finished reconnection never
/// persists.
pub(crate) fn finish_fusion(chain: &mut Chain, now: f32) {
    let ChainPhase::Reconnecting { mover, target, .. } = chain.phase else {
        return;
    };

    if mover < chain.nodes.len() && target < chain.nodes.len() && mover != target {
        // Target takes the midpoint; the mover's slot is deleted and every
        // node index above it shifts down by one
        let midpoint = (chain.nodes[mover].pos + chain.nodes[target].pos) * 0.5;
        chain.nodes[target].pos = midpoint;
        chain.nodes[target].prev_pos = midpoint;
        chain.nodes[target].pinned = false;
        chain.nodes[mover].pinned = false;
        chain.remove_node_renumbering(mover, target);
    }
    chain.invulnerable = false;

    if chain.nodes.len() <= 1 || chain.subdivisions.is_empty() {
        chain.eliminate();
        return;
    }

    chain.recompute_hp();
    if !chain.rebuild_closed_segments() {
        chain.eliminate();
        return;
    }
    chain.clock_offset = now;
    chain.gravity_stamp = None;
    chain.phase = ChainPhase::Settling;
    log::debug!("Chain {} fused, {} segments remain", chain.id, chain.segments.len());
}
