//! Fixed timestep chain lifecycle tick
//!
//! Drives one chain through its phase machine: hanging → connecting →
//! settling → reconnecting → settling. The arena passes its clock value,
//! center and gravity context in explicitly; chains never reach outward for
//! shared state.

use glam::Vec2;

use crate::ease_in_out;
use crate::quad_bezier;
use crate::tuning::BattleTuning;

use super::forces::{GravityParams, active_rhythm_index, gravity_pull, rebuild_layer_forces};
use super::reconnect;
use super::solver::relax;
use super::state::{Chain, ChainPhase, Node};

/// Per-tick context handed down from the arena
#[derive(Debug, Clone, Copy)]
pub struct TickCtx<'a> {
    /// Fixed timestep in seconds
    pub dt: f32,
    /// Master clock: elapsed arena-active time
    pub now: f32,
    /// Shared arena center forces and gravity orient toward
    pub center: Vec2,
    /// Current population-scaled gravity parameters
    pub gravity: GravityParams,
    pub tuning: &'a BattleTuning,
}

/// Verlet integration with velocity-by-difference and per-node acceleration.
/// Pinned nodes are left untouched.
pub(super) fn integrate(nodes: &mut [Node], accel: &[Vec2], dt: f32, damping: f32) {
    for (i, node) in nodes.iter_mut().enumerate() {
        if node.pinned {
            continue;
        }
        let vel = (node.pos - node.prev_pos) * damping;
        let a = accel.get(i).copied().unwrap_or(Vec2::ZERO);
        let next = node.pos + vel + a * dt * dt;
        node.prev_pos = node.pos;
        node.pos = next;
    }
}

/// Advance one chain by one fixed timestep
pub fn tick_chain(chain: &mut Chain, ctx: &TickCtx) {
    chain.glow *= ctx.tuning.glow_decay;
    if chain.glow < 0.01 {
        chain.glow = 0.0;
    }

    // A chain that dropped to one node or ran out of subdivisions is gone,
    // whatever phase that happened in
    if chain.alive && (chain.nodes.len() <= 1 || chain.subdivisions.is_empty()) {
        chain.eliminate();
        return;
    }

    match chain.phase {
        ChainPhase::Dormant | ChainPhase::Eliminated => return,

        ChainPhase::Hanging { elapsed } => {
            let elapsed = elapsed + ctx.dt;
            integrate(&mut chain.nodes, &[], ctx.dt, ctx.tuning.damping);
            relax(
                &mut chain.nodes,
                &chain.segments,
                ctx.tuning.tension,
                ctx.tuning.settle_iterations,
            );
            if elapsed >= ctx.tuning.hang_dwell {
                begin_connecting(chain, ctx);
            } else {
                chain.phase = ChainPhase::Hanging { elapsed };
            }
        }

        ChainPhase::Connecting { elapsed, from, ctrl } => {
            let elapsed = elapsed + ctx.dt;
            let t = (elapsed / ctx.tuning.connect_duration).clamp(0.0, 1.0);

            integrate(&mut chain.nodes, &[], ctx.dt, ctx.tuning.damping);

            // The traveling node is pinned for the duration and guided along
            // the curve; the anchor may have drifted, so re-read it each tick
            let last = chain.nodes.len() - 1;
            let anchor = chain.nodes[0].pos;
            let guided = quad_bezier(from, ctrl, anchor, ease_in_out(t));
            chain.nodes[last].pos = guided;
            chain.nodes[last].prev_pos = guided;

            relax(
                &mut chain.nodes,
                &chain.segments,
                ctx.tuning.tension,
                ctx.tuning.animate_iterations,
            );

            if t >= 1.0 {
                finish_connecting(chain, ctx);
            } else {
                chain.phase = ChainPhase::Connecting { elapsed, from, ctrl };
            }
        }

        ChainPhase::Settling => settle(chain, ctx),

        ChainPhase::Reconnecting { .. } => reconnect::step_fusion(chain, ctx),
    }

    // Re-check after the phase step so external readers never see a stale
    // alive flag next to an updated chain
    if chain.alive && (chain.nodes.len() <= 1 || chain.subdivisions.is_empty()) {
        chain.eliminate();
    }
}

fn begin_connecting(chain: &mut Chain, ctx: &TickCtx) {
    let last = chain.nodes.len() - 1;
    let from = chain.nodes[last].pos;
    let to = chain.nodes[0].pos;
    let ctrl = arc_control(from, to, ctx.center, ctx.tuning.connect_arc_ratio);
    chain.nodes[last].pinned = true;
    chain.phase = ChainPhase::Connecting {
        elapsed: 0.0,
        from,
        ctrl,
    };
}

fn finish_connecting(chain: &mut Chain, ctx: &TickCtx) {
    let last = chain.nodes.len() - 1;
    chain.nodes[last].pinned = false;

    if !chain.rebuild_closed_segments() {
        chain.eliminate();
        return;
    }

    // Anchor stays pinned for a grace period so the loop doesn't visibly jump
    chain.anchor_release = Some(ctx.now + ctx.tuning.anchor_grace);
    chain.clock_offset = ctx.now;
    chain.phase = ChainPhase::Settling;
    log::debug!("Chain {} closed its loop at t={:.2}", chain.id, ctx.now);
}

fn settle(chain: &mut Chain, ctx: &TickCtx) {
    if let Some(release) = chain.anchor_release
        && ctx.now >= release
    {
        for node in &mut chain.nodes {
            node.pinned = false;
        }
        chain.anchor_release = None;
    }

    // Throttled force recomputation (cached value + staleness threshold)
    let forces_stale = chain
        .forces_stamp
        .is_none_or(|stamp| ctx.now - stamp >= ctx.tuning.force_recompute_interval);
    if forces_stale {
        let forces = rebuild_layer_forces(chain, ctx.center, ctx.tuning);
        chain.forces = forces;
        chain.forces_stamp = Some(ctx.now);
    }

    let gravity_stale = chain
        .gravity_stamp
        .is_none_or(|stamp| ctx.now - stamp >= ctx.tuning.gravity_recompute_interval);
    if gravity_stale {
        chain.gravity_pull =
            gravity_pull(chain.center_of_mass(), ctx.center, &ctx.gravity, ctx.now);
        chain.gravity_stamp = Some(ctx.now);
    }

    let mut accel = vec![chain.gravity_pull; chain.nodes.len()];

    // Only the segment at the chain's current rhythmic position pushes
    if let Some(active) = active_rhythm_index(chain, ctx.now, ctx.tuning.grid_rate)
        && let Some(force) = chain.forces.get(active)
        && let Some(seg) = chain
            .segments
            .iter()
            .find(|s| s.rhythm_index == Some(active))
        && seg.a < accel.len()
        && seg.b < accel.len()
    {
        let push = force.dir * force.magnitude;
        accel[seg.a] += push;
        accel[seg.b] += push;
    }

    integrate(&mut chain.nodes, &accel, ctx.dt, ctx.tuning.damping);
    relax(
        &mut chain.nodes,
        &chain.segments,
        ctx.tuning.tension,
        ctx.tuning.settle_iterations,
    );
}

/// Control point for a quadratic travel curve: midpoint pushed perpendicular
/// to the travel line, bowing away from the arena center
pub(super) fn arc_control(from: Vec2, to: Vec2, center: Vec2, ratio: f32) -> Vec2 {
    let mid = (from + to) * 0.5;
    let span = to - from;
    let dist = span.length();
    if dist <= f32::EPSILON {
        return mid;
    }
    let mut perp = Vec2::new(-span.y, span.x) / dist;
    if perp.dot(mid - center) < 0.0 {
        perp = -perp;
    }
    mid + perp * dist * ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;

    fn ctx(tuning: &BattleTuning, now: f32) -> TickCtx<'_> {
        TickCtx {
            dt: SIM_DT,
            now,
            center: Vec2::ZERO,
            gravity: GravityParams::for_population(4, tuning),
            tuning,
        }
    }

    fn run_until<F: Fn(&Chain) -> bool>(
        chain: &mut Chain,
        tuning: &BattleTuning,
        start: f32,
        max_ticks: u32,
        done: F,
    ) -> f32 {
        let mut now = start;
        for _ in 0..max_ticks {
            if done(chain) {
                return now;
            }
            now += SIM_DT;
            tick_chain(chain, &ctx(tuning, now));
        }
        now
    }

    #[test]
    fn test_hanging_dwell_then_connecting() {
        let tuning = BattleTuning::default();
        let mut chain = Chain::from_subdivisions(0, &[4, 3, 2, 1], 10.0, Vec2::new(0.0, 60.0));

        run_until(&mut chain, &tuning, 0.0, 600, |c| {
            matches!(c.phase, ChainPhase::Connecting { .. })
        });
        assert!(matches!(chain.phase, ChainPhase::Connecting { .. }));
        // Traveling node is guided, so pinned
        assert!(chain.nodes.last().unwrap().pinned);
    }

    #[test]
    fn test_connecting_appends_closing_segment() {
        let tuning = BattleTuning::default();
        let mut chain = Chain::from_subdivisions(0, &[4, 3, 2, 1], 10.0, Vec2::new(0.0, 60.0));

        let now = run_until(&mut chain, &tuning, 0.0, 2000, |c| {
            matches!(c.phase, ChainPhase::Settling)
        });
        assert_eq!(chain.phase, ChainPhase::Settling);
        assert_eq!(chain.segments.len(), 5);
        assert!(chain.is_closed());
        // Rhythmic clock zeroed against the master clock at completion
        assert!(chain.clock_offset > 0.0 && chain.clock_offset <= now);
        // Anchor still pinned for the grace period
        assert!(chain.nodes[0].pinned);
        assert!(chain.anchor_release.is_some());
    }

    #[test]
    fn test_anchor_unpins_after_grace() {
        let tuning = BattleTuning::default();
        let mut chain = Chain::from_subdivisions(0, &[4, 3, 2, 1], 10.0, Vec2::new(0.0, 60.0));

        run_until(&mut chain, &tuning, 0.0, 2000, |c| {
            matches!(c.phase, ChainPhase::Settling)
        });
        let release = chain.anchor_release.unwrap();
        run_until(&mut chain, &tuning, release - SIM_DT, 60, |c| {
            c.anchor_release.is_none()
        });
        assert!(chain.nodes.iter().all(|n| !n.pinned));
    }

    #[test]
    fn test_settling_stays_finite_under_forces() {
        let tuning = BattleTuning::default();
        let mut chain = Chain::from_subdivisions(0, &[4, 3, 2, 1], 10.0, Vec2::new(0.0, 60.0));

        let mut now = 0.0;
        for _ in 0..1800 {
            now += SIM_DT;
            tick_chain(&mut chain, &ctx(&tuning, now));
        }
        assert!(chain.alive);
        assert!(chain.nodes.iter().all(|n| n.pos.is_finite()));
        assert_eq!(chain.segments.len(), 5);
    }

    #[test]
    fn test_tick_is_deterministic() {
        let tuning = BattleTuning::default();
        let mut a = Chain::from_subdivisions(7, &[3, 1, 2, 2], 16.0, Vec2::new(-40.0, 25.0));
        let mut b = a.clone();

        let mut now = 0.0;
        for _ in 0..900 {
            now += SIM_DT;
            tick_chain(&mut a, &ctx(&tuning, now));
            tick_chain(&mut b, &ctx(&tuning, now));
        }
        for (na, nb) in a.nodes.iter().zip(&b.nodes) {
            assert_eq!(na.pos, nb.pos);
        }
        assert_eq!(a.phase, b.phase);
    }

    #[test]
    fn test_arc_control_bows_away_from_center() {
        let from = Vec2::new(-10.0, 20.0);
        let to = Vec2::new(10.0, 20.0);
        let ctrl = arc_control(from, to, Vec2::ZERO, 0.5);
        // Center is below the travel line; the bow goes up
        assert!(ctrl.y > 20.0);

        // Degenerate travel collapses to the midpoint
        let ctrl = arc_control(from, from, Vec2::ZERO, 0.5);
        assert_eq!(ctrl, from);
    }
}
