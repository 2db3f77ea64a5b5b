//! Battle arena orchestration
//!
//! Owns the chain collection, the shared center point, the master clock and
//! the battle state. One `tick()` per rendered frame, driven by an external
//! scheduler; within a tick every chain advances before elimination and
//! victory are checked, so readers never observe a half-updated battle.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::{MAX_CHAINS, POPULATION_REFERENCE};
use crate::tuning::BattleTuning;

use super::forces::GravityParams;
use super::reconnect;
use super::state::{Chain, ChainPhase};
use super::tick::{TickCtx, tick_chain};

/// Overall battle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattlePhase {
    /// Chains may be attached; nothing moves
    Setup,
    /// Simulation running
    Active,
    /// Battle over (victory, draw, or external stop)
    Concluded,
}

/// How a concluded battle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Winner(u32),
    Draw,
}

/// The shared battleground for up to four rhythm chains
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleArena {
    /// Battle seed for reproducibility
    pub seed: u64,
    pub tuning: BattleTuning,
    /// Combatants, kept in id order for deterministic iteration
    pub chains: Vec<Chain>,
    /// Shared center point forces and gravity orient toward
    pub center: Vec2,
    /// Elapsed arena-active time in seconds
    pub master_clock: f32,
    pub phase: BattlePhase,
    /// Set once the battle resolves; `None` for an externally stopped battle
    pub outcome: Option<Outcome>,
    /// Population-scaled gravity well parameters
    pub gravity: GravityParams,
    last_population: u32,
    #[serde(default)]
    last_validate: f32,
    next_id: u32,
}

impl BattleArena {
    pub fn new(seed: u64, tuning: BattleTuning) -> Self {
        let gravity = GravityParams::for_population(POPULATION_REFERENCE, &tuning);
        Self {
            seed,
            tuning,
            chains: Vec::new(),
            center: Vec2::ZERO,
            master_clock: 0.0,
            phase: BattlePhase::Setup,
            outcome: None,
            gravity,
            last_population: 0,
            last_validate: 0.0,
            next_id: 0,
        }
    }

    /// Attach a combatant before the battle starts.
    ///
    /// The chain's target perimeter is its grid total scaled by the tuning's
    /// world scale. Returns the chain id, or `None` if the arena is full or
    /// already running. An empty subdivision sequence yields a dormant chain
    /// that never fights.
    pub fn add_chain(&mut self, subdivisions: &[u32], origin: Vec2) -> Option<u32> {
        if self.phase != BattlePhase::Setup {
            log::warn!("Chain attach ignored: battle already started");
            return None;
        }
        if self.chains.len() >= MAX_CHAINS {
            log::warn!("Chain attach ignored: arena is full");
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        let total: u32 = subdivisions.iter().sum();
        let target_length = total as f32 * self.tuning.grid_world_scale;
        self.chains
            .push(Chain::from_subdivisions(id, subdivisions, target_length, origin));
        Some(id)
    }

    /// Transition setup → active: record the battle start and derive the
    /// shared center from the combatants' positions.
    pub fn start(&mut self) {
        if self.phase != BattlePhase::Setup {
            return;
        }
        self.center = self.derive_center();
        self.master_clock = 0.0;
        self.last_validate = 0.0;
        self.phase = BattlePhase::Active;
        self.sync_population();
        log::info!(
            "Battle started: {} combatants around ({:.1}, {:.1})",
            self.alive_count(),
            self.center.x,
            self.center.y
        );
        self.check_conclusion();
    }

    /// Stop the battle. Idempotent. An in-flight reconnection is completed
    /// synchronously so no half-finished animation can ever be resumed.
    pub fn stop(&mut self) {
        if self.phase == BattlePhase::Concluded {
            return;
        }
        for chain in &mut self.chains {
            if matches!(chain.phase, ChainPhase::Reconnecting { .. }) {
                reconnect::finish_fusion(chain, self.master_clock);
            }
        }
        self.phase = BattlePhase::Concluded;
        log::info!("Battle stopped at t={:.2}", self.master_clock);
    }

    /// Advance the whole battle by one fixed timestep.
    ///
    /// Order is fixed: every live chain's physics and constraints, then
    /// topology validation, then elimination bookkeeping and the victory
    /// check.
    pub fn tick(&mut self, dt: f32) {
        if self.phase != BattlePhase::Active {
            return;
        }
        self.master_clock += dt;
        self.sync_population();

        let ctx = TickCtx {
            dt,
            now: self.master_clock,
            center: self.center,
            gravity: self.gravity,
            tuning: &self.tuning,
        };
        for chain in &mut self.chains {
            tick_chain(chain, &ctx);
        }

        if self.master_clock - self.last_validate >= self.tuning.validate_interval {
            self.last_validate = self.master_clock;
            for chain in &mut self.chains {
                chain.validate_and_repair();
            }
        }

        self.sync_population();
        self.check_conclusion();
    }

    /// Deliver an external hit event for a segment of a chain. Invalid or
    /// stale events are dropped. Returns whether the hit was applied.
    pub fn apply_hit(&mut self, chain_id: u32, segment_index: usize) -> bool {
        if self.phase != BattlePhase::Active {
            return false;
        }
        let now = self.master_clock;
        let seed = self.seed;
        let Some(chain) = self.chains.iter_mut().find(|c| c.id == chain_id) else {
            return false;
        };
        reconnect::apply_hit(chain, segment_index, now, seed, &self.tuning)
    }

    pub fn alive_count(&self) -> u32 {
        self.chains.iter().filter(|c| c.alive).count() as u32
    }

    pub fn chain(&self, id: u32) -> Option<&Chain> {
        self.chains.iter().find(|c| c.id == id)
    }

    /// Serialize the whole battle for an external shell to snapshot
    pub fn snapshot(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Restore a snapshot. Cached forces are re-derived on the next tick.
    pub fn restore(json: &str) -> Option<Self> {
        match serde_json::from_str(json) {
            Ok(arena) => Some(arena),
            Err(err) => {
                log::warn!("Bad battle snapshot ({err})");
                None
            }
        }
    }

    /// Shared center: middle of the bounding region of all chain nodes, or
    /// the mean of the planned start positions before anything has moved
    fn derive_center(&self) -> Vec2 {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        let mut any = false;
        for chain in &self.chains {
            for node in &chain.nodes {
                min = min.min(node.pos);
                max = max.max(node.pos);
                any = true;
            }
        }
        if any {
            return (min + max) * 0.5;
        }
        if self.chains.is_empty() {
            return Vec2::ZERO;
        }
        let sum: Vec2 = self.chains.iter().map(|c| c.origin).sum();
        sum / self.chains.len() as f32
    }

    /// Gravity is population-relative, not per-chain-static: recompute the
    /// shared parameters whenever the surviving population changes
    fn sync_population(&mut self) {
        let alive = self.alive_count();
        if alive != self.last_population {
            self.last_population = alive;
            if alive > 0 {
                self.gravity = GravityParams::for_population(alive, &self.tuning);
                log::info!(
                    "Population now {alive}: gravity delay {:.1}s, peak {:.0}",
                    self.gravity.activation_delay,
                    self.gravity.max_strength
                );
            }
        }
    }

    /// Active ends the instant zero or one chains remain alive
    fn check_conclusion(&mut self) {
        if self.phase != BattlePhase::Active {
            return;
        }
        let mut alive = self.chains.iter().filter(|c| c.alive).map(|c| c.id);
        let survivor = alive.next();
        if alive.next().is_some() {
            return;
        }
        self.outcome = Some(match survivor {
            Some(id) => Outcome::Winner(id),
            None => Outcome::Draw,
        });
        self.phase = BattlePhase::Concluded;
        match self.outcome {
            Some(Outcome::Winner(id)) => log::info!("Chain {id} wins at t={:.2}", self.master_clock),
            _ => log::info!("Draw at t={:.2}", self.master_clock),
        }
    }
}
