//! Deterministic simulation module
//!
//! All battle logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by chain ID)
//! - No rendering or platform dependencies
//!
//! Within one tick the order is fixed for every chain: forces, integration,
//! constraint relaxation, then elimination and victory checks. External
//! readers never observe a half-updated chain next to a stale alive flag.

pub mod arena;
pub mod forces;
pub mod reconnect;
pub mod solver;
pub mod state;
pub mod tick;

pub use arena::{BattleArena, BattlePhase, Outcome};
pub use forces::{GravityParams, LayerForce};
pub use state::{Chain, ChainPhase, Node, Segment};
pub use tick::{TickCtx, tick_chain};
