//! Rhythm Rumble entry point
//!
//! Headless battle runner: seeds a four-chain battle, drives the fixed
//! timestep loop, lands scripted hits on random live chains, and logs the
//! outcome. Pass a seed as the first argument to replay a battle.

use glam::Vec2;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use rhythm_rumble::consts::SIM_DT;
use rhythm_rumble::sim::{BattleArena, BattlePhase, ChainPhase, Outcome};
use rhythm_rumble::tuning::BattleTuning;

/// Wall-clock cap on simulated battle time (seconds)
const BATTLE_LIMIT: f32 = 180.0;
/// Simulated seconds between scripted hits
const HIT_INTERVAL: f32 = 2.0;

fn main() {
    env_logger::init();

    let seed = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(0xC0FFEE);
    log::info!("Battle seed {seed}");

    let mut arena = BattleArena::new(seed, BattleTuning::default());
    let patterns: [&[u32]; 4] = [
        &[4, 3, 2, 1],
        &[2, 2, 3, 3, 2],
        &[6, 2, 4, 2],
        &[1, 2, 3, 4, 1, 1],
    ];
    let origins = [
        Vec2::new(-160.0, 120.0),
        Vec2::new(160.0, 120.0),
        Vec2::new(-160.0, -120.0),
        Vec2::new(160.0, -120.0),
    ];
    for (pattern, origin) in patterns.iter().zip(origins) {
        arena.add_chain(pattern, origin);
    }
    arena.start();

    let mut rng = Pcg32::seed_from_u64(seed);
    let mut next_hit = HIT_INTERVAL * 2.0;

    while arena.phase == BattlePhase::Active && arena.master_clock < BATTLE_LIMIT {
        arena.tick(SIM_DT);

        if arena.master_clock >= next_hit {
            next_hit += HIT_INTERVAL;
            let targets: Vec<(u32, usize)> = arena
                .chains
                .iter()
                .filter(|c| c.alive && c.phase == ChainPhase::Settling)
                .map(|c| (c.id, c.segments.len()))
                .collect();
            if !targets.is_empty() {
                let (id, segment_count) = targets[rng.random_range(0..targets.len())];
                let segment = rng.random_range(0..segment_count);
                if arena.apply_hit(id, segment)
                    && let Some(chain) = arena.chain(id)
                {
                    log::info!(
                        "t={:.1}: chain {id} hit on segment {segment}, hp {}",
                        arena.master_clock,
                        chain.hp
                    );
                }
            }
        }
    }
    arena.stop();

    match arena.outcome {
        Some(Outcome::Winner(id)) => log::info!("Chain {id} takes the battle"),
        Some(Outcome::Draw) => log::info!("Mutual destruction: draw"),
        None => log::info!("Battle stopped with no resolution"),
    }
}
