//! Probability tables and the per-round RNG.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Hit chance before modifiers.
pub const BASE_HIT_CHANCE: f64 = 0.5;
/// Lower clamp for a single fighter's hit chance.
pub const MIN_HIT_CHANCE: f64 = 0.15;
/// Upper clamp for a single fighter's hit chance.
pub const MAX_HIT_CHANCE: f64 = 0.85;
/// Mitigation bonus granted by BRACE.
pub const BRACE_MITIGATION_BONUS: f64 = 0.20;
/// Ceiling on any mitigation bonus.
pub const MAX_MITIGATION_BONUS: f64 = 0.50;
/// Hit chance removed by a full shield on the target.
pub const TARGET_SHIELD_PENALTY: f64 = 0.10;
/// Hit chance added by a full shield on the attacker.
pub const ATTACKER_SHIELD_BONUS: f64 = 0.05;
/// Share of hits a full shield absorbs.
pub const SHIELD_ABSORB_BASE: f64 = 0.5;
/// Percentage of shield ablation BRACE cancels.
pub const BRACE_ABLATION_CUT_PERCENT: u32 = 20;
/// Flee chance with equal mobility.
pub const BASE_FLEE_CHANCE: f64 = 0.5;
/// Flee chance per point of mobility advantage.
pub const FLEE_CHANCE_PER_TURN: f64 = 0.1;
/// Lower clamp for flee chance.
pub const MIN_FLEE_CHANCE: f64 = 0.2;
/// Upper clamp for flee chance.
pub const MAX_FLEE_CHANCE: f64 = 0.9;

/// Mitigation bonus for a defender, capped.
#[must_use]
pub fn mitigation_bonus(bracing: bool) -> f64 {
    if bracing {
        BRACE_MITIGATION_BONUS.min(MAX_MITIGATION_BONUS)
    } else {
        0.0
    }
}

/// Chance that one committed fighter hits.
#[must_use]
pub fn hit_chance(target_bracing: bool, target_shield_ratio: f64, attacker_shield_ratio: f64) -> f64 {
    let chance = BASE_HIT_CHANCE - mitigation_bonus(target_bracing)
        - TARGET_SHIELD_PENALTY * target_shield_ratio.clamp(0.0, 1.0)
        + ATTACKER_SHIELD_BONUS * attacker_shield_ratio.clamp(0.0, 1.0);
    chance.clamp(MIN_HIT_CHANCE, MAX_HIT_CHANCE)
}

/// Chance that a landed hit is soaked by shields.
///
/// Effectiveness decays with the square root of the remaining shield
/// fraction, reaching zero on empty shields.
#[must_use]
pub fn absorb_chance(shield_pool: u32, max_shields: u32) -> f64 {
    if shield_pool == 0 || max_shields == 0 {
        return 0.0;
    }
    let ratio = (f64::from(shield_pool) / f64::from(max_shields)).clamp(0.0, 1.0);
    SHIELD_ABSORB_BASE * ratio.sqrt()
}

/// Shield points actually lost for `absorbed` soaked hits.
#[must_use]
pub const fn shield_ablation(absorbed: u32, bracing: bool) -> u32 {
    if bracing {
        absorbed - absorbed * BRACE_ABLATION_CUT_PERCENT / 100
    } else {
        absorbed
    }
}

/// Chance that a flee succeeds given the fastest remaining opponent.
#[must_use]
pub fn flee_chance(fleer_turns_per_warp: u32, fastest_opponent: Option<u32>) -> f64 {
    let Some(opponent) = fastest_opponent else {
        return MAX_FLEE_CHANCE;
    };
    let advantage = f64::from(fleer_turns_per_warp) - f64::from(opponent);
    (BASE_FLEE_CHANCE + FLEE_CHANCE_PER_TURN * advantage).clamp(MIN_FLEE_CHANCE, MAX_FLEE_CHANCE)
}

/// Derives the seed of a specific round.
#[must_use]
pub const fn round_seed(base_seed: u64, round_number: u32) -> u64 {
    base_seed ^ (round_number as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// RNG for one round of one encounter.
#[must_use]
pub fn round_rng(base_seed: u64, round_number: u32) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(round_seed(base_seed, round_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_chance_is_clamped() {
        assert!((hit_chance(false, 0.0, 1.0) - 0.55).abs() < 1e-9);
        assert!((hit_chance(true, 1.0, 0.0) - 0.2).abs() < 1e-9);
        assert!(hit_chance(true, 5.0, -3.0) >= MIN_HIT_CHANCE);
        assert!(hit_chance(false, -5.0, 5.0) <= MAX_HIT_CHANCE);
    }

    #[test]
    fn bracing_lowers_hit_chance() {
        assert!(hit_chance(true, 0.5, 0.5) < hit_chance(false, 0.5, 0.5));
    }

    #[test]
    fn absorb_decays_toward_empty() {
        let full = absorb_chance(100, 100);
        let low = absorb_chance(4, 100);
        assert!((full - SHIELD_ABSORB_BASE).abs() < 1e-9);
        assert!(low < full);
        assert!(absorb_chance(0, 100).abs() < f64::EPSILON);
        assert!(absorb_chance(10, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn brace_cuts_ablation() {
        assert_eq!(shield_ablation(10, false), 10);
        assert_eq!(shield_ablation(10, true), 8);
        assert_eq!(shield_ablation(4, true), 4);
        assert_eq!(shield_ablation(0, true), 0);
    }

    #[test]
    fn flee_chance_bounds() {
        assert!((flee_chance(3, Some(3)) - 0.5).abs() < 1e-9);
        assert!((flee_chance(100, Some(0)) - MAX_FLEE_CHANCE).abs() < 1e-9);
        assert!((flee_chance(0, Some(100)) - MIN_FLEE_CHANCE).abs() < 1e-9);
        assert!((flee_chance(1, None) - MAX_FLEE_CHANCE).abs() < 1e-9);
        assert!(flee_chance(5, Some(3)) > flee_chance(3, Some(3)));
    }

    #[test]
    fn round_seeds_differ_per_round() {
        assert_ne!(round_seed(7, 1), round_seed(7, 2));
        assert_eq!(round_seed(7, 0), 7);
    }

    #[test]
    fn round_rng_is_reproducible() {
        use rand::Rng;
        let a: u64 = round_rng(7, 3).random();
        let b: u64 = round_rng(7, 3).random();
        let c: u64 = round_rng(7, 4).random();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
