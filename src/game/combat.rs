//! Combat math - damage falloff and shield-then-health application

use crate::config::FalloffConfig;

use super::host::Vec3;

/// Result of applying damage to a health/shield pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    pub health: f32,
    pub shield: f32,
    /// Portion soaked up by the shield
    pub absorbed: f32,
    /// Portion that reached health (before clamping at zero)
    pub health_damage: f32,
}

/// Combat system for damage arithmetic
pub struct CombatSystem;

impl CombatSystem {
    /// Distance multiplier: 1.0 up to `full_range`, `min_multiplier` from
    /// `min_range` on, linear in between
    pub fn falloff_multiplier(distance: f32, falloff: &FalloffConfig) -> f32 {
        if distance <= falloff.full_range {
            return 1.0;
        }
        if distance >= falloff.min_range {
            return falloff.min_multiplier;
        }
        let t = (distance - falloff.full_range) / (falloff.min_range - falloff.full_range);
        1.0 + (falloff.min_multiplier - 1.0) * t
    }

    /// Final damage for a hit at `distance`, rounded to a whole number
    pub fn calculate_damage(base_damage: f32, distance: f32, falloff: &FalloffConfig) -> f32 {
        (base_damage * Self::falloff_multiplier(distance, falloff)).round()
    }

    /// Shield absorbs first, the remainder comes off health. Neither goes
    /// below zero.
    pub fn apply_damage(health: f32, shield: f32, amount: f32) -> DamageOutcome {
        let amount = amount.max(0.0);
        let absorbed = amount.min(shield.max(0.0));
        let remaining = amount - absorbed;
        DamageOutcome {
            health: (health - remaining).max(0.0),
            shield: (shield - absorbed).max(0.0),
            absorbed,
            health_damage: remaining,
        }
    }

    /// Unit vector pointing from the victim toward the source of the hit
    pub fn hit_direction(victim: Vec3, source: Vec3) -> Vec3 {
        (source - victim).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn falloff() -> FalloffConfig {
        FalloffConfig {
            full_range: 20.0,
            min_range: 60.0,
            min_multiplier: 0.5,
        }
    }

    #[test]
    fn shield_absorbs_before_health() {
        for (amount, shield) in [(0.0, 0.0), (30.0, 50.0), (50.0, 50.0), (80.0, 50.0), (250.0, 10.0)] {
            let out = CombatSystem::apply_damage(100.0, shield, amount);
            assert_eq!(out.shield, (shield - amount).max(0.0));
            assert_eq!(out.health, (100.0 - (amount - shield).max(0.0)).max(0.0));
            assert!(out.health >= 0.0 && out.shield >= 0.0);
        }
    }

    #[test]
    fn lethal_damage_clamps_health() {
        let out = CombatSystem::apply_damage(20.0, 0.0, 35.0);
        assert_eq!(out.health, 0.0);
        assert_eq!(out.health_damage, 35.0);
    }

    #[test]
    fn full_damage_inside_full_range() {
        let cfg = falloff();
        assert_eq!(CombatSystem::falloff_multiplier(0.0, &cfg), 1.0);
        assert_eq!(CombatSystem::falloff_multiplier(20.0, &cfg), 1.0);
    }

    #[test]
    fn minimum_multiplier_beyond_min_range() {
        let cfg = falloff();
        assert_eq!(CombatSystem::falloff_multiplier(60.0, &cfg), 0.5);
        assert_eq!(CombatSystem::falloff_multiplier(500.0, &cfg), 0.5);
    }

    #[test]
    fn falloff_strictly_decreases_between_thresholds() {
        let cfg = falloff();
        let mut previous = CombatSystem::falloff_multiplier(20.0, &cfg);
        let mut d = 21.0;
        while d < 60.0 {
            let m = CombatSystem::falloff_multiplier(d, &cfg);
            assert!(m < previous, "multiplier at {d} should drop below {previous}");
            assert!(m > 0.5);
            previous = m;
            d += 1.0;
        }
        assert!((CombatSystem::falloff_multiplier(40.0, &cfg) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn damage_is_rounded() {
        let cfg = falloff();
        // 25 * 0.75 = 18.75
        assert_eq!(CombatSystem::calculate_damage(25.0, 40.0, &cfg), 19.0);
        assert_eq!(CombatSystem::calculate_damage(25.0, 5.0, &cfg), 25.0);
    }

    #[test]
    fn hit_direction_points_at_source() {
        let dir = CombatSystem::hit_direction(Vec3::ZERO, Vec3::new(0.0, 0.0, -5.0));
        assert_eq!(dir, Vec3::new(0.0, 0.0, -1.0));
    }
}
