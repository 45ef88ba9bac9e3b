//! Projectile registry and collision resolution

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use tracing::{debug, warn};

use super::combat::CombatSystem;
use super::host::{CollisionTarget, EntityId, Host, PlayerId, Quat, Sound, Vec3};
use super::r#match::{MatchManager, TimerEvent};
use super::scheduler::TimerId;

/// A live projectile fired by a player
#[derive(Debug, Clone)]
pub struct Projectile {
    pub shooter: PlayerId,
    pub damage: f32,
    /// Muzzle position, used for falloff when the shooter is gone
    pub origin: Vec3,
    pub spawned_at: u64,
    pub(crate) expiry: TimerId,
}

/// Rotation that turns a marker's +Y face toward `normal`
pub fn marker_rotation(normal: Vec3) -> Quat {
    const AXES: [(Vec3, Quat); 6] = [
        (Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY),
        (Vec3::new(0.0, -1.0, 0.0), Quat { x: 1.0, y: 0.0, z: 0.0, w: 0.0 }),
        (Vec3::new(1.0, 0.0, 0.0), Quat { x: 0.0, y: 0.0, z: -FRAC_1_SQRT_2, w: FRAC_1_SQRT_2 }),
        (Vec3::new(-1.0, 0.0, 0.0), Quat { x: 0.0, y: 0.0, z: FRAC_1_SQRT_2, w: FRAC_1_SQRT_2 }),
        (Vec3::new(0.0, 0.0, 1.0), Quat { x: FRAC_1_SQRT_2, y: 0.0, z: 0.0, w: FRAC_1_SQRT_2 }),
        (Vec3::new(0.0, 0.0, -1.0), Quat { x: -FRAC_1_SQRT_2, y: 0.0, z: 0.0, w: FRAC_1_SQRT_2 }),
    ];

    let n = normal.normalize_or_zero();
    if n == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    if let Some((_, rotation)) = AXES.iter().find(|(axis, _)| axis.dot(n) > 1.0 - 1e-6) {
        return *rotation;
    }

    // Shortest arc from +Y
    let angle = Vec3::UP.dot(n).clamp(-1.0, 1.0).acos();
    let axis = Vec3::UP.cross(n);
    if axis.length() <= f32::EPSILON {
        // Nearly antiparallel: any horizontal axis gives a half turn
        return Quat::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), PI);
    }
    Quat::from_axis_angle(axis, angle)
}

impl<H: Host> MatchManager<H> {
    pub(crate) fn register_projectile(
        &mut self,
        entity: EntityId,
        shooter: PlayerId,
        damage: f32,
        origin: Vec3,
        lifetime_ms: u64,
    ) {
        let expiry = self
            .timers
            .schedule(self.now + lifetime_ms, TimerEvent::ProjectileExpire { entity });
        self.projectiles.insert(
            entity,
            Projectile {
                shooter,
                damage,
                origin,
                spawned_at: self.now,
                expiry,
            },
        );
    }

    /// Projectile touched another entity
    pub fn projectile_hit_entity(&mut self, entity: EntityId, position: Vec3, other: CollisionTarget) {
        let Some(projectile) = self.projectiles.get(&entity) else {
            return;
        };
        let projectile = projectile.clone();

        let victim = match other {
            CollisionTarget::Projectile { .. } => return,
            CollisionTarget::Player { player_id } if player_id == projectile.shooter => return,
            CollisionTarget::Player { player_id } => Some(player_id),
            CollisionTarget::Other { .. } => None,
        };

        self.remove_projectile(entity);

        let Some(victim) = victim else {
            return;
        };
        let from = self
            .host
            .avatar_position(projectile.shooter)
            .unwrap_or(projectile.origin);
        let distance = from.distance(position);
        let damage = CombatSystem::calculate_damage(projectile.damage, distance, &self.config.falloff);
        let victim_position = self.host.avatar_position(victim).unwrap_or(position);
        let direction = CombatSystem::hit_direction(victim_position, position);

        debug!(
            shooter = %projectile.shooter,
            victim = %victim,
            distance,
            damage,
            flight_ms = self.now.saturating_sub(projectile.spawned_at),
            "Projectile hit"
        );
        self.host.play_sound(Sound::Hit, position);
        self.apply_damage(victim, damage, Some(direction), Some(projectile.shooter));
    }

    /// Projectile struck terrain. Terrain is left intact; a marker shows the
    /// impact for a while.
    pub fn projectile_hit_block(&mut self, entity: EntityId, position: Vec3, normal: Vec3) {
        if !self.remove_projectile(entity) {
            return;
        }
        match self.host.spawn_marker(position, marker_rotation(normal)) {
            Ok(marker) => {
                self.timers.schedule(
                    self.now + self.config.marker_lifetime_ms,
                    TimerEvent::MarkerExpire { entity: marker },
                );
            }
            Err(e) => warn!(error = %e, "Failed to spawn impact marker"),
        }
    }

    pub(crate) fn on_projectile_expire(&mut self, entity: EntityId) {
        self.remove_projectile(entity);
    }

    /// Forget and despawn a projectile. Returns false if it was already gone,
    /// so each projectile is despawned exactly once.
    fn remove_projectile(&mut self, entity: EntityId) -> bool {
        let Some(projectile) = self.projectiles.remove(&entity) else {
            return false;
        };
        self.timers.cancel(projectile.expiry);
        self.host.despawn(entity);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::testing::active_match;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!(a.distance(b) < 1e-5, "{a:?} != {b:?}");
    }

    #[test]
    fn marker_faces_every_axis_normal() {
        for normal in [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::UP,
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ] {
            assert_close(marker_rotation(normal).rotate(Vec3::UP), normal);
        }
        assert_eq!(marker_rotation(Vec3::UP), Quat::IDENTITY);
    }

    #[test]
    fn marker_follows_oblique_normals() {
        let normal = Vec3::new(1.0, 1.0, 0.0).normalize_or_zero();
        assert_close(marker_rotation(normal).rotate(Vec3::UP), normal);
        let normal = Vec3::new(0.3, -0.2, -0.9).normalize_or_zero();
        assert_close(marker_rotation(normal).rotate(Vec3::UP), normal);
    }

    #[test]
    fn projectile_is_despawned_exactly_once() {
        let (mut m, a, b) = active_match();
        m.trigger(a);
        let (entity, _) = m.host().projectiles[0].clone();

        m.projectile_hit_entity(entity, Vec3::ZERO, CollisionTarget::Player { player_id: b });
        m.projectile_hit_block(entity, Vec3::ZERO, Vec3::UP);
        let now = m.now();
        m.advance_to(now + 10_000);

        let despawns = m.host().despawned.iter().filter(|e| **e == entity).count();
        assert_eq!(despawns, 1);
        assert!(m.host().markers.is_empty());
    }

    #[test]
    fn shooter_and_other_projectiles_are_ignored() {
        let (mut m, a, _) = active_match();
        m.trigger(a);
        let (entity, _) = m.host().projectiles[0].clone();

        m.projectile_hit_entity(entity, Vec3::ZERO, CollisionTarget::Player { player_id: a });
        m.projectile_hit_entity(
            entity,
            Vec3::ZERO,
            CollisionTarget::Projectile { entity: EntityId(999) },
        );
        assert!(m.projectiles.contains_key(&entity));
        assert_eq!(m.projectiles[&entity].spawned_at, m.now());
        assert_eq!(m.session(a).unwrap().shield(), 100.0);
    }

    #[test]
    fn hit_applies_falloff_from_shooter_position() {
        let (mut m, a, b) = active_match();
        m.host_mut().avatars.insert(a, Vec3::ZERO);
        m.host_mut().avatars.insert(b, Vec3::new(0.0, 0.0, -40.0));
        m.trigger(a);
        let (entity, _) = m.host().projectiles[0].clone();

        m.projectile_hit_entity(
            entity,
            Vec3::new(0.0, 0.0, -40.0),
            CollisionTarget::Player { player_id: b },
        );
        // Pistol 20 at 40 units: 20 * 0.75
        assert_eq!(m.session(b).unwrap().shield(), 85.0);
        let indicator = m.host().ui_for(b).into_iter().find_map(|msg| match msg {
            crate::ws::protocol::UiMessage::DamageIndicator { direction } => Some(*direction),
            _ => None,
        });
        assert!(indicator.is_some());
    }

    #[test]
    fn block_hit_leaves_terrain_and_marker_expires() {
        let (mut m, a, _) = active_match();
        m.trigger(a);
        let (entity, _) = m.host().projectiles[0].clone();

        m.projectile_hit_block(entity, Vec3::new(2.0, 5.0, 2.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(m.host().removed_blocks.is_empty());
        let (marker, _, _) = m.host().markers[0];

        let now = m.now();
        m.advance_to(now + m.config().marker_lifetime_ms);
        assert!(m.host().despawned.contains(&marker));
    }

    #[test]
    fn projectiles_expire_after_lifetime() {
        let (mut m, a, _) = active_match();
        m.trigger(a);
        let (entity, _) = m.host().projectiles[0].clone();
        let now = m.now();
        m.advance_to(now + 2_000);
        assert!(m.projectiles.is_empty());
        assert!(m.host().despawned.contains(&entity));
    }
}
