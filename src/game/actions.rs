//! Player actions - trigger, reload, melee swings and consumables

use tracing::{debug, warn};

use super::combat::CombatSystem;
use super::host::{HitTarget, Host, ItemId, PlayerId, ProjectileSpawn, Sound};
use super::r#match::{MatchManager, TimerEvent};
use super::scheduler::TimerId;
use super::weapons::{AttackRejected, ItemHolder, ItemKind};

/// Which behaviour the active item has
enum ActiveKind {
    Melee,
    Ranged,
    Consumable,
}

impl<H: Host> MatchManager<H> {
    /// Primary action with whatever the player is holding
    pub fn trigger(&mut self, player_id: PlayerId) {
        let Some(session) = self.sessions.get(&player_id) else {
            return;
        };
        if !session.alive {
            return;
        }
        let Some(item_id) = session.inventory.active_item() else {
            return;
        };
        let kind = match self.items.get(&item_id).map(|i| &i.kind) {
            Some(ItemKind::Melee(_)) => ActiveKind::Melee,
            Some(ItemKind::Ranged(_)) => ActiveKind::Ranged,
            Some(ItemKind::Consumable(_)) => ActiveKind::Consumable,
            None => return,
        };
        match kind {
            ActiveKind::Melee => self.melee(player_id, item_id),
            ActiveKind::Ranged => self.fire(player_id, item_id),
            ActiveKind::Consumable => self.consume(player_id, item_id),
        }
    }

    /// Reload the active weapon
    pub fn reload(&mut self, player_id: PlayerId) {
        let Some(session) = self.sessions.get(&player_id) else {
            return;
        };
        if !session.alive {
            return;
        }
        if let Some(item_id) = session.inventory.active_item() {
            self.start_reload(player_id, item_id);
        }
    }

    fn fire(&mut self, player_id: PlayerId, item_id: ItemId) {
        let Some(aim) = self.host.avatar_aim(player_id) else {
            warn!(player_id = %player_id, "No avatar to fire from");
            return;
        };
        let Some(weapon) = self.items.get_mut(&item_id).and_then(|i| i.as_ranged_mut()) else {
            return;
        };

        match weapon.try_fire(self.now) {
            Ok(()) => {}
            Err(AttackRejected::EmptyClip) => {
                if weapon.can_reload() {
                    self.start_reload(player_id, item_id);
                } else {
                    self.host.play_sound(Sound::DryFire, aim.origin);
                }
                return;
            }
            Err(reason) => {
                debug!(player_id = %player_id, ?reason, "Fire rejected");
                return;
            }
        }

        let stats = weapon.stats();
        let empty = weapon.ammo() == 0;
        let spawn = ProjectileSpawn {
            shooter: player_id,
            origin: aim.origin,
            direction: aim.direction.normalize_or_zero(),
            speed: stats.projectile_speed,
            model: stats.projectile_model.to_string(),
        };
        match self.host.spawn_projectile(spawn) {
            Ok(entity) => self.register_projectile(
                entity,
                player_id,
                stats.damage,
                aim.origin,
                stats.projectile_lifetime_ms,
            ),
            Err(e) => warn!(player_id = %player_id, error = %e, "Failed to spawn projectile"),
        }
        self.host.play_sound(Sound::Fire, aim.origin);

        self.send_ammo(player_id);
        self.send_inventory(player_id);
        if empty {
            self.start_reload(player_id, item_id);
        }
    }

    fn start_reload(&mut self, player_id: PlayerId, item_id: ItemId) {
        let now = self.now;
        let Some(weapon) = self.items.get_mut(&item_id).and_then(|i| i.as_ranged_mut()) else {
            return;
        };
        if !weapon.can_reload() {
            return;
        }
        let timer = self.timers.schedule(
            now + weapon.stats().reload_ms,
            TimerEvent::ReloadComplete { item_id },
        );
        weapon.begin_reload(timer);

        if let Some(position) = self.host.avatar_position(player_id) {
            self.host.play_sound(Sound::Reload, position);
        }
        self.send_ammo(player_id);
    }

    /// Reload timer body. Stale timers (weapon stowed, dropped or refilled
    /// since) are ignored.
    pub(crate) fn on_reload_complete(&mut self, timer: TimerId, item_id: ItemId) {
        let Some(item) = self.items.get_mut(&item_id) else {
            return;
        };
        let holder = item.holder;
        let Some(weapon) = item.as_ranged_mut() else {
            return;
        };
        if !weapon.finish_reload(timer) {
            return;
        }
        if let ItemHolder::Player(player_id) = holder {
            let active = self
                .sessions
                .get(&player_id)
                .and_then(|s| s.inventory.active_item());
            if active == Some(item_id) {
                self.send_ammo(player_id);
            }
            self.send_inventory(player_id);
        }
    }

    fn melee(&mut self, player_id: PlayerId, item_id: ItemId) {
        let Some(weapon) = self.items.get_mut(&item_id).and_then(|i| match &mut i.kind {
            ItemKind::Melee(m) => Some(m),
            _ => None,
        }) else {
            return;
        };
        if let Err(reason) = weapon.try_attack(self.now) {
            debug!(player_id = %player_id, ?reason, "Swing rejected");
            return;
        }
        let stats = weapon.stats();

        let Some(aim) = self.host.avatar_aim(player_id) else {
            return;
        };
        self.host.play_sound(Sound::MeleeSwing, aim.origin);

        let Some(hit) = self.host.raycast(aim, stats.range, Some(player_id)) else {
            return;
        };
        match hit.target {
            HitTarget::Block { coord } if coord.y < 0 => {
                self.host.play_sound(Sound::MeleeDenied, hit.point);
            }
            HitTarget::Block { coord } => {
                if stats.mines_blocks {
                    self.host.remove_block(coord);
                    self.host.play_sound(Sound::BlockBreak, hit.point);
                }
            }
            HitTarget::Player { player_id: victim } if victim != player_id => {
                let victim_position = self.host.avatar_position(victim).unwrap_or(hit.point);
                let direction = CombatSystem::hit_direction(victim_position, aim.origin);
                self.host.play_sound(Sound::Hit, hit.point);
                self.apply_damage(victim, stats.damage, Some(direction), Some(player_id));
            }
            HitTarget::Player { .. } | HitTarget::Entity { .. } => {}
        }
    }

    fn consume(&mut self, player_id: PlayerId, item_id: ItemId) {
        let (max_health, max_shield) = (self.config.max_health, self.config.max_shield);
        let Some(session) = self.sessions.get_mut(&player_id) else {
            return;
        };
        let Some(consumable) = self.items.get_mut(&item_id).and_then(|i| match &mut i.kind {
            ItemKind::Consumable(c) => Some(c),
            _ => None,
        }) else {
            return;
        };
        let stats = consumable.stats();

        let heals = stats.heal > 0.0 && session.health < max_health;
        let shields = stats.shield > 0.0 && session.shield < max_shield;
        if !heals && !shields {
            self.host
                .send_chat(Some(player_id), &format!("You don't need a {} right now", stats.name));
            return;
        }

        session.health = (session.health + stats.heal).min(max_health);
        session.shield = (session.shield + stats.shield).min(max_shield);
        consumable.quantity = consumable.quantity.saturating_sub(1);
        if consumable.quantity == 0 {
            session.inventory.remove(item_id);
            self.items.remove(&item_id);
            self.host.unequip(player_id, item_id);
            self.send_ammo(player_id);
        }

        if let Some(position) = self.host.avatar_position(player_id) {
            self.host.play_sound(Sound::Consume, position);
        }
        self.send_vitals(player_id);
        self.send_inventory(player_id);
    }
}
