//! Player sessions - vitals, loadout, death and respawn

use tracing::{debug, info, warn};

use crate::ws::protocol::{AmmoIndicator, SlotView, UiMessage};

use super::combat::CombatSystem;
use super::host::{CameraMode, Host, ItemId, PlayerId, Vec3};
use super::inventory::{Inventory, MELEE_SLOT, STARTING_WEAPON_SLOT};
use super::r#match::{MatchManager, MatchPhase, TimerEvent};
use super::progression::{PlayerProgress, Progression};
use super::scheduler::TimerId;
use super::weapons::{Item, ItemHolder, ItemKind, MeleeType, RangedType};

/// Per-player state for the lifetime of a connection
#[derive(Debug)]
pub struct PlayerSession {
    pub(crate) id: PlayerId,
    pub(crate) username: String,
    pub(crate) health: f32,
    pub(crate) shield: f32,
    pub(crate) alive: bool,
    /// Bumped on every death; respawn timers carry the value they were
    /// scheduled for
    pub(crate) life: u32,
    pub(crate) progression: Progression,
    pub(crate) inventory: Inventory,
    pub(crate) last_damaged_at: Option<u64>,
    pub(crate) respawn_timer: Option<TimerId>,
}

impl PlayerSession {
    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn shield(&self) -> f32 {
        self.shield
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn life(&self) -> u32 {
        self.life
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn total_exp(&self) -> u64 {
        self.progression.total_exp()
    }

    pub fn rank_index(&self) -> usize {
        self.progression.rank_index()
    }
}

impl<H: Host> MatchManager<H> {
    /// Admit a player whose progress has been loaded
    pub fn player_joined(&mut self, player_id: PlayerId, username: String, progress: PlayerProgress) {
        if self.sessions.contains_key(&player_id) {
            warn!(player_id = %player_id, "Duplicate join ignored");
            return;
        }

        let spawn = self.random_spawn_point();
        if let Err(e) = self.host.spawn_avatar(player_id, spawn) {
            warn!(player_id = %player_id, error = %e, "Failed to spawn avatar");
        }

        let session = PlayerSession {
            id: player_id,
            username: username.clone(),
            health: self.config.max_health,
            shield: self.config.max_shield,
            alive: true,
            life: 0,
            progression: Progression::new(progress, &self.rank_thresholds),
            inventory: Inventory::new(self.config.inventory_slots),
            last_damaged_at: None,
            respawn_timer: None,
        };
        self.sessions.insert(player_id, session);

        self.grant(player_id, MELEE_SLOT, Item::melee(MeleeType::Pickaxe, false));
        self.grant(player_id, STARTING_WEAPON_SLOT, Item::ranged(RangedType::Pistol, false));
        if let Some(session) = self.sessions.get_mut(&player_id) {
            session.inventory.select(STARTING_WEAPON_SLOT);
        }
        self.equip_active(player_id);

        self.timers.schedule(
            self.now + self.config.heal_interval_ms,
            TimerEvent::AutoHeal { player_id },
        );
        self.timers.schedule(
            self.now + self.config.out_of_bounds_check_ms,
            TimerEvent::OutOfBoundsCheck { player_id },
        );

        let ranks = self.config.ranks.clone();
        self.host.send_ui(player_id, UiMessage::Ranks { ranks });
        self.send_exp(player_id);
        self.send_vitals(player_id);
        self.send_loadout(player_id);
        self.sync_match_state(player_id);

        info!(
            player_id = %player_id,
            username = %username,
            total_exp = progress.total_exp,
            players = self.sessions.len(),
            "Player joined"
        );

        let count = self.sessions.len();
        self.broadcast(UiMessage::PlayersCount { count });
        self.on_session_joined();
    }

    pub fn player_left(&mut self, player_id: PlayerId) {
        let Some(mut session) = self.sessions.remove(&player_id) else {
            return;
        };
        self.cancel_player_timers(player_id);

        for item_id in session.inventory.items().collect::<Vec<_>>() {
            if let Some(mut item) = self.items.remove(&item_id) {
                if let Some(timer) = item.as_ranged_mut().and_then(|r| r.abort_reload()) {
                    self.timers.cancel(timer);
                }
            }
        }

        if session.progression.has_unsaved() {
            session.progression.mark_saved();
            self.progress.persist(player_id, session.progression.record());
        }

        info!(
            player_id = %player_id,
            username = %session.username,
            players = self.sessions.len(),
            "Player left"
        );

        let count = self.sessions.len();
        self.broadcast(UiMessage::PlayersCount { count });
        self.on_session_left();
    }

    // ------------------------------------------------------------------
    // Damage, death, respawn
    // ------------------------------------------------------------------

    /// Apply `amount` damage, shield first. `direction` points from the victim
    /// toward the source of the hit.
    pub fn apply_damage(
        &mut self,
        victim: PlayerId,
        amount: f32,
        direction: Option<Vec3>,
        attacker: Option<PlayerId>,
    ) {
        if self.phase != MatchPhase::Active || amount <= 0.0 {
            return;
        }
        let now = self.now;
        let Some(session) = self.sessions.get_mut(&victim) else {
            return;
        };
        if !session.alive {
            return;
        }

        let outcome = CombatSystem::apply_damage(session.health, session.shield, amount);
        session.health = outcome.health;
        session.shield = outcome.shield;
        session.last_damaged_at = Some(now);

        debug!(
            victim = %victim,
            amount,
            absorbed = outcome.absorbed,
            health = outcome.health,
            "Damage applied"
        );

        self.send_vitals(victim);
        if let Some(direction) = direction {
            self.host
                .send_ui(victim, UiMessage::DamageIndicator { direction });
        }
        if let Some(attacker) = attacker.filter(|a| *a != victim && self.sessions.contains_key(a)) {
            self.host
                .send_ui(attacker, UiMessage::ShowDamage { damage: amount });
        }

        self.check_death(victim, attacker);
    }

    fn check_death(&mut self, victim: PlayerId, attacker: Option<PlayerId>) {
        let Some(session) = self.sessions.get_mut(&victim) else {
            return;
        };
        if session.health > 0.0 || !session.alive {
            return;
        }
        session.alive = false;
        session.life += 1;
        let life = session.life;
        let victim_name = session.username.clone();

        let position = self.host.avatar_position(victim);
        self.drop_droppable_items(victim, position);

        let credited = attacker.filter(|a| {
            *a != victim && self.sessions.get(a).map_or(false, |s| s.alive)
        });

        match credited {
            Some(killer) => {
                let killer_name = self
                    .sessions
                    .get(&killer)
                    .map(|s| s.username.clone())
                    .unwrap_or_default();
                self.record_kill(killer);
                self.add_experience(killer, self.config.kill_exp);
                self.host
                    .set_camera(victim, CameraMode::Spectate { target: killer });
                self.host.set_camera(killer, CameraMode::FirstPerson);
                self.host
                    .send_chat(None, &format!("{killer_name} eliminated {victim_name}"));
                info!(victim = %victim, killer = %killer, "Player eliminated");
            }
            None if attacker == Some(victim) => {
                self.host.set_camera(victim, CameraMode::Death);
                self.host
                    .send_chat(None, &format!("{victim_name} eliminated themselves"));
                info!(victim = %victim, "Player eliminated themselves");
            }
            None => {
                self.host.set_camera(victim, CameraMode::Death);
                self.host
                    .send_chat(None, &format!("{victim_name} was eliminated"));
                info!(victim = %victim, "Player eliminated");
            }
        }

        let timer = self.timers.schedule(
            self.now + self.config.respawn_delay_ms,
            TimerEvent::Respawn {
                player_id: victim,
                life,
            },
        );
        if let Some(session) = self.sessions.get_mut(&victim) {
            session.respawn_timer = Some(timer);
        }
    }

    /// Respawn timer body. Ignored unless `life` is still the session's
    /// current life and the session is dead.
    pub(crate) fn respawn(&mut self, player_id: PlayerId, life: u32) {
        let Some(session) = self.sessions.get_mut(&player_id) else {
            return;
        };
        if session.life != life || session.alive {
            return;
        }
        session.alive = true;
        session.health = self.config.max_health;
        session.shield = self.config.max_shield;
        session.last_damaged_at = None;
        session.respawn_timer = None;

        let spawn = self.random_spawn_point();
        if let Err(e) = self.host.teleport(player_id, spawn) {
            warn!(player_id = %player_id, error = %e, "Failed to teleport respawning player");
        }
        self.restore_starting_weapon(player_id);
        self.host.set_camera(player_id, CameraMode::FirstPerson);

        self.send_vitals(player_id);
        self.send_loadout(player_id);
        info!(player_id = %player_id, "Player respawned");
    }

    /// Refill the weapon in the starting slot, or grant a new sidearm if the
    /// slot is empty
    fn restore_starting_weapon(&mut self, player_id: PlayerId) {
        let Some(session) = self.sessions.get(&player_id) else {
            return;
        };
        match session.inventory.get(STARTING_WEAPON_SLOT) {
            Some(item_id) => {
                let aborted = self
                    .items
                    .get_mut(&item_id)
                    .and_then(Item::as_ranged_mut)
                    .and_then(|r| r.refill());
                if let Some(timer) = aborted {
                    self.timers.cancel(timer);
                }
            }
            None => {
                self.grant(
                    player_id,
                    STARTING_WEAPON_SLOT,
                    Item::ranged(RangedType::Pistol, false),
                );
                let active = self
                    .sessions
                    .get(&player_id)
                    .map(|s| s.inventory.active_slot());
                if active == Some(STARTING_WEAPON_SLOT) {
                    self.equip_active(player_id);
                }
            }
        }
    }

    /// Fresh loadout and full vitals at the start of a round
    pub(crate) fn reset_for_round(&mut self, player_id: PlayerId) {
        self.unequip_active(player_id);

        let Some(session) = self.sessions.get_mut(&player_id) else {
            return;
        };
        let held: Vec<ItemId> = session.inventory.items().collect();
        let mut has_melee = false;
        for item_id in held {
            let keep = match self.items.get(&item_id) {
                Some(item) => !item.droppable && matches!(item.kind, ItemKind::Melee(_)),
                None => false,
            };
            if keep && session.inventory.slot_of(item_id) == Some(MELEE_SLOT) {
                has_melee = true;
                continue;
            }
            session.inventory.remove(item_id);
            if let Some(mut item) = self.items.remove(&item_id) {
                if let Some(timer) = item.as_ranged_mut().and_then(|r| r.abort_reload()) {
                    self.timers.cancel(timer);
                }
            }
        }

        session.alive = true;
        session.life += 1;
        session.health = self.config.max_health;
        session.shield = self.config.max_shield;
        session.last_damaged_at = None;
        self.timers.cancel_slot(&mut session.respawn_timer);
        session.inventory.select(STARTING_WEAPON_SLOT);

        if !has_melee {
            self.grant(player_id, MELEE_SLOT, Item::melee(MeleeType::Pickaxe, false));
        }
        self.grant(
            player_id,
            STARTING_WEAPON_SLOT,
            Item::ranged(RangedType::Pistol, false),
        );

        let spawn = self.random_spawn_point();
        if let Err(e) = self.host.teleport(player_id, spawn) {
            warn!(player_id = %player_id, error = %e, "Failed to move player to round spawn");
        }
        self.equip_active(player_id);
        self.host.set_camera(player_id, CameraMode::FirstPerson);

        self.send_vitals(player_id);
        self.send_loadout(player_id);
    }

    // ------------------------------------------------------------------
    // Experience
    // ------------------------------------------------------------------

    pub fn add_experience(&mut self, player_id: PlayerId, amount: u64) {
        let Some(session) = self.sessions.get_mut(&player_id) else {
            return;
        };
        let gain = session.progression.add(
            amount,
            &self.rank_thresholds,
            self.config.exp_save_interval,
        );
        if gain.should_persist {
            self.progress
                .persist(player_id, session.progression.record());
        }
        if gain.ranked_up {
            if let Some(rank) = self.config.ranks.get(gain.rank_index) {
                let text = format!("{} ranked up to {}!", session.username, rank.name);
                info!(player_id = %player_id, rank = %rank.name, "Rank up");
                self.host.send_chat(None, &text);
            }
        }
        self.send_exp(player_id);
    }

    // ------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------

    /// Switch the active slot. Stowing a weapon cancels its reload.
    pub fn select_slot(&mut self, player_id: PlayerId, index: usize) {
        let Some(session) = self.sessions.get_mut(&player_id) else {
            return;
        };
        let Some(change) = session.inventory.select(index) else {
            debug!(player_id = %player_id, index, "Slot select ignored");
            return;
        };

        if let Some(previous) = change.previous {
            self.stow(previous);
            self.host.unequip(player_id, previous);
        }
        self.equip_active(player_id);

        self.host
            .send_ui(player_id, UiMessage::InventoryActiveSlot { index });
        self.send_ammo(player_id);
    }

    /// Place an item into the player's inventory. Returns false when there is
    /// no slot for it.
    pub fn add_item(&mut self, player_id: PlayerId, item_id: ItemId) -> bool {
        let Some(session) = self.sessions.get(&player_id) else {
            return false;
        };
        let items = &self.items;
        let placement = session
            .inventory
            .find_slot(|id| items.get(&id).map_or(false, |i| i.droppable));
        let Some(placement) = placement else {
            self.host
                .send_chat(Some(player_id), "No room in your inventory");
            return false;
        };
        let active_slot = session.inventory.active_slot();

        if let Some(displaced) = placement.displaced {
            let position = self.host.avatar_position(player_id);
            self.drop_from_inventory(player_id, displaced, position);
        }

        if let Some(session) = self.sessions.get_mut(&player_id) {
            session.inventory.put(placement.slot, item_id);
        }
        if let Some(item) = self.items.get_mut(&item_id) {
            item.holder = ItemHolder::Player(player_id);
        }
        if placement.slot == active_slot {
            self.equip_active(player_id);
            self.send_ammo(player_id);
        }
        self.send_inventory(player_id);
        true
    }

    /// Pick up an item lying in the world
    pub fn pickup_item(&mut self, player_id: PlayerId, item_id: ItemId) {
        if !self.sessions.get(&player_id).map_or(false, |s| s.alive) {
            return;
        }
        let Some(ItemHolder::World(entity)) = self.items.get(&item_id).map(|i| i.holder) else {
            debug!(player_id = %player_id, item_id = %item_id, "Item is not on the ground");
            return;
        };
        if self.add_item(player_id, item_id) {
            self.host.despawn(entity);
            debug!(player_id = %player_id, item_id = %item_id, "Item picked up");
        }
    }

    /// Drop the active item at the player's feet
    pub fn drop_active(&mut self, player_id: PlayerId) {
        let Some(session) = self.sessions.get(&player_id) else {
            return;
        };
        if !session.alive {
            return;
        }
        if session.inventory.active_slot() == MELEE_SLOT {
            self.host
                .send_chat(Some(player_id), "You cannot drop your melee tool");
            return;
        }
        let Some(item_id) = session.inventory.active_item() else {
            return;
        };
        if !self.items.get(&item_id).map_or(false, |i| i.droppable) {
            return;
        }
        let Some(position) = self.host.avatar_position(player_id) else {
            warn!(player_id = %player_id, "Cannot drop item without an avatar");
            return;
        };

        self.drop_from_inventory(player_id, item_id, Some(position));
        self.send_inventory(player_id);
        self.send_ammo(player_id);
    }

    /// Drop everything droppable, used on death
    fn drop_droppable_items(&mut self, player_id: PlayerId, position: Option<Vec3>) {
        let Some(session) = self.sessions.get(&player_id) else {
            return;
        };
        let droppable: Vec<ItemId> = session
            .inventory
            .items()
            .filter(|id| self.items.get(id).map_or(false, |i| i.droppable))
            .collect();
        if droppable.is_empty() {
            return;
        }
        for item_id in droppable {
            self.drop_from_inventory(player_id, item_id, position);
        }
        self.send_inventory(player_id);
        self.send_ammo(player_id);
    }

    /// Take an item out of a player's inventory and put it on the ground.
    /// Without a position the item is discarded.
    fn drop_from_inventory(&mut self, player_id: PlayerId, item_id: ItemId, position: Option<Vec3>) {
        let Some(session) = self.sessions.get_mut(&player_id) else {
            return;
        };
        let was_active = session.inventory.active_item() == Some(item_id);
        session.inventory.remove(item_id);
        if was_active {
            self.host.unequip(player_id, item_id);
        }
        self.stow(item_id);

        match position {
            Some(position) => self.drop_into_world(item_id, position),
            None => {
                warn!(player_id = %player_id, item_id = %item_id, "No drop position, item discarded");
                self.items.remove(&item_id);
            }
        }
    }

    /// Cancel a running reload on an item leaving the player's hands
    fn stow(&mut self, item_id: ItemId) {
        let aborted = self
            .items
            .get_mut(&item_id)
            .and_then(Item::as_ranged_mut)
            .and_then(|r| r.abort_reload());
        if let Some(timer) = aborted {
            self.timers.cancel(timer);
        }
    }

    /// Register a new item and put it in a specific slot
    fn grant(&mut self, player_id: PlayerId, slot: usize, mut item: Item) {
        let Some(session) = self.sessions.get_mut(&player_id) else {
            return;
        };
        item.holder = ItemHolder::Player(player_id);
        let item_id = item.id;
        self.items.insert(item_id, item);
        if let Some(replaced) = session.inventory.put(slot, item_id) {
            self.items.remove(&replaced);
        }
    }

    pub(crate) fn equip_active(&mut self, player_id: PlayerId) {
        let active = self
            .sessions
            .get(&player_id)
            .and_then(|s| s.inventory.active_item())
            .and_then(|id| self.items.get(&id))
            .map(|item| (item.id, item.model()));
        if let Some((item_id, model)) = active {
            self.host.equip(player_id, item_id, model);
        }
    }

    fn unequip_active(&mut self, player_id: PlayerId) {
        if let Some(item_id) = self
            .sessions
            .get(&player_id)
            .and_then(|s| s.inventory.active_item())
        {
            self.host.unequip(player_id, item_id);
        }
    }

    // ------------------------------------------------------------------
    // Periodic checks
    // ------------------------------------------------------------------

    pub(crate) fn on_auto_heal(&mut self, player_id: PlayerId) {
        let now = self.now;
        let Some(session) = self.sessions.get_mut(&player_id) else {
            return;
        };
        self.timers.schedule(
            now + self.config.heal_interval_ms,
            TimerEvent::AutoHeal { player_id },
        );

        let rested = session
            .last_damaged_at
            .map_or(true, |at| now.saturating_sub(at) >= self.config.heal_delay_ms);
        if !session.alive || !rested || session.health >= self.config.max_health {
            return;
        }
        session.health = (session.health + self.config.heal_amount).min(self.config.max_health);
        let health = session.health;
        self.host.send_ui(
            player_id,
            UiMessage::Health {
                health,
                max_health: self.config.max_health,
            },
        );
    }

    pub(crate) fn on_out_of_bounds_check(&mut self, player_id: PlayerId) {
        let Some(session) = self.sessions.get(&player_id) else {
            return;
        };
        self.timers.schedule(
            self.now + self.config.out_of_bounds_check_ms,
            TimerEvent::OutOfBoundsCheck { player_id },
        );
        if !session.alive {
            return;
        }
        let Some(position) = self.host.avatar_position(player_id) else {
            return;
        };
        if position.y >= self.config.kill_plane_y {
            return;
        }

        info!(player_id = %player_id, y = position.y, "Player fell out of the world");
        if self.phase == MatchPhase::Active {
            let lethal = session.health + session.shield;
            self.apply_damage(player_id, lethal, None, Some(player_id));
        } else {
            let spawn = self.random_spawn_point();
            if let Err(e) = self.host.teleport(player_id, spawn) {
                warn!(player_id = %player_id, error = %e, "Failed to rescue fallen player");
            }
        }
    }

    // ------------------------------------------------------------------
    // UI
    // ------------------------------------------------------------------

    pub(crate) fn send_vitals(&mut self, player_id: PlayerId) {
        let Some(session) = self.sessions.get(&player_id) else {
            return;
        };
        let (health, shield) = (session.health, session.shield);
        self.host.send_ui(
            player_id,
            UiMessage::Health {
                health,
                max_health: self.config.max_health,
            },
        );
        self.host.send_ui(
            player_id,
            UiMessage::Shield {
                shield,
                max_shield: self.config.max_shield,
            },
        );
    }

    fn send_exp(&mut self, player_id: PlayerId) {
        let Some(session) = self.sessions.get(&player_id) else {
            return;
        };
        let message = UiMessage::ExpUpdate {
            total_exp: session.progression.total_exp(),
            rank_index: session.progression.rank_index(),
        };
        self.host.send_ui(player_id, message);
    }

    pub(crate) fn send_inventory(&mut self, player_id: PlayerId) {
        let Some(session) = self.sessions.get(&player_id) else {
            return;
        };
        let slots: Vec<Option<SlotView>> = session
            .inventory
            .slots()
            .iter()
            .map(|slot| slot.and_then(|id| self.items.get(&id)).map(Item::slot_view))
            .collect();
        self.host.send_ui(player_id, UiMessage::Inventory { slots });
    }

    pub(crate) fn send_ammo(&mut self, player_id: PlayerId) {
        let Some(session) = self.sessions.get(&player_id) else {
            return;
        };
        let indicator = session
            .inventory
            .active_item()
            .and_then(|id| self.items.get(&id))
            .map_or_else(AmmoIndicator::hidden, Item::ammo_indicator);
        self.host
            .send_ui(player_id, UiMessage::AmmoIndicator(indicator));
    }

    /// Inventory, active slot and ammo in one go
    fn send_loadout(&mut self, player_id: PlayerId) {
        let Some(index) = self
            .sessions
            .get(&player_id)
            .map(|s| s.inventory.active_slot())
        else {
            return;
        };
        self.send_inventory(player_id);
        self.host
            .send_ui(player_id, UiMessage::InventoryActiveSlot { index });
        self.send_ammo(player_id);
    }
}
