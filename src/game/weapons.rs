//! Items and weapon state machines - cooldown, clip, reload

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::{AmmoIndicator, SlotView};

use super::host::{EntityId, ItemId, PlayerId};
use super::scheduler::TimerId;

/// Melee tool variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeleeType {
    /// Starting tool - mines terrain, weak against players
    Pickaxe,
    Knife,
}

/// Ranged weapon variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangedType {
    /// Starting sidearm - unlimited reserve
    Pistol,
    Rifle,
    Sniper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumableType {
    Medkit,
    ShieldPotion,
}

/// Melee stats per tool type
#[derive(Debug, Clone, Copy)]
pub struct MeleeStats {
    pub name: &'static str,
    pub model: &'static str,
    pub icon: &'static str,
    /// Damage per hit on a player
    pub damage: f32,
    /// Attacks per second
    pub rate: f32,
    /// Raycast reach
    pub range: f32,
    /// Struck blocks are removed
    pub mines_blocks: bool,
}

impl MeleeStats {
    pub fn for_type(melee_type: MeleeType) -> Self {
        match melee_type {
            MeleeType::Pickaxe => Self {
                name: "Pickaxe",
                model: "models/items/pickaxe.gltf",
                icon: "icons/pickaxe.png",
                damage: 10.0,
                rate: 3.0,
                range: 4.0,
                mines_blocks: true,
            },
            MeleeType::Knife => Self {
                name: "Knife",
                model: "models/items/knife.gltf",
                icon: "icons/knife.png",
                damage: 35.0,
                rate: 2.0,
                range: 3.0,
                mines_blocks: false,
            },
        }
    }
}

/// Weapon stats per ranged type
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    pub name: &'static str,
    pub model: &'static str,
    pub icon: &'static str,
    pub projectile_model: &'static str,
    /// Damage per round
    pub damage: f32,
    /// Shots per second
    pub rate: f32,
    pub clip_size: u32,
    /// Rounds carried beyond the clip; `None` means unlimited
    pub reserve: Option<u32>,
    pub reload_ms: u64,
    pub projectile_speed: f32,
    pub projectile_lifetime_ms: u64,
}

impl WeaponStats {
    pub fn for_type(ranged_type: RangedType) -> Self {
        match ranged_type {
            RangedType::Pistol => Self {
                name: "Pistol",
                model: "models/items/pistol.gltf",
                icon: "icons/pistol.png",
                projectile_model: "models/projectiles/bullet.gltf",
                damage: 20.0,
                rate: 4.0,
                clip_size: 12,
                reserve: None,
                reload_ms: 1200,
                projectile_speed: 80.0,
                projectile_lifetime_ms: 2000,
            },
            RangedType::Rifle => Self {
                name: "Rifle",
                model: "models/items/rifle.gltf",
                icon: "icons/rifle.png",
                projectile_model: "models/projectiles/bullet.gltf",
                damage: 14.0,
                rate: 10.0,
                clip_size: 30,
                reserve: Some(90),
                reload_ms: 2000,
                projectile_speed: 110.0,
                projectile_lifetime_ms: 2000,
            },
            RangedType::Sniper => Self {
                name: "Sniper",
                model: "models/items/sniper.gltf",
                icon: "icons/sniper.png",
                projectile_model: "models/projectiles/slug.gltf",
                damage: 80.0,
                rate: 0.8,
                clip_size: 5,
                reserve: Some(15),
                reload_ms: 2800,
                projectile_speed: 200.0,
                projectile_lifetime_ms: 3000,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsumableStats {
    pub name: &'static str,
    pub model: &'static str,
    pub icon: &'static str,
    pub heal: f32,
    pub shield: f32,
}

impl ConsumableStats {
    pub fn for_type(consumable_type: ConsumableType) -> Self {
        match consumable_type {
            ConsumableType::Medkit => Self {
                name: "Medkit",
                model: "models/items/medkit.gltf",
                icon: "icons/medkit.png",
                heal: 50.0,
                shield: 0.0,
            },
            ConsumableType::ShieldPotion => Self {
                name: "Shield Potion",
                model: "models/items/shield-potion.gltf",
                icon: "icons/shield-potion.png",
                heal: 0.0,
                shield: 50.0,
            },
        }
    }
}

/// Minimum spacing between accepted attacks at `rate` per second
pub fn attack_interval_ms(rate: f32) -> u64 {
    if rate <= 0.0 {
        return u64::MAX;
    }
    (1000.0 / rate).round() as u64
}

fn cooling_down(last: Option<u64>, now: u64, rate: f32) -> bool {
    match last {
        Some(last) => now.saturating_sub(last) < attack_interval_ms(rate),
        None => false,
    }
}

/// Why an attack request was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackRejected {
    Cooldown,
    Reloading,
    EmptyClip,
}

#[derive(Debug, Clone)]
pub struct MeleeWeapon {
    pub melee_type: MeleeType,
    last_attack_at: Option<u64>,
}

impl MeleeWeapon {
    pub fn new(melee_type: MeleeType) -> Self {
        Self {
            melee_type,
            last_attack_at: None,
        }
    }

    pub fn stats(&self) -> MeleeStats {
        MeleeStats::for_type(self.melee_type)
    }

    pub fn try_attack(&mut self, now: u64) -> Result<(), AttackRejected> {
        if cooling_down(self.last_attack_at, now, self.stats().rate) {
            return Err(AttackRejected::Cooldown);
        }
        self.last_attack_at = Some(now);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RangedWeapon {
    pub ranged_type: RangedType,
    ammo: u32,
    /// `None` = unlimited
    reserve: Option<u32>,
    last_fire_at: Option<u64>,
    reload_timer: Option<TimerId>,
}

impl RangedWeapon {
    pub fn new(ranged_type: RangedType) -> Self {
        let stats = WeaponStats::for_type(ranged_type);
        Self {
            ranged_type,
            ammo: stats.clip_size,
            reserve: stats.reserve,
            last_fire_at: None,
            reload_timer: None,
        }
    }

    pub fn stats(&self) -> WeaponStats {
        WeaponStats::for_type(self.ranged_type)
    }

    pub fn ammo(&self) -> u32 {
        self.ammo
    }

    pub fn reserve(&self) -> Option<u32> {
        self.reserve
    }

    pub fn is_reloading(&self) -> bool {
        self.reload_timer.is_some()
    }

    /// Consume one round if the weapon is ready
    pub fn try_fire(&mut self, now: u64) -> Result<(), AttackRejected> {
        if self.is_reloading() {
            return Err(AttackRejected::Reloading);
        }
        if cooling_down(self.last_fire_at, now, self.stats().rate) {
            return Err(AttackRejected::Cooldown);
        }
        if self.ammo == 0 {
            return Err(AttackRejected::EmptyClip);
        }
        self.ammo -= 1;
        self.last_fire_at = Some(now);
        Ok(())
    }

    /// A reload would add rounds and none is running
    pub fn can_reload(&self) -> bool {
        !self.is_reloading()
            && self.ammo < self.stats().clip_size
            && self.reserve.map_or(true, |r| r > 0)
    }

    pub fn begin_reload(&mut self, timer: TimerId) {
        self.reload_timer = Some(timer);
    }

    /// Abandon a running reload (weapon dropped or stowed); returns its timer
    pub fn abort_reload(&mut self) -> Option<TimerId> {
        self.reload_timer.take()
    }

    /// Complete the reload started with `timer`. Returns false for a stale
    /// timer. The clip is refilled in one step.
    pub fn finish_reload(&mut self, timer: TimerId) -> bool {
        if self.reload_timer != Some(timer) {
            return false;
        }
        self.reload_timer = None;
        let missing = self.stats().clip_size.saturating_sub(self.ammo);
        let loaded = match self.reserve.as_mut() {
            None => missing,
            Some(reserve) => {
                let loaded = missing.min(*reserve);
                *reserve -= loaded;
                loaded
            }
        };
        self.ammo += loaded;
        true
    }

    /// Full clip and reserve, any reload abandoned
    pub fn refill(&mut self) -> Option<TimerId> {
        let stats = self.stats();
        self.ammo = stats.clip_size;
        self.reserve = stats.reserve;
        self.reload_timer.take()
    }

    pub fn ammo_indicator(&self) -> AmmoIndicator {
        AmmoIndicator {
            show: true,
            ammo: Some(self.ammo),
            reserve: self.reserve,
            is_infinite: self.reserve.is_none(),
            reloading: self.is_reloading(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Consumable {
    pub consumable_type: ConsumableType,
    pub quantity: u32,
}

impl Consumable {
    pub fn stats(&self) -> ConsumableStats {
        ConsumableStats::for_type(self.consumable_type)
    }
}

/// Closed set of item behaviours
#[derive(Debug, Clone)]
pub enum ItemKind {
    Melee(MeleeWeapon),
    Ranged(RangedWeapon),
    Consumable(Consumable),
}

/// Who currently holds an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemHolder {
    /// Not yet placed (just created)
    Nobody,
    Player(PlayerId),
    /// Lying in the world as a host entity
    World(EntityId),
}

#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    pub droppable: bool,
    pub holder: ItemHolder,
}

impl Item {
    pub fn new(kind: ItemKind, droppable: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            droppable,
            holder: ItemHolder::Nobody,
        }
    }

    pub fn melee(melee_type: MeleeType, droppable: bool) -> Self {
        Self::new(ItemKind::Melee(MeleeWeapon::new(melee_type)), droppable)
    }

    pub fn ranged(ranged_type: RangedType, droppable: bool) -> Self {
        Self::new(ItemKind::Ranged(RangedWeapon::new(ranged_type)), droppable)
    }

    pub fn consumable(consumable_type: ConsumableType, quantity: u32) -> Self {
        Self::new(
            ItemKind::Consumable(Consumable {
                consumable_type,
                quantity,
            }),
            true,
        )
    }

    pub fn name(&self) -> &'static str {
        match &self.kind {
            ItemKind::Melee(m) => m.stats().name,
            ItemKind::Ranged(r) => r.stats().name,
            ItemKind::Consumable(c) => c.stats().name,
        }
    }

    pub fn model(&self) -> &'static str {
        match &self.kind {
            ItemKind::Melee(m) => m.stats().model,
            ItemKind::Ranged(r) => r.stats().model,
            ItemKind::Consumable(c) => c.stats().model,
        }
    }

    pub fn slot_view(&self) -> SlotView {
        let (icon, quantity, is_infinite) = match &self.kind {
            ItemKind::Melee(m) => (m.stats().icon, None, true),
            ItemKind::Ranged(r) => (r.stats().icon, r.reserve().map(|reserve| reserve + r.ammo()), r.reserve().is_none()),
            ItemKind::Consumable(c) => (c.stats().icon, Some(c.quantity), false),
        };
        SlotView {
            name: self.name().to_string(),
            icon_uri: icon.to_string(),
            quantity,
            is_infinite,
        }
    }

    pub fn ammo_indicator(&self) -> AmmoIndicator {
        match &self.kind {
            ItemKind::Ranged(r) => r.ammo_indicator(),
            ItemKind::Melee(_) | ItemKind::Consumable(_) => AmmoIndicator::hidden(),
        }
    }

    pub fn as_ranged(&self) -> Option<&RangedWeapon> {
        match &self.kind {
            ItemKind::Ranged(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_ranged_mut(&mut self) -> Option<&mut RangedWeapon> {
        match &mut self.kind {
            ItemKind::Ranged(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::scheduler::Scheduler;

    #[test]
    fn fire_respects_rate() {
        let mut rifle = RangedWeapon::new(RangedType::Rifle);
        assert_eq!(attack_interval_ms(10.0), 100);
        assert!(rifle.try_fire(1000).is_ok());
        assert_eq!(rifle.try_fire(1050), Err(AttackRejected::Cooldown));
        assert!(rifle.try_fire(1100).is_ok());
        assert_eq!(rifle.ammo(), 28);
    }

    #[test]
    fn empty_clip_rejects_fire() {
        let mut sniper = RangedWeapon::new(RangedType::Sniper);
        let interval = attack_interval_ms(sniper.stats().rate);
        for shot in 0..5 {
            assert!(sniper.try_fire(shot * interval).is_ok());
        }
        assert_eq!(sniper.try_fire(10 * interval), Err(AttackRejected::EmptyClip));
    }

    #[test]
    fn reload_blocks_fire_and_refills_from_reserve() {
        let mut timers = Scheduler::<()>::new();
        let mut sniper = RangedWeapon::new(RangedType::Sniper);
        sniper.try_fire(0).unwrap();
        sniper.try_fire(5000).unwrap();
        assert!(sniper.can_reload());

        let timer = timers.schedule(10_000, ());
        sniper.begin_reload(timer);
        assert_eq!(sniper.try_fire(20_000), Err(AttackRejected::Reloading));
        assert!(!sniper.can_reload());

        assert!(sniper.finish_reload(timer));
        assert_eq!(sniper.ammo(), 5);
        assert_eq!(sniper.reserve(), Some(13));
        assert!(!sniper.finish_reload(timer));
    }

    #[test]
    fn reserve_limits_reload() {
        let mut timers = Scheduler::<()>::new();
        let mut sniper = RangedWeapon::new(RangedType::Sniper);
        sniper.reserve = Some(2);
        sniper.ammo = 0;
        let timer = timers.schedule(0, ());
        sniper.begin_reload(timer);
        sniper.finish_reload(timer);
        assert_eq!(sniper.ammo(), 2);
        assert_eq!(sniper.reserve(), Some(0));
        assert!(!sniper.can_reload());
    }

    #[test]
    fn pistol_reload_never_consumes_reserve() {
        let mut timers = Scheduler::<()>::new();
        let mut pistol = RangedWeapon::new(RangedType::Pistol);
        pistol.ammo = 0;
        let timer = timers.schedule(0, ());
        pistol.begin_reload(timer);
        pistol.finish_reload(timer);
        assert_eq!(pistol.ammo(), 12);
        assert_eq!(pistol.reserve(), None);
        let indicator = pistol.ammo_indicator();
        assert!(indicator.is_infinite && indicator.reserve.is_none());
    }

    #[test]
    fn stale_reload_timer_is_ignored() {
        let mut timers = Scheduler::<()>::new();
        let mut pistol = RangedWeapon::new(RangedType::Pistol);
        pistol.ammo = 3;
        let first = timers.schedule(0, ());
        pistol.begin_reload(first);
        assert_eq!(pistol.abort_reload(), Some(first));
        assert!(!pistol.finish_reload(first));
        assert_eq!(pistol.ammo(), 3);
    }

    #[test]
    fn melee_cooldown() {
        let mut knife = MeleeWeapon::new(MeleeType::Knife);
        assert!(knife.try_attack(0).is_ok());
        assert_eq!(knife.try_attack(499), Err(AttackRejected::Cooldown));
        assert!(knife.try_attack(500).is_ok());
    }

    #[test]
    fn slot_view_marks_unlimited_weapons() {
        let pistol = Item::ranged(RangedType::Pistol, false);
        let view = pistol.slot_view();
        assert_eq!(view.name, "Pistol");
        assert!(view.is_infinite);
        assert_eq!(view.quantity, None);

        let medkit = Item::consumable(ConsumableType::Medkit, 2);
        assert_eq!(medkit.slot_view().quantity, Some(2));
        assert!(!medkit.ammo_indicator().show);
    }
}
