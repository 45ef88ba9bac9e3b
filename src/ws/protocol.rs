//! Wire types: client UI messages and the host bridge protocol

use serde::{Deserialize, Serialize};

use crate::config::RankTier;
use crate::game::host::{
    BlockCoord, CameraMode, CollisionTarget, EntityId, ItemId, PlayerId, ProjectileSpawn, Quat,
    RaycastHit, Sound, Vec3,
};

/// Messages sent to a player's UI channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UiMessage {
    PlayersCount {
        count: usize,
    },

    CountdownUpdate {
        seconds: u32,
        show: bool,
    },

    /// Round timing in server milliseconds
    TimerSync {
        started_at: u64,
        ends_at: u64,
    },

    LeaderboardSync {
        kill_counts: Vec<LeaderboardEntry>,
    },

    LeaderboardUpdate {
        username: String,
        kill_count: u32,
    },

    /// `None` when nobody scored a kill
    AnnounceWinner {
        username: Option<String>,
    },

    Health {
        health: f32,
        max_health: f32,
    },

    Shield {
        shield: f32,
        max_shield: f32,
    },

    /// Direction the hit came from, relative to the victim
    DamageIndicator {
        direction: Vec3,
    },

    ShowDamage {
        damage: f32,
    },

    Inventory {
        slots: Vec<Option<SlotView>>,
    },

    InventoryActiveSlot {
        index: usize,
    },

    AmmoIndicator(AmmoIndicator),

    ExpUpdate {
        total_exp: u64,
        rank_index: usize,
    },

    Ranks {
        ranks: Vec<RankTier>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub username: String,
    pub kill_count: u32,
}

/// One inventory slot as the UI renders it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub name: String,
    pub icon_uri: String,
    /// Stack size or remaining rounds; absent when infinite
    pub quantity: Option<u32>,
    pub is_infinite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmmoIndicator {
    pub show: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ammo: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reserve: Option<u32>,
    #[serde(default)]
    pub is_infinite: bool,
    #[serde(default)]
    pub reloading: bool,
}

impl AmmoIndicator {
    pub fn hidden() -> Self {
        Self::default()
    }
}

/// Messages received from a player's UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiInbound {
    InventorySelect { index: usize },
}

/// Events the host runtime streams into the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    PlayerJoined {
        player_id: PlayerId,
        username: String,
    },

    PlayerLeft {
        player_id: PlayerId,
    },

    /// Avatar transform, mirrored for position/aim queries
    AvatarMoved {
        player_id: PlayerId,
        position: Vec3,
        eye: Vec3,
        facing: Vec3,
    },

    /// Primary action; `aim_hit` is the host's short-range raycast along the
    /// avatar's facing
    Trigger {
        player_id: PlayerId,
        #[serde(default)]
        aim_hit: Option<RaycastHit>,
    },

    Reload {
        player_id: PlayerId,
    },

    DropItem {
        player_id: PlayerId,
    },

    ItemPickup {
        player_id: PlayerId,
        item_id: ItemId,
    },

    Ui {
        player_id: PlayerId,
        message: UiInbound,
    },

    ProjectileCollision {
        projectile: EntityId,
        position: Vec3,
        other: CollisionTarget,
    },

    ProjectileBlockHit {
        projectile: EntityId,
        position: Vec3,
        normal: Vec3,
    },
}

/// Side effects the bridge asks the host runtime to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    SpawnAvatar {
        player_id: PlayerId,
        position: Vec3,
    },
    Teleport {
        player_id: PlayerId,
        position: Vec3,
    },
    SetCamera {
        player_id: PlayerId,
        camera: CameraMode,
    },
    RemoveBlock {
        coord: BlockCoord,
    },
    SpawnProjectile {
        entity: EntityId,
        spawn: ProjectileSpawn,
    },
    SpawnMarker {
        entity: EntityId,
        position: Vec3,
        rotation: Quat,
    },
    SpawnDroppedItem {
        entity: EntityId,
        item_id: ItemId,
        model: String,
        position: Vec3,
    },
    Despawn {
        entity: EntityId,
    },
    Equip {
        player_id: PlayerId,
        item_id: ItemId,
        model: String,
    },
    Unequip {
        player_id: PlayerId,
        item_id: ItemId,
    },
    PlaySound {
        sound: Sound,
        position: Vec3,
    },
    Ui {
        player_id: PlayerId,
        message: UiMessage,
    },
    Chat {
        player_id: Option<PlayerId>,
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn ui_messages_use_kebab_case_tags_and_camel_case_fields() {
        let json = serde_json::to_value(UiMessage::TimerSync {
            started_at: 1,
            ends_at: 2,
        })
        .unwrap();
        assert_eq!(json["type"], "timer-sync");
        assert_eq!(json["startedAt"], 1);
        assert_eq!(json["endsAt"], 2);
    }

    #[test]
    fn hidden_ammo_indicator_only_carries_show() {
        let json = serde_json::to_value(UiMessage::AmmoIndicator(AmmoIndicator::hidden())).unwrap();
        assert_eq!(json["type"], "ammo-indicator");
        assert_eq!(json["show"], false);
        assert!(json.get("ammo").is_none());
    }

    #[test]
    fn inbound_inventory_select_parses() {
        let msg: UiInbound = serde_json::from_str(r#"{"type":"inventory-select","index":2}"#).unwrap();
        assert_eq!(msg, UiInbound::InventorySelect { index: 2 });
    }

    #[test]
    fn host_trigger_event_defaults_missing_hit() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"event":"trigger","player_id":"{id}"}}"#);
        let event: HostEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            event,
            HostEvent::Trigger {
                player_id: id,
                aim_hit: None
            }
        );
    }
}
