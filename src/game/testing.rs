//! Test doubles for driving a `MatchManager` without a host runtime

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::protocol::UiMessage;

use super::host::{
    BlockCoord, CameraMode, EntityId, Host, HostError, ItemId, PlayerId, ProjectileSpawn, Quat,
    Ray, RaycastHit, Sound, Vec3,
};
use super::progression::{PlayerProgress, ProgressSink};
use super::r#match::{MatchManager, MatchPhase};

/// Host that records every side effect and answers queries from its maps
#[derive(Debug, Default)]
pub struct FakeHost {
    pub avatars: HashMap<PlayerId, Vec3>,
    /// Scripted aim; falls back to eye height above the avatar facing -Z
    pub aims: HashMap<PlayerId, Ray>,
    /// Returned by every raycast
    pub raycast_result: Option<RaycastHit>,
    pub cameras: HashMap<PlayerId, CameraMode>,
    pub equipped: HashMap<PlayerId, ItemId>,
    /// Live entities
    pub entities: HashSet<EntityId>,
    pub removed_blocks: Vec<BlockCoord>,
    pub projectiles: Vec<(EntityId, ProjectileSpawn)>,
    pub markers: Vec<(EntityId, Vec3, Quat)>,
    pub dropped: Vec<(EntityId, ItemId)>,
    pub despawned: Vec<EntityId>,
    pub sounds: Vec<Sound>,
    pub ui: Vec<(PlayerId, UiMessage)>,
    pub chat: Vec<(Option<PlayerId>, String)>,
    pub fail_spawns: bool,
    next_entity: u64,
}

impl FakeHost {
    pub fn ui_for(&self, player: PlayerId) -> Vec<&UiMessage> {
        self.ui
            .iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn clear_ui(&mut self) {
        self.ui.clear();
    }

    pub fn chat_lines(&self) -> Vec<&str> {
        self.chat.iter().map(|(_, text)| text.as_str()).collect()
    }

    fn allocate(&mut self) -> Result<EntityId, HostError> {
        if self.fail_spawns {
            return Err(HostError::Rejected("spawns disabled".into()));
        }
        self.next_entity += 1;
        let entity = EntityId(self.next_entity);
        self.entities.insert(entity);
        Ok(entity)
    }
}

impl Host for FakeHost {
    fn spawn_avatar(&mut self, player: PlayerId, position: Vec3) -> Result<(), HostError> {
        if self.fail_spawns {
            return Err(HostError::Rejected("spawns disabled".into()));
        }
        self.avatars.insert(player, position);
        Ok(())
    }

    fn teleport(&mut self, player: PlayerId, position: Vec3) -> Result<(), HostError> {
        let avatar = self
            .avatars
            .get_mut(&player)
            .ok_or(HostError::AvatarNotFound(player))?;
        *avatar = position;
        Ok(())
    }

    fn avatar_position(&self, player: PlayerId) -> Option<Vec3> {
        self.avatars.get(&player).copied()
    }

    fn avatar_aim(&self, player: PlayerId) -> Option<Ray> {
        if let Some(aim) = self.aims.get(&player) {
            return Some(*aim);
        }
        self.avatars.get(&player).map(|p| Ray {
            origin: *p + Vec3::new(0.0, 1.6, 0.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        })
    }

    fn set_camera(&mut self, player: PlayerId, mode: CameraMode) {
        self.cameras.insert(player, mode);
    }

    fn raycast(&self, _ray: Ray, max_distance: f32, _exclude: Option<PlayerId>) -> Option<RaycastHit> {
        self.raycast_result.filter(|hit| hit.distance <= max_distance)
    }

    fn remove_block(&mut self, coord: BlockCoord) {
        self.removed_blocks.push(coord);
    }

    fn spawn_projectile(&mut self, spawn: ProjectileSpawn) -> Result<EntityId, HostError> {
        let entity = self.allocate()?;
        self.projectiles.push((entity, spawn));
        Ok(entity)
    }

    fn spawn_marker(&mut self, position: Vec3, rotation: Quat) -> Result<EntityId, HostError> {
        let entity = self.allocate()?;
        self.markers.push((entity, position, rotation));
        Ok(entity)
    }

    fn spawn_dropped_item(
        &mut self,
        item: ItemId,
        _model: &str,
        position: Vec3,
    ) -> Result<EntityId, HostError> {
        let entity = self.allocate()?;
        self.dropped.push((entity, item));
        Ok(entity)
    }

    fn despawn(&mut self, entity: EntityId) {
        self.entities.remove(&entity);
        self.despawned.push(entity);
    }

    fn equip(&mut self, player: PlayerId, item: ItemId, _model: &str) {
        self.equipped.insert(player, item);
    }

    fn unequip(&mut self, player: PlayerId, item: ItemId) {
        if self.equipped.get(&player) == Some(&item) {
            self.equipped.remove(&player);
        }
    }

    fn play_sound(&mut self, sound: Sound, _position: Vec3) {
        self.sounds.push(sound);
    }

    fn send_ui(&mut self, player: PlayerId, message: UiMessage) {
        self.ui.push((player, message));
    }

    fn send_chat(&mut self, player: Option<PlayerId>, text: &str) {
        self.chat.push((player, text.to_string()));
    }
}

/// Sink that keeps every persisted record
#[derive(Debug, Default)]
pub struct RecordingSink {
    saved: Mutex<Vec<(PlayerId, PlayerProgress)>>,
}

impl RecordingSink {
    pub fn saved_for(&self, player: PlayerId) -> Vec<u64> {
        self.saved
            .lock()
            .iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, progress)| progress.total_exp)
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn persist(&self, player_id: PlayerId, progress: PlayerProgress) {
        self.saved.lock().push((player_id, progress));
    }
}

pub fn player(n: u128) -> PlayerId {
    Uuid::from_u128(n)
}

pub fn manager() -> MatchManager<FakeHost> {
    manager_with(GameConfig::default())
}

pub fn manager_with(config: GameConfig) -> MatchManager<FakeHost> {
    manager_with_sink(config).0
}

pub fn manager_with_sink(config: GameConfig) -> (MatchManager<FakeHost>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let manager = MatchManager::new(config, FakeHost::default(), sink.clone(), 7);
    (manager, sink)
}

/// Two players (alice, bob) in a match that has just gone active
pub fn active_match() -> (MatchManager<FakeHost>, PlayerId, PlayerId) {
    let mut m = manager();
    let (a, b) = (player(1), player(2));
    m.player_joined(a, "alice".into(), PlayerProgress::default());
    m.player_joined(b, "bob".into(), PlayerProgress::default());
    let countdown_ms = u64::from(m.config().countdown_secs) * 1000;
    m.advance_to(countdown_ms);
    assert_eq!(m.phase(), MatchPhase::Active);
    (m, a, b)
}
