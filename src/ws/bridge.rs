//! `Host` implementation that talks to the runtime over the bridge socket
//!
//! Side effects go out as `HostCommand`s on a broadcast channel. Queries are
//! answered from mirrors kept current by the incoming `HostEvent` stream.

use std::collections::{HashMap, HashSet};

use tokio::sync::broadcast;
use tracing::trace;

use crate::game::host::{
    BlockCoord, CameraMode, EntityId, Host, HostError, ItemId, PlayerId, ProjectileSpawn, Quat,
    Ray, RaycastHit, Sound, Vec3,
};

use super::protocol::{HostCommand, HostEvent, UiMessage};

/// Eye offset used until the runtime reports a real transform
const EYE_HEIGHT: f32 = 1.6;

#[derive(Debug, Clone, Copy)]
struct AvatarTransform {
    position: Vec3,
    eye: Vec3,
    facing: Vec3,
}

impl AvatarTransform {
    fn standing_at(position: Vec3) -> Self {
        Self {
            position,
            eye: position + Vec3::new(0.0, EYE_HEIGHT, 0.0),
            facing: Vec3::new(0.0, 0.0, -1.0),
        }
    }
}

pub struct BridgeHost {
    command_tx: broadcast::Sender<HostCommand>,
    avatars: HashMap<PlayerId, AvatarTransform>,
    /// Runtime-resolved hit along each player's aim, from their last trigger
    aim_hits: HashMap<PlayerId, RaycastHit>,
    /// Entities spawned and not yet despawned
    entities: HashSet<EntityId>,
    next_entity: u64,
}

impl BridgeHost {
    pub fn new(command_tx: broadcast::Sender<HostCommand>) -> Self {
        Self {
            command_tx,
            avatars: HashMap::new(),
            aim_hits: HashMap::new(),
            entities: HashSet::new(),
            next_entity: 0,
        }
    }

    /// Update mirrors from an incoming event. Called before the event is
    /// handed to the match.
    pub fn observe(&mut self, event: &HostEvent) {
        match event {
            HostEvent::AvatarMoved {
                player_id,
                position,
                eye,
                facing,
            } => {
                self.avatars.insert(
                    *player_id,
                    AvatarTransform {
                        position: *position,
                        eye: *eye,
                        facing: *facing,
                    },
                );
            }
            HostEvent::Trigger { player_id, aim_hit } => match aim_hit {
                Some(hit) => {
                    self.aim_hits.insert(*player_id, *hit);
                }
                None => {
                    self.aim_hits.remove(player_id);
                }
            },
            _ => {}
        }
    }

    pub fn forget_player(&mut self, player_id: PlayerId) {
        self.avatars.remove(&player_id);
        self.aim_hits.remove(&player_id);
    }

    fn emit(&self, command: HostCommand) {
        trace!(?command, "Host command");
        // No subscribers just means no runtime is connected right now
        let _ = self.command_tx.send(command);
    }

    fn allocate(&mut self) -> EntityId {
        self.next_entity += 1;
        let entity = EntityId(self.next_entity);
        self.entities.insert(entity);
        entity
    }
}

impl Host for BridgeHost {
    fn spawn_avatar(&mut self, player: PlayerId, position: Vec3) -> Result<(), HostError> {
        self.avatars
            .insert(player, AvatarTransform::standing_at(position));
        self.emit(HostCommand::SpawnAvatar {
            player_id: player,
            position,
        });
        Ok(())
    }

    fn teleport(&mut self, player: PlayerId, position: Vec3) -> Result<(), HostError> {
        let avatar = self
            .avatars
            .get_mut(&player)
            .ok_or(HostError::AvatarNotFound(player))?;
        let facing = avatar.facing;
        *avatar = AvatarTransform {
            facing,
            ..AvatarTransform::standing_at(position)
        };
        self.emit(HostCommand::Teleport {
            player_id: player,
            position,
        });
        Ok(())
    }

    fn avatar_position(&self, player: PlayerId) -> Option<Vec3> {
        self.avatars.get(&player).map(|a| a.position)
    }

    fn avatar_aim(&self, player: PlayerId) -> Option<Ray> {
        self.avatars.get(&player).map(|a| Ray {
            origin: a.eye,
            direction: a.facing,
        })
    }

    fn set_camera(&mut self, player: PlayerId, mode: CameraMode) {
        self.emit(HostCommand::SetCamera {
            player_id: player,
            camera: mode,
        });
    }

    /// Only the excluded player's own aim can be resolved: the runtime
    /// attaches that hit to each trigger event.
    fn raycast(&self, _ray: Ray, max_distance: f32, exclude: Option<PlayerId>) -> Option<RaycastHit> {
        exclude
            .and_then(|player| self.aim_hits.get(&player))
            .filter(|hit| hit.distance <= max_distance)
            .copied()
    }

    fn remove_block(&mut self, coord: BlockCoord) {
        self.emit(HostCommand::RemoveBlock { coord });
    }

    fn spawn_projectile(&mut self, spawn: ProjectileSpawn) -> Result<EntityId, HostError> {
        let entity = self.allocate();
        self.emit(HostCommand::SpawnProjectile { entity, spawn });
        Ok(entity)
    }

    fn spawn_marker(&mut self, position: Vec3, rotation: Quat) -> Result<EntityId, HostError> {
        let entity = self.allocate();
        self.emit(HostCommand::SpawnMarker {
            entity,
            position,
            rotation,
        });
        Ok(entity)
    }

    fn spawn_dropped_item(
        &mut self,
        item: ItemId,
        model: &str,
        position: Vec3,
    ) -> Result<EntityId, HostError> {
        let entity = self.allocate();
        self.emit(HostCommand::SpawnDroppedItem {
            entity,
            item_id: item,
            model: model.to_string(),
            position,
        });
        Ok(entity)
    }

    fn despawn(&mut self, entity: EntityId) {
        if self.entities.remove(&entity) {
            self.emit(HostCommand::Despawn { entity });
        }
    }

    fn equip(&mut self, player: PlayerId, item: ItemId, model: &str) {
        self.emit(HostCommand::Equip {
            player_id: player,
            item_id: item,
            model: model.to_string(),
        });
    }

    fn unequip(&mut self, player: PlayerId, item: ItemId) {
        self.emit(HostCommand::Unequip {
            player_id: player,
            item_id: item,
        });
    }

    fn play_sound(&mut self, sound: Sound, position: Vec3) {
        self.emit(HostCommand::PlaySound { sound, position });
    }

    fn send_ui(&mut self, player: PlayerId, message: UiMessage) {
        self.emit(HostCommand::Ui {
            player_id: player,
            message,
        });
    }

    fn send_chat(&mut self, player: Option<PlayerId>, text: &str) {
        self.emit(HostCommand::Chat {
            player_id: player,
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::host::HitTarget;
    use uuid::Uuid;

    fn bridge() -> (BridgeHost, broadcast::Receiver<HostCommand>) {
        let (tx, rx) = broadcast::channel(64);
        (BridgeHost::new(tx), rx)
    }

    #[test]
    fn spawned_entities_get_distinct_ids() {
        let (mut host, mut rx) = bridge();
        let a = host.spawn_marker(Vec3::ZERO, Quat::IDENTITY).unwrap();
        let b = host.spawn_marker(Vec3::UP, Quat::IDENTITY).unwrap();
        assert_ne!(a, b);
        assert!(matches!(rx.try_recv().unwrap(), HostCommand::SpawnMarker { entity, .. } if entity == a));
        assert!(matches!(
            rx.try_recv().unwrap(),
            HostCommand::SpawnMarker { entity, position, .. } if entity == b && position == Vec3::UP
        ));
    }

    #[test]
    fn despawn_is_sent_once() {
        let (mut host, mut rx) = bridge();
        let entity = host.spawn_marker(Vec3::ZERO, Quat::IDENTITY).unwrap();
        host.despawn(entity);
        host.despawn(entity);
        let _spawn = rx.try_recv().unwrap();
        assert_eq!(rx.try_recv().unwrap(), HostCommand::Despawn { entity });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn avatar_mirror_follows_events() {
        let (mut host, _rx) = bridge();
        let player = Uuid::new_v4();
        assert!(host.teleport(player, Vec3::ZERO).is_err());

        host.spawn_avatar(player, Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(host.avatar_position(player), Some(Vec3::new(1.0, 2.0, 3.0)));

        host.observe(&HostEvent::AvatarMoved {
            player_id: player,
            position: Vec3::new(5.0, 0.0, 0.0),
            eye: Vec3::new(5.0, 1.7, 0.0),
            facing: Vec3::new(1.0, 0.0, 0.0),
        });
        let aim = host.avatar_aim(player).unwrap();
        assert_eq!(aim.origin, Vec3::new(5.0, 1.7, 0.0));
        assert_eq!(aim.direction, Vec3::new(1.0, 0.0, 0.0));

        host.forget_player(player);
        assert!(host.avatar_position(player).is_none());
    }

    #[test]
    fn raycast_answers_from_trigger_hit() {
        let (mut host, _rx) = bridge();
        let player = Uuid::new_v4();
        let hit = RaycastHit {
            target: HitTarget::Block {
                coord: BlockCoord { x: 0, y: 4, z: 0 },
            },
            point: Vec3::ZERO,
            distance: 3.0,
        };
        host.observe(&HostEvent::Trigger {
            player_id: player,
            aim_hit: Some(hit),
        });
        let ray = Ray {
            origin: Vec3::ZERO,
            direction: Vec3::UP,
        };
        assert_eq!(host.raycast(ray, 4.0, Some(player)), Some(hit));
        assert_eq!(host.raycast(ray, 2.0, Some(player)), None);
        assert_eq!(host.raycast(ray, 4.0, None), None);
    }
}
