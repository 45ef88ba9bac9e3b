//! Host runtime port - everything the game needs from the embedding world

use std::fmt;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::UiMessage;

/// Player identity as assigned by the host
pub type PlayerId = Uuid;

/// Item instance identity (items live in the match registry)
pub type ItemId = Uuid;

/// Host entity identity (projectiles, markers, dropped items)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Vec3) -> f32 {
        (self - other).length()
    }

    /// Unit vector, or zero for a degenerate input
    pub fn normalize_or_zero(self) -> Vec3 {
        let len = self.length();
        if len <= f32::EPSILON {
            Vec3::ZERO
        } else {
            self * (1.0 / len)
        }
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Rotation quaternion (x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Quat {
        let axis = axis.normalize_or_zero();
        let (s, c) = (angle * 0.5).sin_cos();
        Quat {
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
            w: c,
        }
    }

    /// Rotate a vector by this (unit) quaternion
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let q = Vec3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }
}

/// Integer block coordinate in the host's chunked terrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A ray from the avatar's eye along its facing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

/// What a raycast or melee swing struck
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HitTarget {
    Block { coord: BlockCoord },
    Player { player_id: PlayerId },
    Entity { entity: EntityId },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaycastHit {
    pub target: HitTarget,
    pub point: Vec3,
    pub distance: f32,
}

/// The other party in a projectile-vs-entity collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollisionTarget {
    Player { player_id: PlayerId },
    Projectile { entity: EntityId },
    Other { entity: EntityId },
}

/// Camera attachment for a player's client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CameraMode {
    FirstPerson,
    /// Spectating another player's avatar
    Spectate { target: PlayerId },
    /// Fixed death camera (self-elimination)
    Death,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sound {
    Fire,
    DryFire,
    Reload,
    MeleeSwing,
    MeleeDenied,
    BlockBreak,
    Hit,
    Consume,
}

/// Request to spawn a physical projectile entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSpawn {
    pub shooter: PlayerId,
    pub origin: Vec3,
    pub direction: Vec3,
    pub speed: f32,
    pub model: String,
}

/// Host-side failures (entity lookups, rejected spawns)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    #[error("No avatar for player {0}")]
    AvatarNotFound(PlayerId),

    #[error("Host rejected request: {0}")]
    Rejected(String),
}

/// The embedding game-world runtime
///
/// Queries take `&self`; everything that changes the world takes `&mut self`.
/// Implementations must never block: the match manager calls into the host
/// from its single logical thread of control.
pub trait Host {
    /// Spawn (or move) the player's avatar into the world
    fn spawn_avatar(&mut self, player: PlayerId, position: Vec3) -> Result<(), HostError>;

    fn teleport(&mut self, player: PlayerId, position: Vec3) -> Result<(), HostError>;

    fn avatar_position(&self, player: PlayerId) -> Option<Vec3>;

    /// Eye position and facing direction of the avatar
    fn avatar_aim(&self, player: PlayerId) -> Option<Ray>;

    fn set_camera(&mut self, player: PlayerId, mode: CameraMode);

    /// Raycast that ignores `exclude`'s own avatar
    fn raycast(&self, ray: Ray, max_distance: f32, exclude: Option<PlayerId>) -> Option<RaycastHit>;

    fn remove_block(&mut self, coord: BlockCoord);

    fn spawn_projectile(&mut self, spawn: ProjectileSpawn) -> Result<EntityId, HostError>;

    fn spawn_marker(&mut self, position: Vec3, rotation: Quat) -> Result<EntityId, HostError>;

    fn spawn_dropped_item(
        &mut self,
        item: ItemId,
        model: &str,
        position: Vec3,
    ) -> Result<EntityId, HostError>;

    fn despawn(&mut self, entity: EntityId);

    /// Attach the item model to the avatar's hand
    fn equip(&mut self, player: PlayerId, item: ItemId, model: &str);

    fn unequip(&mut self, player: PlayerId, item: ItemId);

    fn play_sound(&mut self, sound: Sound, position: Vec3);

    fn send_ui(&mut self, player: PlayerId, message: UiMessage);

    /// Chat line to one player, or to everyone when `player` is `None`
    fn send_chat(&mut self, player: Option<PlayerId>, text: &str);
}
