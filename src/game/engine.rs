//! Engine task - owns the match and feeds it host events and clock ticks

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::store::ProgressStore;
use crate::util::time::unix_millis;
use crate::ws::bridge::BridgeHost;
use crate::ws::protocol::{HostCommand, HostEvent};

use super::host::PlayerId;
use super::progression::PlayerProgress;
use super::r#match::{MatchManager, MatchStatus};

/// Clock ticks per second
pub const ENGINE_TPS: u64 = 20;

/// Inputs the engine task consumes
#[derive(Debug, Clone)]
pub enum EngineInput {
    Host(HostEvent),
    /// Progress load for a joining player finished
    ProgressLoaded {
        player_id: PlayerId,
        username: String,
        progress: PlayerProgress,
    },
    ForceStart,
    Reset,
}

/// Cloneable handle for talking to the engine task
#[derive(Clone)]
pub struct EngineHandle {
    pub input_tx: mpsc::Sender<EngineInput>,
    pub command_tx: broadcast::Sender<HostCommand>,
    pub status: Arc<RwLock<MatchStatus>>,
}

impl EngineHandle {
    pub fn status(&self) -> MatchStatus {
        self.status.read().clone()
    }

    pub fn subscribe_commands(&self) -> broadcast::Receiver<HostCommand> {
        self.command_tx.subscribe()
    }
}

/// The match plus everything needed to drive it from async land
pub struct MatchEngine {
    manager: MatchManager<BridgeHost>,
    store: ProgressStore,
    input_rx: mpsc::Receiver<EngineInput>,
    input_tx: mpsc::Sender<EngineInput>,
    status: Arc<RwLock<MatchStatus>>,
    /// Joins waiting on a progress load
    pending_joins: HashSet<PlayerId>,
}

impl MatchEngine {
    pub fn new(config: GameConfig, store: ProgressStore) -> (Self, EngineHandle) {
        let (input_tx, input_rx) = mpsc::channel(1024);
        let (command_tx, _) = broadcast::channel(1024);
        let status = Arc::new(RwLock::new(MatchStatus::default()));

        let host = BridgeHost::new(command_tx.clone());
        let seed = rand::thread_rng().gen();
        let mut manager = MatchManager::new(config, host, Arc::new(store.clone()), seed);
        manager.advance_to(unix_millis());

        let handle = EngineHandle {
            input_tx: input_tx.clone(),
            command_tx,
            status: status.clone(),
        };

        let engine = Self {
            manager,
            store,
            input_rx,
            input_tx,
            status,
            pending_joins: HashSet::new(),
        };

        (engine, handle)
    }

    /// Run until every input sender is gone
    pub async fn run(mut self) {
        info!(tps = ENGINE_TPS, "Match engine started");

        let mut tick_interval = interval(Duration::from_millis(1000 / ENGINE_TPS));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.manager.advance_to(unix_millis());
                    self.publish_status();
                }
                input = self.input_rx.recv() => {
                    let Some(input) = input else {
                        break;
                    };
                    self.manager.advance_to(unix_millis());
                    self.handle_input(input);
                }
            }
        }

        info!("Match engine stopped");
    }

    fn publish_status(&self) {
        *self.status.write() = self.manager.status();
    }

    fn handle_input(&mut self, input: EngineInput) {
        match input {
            EngineInput::Host(event) => self.handle_host_event(event),
            EngineInput::ProgressLoaded {
                player_id,
                username,
                progress,
            } => {
                if self.pending_joins.remove(&player_id) {
                    self.manager.player_joined(player_id, username, progress);
                } else {
                    debug!(player_id = %player_id, "Player left before progress loaded");
                }
            }
            EngineInput::ForceStart => {
                if !self.manager.force_start() {
                    debug!(phase = ?self.manager.phase(), "Force start ignored");
                }
            }
            EngineInput::Reset => self.manager.reset(),
        }
        self.publish_status();
    }

    fn handle_host_event(&mut self, event: HostEvent) {
        self.manager.host_mut().observe(&event);

        match event {
            HostEvent::PlayerJoined { player_id, username } => {
                if self.manager.session(player_id).is_some() || !self.pending_joins.insert(player_id) {
                    debug!(player_id = %player_id, "Join already in progress");
                    return;
                }
                let store = self.store.clone();
                let input_tx = self.input_tx.clone();
                tokio::spawn(async move {
                    let progress = store.load_or_default(player_id).await;
                    let _ = input_tx
                        .send(EngineInput::ProgressLoaded {
                            player_id,
                            username,
                            progress,
                        })
                        .await;
                });
            }
            HostEvent::PlayerLeft { player_id } => {
                self.pending_joins.remove(&player_id);
                self.manager.player_left(player_id);
                self.manager.host_mut().forget_player(player_id);
            }
            HostEvent::AvatarMoved { .. } => {}
            HostEvent::Trigger { player_id, .. } => self.manager.trigger(player_id),
            HostEvent::Reload { player_id } => self.manager.reload(player_id),
            HostEvent::DropItem { player_id } => self.manager.drop_active(player_id),
            HostEvent::ItemPickup { player_id, item_id } => {
                self.manager.pickup_item(player_id, item_id)
            }
            HostEvent::Ui { player_id, message } => self.manager.handle_ui(player_id, message),
            HostEvent::ProjectileCollision {
                projectile,
                position,
                other,
            } => self
                .manager
                .projectile_hit_entity(projectile, position, other),
            HostEvent::ProjectileBlockHit {
                projectile,
                position,
                normal,
            } => self
                .manager
                .projectile_hit_block(projectile, position, normal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::r#match::MatchPhase;
    use uuid::Uuid;

    #[test]
    fn join_waits_for_progress_load() {
        tokio_test::block_on(async {
            let store = ProgressStore::memory();
            let player_id = Uuid::new_v4();
            crate::game::progression::ProgressSink::persist(
                &store,
                player_id,
                PlayerProgress { total_exp: 150 },
            );

            let (mut engine, _handle) = MatchEngine::new(GameConfig::default(), store);
            engine.handle_input(EngineInput::Host(HostEvent::PlayerJoined {
                player_id,
                username: "alice".into(),
            }));
            assert!(engine.manager.session(player_id).is_none());

            let loaded = engine.input_rx.recv().await.unwrap();
            engine.handle_input(loaded);
            let session = engine.manager.session(player_id).unwrap();
            assert_eq!(session.total_exp(), 150);
            assert_eq!(engine.status.read().players, 1);
            assert_eq!(engine.status.read().phase, MatchPhase::WaitingForPlayers);
        });
    }

    #[test]
    fn leaving_before_load_drops_the_join() {
        tokio_test::block_on(async {
            let (mut engine, _handle) = MatchEngine::new(GameConfig::default(), ProgressStore::memory());
            let player_id = Uuid::new_v4();
            engine.handle_input(EngineInput::Host(HostEvent::PlayerJoined {
                player_id,
                username: "bob".into(),
            }));
            engine.handle_input(EngineInput::Host(HostEvent::PlayerLeft { player_id }));

            let loaded = engine.input_rx.recv().await.unwrap();
            engine.handle_input(loaded);
            assert!(engine.manager.session(player_id).is_none());
            assert_eq!(engine.manager.phase(), MatchPhase::Idle);
        });
    }
}
