//! Match lifecycle - waiting, countdown, active round, round end

use std::collections::HashMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{GameConfig, LootItem};
use crate::ws::protocol::{LeaderboardEntry, UiInbound, UiMessage};

use super::host::{EntityId, Host, ItemId, PlayerId, Vec3};
use super::player::PlayerSession;
use super::progression::ProgressSink;
use super::projectile::Projectile;
use super::scheduler::{Scheduler, TimerId};
use super::weapons::{Item, ItemHolder};

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// No players, nothing scheduled
    Idle,
    /// Polling until enough players are connected
    WaitingForPlayers,
    /// Countdown before start
    CountingDown,
    /// Match in progress
    Active,
    /// Winner announced, next round pending
    Ending,
}

/// Everything the match schedules. Each variant carries what its handler
/// needs to check that it still applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerEvent {
    WaitingCheck,
    CountdownTick,
    MatchEnd,
    NextRound,
    Respawn { player_id: PlayerId, life: u32 },
    AutoHeal { player_id: PlayerId },
    OutOfBoundsCheck { player_id: PlayerId },
    ReloadComplete { item_id: ItemId },
    ProjectileExpire { entity: EntityId },
    MarkerExpire { entity: EntityId },
}

impl TimerEvent {
    fn player(&self) -> Option<PlayerId> {
        match self {
            TimerEvent::Respawn { player_id, .. }
            | TimerEvent::AutoHeal { player_id }
            | TimerEvent::OutOfBoundsCheck { player_id } => Some(*player_id),
            _ => None,
        }
    }
}

/// Kills scored by one player this round
#[derive(Debug, Clone)]
pub struct KillTally {
    pub username: String,
    pub kills: u32,
    /// Sequence number of the kill that produced the current count
    pub reached_at: u64,
}

/// Point-in-time view of the match for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct MatchStatus {
    pub phase: MatchPhase,
    pub players: usize,
    pub countdown_remaining: Option<u32>,
    pub started_at: Option<u64>,
    pub ends_at: Option<u64>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl Default for MatchStatus {
    fn default() -> Self {
        Self {
            phase: MatchPhase::Idle,
            players: 0,
            countdown_remaining: None,
            started_at: None,
            ends_at: None,
            leaderboard: Vec::new(),
        }
    }
}

/// The match service. One instance per process; it owns every player
/// session, the item and projectile registries and all timers, and is driven
/// by host events plus `advance_to`.
pub struct MatchManager<H: Host> {
    pub(crate) config: GameConfig,
    pub(crate) rank_thresholds: Vec<u64>,
    pub(crate) host: H,
    pub(crate) progress: Arc<dyn ProgressSink>,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) now: u64,

    pub(crate) phase: MatchPhase,
    pub(crate) sessions: HashMap<PlayerId, PlayerSession>,
    pub(crate) items: HashMap<ItemId, Item>,
    pub(crate) projectiles: HashMap<EntityId, Projectile>,
    pub(crate) timers: Scheduler<TimerEvent>,

    countdown_remaining: u32,
    countdown_timer: Option<TimerId>,
    match_timer: Option<TimerId>,
    waiting_timer: Option<TimerId>,
    next_round_timer: Option<TimerId>,
    started_at: Option<u64>,
    ends_at: Option<u64>,

    kill_counter: HashMap<PlayerId, KillTally>,
    kill_seq: u64,
}

impl<H: Host> MatchManager<H> {
    pub fn new(config: GameConfig, host: H, progress: Arc<dyn ProgressSink>, seed: u64) -> Self {
        let rank_thresholds = config.rank_thresholds();
        Self {
            config,
            rank_thresholds,
            host,
            progress,
            rng: ChaCha8Rng::seed_from_u64(seed),
            now: 0,
            phase: MatchPhase::Idle,
            sessions: HashMap::new(),
            items: HashMap::new(),
            projectiles: HashMap::new(),
            timers: Scheduler::new(),
            countdown_remaining: 0,
            countdown_timer: None,
            match_timer: None,
            waiting_timer: None,
            next_round_timer: None,
            started_at: None,
            ends_at: None,
            kill_counter: HashMap::new(),
            kill_seq: 0,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn session(&self, player_id: PlayerId) -> Option<&PlayerSession> {
        self.sessions.get(&player_id)
    }

    pub fn player_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn item(&self, item_id: ItemId) -> Option<&Item> {
        self.items.get(&item_id)
    }

    pub fn countdown_remaining(&self) -> Option<u32> {
        (self.phase == MatchPhase::CountingDown).then_some(self.countdown_remaining)
    }

    pub fn kill_count(&self, player_id: PlayerId) -> u32 {
        self.kill_counter.get(&player_id).map_or(0, |t| t.kills)
    }

    pub fn status(&self) -> MatchStatus {
        MatchStatus {
            phase: self.phase,
            players: self.sessions.len(),
            countdown_remaining: self.countdown_remaining(),
            started_at: self.started_at,
            ends_at: self.ends_at,
            leaderboard: self.leaderboard(),
        }
    }

    /// Move the match clock forward, firing every timer due on the way in
    /// order. Each timer runs with the clock at its own due time.
    pub fn advance_to(&mut self, now: u64) {
        while let Some((id, due_at, event)) = self.timers.pop_due(now) {
            self.now = self.now.max(due_at);
            self.dispatch(id, event);
        }
        self.now = self.now.max(now);
    }

    fn dispatch(&mut self, id: TimerId, event: TimerEvent) {
        match event {
            TimerEvent::WaitingCheck => {
                self.waiting_timer = None;
                self.check_waiting();
            }
            TimerEvent::CountdownTick => self.on_countdown_tick(),
            TimerEvent::MatchEnd => self.end_match(),
            TimerEvent::NextRound => self.on_next_round(),
            TimerEvent::Respawn { player_id, life } => self.respawn(player_id, life),
            TimerEvent::AutoHeal { player_id } => self.on_auto_heal(player_id),
            TimerEvent::OutOfBoundsCheck { player_id } => self.on_out_of_bounds_check(player_id),
            TimerEvent::ReloadComplete { item_id } => self.on_reload_complete(id, item_id),
            TimerEvent::ProjectileExpire { entity } => self.on_projectile_expire(entity),
            TimerEvent::MarkerExpire { entity } => self.host.despawn(entity),
        }
    }

    /// Inbound UI message from a player's client
    pub fn handle_ui(&mut self, player_id: PlayerId, message: UiInbound) {
        match message {
            UiInbound::InventorySelect { index } => self.select_slot(player_id, index),
        }
    }

    // ------------------------------------------------------------------
    // Joins and leaves
    // ------------------------------------------------------------------

    /// Phase transition for a session that just finished joining
    pub(crate) fn on_session_joined(&mut self) {
        match self.phase {
            MatchPhase::Idle => {
                info!("First player joined, waiting for players");
                self.phase = MatchPhase::WaitingForPlayers;
                self.check_waiting();
            }
            MatchPhase::WaitingForPlayers => self.check_waiting(),
            // Late joiners must not miss the countdown
            MatchPhase::CountingDown => self.start_countdown(),
            MatchPhase::Active | MatchPhase::Ending => {}
        }
    }

    pub(crate) fn on_session_left(&mut self) {
        let remaining = self.sessions.len();
        match self.phase {
            MatchPhase::CountingDown if remaining < self.config.min_players => {
                info!(players = remaining, "Not enough players, countdown aborted");
                self.timers.cancel_slot(&mut self.countdown_timer);
                self.broadcast(UiMessage::CountdownUpdate {
                    seconds: 0,
                    show: false,
                });
                self.phase = MatchPhase::WaitingForPlayers;
                self.check_waiting();
            }
            MatchPhase::WaitingForPlayers if remaining == 0 => {
                self.timers.cancel_slot(&mut self.waiting_timer);
                self.phase = MatchPhase::Idle;
            }
            MatchPhase::Active if remaining == 0 => {
                info!("All players left, ending round early");
                self.timers.cancel_slot(&mut self.match_timer);
                self.finish_round();
                self.phase = MatchPhase::Idle;
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Waiting and countdown
    // ------------------------------------------------------------------

    fn check_waiting(&mut self) {
        self.timers.cancel_slot(&mut self.waiting_timer);
        if self.phase != MatchPhase::WaitingForPlayers {
            return;
        }

        if self.sessions.len() >= self.config.min_players {
            self.start_countdown();
        } else {
            debug!(
                players = self.sessions.len(),
                needed = self.config.min_players,
                "Waiting for players"
            );
            self.waiting_timer = Some(
                self.timers
                    .schedule(self.now + self.config.waiting_poll_ms, TimerEvent::WaitingCheck),
            );
        }
    }

    /// Start the countdown from its full duration. Also used to restart it
    /// when someone joins mid-countdown.
    fn start_countdown(&mut self) {
        self.timers.cancel_slot(&mut self.countdown_timer);
        self.timers.cancel_slot(&mut self.waiting_timer);
        self.phase = MatchPhase::CountingDown;
        self.countdown_remaining = self.config.countdown_secs;

        info!(seconds = self.countdown_remaining, "Countdown started");
        self.broadcast(UiMessage::CountdownUpdate {
            seconds: self.countdown_remaining,
            show: true,
        });

        if self.countdown_remaining == 0 {
            self.start_match();
            return;
        }
        self.countdown_timer = Some(self.timers.schedule(self.now + 1000, TimerEvent::CountdownTick));
    }

    fn on_countdown_tick(&mut self) {
        self.countdown_timer = None;
        if self.phase != MatchPhase::CountingDown {
            return;
        }

        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        self.broadcast(UiMessage::CountdownUpdate {
            seconds: self.countdown_remaining,
            show: self.countdown_remaining > 0,
        });

        if self.countdown_remaining == 0 {
            self.start_match();
        } else {
            self.countdown_timer = Some(self.timers.schedule(self.now + 1000, TimerEvent::CountdownTick));
        }
    }

    // ------------------------------------------------------------------
    // Active round
    // ------------------------------------------------------------------

    fn start_match(&mut self) {
        self.timers.cancel_slot(&mut self.countdown_timer);
        self.timers.cancel_slot(&mut self.match_timer);
        self.timers.cancel_slot(&mut self.waiting_timer);

        let started_at = self.now;
        let ends_at = started_at + self.config.match_duration_ms;
        self.phase = MatchPhase::Active;
        self.started_at = Some(started_at);
        self.ends_at = Some(ends_at);
        self.kill_counter.clear();
        self.match_timer = Some(self.timers.schedule(ends_at, TimerEvent::MatchEnd));

        self.spawn_loot();

        let player_ids: Vec<PlayerId> = self.sessions.keys().copied().collect();
        for player_id in player_ids {
            if self.host.avatar_position(player_id).is_none() {
                error!(player_id = %player_id, "No avatar at match start, skipping loadout");
                continue;
            }
            self.reset_for_round(player_id);
        }

        self.broadcast(UiMessage::CountdownUpdate {
            seconds: 0,
            show: false,
        });
        self.broadcast(UiMessage::TimerSync { started_at, ends_at });
        self.broadcast(UiMessage::LeaderboardSync {
            kill_counts: Vec::new(),
        });
        self.host.send_chat(None, "The match has started. Last one standing wins!");

        info!(
            players = self.sessions.len(),
            started_at,
            ends_at,
            "Match started"
        );
    }

    /// Count a kill for `killer` and push the new count to every scoreboard
    pub(crate) fn record_kill(&mut self, killer: PlayerId) {
        let Some(username) = self.sessions.get(&killer).map(|s| s.username.clone()) else {
            return;
        };
        self.kill_seq += 1;
        let tally = self.kill_counter.entry(killer).or_insert(KillTally {
            username: username.clone(),
            kills: 0,
            reached_at: 0,
        });
        tally.kills += 1;
        tally.reached_at = self.kill_seq;
        let kill_count = tally.kills;

        self.broadcast(UiMessage::LeaderboardUpdate { username, kill_count });
    }

    /// Current leader: most kills, ties go to whoever reached the count first
    pub fn leader(&self) -> Option<(PlayerId, &KillTally)> {
        self.kill_counter
            .iter()
            .filter(|(_, tally)| tally.kills > 0)
            .max_by(|(_, a), (_, b)| a.kills.cmp(&b.kills).then(b.reached_at.cmp(&a.reached_at)))
            .map(|(id, tally)| (*id, tally))
    }

    fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut tallies: Vec<&KillTally> = self.kill_counter.values().collect();
        tallies.sort_by(|a, b| b.kills.cmp(&a.kills).then(a.reached_at.cmp(&b.reached_at)));
        tallies
            .into_iter()
            .map(|t| LeaderboardEntry {
                username: t.username.clone(),
                kill_count: t.kills,
            })
            .collect()
    }

    fn end_match(&mut self) {
        self.match_timer = None;
        if self.phase != MatchPhase::Active {
            return;
        }
        self.phase = MatchPhase::Ending;

        let winner = self
            .leader()
            .map(|(player_id, tally)| (player_id, tally.username.clone(), tally.kills));

        match &winner {
            Some((player_id, username, kills)) => {
                info!(winner = %player_id, username = %username, kills, "Match ended");
                let player_id = *player_id;
                if self.sessions.contains_key(&player_id) {
                    self.add_experience(player_id, self.config.win_bonus_exp);
                }
                self.host
                    .send_chat(None, &format!("{username} wins the match with {kills} kills!"));
            }
            None => {
                info!("Match ended without kills");
                self.host.send_chat(None, "The match ended with no winner.");
            }
        }
        self.broadcast(UiMessage::AnnounceWinner {
            username: winner.map(|(_, username, _)| username),
        });

        self.finish_round();
        self.next_round_timer = Some(
            self.timers
                .schedule(self.now + self.config.next_round_delay_ms, TimerEvent::NextRound),
        );
    }

    /// Clear per-round state shared by normal and early round ends
    fn finish_round(&mut self) {
        self.kill_counter.clear();
        self.started_at = None;
        self.ends_at = None;
        self.clear_world_items();
    }

    fn on_next_round(&mut self) {
        self.next_round_timer = None;
        if self.phase != MatchPhase::Ending {
            return;
        }
        if self.sessions.is_empty() {
            self.phase = MatchPhase::Idle;
            return;
        }
        self.phase = MatchPhase::WaitingForPlayers;
        self.check_waiting();
    }

    /// Operator override: skip the wait/countdown and start now
    pub fn force_start(&mut self) -> bool {
        match self.phase {
            MatchPhase::WaitingForPlayers | MatchPhase::CountingDown if !self.sessions.is_empty() => {
                info!("Match start forced");
                self.start_match();
                true
            }
            _ => false,
        }
    }

    /// Operator override: abandon the current round and start over
    pub fn reset(&mut self) {
        info!(phase = ?self.phase, "Match reset");
        self.timers.cancel_slot(&mut self.countdown_timer);
        self.timers.cancel_slot(&mut self.match_timer);
        self.timers.cancel_slot(&mut self.waiting_timer);
        self.timers.cancel_slot(&mut self.next_round_timer);
        self.finish_round();
        self.broadcast(UiMessage::CountdownUpdate {
            seconds: 0,
            show: false,
        });

        if self.sessions.is_empty() {
            self.phase = MatchPhase::Idle;
        } else {
            self.phase = MatchPhase::WaitingForPlayers;
            self.check_waiting();
        }
    }

    // ------------------------------------------------------------------
    // Loot
    // ------------------------------------------------------------------

    fn spawn_loot(&mut self) {
        let spawns = self.config.loot_spawns.clone();
        for spawn in spawns {
            let item = match spawn.loot {
                LootItem::Melee { melee } => Item::melee(melee, true),
                LootItem::Ranged { weapon } => Item::ranged(weapon, true),
                LootItem::Consumable {
                    consumable,
                    quantity,
                } => Item::consumable(consumable, quantity),
            };
            let item_id = item.id;
            self.items.insert(item_id, item);
            self.drop_into_world(item_id, spawn.position);
        }
    }

    /// Despawn items nobody picked up this round
    fn clear_world_items(&mut self) {
        let lying: Vec<(ItemId, EntityId)> = self
            .items
            .values()
            .filter_map(|item| match item.holder {
                ItemHolder::World(entity) => Some((item.id, entity)),
                _ => None,
            })
            .collect();
        for (item_id, entity) in lying {
            self.host.despawn(entity);
            self.items.remove(&item_id);
        }
    }

    /// Place a registered item in the world as a pickup entity
    pub(crate) fn drop_into_world(&mut self, item_id: ItemId, position: Vec3) {
        let Some(model) = self.items.get(&item_id).map(|i| i.model()) else {
            return;
        };
        match self.host.spawn_dropped_item(item_id, model, position) {
            Ok(entity) => {
                if let Some(item) = self.items.get_mut(&item_id) {
                    item.holder = ItemHolder::World(entity);
                }
            }
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "Failed to drop item, discarding");
                self.items.remove(&item_id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    pub(crate) fn broadcast(&mut self, message: UiMessage) {
        for player_id in self.sessions.keys() {
            self.host.send_ui(*player_id, message.clone());
        }
    }

    /// Bring a freshly joined session up to date with the round in progress.
    /// A running countdown is not synced here; the join restarts it.
    pub(crate) fn sync_match_state(&mut self, player_id: PlayerId) {
        if let (MatchPhase::Active, Some(started_at), Some(ends_at)) =
            (self.phase, self.started_at, self.ends_at)
        {
            self.host
                .send_ui(player_id, UiMessage::TimerSync { started_at, ends_at });
        }
        let kill_counts = self.leaderboard();
        self.host
            .send_ui(player_id, UiMessage::LeaderboardSync { kill_counts });
    }

    /// Cancel every timer tied to a departed player
    pub(crate) fn cancel_player_timers(&mut self, player_id: PlayerId) {
        self.timers.cancel_where(|event| event.player() == Some(player_id));
    }

    pub(crate) fn random_spawn_point(&mut self) -> Vec3 {
        let region = self.config.spawn_region;
        Vec3::new(
            self.rng.gen_range(region.min.x..=region.max.x),
            self.rng.gen_range(region.min.y..=region.max.y),
            self.rng.gen_range(region.min.z..=region.max.z),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::host::{CameraMode, HitTarget, RaycastHit};
    use crate::game::inventory::{MELEE_SLOT, STARTING_WEAPON_SLOT};
    use crate::game::progression::PlayerProgress;
    use crate::game::testing::{manager, manager_with, player, FakeHost};
    use crate::game::weapons::ItemKind;

    fn countdown_updates(m: &MatchManager<FakeHost>, p: PlayerId) -> Vec<(u32, bool)> {
        m.host()
            .ui_for(p)
            .into_iter()
            .filter_map(|msg| match msg {
                UiMessage::CountdownUpdate { seconds, show } => Some((*seconds, *show)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_join_waits_for_players() {
        let mut m = manager();
        let a = player(1);
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        assert_eq!(m.phase(), MatchPhase::WaitingForPlayers);

        // Still waiting after several polls
        m.advance_to(5_000);
        assert_eq!(m.phase(), MatchPhase::WaitingForPlayers);
        assert!(!m.timers.is_empty());
    }

    #[test]
    fn reaching_min_players_starts_countdown_once() {
        let mut m = manager();
        let (a, b) = (player(1), player(2));
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        m.player_joined(b, "bob".into(), PlayerProgress::default());
        assert_eq!(m.phase(), MatchPhase::CountingDown);
        assert_eq!(m.countdown_remaining(), Some(10));

        // The waiting poll must not restart the countdown
        m.advance_to(1_500);
        assert_eq!(m.phase(), MatchPhase::CountingDown);
        assert_eq!(m.countdown_remaining(), Some(9));
        let starts = countdown_updates(&m, a)
            .into_iter()
            .filter(|(s, show)| *s == 10 && *show)
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn join_during_countdown_resets_it() {
        let mut m = manager();
        m.player_joined(player(1), "alice".into(), PlayerProgress::default());
        m.player_joined(player(2), "bob".into(), PlayerProgress::default());
        m.advance_to(4_000);
        assert_eq!(m.countdown_remaining(), Some(6));

        m.player_joined(player(3), "carol".into(), PlayerProgress::default());
        assert_eq!(m.phase(), MatchPhase::CountingDown);
        assert_eq!(m.countdown_remaining(), Some(10));
        // Late joiner only ever saw the restarted countdown
        assert_eq!(countdown_updates(&m, player(3)), vec![(10, true)]);

        // Full ten seconds from the reset
        m.advance_to(13_900);
        assert_eq!(m.phase(), MatchPhase::CountingDown);
        m.advance_to(14_000);
        assert_eq!(m.phase(), MatchPhase::Active);
    }

    #[test]
    fn two_players_reach_active_after_countdown() {
        let mut m = manager();
        let (a, b) = (player(1), player(2));
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        m.player_joined(b, "bob".into(), PlayerProgress::default());
        assert!(countdown_updates(&m, a).contains(&(10, true)));
        assert!(countdown_updates(&m, b).contains(&(10, true)));

        m.advance_to(10_000);
        assert_eq!(m.phase(), MatchPhase::Active);

        for p in [a, b] {
            let session = m.session(p).unwrap();
            let melee = session.inventory().get(MELEE_SLOT).and_then(|id| m.item(id)).unwrap();
            assert!(matches!(melee.kind, ItemKind::Melee(_)));
            let ranged = session
                .inventory()
                .get(STARTING_WEAPON_SLOT)
                .and_then(|id| m.item(id))
                .unwrap();
            assert!(matches!(ranged.kind, ItemKind::Ranged(_)));

            let sync = m.host().ui_for(p).into_iter().find_map(|msg| match msg {
                UiMessage::TimerSync { started_at, ends_at } => Some((*started_at, *ends_at)),
                _ => None,
            });
            assert_eq!(sync, Some((10_000, 10_000 + m.config().match_duration_ms)));
        }

        // Countdown interval is gone once active
        m.advance_to(20_000);
        assert_eq!(m.phase(), MatchPhase::Active);
        assert_eq!(m.countdown_remaining(), None);
    }

    #[test]
    fn leave_during_countdown_returns_to_waiting() {
        let mut m = manager();
        m.player_joined(player(1), "alice".into(), PlayerProgress::default());
        m.player_joined(player(2), "bob".into(), PlayerProgress::default());
        m.player_left(player(2));
        assert_eq!(m.phase(), MatchPhase::WaitingForPlayers);

        m.advance_to(30_000);
        assert_eq!(m.phase(), MatchPhase::WaitingForPlayers);

        m.player_left(player(1));
        assert_eq!(m.phase(), MatchPhase::Idle);
        assert!(m.timers.is_empty());
    }

    #[test]
    fn kill_updates_every_scoreboard_immediately() {
        let mut m = manager();
        let (a, b) = (player(1), player(2));
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        m.player_joined(b, "bob".into(), PlayerProgress::default());
        m.advance_to(10_000);

        m.record_kill(a);
        for p in [a, b] {
            assert!(m.host().ui_for(p).contains(&&UiMessage::LeaderboardUpdate {
                username: "alice".into(),
                kill_count: 1,
            }));
        }
    }

    #[test]
    fn winner_is_earliest_to_reach_top_count() {
        let mut m = manager();
        let (a, b, c) = (player(1), player(2), player(3));
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        m.player_joined(b, "bob".into(), PlayerProgress::default());
        m.player_joined(c, "carol".into(), PlayerProgress::default());
        m.advance_to(10_000);

        m.record_kill(b);
        m.record_kill(a);
        m.record_kill(a);
        m.record_kill(b);
        m.record_kill(c);
        // alice reached 2 before bob did
        assert_eq!(m.leader().map(|(id, _)| id), Some(a));
    }

    #[test]
    fn match_end_announces_winner_and_restarts() {
        let mut m = manager();
        let (a, b) = (player(1), player(2));
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        m.player_joined(b, "bob".into(), PlayerProgress::default());
        m.advance_to(10_000);
        m.record_kill(a);
        let exp_before = m.session(a).unwrap().total_exp();

        let ends_at = 10_000 + m.config().match_duration_ms;
        m.advance_to(ends_at);
        assert_eq!(m.phase(), MatchPhase::Ending);
        assert!(m.host().ui_for(b).contains(&&UiMessage::AnnounceWinner {
            username: Some("alice".into())
        }));
        assert_eq!(
            m.session(a).unwrap().total_exp(),
            exp_before + m.config().win_bonus_exp
        );
        assert_eq!(m.kill_count(a), 0);

        m.advance_to(ends_at + 10_000);
        assert_eq!(m.phase(), MatchPhase::CountingDown);
    }

    #[test]
    fn match_without_kills_has_no_winner() {
        let mut m = manager();
        let (a, b) = (player(1), player(2));
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        m.player_joined(b, "bob".into(), PlayerProgress::default());
        m.advance_to(10_000 + m.config().match_duration_ms);
        assert!(m
            .host()
            .ui_for(a)
            .contains(&&UiMessage::AnnounceWinner { username: None }));
    }

    #[test]
    fn mid_round_joiner_gets_timer_without_disturbing_others() {
        let mut m = manager();
        let (a, b, c) = (player(1), player(2), player(3));
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        m.player_joined(b, "bob".into(), PlayerProgress::default());
        m.advance_to(10_000);
        m.record_kill(a);
        m.host_mut().clear_ui();

        m.advance_to(12_000);
        m.player_joined(c, "carol".into(), PlayerProgress::default());
        assert_eq!(m.phase(), MatchPhase::Active);

        let carol = m.host().ui_for(c);
        assert!(carol.iter().any(|msg| matches!(msg, UiMessage::TimerSync { started_at: 10_000, .. })));
        assert!(carol.iter().any(|msg| matches!(
            msg,
            UiMessage::LeaderboardSync { kill_counts } if kill_counts.len() == 1
        )));
        // Others only learn the new player count
        for p in [a, b] {
            assert!(m.host().ui_for(p).iter().all(|msg| matches!(msg, UiMessage::PlayersCount { .. })));
        }
    }

    #[test]
    fn missing_avatar_does_not_block_match_start() {
        let mut m = manager();
        let (a, b) = (player(1), player(2));
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        m.player_joined(b, "bob".into(), PlayerProgress::default());
        m.host_mut().avatars.remove(&b);
        m.advance_to(10_000);
        assert_eq!(m.phase(), MatchPhase::Active);
    }

    #[test]
    fn everyone_leaving_ends_round() {
        let mut m = manager();
        m.player_joined(player(1), "alice".into(), PlayerProgress::default());
        m.player_joined(player(2), "bob".into(), PlayerProgress::default());
        m.advance_to(10_000);
        m.player_left(player(1));
        m.player_left(player(2));
        assert_eq!(m.phase(), MatchPhase::Idle);
        assert!(m.timers.is_empty());
        assert!(m.items.is_empty());
    }

    #[test]
    fn force_start_and_reset() {
        let mut m = manager_with(GameConfig {
            min_players: 3,
            ..GameConfig::default()
        });
        m.player_joined(player(1), "alice".into(), PlayerProgress::default());
        assert!(m.force_start());
        assert_eq!(m.phase(), MatchPhase::Active);
        assert!(!m.force_start());

        m.reset();
        assert_eq!(m.phase(), MatchPhase::WaitingForPlayers);
        m.advance_to(10 * 60 * 1000);
        assert_eq!(m.phase(), MatchPhase::WaitingForPlayers);
    }

    #[test]
    fn loot_spawns_at_start_and_clears_at_end() {
        let mut m = manager();
        m.player_joined(player(1), "alice".into(), PlayerProgress::default());
        m.player_joined(player(2), "bob".into(), PlayerProgress::default());
        m.advance_to(10_000);
        let lying = m
            .items
            .values()
            .filter(|i| matches!(i.holder, ItemHolder::World(_)))
            .count();
        assert_eq!(lying, m.config().loot_spawns.len());

        m.advance_to(10_000 + m.config().match_duration_ms);
        assert!(m.items.values().all(|i| matches!(i.holder, ItemHolder::Player(_))));
    }

    #[test]
    fn scenario_kill_and_respawn() {
        let mut m = manager();
        let (a, b) = (player(1), player(2));
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        m.player_joined(b, "bob".into(), PlayerProgress::default());
        m.advance_to(10_000);

        m.apply_damage(b, 500.0, None, Some(a));
        let victim = m.session(b).unwrap();
        assert!(!victim.is_alive());
        assert_eq!(victim.health(), 0.0);
        assert_eq!(m.kill_count(a), 1);
        assert_eq!(m.session(a).unwrap().total_exp(), m.config().kill_exp);
        assert_eq!(m.host().cameras.get(&b), Some(&CameraMode::Spectate { target: a }));

        m.advance_to(14_999);
        assert!(!m.session(b).unwrap().is_alive());
        m.advance_to(15_000);
        let victim = m.session(b).unwrap();
        assert!(victim.is_alive());
        assert_eq!(victim.health(), m.config().max_health);
        assert_eq!(victim.shield(), m.config().max_shield);
        assert_eq!(m.host().cameras.get(&b), Some(&CameraMode::FirstPerson));
    }

    #[test]
    fn melee_kill_through_trigger() {
        let mut m = manager();
        let (a, b) = (player(1), player(2));
        m.player_joined(a, "alice".into(), PlayerProgress::default());
        m.player_joined(b, "bob".into(), PlayerProgress::default());
        m.advance_to(10_000);
        m.select_slot(a, MELEE_SLOT);

        m.host_mut().raycast_result = Some(RaycastHit {
            target: HitTarget::Player { player_id: b },
            point: Vec3::ZERO,
            distance: 1.0,
        });
        m.trigger(a);
        // Pickaxe damage comes off the shield first
        assert_eq!(m.session(b).unwrap().shield(), m.config().max_shield - 10.0);
        assert_eq!(m.session(b).unwrap().health(), m.config().max_health);
    }
}
