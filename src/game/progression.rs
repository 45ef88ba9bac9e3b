//! Experience totals, rank lookup and save throttling

use serde::{Deserialize, Serialize};

use super::host::PlayerId;

/// Durable per-player record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProgress {
    pub total_exp: u64,
}

/// Where progress records go when they need saving. Implementations must
/// not block the caller; failures are theirs to log.
pub trait ProgressSink: Send + Sync {
    fn persist(&self, player_id: PlayerId, progress: PlayerProgress);
}

/// Index of the highest threshold `exp` has reached. Thresholds are ascending
/// and start at zero.
pub fn rank_index(thresholds: &[u64], exp: u64) -> usize {
    thresholds.iter().rposition(|&t| exp >= t).unwrap_or(0)
}

/// What an experience gain changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpGain {
    pub total_exp: u64,
    pub rank_index: usize,
    pub ranked_up: bool,
    /// The accumulated unsaved amount crossed the save interval
    pub should_persist: bool,
}

#[derive(Debug, Clone)]
pub struct Progression {
    total_exp: u64,
    unsaved: u64,
    rank_index: usize,
}

impl Progression {
    pub fn new(progress: PlayerProgress, thresholds: &[u64]) -> Self {
        Self {
            total_exp: progress.total_exp,
            unsaved: 0,
            rank_index: rank_index(thresholds, progress.total_exp),
        }
    }

    pub fn total_exp(&self) -> u64 {
        self.total_exp
    }

    pub fn rank_index(&self) -> usize {
        self.rank_index
    }

    pub fn record(&self) -> PlayerProgress {
        PlayerProgress {
            total_exp: self.total_exp,
        }
    }

    pub fn has_unsaved(&self) -> bool {
        self.unsaved > 0
    }

    pub fn add(&mut self, amount: u64, thresholds: &[u64], save_interval: u64) -> ExpGain {
        self.total_exp = self.total_exp.saturating_add(amount);
        self.unsaved = self.unsaved.saturating_add(amount);

        let previous_rank = self.rank_index;
        self.rank_index = rank_index(thresholds, self.total_exp);

        let should_persist = self.unsaved > save_interval;
        if should_persist {
            self.unsaved = 0;
        }

        ExpGain {
            total_exp: self.total_exp,
            rank_index: self.rank_index,
            ranked_up: self.rank_index > previous_rank,
            should_persist,
        }
    }

    /// Mark everything as saved (used when flushing on leave)
    pub fn mark_saved(&mut self) {
        self.unsaved = 0;
    }
}
