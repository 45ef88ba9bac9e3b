//! Player progress persistence

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::game::host::PlayerId;
use crate::game::progression::{PlayerProgress, ProgressSink};

use super::supabase::{SupabaseClient, SupabaseError};

const TABLE: &str = "player_progress";

/// Row in the `player_progress` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRow {
    pub player_id: PlayerId,
    pub total_exp: u64,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Serializes progress writes through one background task.
///
/// Writes reach the backend in submission order, and `latest` holds the
/// highest total submitted per player so a load that races a pending write
/// never hands back a lower value.
#[derive(Clone)]
pub struct ProgressWriter {
    tx: mpsc::UnboundedSender<(PlayerId, PlayerProgress)>,
    latest: Arc<DashMap<PlayerId, u64>>,
}

impl ProgressWriter {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn spawn<F, Fut>(save: F) -> Self
    where
        F: Fn(PlayerId, PlayerProgress) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<(PlayerId, PlayerProgress)>();

        tokio::spawn(async move {
            while let Some((player_id, progress)) = rx.recv().await {
                match save(player_id, progress).await {
                    Ok(()) => debug!(player_id = %player_id, total_exp = progress.total_exp, "Progress saved"),
                    Err(e) => warn!(player_id = %player_id, error = %e, "Failed to save progress"),
                }
            }
            debug!("Progress writer stopped");
        });

        Self {
            tx,
            latest: Arc::new(DashMap::new()),
        }
    }

    /// Queue a write. The queued total never drops below an earlier one.
    pub fn submit(&self, player_id: PlayerId, progress: PlayerProgress) {
        let total_exp = {
            let mut entry = self.latest.entry(player_id).or_insert(0);
            *entry = (*entry).max(progress.total_exp);
            *entry
        };
        if self.tx.send((player_id, PlayerProgress { total_exp })).is_err() {
            warn!(player_id = %player_id, "Progress writer is gone, dropping save");
        }
    }

    /// Merge a stored record with anything submitted since
    pub fn reconcile(&self, player_id: PlayerId, stored: Option<PlayerProgress>) -> Option<PlayerProgress> {
        let pending = self.latest.get(&player_id).map(|entry| *entry);
        match (stored, pending) {
            (Some(stored), Some(pending)) => Some(PlayerProgress {
                total_exp: stored.total_exp.max(pending),
            }),
            (Some(stored), None) => Some(stored),
            (None, Some(pending)) => Some(PlayerProgress { total_exp: pending }),
            (None, None) => None,
        }
    }
}

/// Progress store backed by Supabase, or by memory when no project is
/// configured
#[derive(Clone)]
pub enum ProgressStore {
    Supabase {
        client: SupabaseClient,
        writer: ProgressWriter,
    },
    Memory(Arc<DashMap<PlayerId, PlayerProgress>>),
}

impl ProgressStore {
    /// Supabase-backed store; spawns its writer task
    pub fn supabase(client: SupabaseClient) -> Self {
        let upsert_client = client.clone();
        let writer = ProgressWriter::spawn(move |player_id, progress| {
            let client = upsert_client.clone();
            async move { upsert_row(&client, player_id, progress).await }
        });
        Self::Supabase { client, writer }
    }

    pub fn memory() -> Self {
        Self::Memory(Arc::new(DashMap::new()))
    }

    /// Load a player's record; `None` for a first-time player
    pub async fn load(&self, player_id: PlayerId) -> Result<Option<PlayerProgress>, StoreError> {
        match self {
            Self::Supabase { client, writer } => {
                let query = format!("player_id=eq.{}&select=player_id,total_exp,updated_at", player_id);
                let row: Option<ProgressRow> = client.get_one(TABLE, &query).await?;
                let stored = row.map(|row| PlayerProgress {
                    total_exp: row.total_exp,
                });
                Ok(writer.reconcile(player_id, stored))
            }
            Self::Memory(map) => Ok(map.get(&player_id).map(|entry| *entry)),
        }
    }

    /// Load a record, falling back to a fresh one on any failure
    pub async fn load_or_default(&self, player_id: PlayerId) -> PlayerProgress {
        match self.load(player_id).await {
            Ok(Some(progress)) => progress,
            Ok(None) => PlayerProgress::default(),
            Err(e) => {
                warn!(player_id = %player_id, error = %e, "Failed to load progress, starting fresh");
                PlayerProgress::default()
            }
        }
    }
}

async fn upsert_row(client: &SupabaseClient, player_id: PlayerId, progress: PlayerProgress) -> Result<(), StoreError> {
    let row = ProgressRow {
        player_id,
        total_exp: progress.total_exp,
        updated_at: Some(chrono::Utc::now()),
    };
    client.upsert(TABLE, &row, "player_id").await?;
    Ok(())
}

impl ProgressSink for ProgressStore {
    fn persist(&self, player_id: PlayerId, progress: PlayerProgress) {
        match self {
            Self::Memory(map) => {
                map.entry(player_id)
                    .and_modify(|stored| stored.total_exp = stored.total_exp.max(progress.total_exp))
                    .or_insert(progress);
            }
            Self::Supabase { writer, .. } => writer.submit(player_id, progress),
        }
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Supabase(#[from] SupabaseError),
}
