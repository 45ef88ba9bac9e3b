//! Application state shared across routes

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::config::Config;
use crate::game::host::PlayerId;
use crate::game::{EngineHandle, MatchEngine};
use crate::store::{ProgressStore, SupabaseClient};
use crate::util::rate_limit::PlayerRateLimiter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: EngineHandle,
    pub progress: ProgressStore,
    pub player_limiters: Arc<DashMap<PlayerId, PlayerRateLimiter>>,
}

impl AppState {
    /// Build the state and the engine it talks to. The engine still has to
    /// be spawned.
    pub fn new(config: Config) -> (Self, MatchEngine) {
        let config = Arc::new(config);

        let progress = match (&config.supabase_url, &config.supabase_service_role_key) {
            (Some(url), Some(key)) => {
                info!(url = %url, "Persisting progress to Supabase");
                ProgressStore::supabase(SupabaseClient::new(url, key))
            }
            _ => {
                info!("No Supabase project configured, keeping progress in memory");
                ProgressStore::memory()
            }
        };

        let (engine, handle) = MatchEngine::new(config.game.clone(), progress.clone());

        let state = Self {
            config,
            engine: handle,
            progress,
            player_limiters: Arc::new(DashMap::new()),
        };

        (state, engine)
    }
}
