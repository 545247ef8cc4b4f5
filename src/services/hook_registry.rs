use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::AppResult;
use crate::models::{EventType, Hook};

type HookMap = HashMap<String, HashMap<EventType, Vec<String>>>;

/// Read-mostly map of (game, event type) -> callback URLs. Reloaded in
/// full by the hook CRUD handlers; the dispatcher only reads.
#[derive(Clone, Default)]
pub struct HookRegistry {
    inner: Arc<RwLock<HookMap>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(pool: &PgPool) -> AppResult<Self> {
        let registry = Self::new();
        registry.refresh(pool).await?;
        Ok(registry)
    }

    pub async fn refresh(&self, pool: &PgPool) -> AppResult<()> {
        let hooks: Vec<Hook> = sqlx::query_as(
            "SELECT id, public_id, game_id, event_type, url, created_at FROM hooks",
        )
        .fetch_all(pool)
        .await?;

        let mut map = self.inner.write().await;
        *map = build_map(hooks);
        Ok(())
    }

    pub async fn replace(&self, hooks: Vec<Hook>) {
        let mut map = self.inner.write().await;
        *map = build_map(hooks);
    }

    pub async fn resolve(&self, game_id: &str, event_type: EventType) -> Vec<String> {
        let map = self.inner.read().await;
        map.get(game_id)
            .and_then(|by_event| by_event.get(&event_type))
            .cloned()
            .unwrap_or_default()
    }
}

fn build_map(hooks: Vec<Hook>) -> HookMap {
    let mut map: HookMap = HashMap::new();
    for hook in hooks {
        map.entry(hook.game_id)
            .or_default()
            .entry(hook.event_type)
            .or_default()
            .push(hook.url);
    }
    map
}
