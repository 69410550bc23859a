use std::{sync::Arc, time::Duration};

use moka::future::Cache;
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::{
    config::AppConfig,
    db::build_pool,
    services::{
        storage::{AssetStorage, S3Storage},
        wizard::WizardState,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub http_client: reqwest::Client,
    pub asset_storage: Option<Arc<dyn AssetStorage>>,
    pub public_listings_cache: JsonResponseCache,
    pub wizard_sessions: Cache<String, Arc<Mutex<WizardSession>>>,
}

impl AppState {
    pub async fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = build_pool(&config)?;
        if db_pool.is_none() {
            tracing::warn!("DATABASE_URL is not set; database-backed routes will return 502");
        }

        let asset_storage = S3Storage::from_config(&config)
            .await
            .map(|storage| Arc::new(storage) as Arc<dyn AssetStorage>);
        if asset_storage.is_none() {
            tracing::warn!("STORAGE_BUCKET is not set; wizard submits with new files will fail");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let public_listings_cache = JsonResponseCache::new(
            config.public_listings_cache_max_entries,
            Duration::from_secs(config.public_listings_cache_ttl_seconds),
        );
        let wizard_sessions = Cache::builder()
            .max_capacity(config.wizard_session_max_entries)
            .time_to_idle(Duration::from_secs(config.wizard_session_ttl_seconds))
            .build();

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            http_client,
            asset_storage,
            public_listings_cache,
            wizard_sessions,
        })
    }
}

/// Server-held wizard session, owned by the admin who opened it.
#[derive(Debug)]
pub struct WizardSession {
    pub owner_user_id: String,
    pub wizard: WizardState,
}

/// Short-lived cache of rendered JSON responses with per-key fill locks.
#[derive(Clone)]
pub struct JsonResponseCache {
    entries: Cache<String, Value>,
    fill_locks: Cache<String, Arc<Mutex<()>>>,
}

impl JsonResponseCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            fill_locks: Cache::builder()
                .max_capacity(max_entries)
                .time_to_idle(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).await
    }

    pub async fn put(&self, key: String, value: Value) {
        self.entries.insert(key, value).await;
    }

    pub async fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Lock shared by every request filling the same key, so only one of
    /// them hits the database.
    pub async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.fill_locks
            .get_with(key.to_string(), async { Arc::new(Mutex::new(())) })
            .await
    }
}
