use std::env;
use std::sync::Arc;

use arc_swap::ArcSwap;
use gpool_common::{normalize_prefix, PoolConfig, PoolConfigPatch, SystemSettings};
use gpool_storage::ConfigStore;

/// Process-wide snapshot behind a copy-on-write pointer (spec.md §4.1,
/// §5: "readers must see a consistent snapshot ... never a torn view
/// across fields"). Grounded on the teacher's `MemoryAuth` `ArcSwap`
/// pattern in `gproxy-core::auth`.
pub struct ConfigSnapshot {
    inner: ArcSwap<PoolConfig>,
    system: ArcSwap<SystemSettings>,
}

impl ConfigSnapshot {
    pub fn new(pool: PoolConfig, system: SystemSettings) -> Self {
        Self { inner: ArcSwap::from_pointee(pool), system: ArcSwap::from_pointee(system) }
    }

    /// Returns an immutable view; callers get a cheap `Arc` clone, never a
    /// reference into shared mutable state.
    pub fn pool(&self) -> Arc<PoolConfig> {
        self.inner.load_full()
    }

    pub fn system(&self) -> Arc<SystemSettings> {
        self.system.load_full()
    }

    pub fn replace(&self, pool: PoolConfig, system: SystemSettings) {
        self.inner.store(Arc::new(pool));
        self.system.store(Arc::new(system));
    }
}

/// Reads env vars with typed coercion-never-throws defaults, then overlays
/// the persisted `system_config` row (spec.md §4.1/§4.4). This is the
/// `reload()` entry point; call it again after an (external) admin
/// mutation to refresh the snapshot.
pub struct ConfigLoader<S: ConfigStore> {
    store: Arc<S>,
}

impl<S: ConfigStore> ConfigLoader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> (PoolConfig, SystemSettings) {
        let mut pool_patch = env_pool_patch();
        let mut system = env_system_settings();

        if let Ok(Some(value)) = self.store.get_all().await {
            if let Ok(persisted) = serde_json::from_value::<PersistedOverlay>(value) {
                pool_patch.overlay(persisted.pool);
                if let Some(persisted_system) = persisted.system {
                    system = merge_system(system, persisted_system);
                }
            }
        }

        (pool_patch.into_config(), system)
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, Default)]
struct PersistedOverlay {
    #[serde(default)]
    pool: PoolConfigPatch,
    #[serde(default)]
    system: Option<SystemSettingsPatch>,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, Default)]
struct SystemSettingsPatch {
    host: Option<String>,
    port: Option<u16>,
    api_prefix: Option<String>,
    api_secret: Option<String>,
    admin_prefix: Option<String>,
    admin_username: Option<String>,
    admin_password: Option<String>,
    jwt_secret_key: Option<String>,
    db_echo: Option<bool>,
}

fn merge_system(base: SystemSettings, patch: SystemSettingsPatch) -> SystemSettings {
    SystemSettings {
        host: patch.host.unwrap_or(base.host),
        port: patch.port.unwrap_or(base.port),
        api_prefix: patch.api_prefix.map(|p| normalize_prefix(&p)).unwrap_or(base.api_prefix),
        api_secret: patch.api_secret.or(base.api_secret),
        admin_prefix: patch.admin_prefix.map(|p| normalize_prefix(&p)).unwrap_or(base.admin_prefix),
        admin_username: patch.admin_username.or(base.admin_username),
        admin_password: patch.admin_password.or(base.admin_password),
        jwt_secret_key: patch.jwt_secret_key.or(base.jwt_secret_key),
        db_echo: patch.db_echo.unwrap_or(base.db_echo),
    }
}

fn env_pool_patch() -> PoolConfigPatch {
    PoolConfigPatch {
        key_pool_size: env::var("KEY_POOL_SIZE").ok().and_then(|v| v.parse().ok()),
        key_selection_strategy: env::var("KEY_SELECTION_STRATEGY").ok().and_then(|v| v.parse().ok()),
        ua_list: env::var("UA_LIST").ok().map(|v| split_list(&v)),
        proxy_list: env::var("PROXY_LIST").ok().map(|v| split_list(&v)),
        log_conversation_content: env::var("LOG_CONVERSATION_CONTENT").ok().and_then(|v| parse_bool(&v)),
        openai_models: env::var("OPENAI_MODELS").ok().map(|v| split_list(&v).into_iter().collect()),
        anthropic_models: env::var("ANTHROPIC_MODELS").ok().map(|v| split_list(&v).into_iter().collect()),
    }
}

fn env_system_settings() -> SystemSettings {
    let defaults = SystemSettings::default();
    SystemSettings {
        host: env::var("HOST").unwrap_or(defaults.host),
        port: env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.port),
        api_prefix: env::var("API_PREFIX").map(|v| normalize_prefix(&v)).unwrap_or(defaults.api_prefix),
        api_secret: env::var("API_SECRET").ok().filter(|v| !v.is_empty()),
        admin_prefix: env::var("ADMIN_PREFIX").map(|v| normalize_prefix(&v)).unwrap_or(defaults.admin_prefix),
        admin_username: env::var("ADMIN_USERNAME").ok(),
        admin_password: env::var("ADMIN_PASSWORD").ok(),
        jwt_secret_key: env::var("JWT_SECRET_KEY").ok(),
        db_echo: env::var("DB_ECHO").ok().and_then(|v| parse_bool(&v)).unwrap_or(defaults.db_echo),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_replace_is_visible_to_readers() {
        let snapshot = ConfigSnapshot::new(PoolConfig::default(), SystemSettings::default());
        assert_eq!(snapshot.pool().key_pool_size, 5);
        let mut next = PoolConfig::default();
        next.key_pool_size = 9;
        snapshot.replace(next, SystemSettings::default());
        assert_eq!(snapshot.pool().key_pool_size, 9);
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nonsense"), None);
    }
}
