//! Not included — see `gpool-core::config` for the `ArcSwap`-backed runtime
//! snapshot. This module only carries the plain, serializable value type so
//! storage and core can share it without a cyclic dependency.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::SelectionStrategy;

fn default_ua_list() -> Vec<String> {
    vec!["Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string()]
}

fn default_openai_models() -> BTreeSet<String> {
    ["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_anthropic_models() -> BTreeSet<String> {
    [
        "claude-3-5-sonnet-20241022",
        "claude-3-5-haiku-20241022",
        "claude-3-opus-20240229",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Operator-tunable parameters, loaded at startup and reloaded on mutation
/// (spec.md §4.1). `Clone` is cheap enough for copy-on-write readers since
/// every field here is owned data with no further indirection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub key_pool_size: u32,
    pub key_selection_strategy: SelectionStrategy,
    pub ua_list: Vec<String>,
    pub proxy_list: Vec<String>,
    pub log_conversation_content: bool,
    pub openai_models: BTreeSet<String>,
    pub anthropic_models: BTreeSet<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            key_pool_size: 5,
            key_selection_strategy: SelectionStrategy::Random,
            ua_list: default_ua_list(),
            proxy_list: Vec::new(),
            log_conversation_content: false,
            openai_models: default_openai_models(),
            anthropic_models: default_anthropic_models(),
        }
    }
}

/// Partial overlay of `PoolConfig`, used when merging the persisted
/// `system_config` row over environment-sourced defaults. Mirrors the
/// overlay pattern the teacher uses for its own global config patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolConfigPatch {
    pub key_pool_size: Option<u32>,
    pub key_selection_strategy: Option<i64>,
    pub ua_list: Option<Vec<String>>,
    pub proxy_list: Option<Vec<String>>,
    pub log_conversation_content: Option<bool>,
    pub openai_models: Option<BTreeSet<String>>,
    pub anthropic_models: Option<BTreeSet<String>>,
}

impl PoolConfigPatch {
    pub fn overlay(&mut self, other: PoolConfigPatch) {
        if other.key_pool_size.is_some() {
            self.key_pool_size = other.key_pool_size;
        }
        if other.key_selection_strategy.is_some() {
            self.key_selection_strategy = other.key_selection_strategy;
        }
        if other.ua_list.is_some() {
            self.ua_list = other.ua_list;
        }
        if other.proxy_list.is_some() {
            self.proxy_list = other.proxy_list;
        }
        if other.log_conversation_content.is_some() {
            self.log_conversation_content = other.log_conversation_content;
        }
        if other.openai_models.is_some() {
            self.openai_models = other.openai_models;
        }
        if other.anthropic_models.is_some() {
            self.anthropic_models = other.anthropic_models;
        }
    }

    /// Coerces with defaults on missing/invalid input; this loader never
    /// fails (spec.md §4.1 "coerces with defaults on parse failure, never
    /// throws").
    pub fn into_config(self) -> PoolConfig {
        let defaults = PoolConfig::default();
        PoolConfig {
            key_pool_size: self.key_pool_size.filter(|n| *n >= 1).unwrap_or(defaults.key_pool_size),
            key_selection_strategy: self
                .key_selection_strategy
                .map(SelectionStrategy::from_raw)
                .unwrap_or(defaults.key_selection_strategy),
            ua_list: self.ua_list.filter(|l| !l.is_empty()).unwrap_or(defaults.ua_list),
            proxy_list: self.proxy_list.unwrap_or(defaults.proxy_list),
            log_conversation_content: self.log_conversation_content.unwrap_or(defaults.log_conversation_content),
            openai_models: self.openai_models.filter(|s| !s.is_empty()).unwrap_or(defaults.openai_models),
            anthropic_models: self
                .anthropic_models
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.anthropic_models),
        }
    }
}

/// System-level settings, separate from `PoolConfig` because they gate the
/// HTTP surface itself rather than dispatch behavior (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSettings {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    pub api_secret: Option<String>,
    pub admin_prefix: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub jwt_secret_key: Option<String>,
    pub db_echo: bool,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            api_prefix: String::new(),
            api_secret: None,
            admin_prefix: "/admin".to_string(),
            admin_username: None,
            admin_password: None,
            jwt_secret_key: None,
            db_echo: false,
        }
    }
}

/// Normalizes a path-prefix value to `""` or `/segment…` (leading slash, no
/// trailing slash), per spec.md §6.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_into_config_uses_defaults_on_missing_fields() {
        let cfg = PoolConfigPatch::default().into_config();
        assert_eq!(cfg.key_pool_size, 5);
        assert_eq!(cfg.key_selection_strategy, SelectionStrategy::Random);
        assert!(!cfg.openai_models.is_empty());
    }

    #[test]
    fn patch_coerces_zero_pool_size_to_default() {
        let mut patch = PoolConfigPatch::default();
        patch.key_pool_size = Some(0);
        let cfg = patch.into_config();
        assert_eq!(cfg.key_pool_size, 5);
    }

    #[test]
    fn normalize_prefix_variants() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("api"), "/api");
        assert_eq!(normalize_prefix("/api/"), "/api");
    }
}
