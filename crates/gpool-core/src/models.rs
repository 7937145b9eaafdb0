use gpool_common::{PoolConfig, Provider};

/// Resolves a model name to its provider via a static prefix table
/// (spec.md §4.8, glossary "Provider"). Anthropic models are always
/// `claude-*`; everything else is treated as OpenAI-compatible, matching
/// the gateway's two-upstream scope.
pub fn resolve_provider(model: &str) -> Option<Provider> {
    if model.is_empty() {
        return None;
    }
    if model.starts_with("claude-") {
        Some(Provider::Anthropic)
    } else if model.starts_with("gpt-") || model.starts_with("o1") || model.starts_with("o3") {
        Some(Provider::OpenAi)
    } else {
        None
    }
}

/// True when the resolved provider's allow-list in the configuration
/// snapshot contains the model (spec.md §4.8).
pub fn is_model_allowed(config: &PoolConfig, provider: Provider, model: &str) -> bool {
    match provider {
        Provider::OpenAi => config.openai_models.contains(model),
        Provider::Anthropic => config.anthropic_models.contains(model),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_prefixes() {
        assert_eq!(resolve_provider("claude-3-5-sonnet-20241022"), Some(Provider::Anthropic));
        assert_eq!(resolve_provider("gpt-4o-mini"), Some(Provider::OpenAi));
        assert_eq!(resolve_provider(""), None);
        assert_eq!(resolve_provider("gpt-banana"), Some(Provider::OpenAi));
    }

    #[test]
    fn allow_list_checks_the_right_set() {
        let config = PoolConfig::default();
        assert!(is_model_allowed(&config, Provider::OpenAi, "gpt-4o-mini"));
        assert!(!is_model_allowed(&config, Provider::OpenAi, "gpt-banana"));
    }
}
