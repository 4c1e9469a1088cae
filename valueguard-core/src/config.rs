use crate::categorize::LlmConfig;
use crate::identity::IdentityConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub db_path: String,
    pub bind: String,
    pub identity: IdentityConfig,
    pub seed_demo: bool,
    pub llm: Option<LlmConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "valueguard.db".into(),
            bind: "0.0.0.0:8080".into(),
            identity: IdentityConfig::default(),
            seed_demo: false,
            llm: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let token_secret = match lookup("VALUEGUARD_TOKEN_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!("VALUEGUARD_TOKEN_SECRET unset; using the development secret");
                defaults.identity.token_secret.clone()
            }
        };

        Self {
            db_path: lookup("VALUEGUARD_DB").unwrap_or(defaults.db_path),
            bind: lookup("VALUEGUARD_BIND").unwrap_or(defaults.bind),
            identity: IdentityConfig {
                token_secret,
                token_ttl_secs: lookup("VALUEGUARD_TOKEN_TTL_SECS")
                    .and_then(|v| v.parse::<i64>().ok())
                    .filter(|ttl| *ttl > 0)
                    .unwrap_or(defaults.identity.token_ttl_secs),
                ..defaults.identity
            },
            seed_demo: lookup("VALUEGUARD_SEED_DEMO")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            llm: build_llm_config(&lookup),
        }
    }
}

/// `None` when the key variable is unset, which turns categorization off.
fn build_llm_config(lookup: &impl Fn(&str) -> Option<String>) -> Option<LlmConfig> {
    let api_key_env = lookup("LLM_API_KEY_ENV").unwrap_or_else(|| "OPENAI_API_KEY".into());
    lookup(&api_key_env)?;

    Some(LlmConfig {
        provider: lookup("LLM_PROVIDER").unwrap_or_else(|| "openai".into()),
        model: lookup("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
        api_key_env,
        temperature: lookup("LLM_TEMPERATURE")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.2),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(env(&[]));
        assert_eq!(config.db_path, "valueguard.db");
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.identity.token_ttl_secs, 3600);
        assert!(!config.seed_demo);
        assert!(config.llm.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = AppConfig::from_lookup(env(&[
            ("VALUEGUARD_DB", "/var/lib/vg.db"),
            ("VALUEGUARD_TOKEN_SECRET", "s3cret"),
            ("VALUEGUARD_TOKEN_TTL_SECS", "60"),
            ("VALUEGUARD_SEED_DEMO", "TRUE"),
            ("LLM_API_KEY_ENV", "MY_KEY"),
            ("MY_KEY", "sk-test"),
            ("LLM_TEMPERATURE", "0.5"),
        ]));
        assert_eq!(config.db_path, "/var/lib/vg.db");
        assert_eq!(config.identity.token_secret, "s3cret");
        assert_eq!(config.identity.token_ttl_secs, 60);
        assert!(config.seed_demo);

        let llm = config.llm.expect("llm configured");
        assert_eq!(llm.api_key_env, "MY_KEY");
        assert_eq!(llm.model, "gpt-4o-mini");
        assert!((llm.temperature - 0.5).abs() < f64::EPSILON);
    }
}
