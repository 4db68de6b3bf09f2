//! Merging YAML overrides onto the environment configuration.

use super::yaml::YamlConfig;
use super::{AuthApiSecret, ConfigError, ServerConfig, env};

/// Loads the environment configuration and applies `yaml` on top of it.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let mut config = env::load_from_env()?;
    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml);
    }
    Ok(config)
}

fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
    }

    if let Some(tts) = yaml.tts {
        for profile in tts.providers {
            match config.providers.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => *existing = profile,
                None => config.providers.push(profile),
            }
        }
        if let Some(active) = tts.active_provider {
            config.active_provider = Some(active);
        }
        if let Some(ttl) = tts.voice_cache_ttl_seconds {
            config.voice_cache_ttl_seconds = ttl;
        }
    }

    if let Some(playback) = yaml.playback {
        if let Some(capacity) = playback.cache_capacity {
            config.playback.cache_capacity = capacity;
        }
        if let Some(concurrency) = playback.max_concurrency {
            config.playback.max_concurrency = concurrency;
        }
        if let Some(rate) = playback.rate {
            config.playback.rate = rate;
        }
        if let Some(progressive) = playback.progressive_append {
            config.playback.progressive_append = progressive;
        }
    }

    if let Some(auth) = yaml.auth {
        if let Some(required) = auth.required {
            config.auth_required = required;
        }
        if !auth.api_secrets.is_empty() {
            config.auth_api_secrets = auth
                .api_secrets
                .into_iter()
                .map(|entry| AuthApiSecret {
                    id: entry.id,
                    secret: entry.secret,
                })
                .collect();
        } else if let Some(secret) = auth.api_secret {
            config.auth_api_secrets = vec![AuthApiSecret {
                id: auth.api_secret_id.unwrap_or_else(|| "default".to_string()),
                secret,
            }];
        }
    }

    if let Some(security) = yaml.security {
        if let Some(origins) = security.cors_allowed_origins {
            config.cors_allowed_origins = Some(origins);
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tts::ProviderProfile;

    #[test]
    fn test_yaml_profile_replaces_same_id() {
        let mut config = ServerConfig::default();
        config.providers = vec![
            ProviderProfile::new("openai", "https://api.openai.com/v1").with_api_key("sk-env"),
        ];

        let yaml = YamlConfig::parse(
            r#"
tts:
  providers:
    - id: "openai"
      baseUrl: "http://proxy.internal/v1"
    - id: "local"
      baseUrl: "http://localhost:8880/v1"
"#,
        )
        .unwrap();
        apply_yaml(&mut config, yaml);

        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].base_url, "http://proxy.internal/v1");
        assert!(config.providers[0].api_key.is_none());
        assert_eq!(config.providers[1].id, "local");
    }

    #[test]
    fn test_legacy_yaml_secret() {
        let mut config = ServerConfig::default();
        let yaml =
            YamlConfig::parse("auth:\n  api_secret: \"s\"\n  api_secret_id: \"cli\"\n").unwrap();
        apply_yaml(&mut config, yaml);

        assert_eq!(config.auth_api_secrets.len(), 1);
        assert_eq!(config.auth_api_secrets[0].id, "cli");
    }

    #[test]
    fn test_absent_sections_keep_env_values() {
        let mut config = ServerConfig::default();
        config.rate_limit_burst_size = 42;
        apply_yaml(&mut config, YamlConfig::default());

        assert_eq!(config.rate_limit_burst_size, 42);
        assert_eq!(config.host, "0.0.0.0");
    }
}
