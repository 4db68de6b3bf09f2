use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::tts::{
    ProviderProfile, ProviderRegistry, SynthesisClient, SynthesisClients, TTSResult,
};

/// Shared state of the proxy server.
pub struct AppState {
    pub config: ServerConfig,
    pub providers: ProviderRegistry,
    pub clients: SynthesisClients,
}

impl AppState {
    /// Builds the state with one HTTP client per configured provider type.
    pub fn new(config: ServerConfig) -> TTSResult<Arc<Self>> {
        let clients = SynthesisClients::for_profiles(&config.providers, config.voice_cache_ttl())?;
        Ok(Self::with_clients(config, clients))
    }

    pub fn with_clients(config: ServerConfig, clients: SynthesisClients) -> Arc<Self> {
        let providers = config.provider_registry();
        Arc::new(Self {
            config,
            providers,
            clients,
        })
    }

    /// Profile named `provider` (or the active one) with its client.
    pub fn resolve(
        &self,
        provider: Option<&str>,
    ) -> TTSResult<(&ProviderProfile, Arc<dyn SynthesisClient>)> {
        let profile = self.providers.resolve(provider)?;
        let client = self.clients.for_profile(profile)?;
        Ok((profile, client))
    }
}
