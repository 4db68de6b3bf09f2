mod base;
pub mod format;
pub mod openai;
pub mod profile;

pub use base::{
    AudioClip, HealthReport, MAX_ERROR_EXCERPT_CHARS, SynthesisClient, SynthesisParams,
    SynthesisStream, TTSError, TTSErrorCode, TTSResult, Voice, body_excerpt, filter_voices,
};
pub use format::{ResponseFormat, resolve_content_type, sniff_audio_mime};
pub use openai::{DEFAULT_VOICE_CACHE_TTL, OpenAICompatibleClient, OpenAIVoice};
pub use profile::{
    ChunkingOptions, DEFAULT_PREFETCH_WINDOW, DEFAULT_TIMEOUT_MS, OPENAI_BASE_URL,
    ProviderProfile, ProviderRegistry, ProviderSummary, ProviderType,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Factory function to create a synthesis client.
///
/// # Supported Providers
///
/// - [`ProviderType::OpenAICompatible`] (`"openai"`, `"openai-compatible"`)
///
/// # Example
///
/// ```rust,ignore
/// use waav_narrator::core::tts::{create_synthesis_client, ProviderType};
///
/// let client = create_synthesis_client(ProviderType::OpenAICompatible, DEFAULT_VOICE_CACHE_TTL)?;
/// ```
pub fn create_synthesis_client(
    provider_type: ProviderType,
    voice_cache_ttl: Duration,
) -> TTSResult<Arc<dyn SynthesisClient>> {
    match provider_type {
        ProviderType::OpenAICompatible => Ok(Arc::new(OpenAICompatibleClient::with_voice_cache_ttl(
            voice_cache_ttl,
        )?)),
    }
}

/// One client per provider type, shared by every profile of that type.
#[derive(Clone, Default)]
pub struct SynthesisClients {
    clients: HashMap<ProviderType, Arc<dyn SynthesisClient>>,
}

impl SynthesisClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client for every provider type used by `profiles`.
    pub fn for_profiles(
        profiles: &[ProviderProfile],
        voice_cache_ttl: Duration,
    ) -> TTSResult<Self> {
        let mut clients = Self::new();
        for profile in profiles {
            if !clients.clients.contains_key(&profile.provider_type) {
                let client = create_synthesis_client(profile.provider_type, voice_cache_ttl)?;
                clients.insert(profile.provider_type, client);
            }
        }
        Ok(clients)
    }

    pub fn insert(&mut self, provider_type: ProviderType, client: Arc<dyn SynthesisClient>) {
        self.clients.insert(provider_type, client);
    }

    pub fn with_client(
        mut self,
        provider_type: ProviderType,
        client: Arc<dyn SynthesisClient>,
    ) -> Self {
        self.insert(provider_type, client);
        self
    }

    pub fn get(&self, provider_type: ProviderType) -> TTSResult<Arc<dyn SynthesisClient>> {
        self.clients.get(&provider_type).cloned().ok_or_else(|| {
            TTSError::invalid_provider(format!("No client for provider type '{provider_type}'"))
        })
    }

    pub fn for_profile(&self, profile: &ProviderProfile) -> TTSResult<Arc<dyn SynthesisClient>> {
        self.get(profile.provider_type)
    }
}
