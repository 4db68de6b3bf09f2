//! OpenAI-compatible provider.
//!
//! Works with the first-party OpenAI Audio Speech API and with self-hosted
//! servers that mirror it.
//!
//! # Example
//!
//! ```rust,ignore
//! use waav_narrator::core::tts::{
//!     OpenAICompatibleClient, ProviderProfile, SynthesisClient, SynthesisParams,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = OpenAICompatibleClient::new().unwrap();
//!     let profile =
//!         ProviderProfile::new("openai", "https://api.openai.com/v1").with_api_key("sk-...");
//!     let clip = client
//!         .synthesize(&profile, &SynthesisParams::new("Hello, world!").with_voice("nova"))
//!         .await
//!         .unwrap();
//!     println!("{} bytes of {}", clip.len(), clip.content_type);
//! }
//! ```

mod config;
mod provider;

pub use config::{MAX_SPEED, MIN_SPEED, OpenAIVoice, builtin_voices, clamp_speed};
pub use provider::{DEFAULT_VOICE_CACHE_TTL, OpenAICompatibleClient};
