pub mod cache;
pub mod controller;
pub mod playback;
pub mod scheduler;
pub mod text;
pub mod tts;

// Re-export commonly used types for convenience
pub use cache::{AudioCache, CacheKey};
pub use controller::{
    ControllerOutcome, EngineRegistry, PlaybackState, SectionSource, SpeechEngine, TtsController,
    VecSectionSource,
};
pub use playback::{
    AudioSink, FileSink, PlaybackEngine, PlaybackError, PlaybackEvent, RuntimeCapabilities,
    SharedSettings,
};
pub use scheduler::{AudioScheduler, SchedulerConfig};
pub use text::{Mark, Segment, SegmentOptions, Utterance, build_segments};
pub use tts::{
    AudioClip, ProviderProfile, ProviderRegistry, SynthesisClient, SynthesisClients,
    SynthesisParams, TTSError, TTSErrorCode, TTSResult, Voice,
};
