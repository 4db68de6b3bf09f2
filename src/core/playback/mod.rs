//! Utterance playback.

pub mod engine;
pub mod events;
pub mod settings;
pub mod sink;

pub use engine::{MarkDispatcher, PlaybackEngine};
pub use events::{EventRecord, PlaybackError, PlaybackEvent};
pub use settings::{DEFAULT_RATE, PlaybackSettings, SettingsSnapshot, SharedSettings};
pub use sink::{AudioSink, FileSink, RuntimeCapabilities, SinkError, StreamSession};
