//! Constants and built-in catalogue for OpenAI-compatible providers.
//!
//! Covers the speech request body, the speed range and the voices of the
//! first-party API, which are used when `GET /audio/voices` is not offered.

use serde::{Deserialize, Serialize};

use crate::core::tts::base::Voice;
use crate::core::tts::format::ResponseFormat;

/// Path of the speech endpoint, relative to the profile base URL.
pub const SPEECH_PATH: &str = "audio/speech";
/// Path of the optional voice catalogue endpoint.
pub const VOICES_PATH: &str = "audio/voices";
/// Path of the model listing used as a health probe.
pub const MODELS_PATH: &str = "models";

pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

/// Clamps a playback rate into the range accepted by the API.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    }
}

// =============================================================================
// OpenAI TTS Voices
// =============================================================================

/// Voices of the first-party OpenAI API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIVoice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Fable,
    Onyx,
    Nova,
    Sage,
    Shimmer,
    Verse,
}

impl OpenAIVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Display name shown in voice pickers.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Alloy => "Alloy",
            Self::Ash => "Ash",
            Self::Ballad => "Ballad",
            Self::Coral => "Coral",
            Self::Echo => "Echo",
            Self::Fable => "Fable",
            Self::Onyx => "Onyx",
            Self::Nova => "Nova",
            Self::Sage => "Sage",
            Self::Shimmer => "Shimmer",
            Self::Verse => "Verse",
        }
    }

    pub fn all() -> &'static [OpenAIVoice] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Ballad,
            Self::Coral,
            Self::Echo,
            Self::Fable,
            Self::Onyx,
            Self::Nova,
            Self::Sage,
            Self::Shimmer,
            Self::Verse,
        ]
    }

    /// The voices are multilingual, so no language is attached.
    pub fn to_voice(self) -> Voice {
        Voice::new(self.as_str(), self.display_name(), None)
    }
}

impl std::fmt::Display for OpenAIVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Built-in voice list of the first-party API.
pub fn builtin_voices() -> Vec<Voice> {
    OpenAIVoice::all().iter().map(|voice| voice.to_voice()).collect()
}

// =============================================================================
// Wire Types
// =============================================================================

/// Body of `POST {base}/audio/speech`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechRequestBody<'a> {
    pub input: &'a str,
    pub model: &'a str,
    pub voice: &'a str,
    pub speed: f32,
    pub response_format: ResponseFormat,
    pub stream: bool,
}

/// `GET {base}/audio/voices` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoicesResponse {
    #[serde(default)]
    pub voices: Vec<VoiceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "language")]
    pub lang: Option<String>,
}

impl From<VoiceEntry> for Voice {
    fn from(entry: VoiceEntry) -> Self {
        Voice {
            name: entry.name.unwrap_or_else(|| entry.id.clone()),
            id: entry.id,
            lang: entry.lang,
        }
    }
}

/// `GET {base}/models` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub id: String,
}
