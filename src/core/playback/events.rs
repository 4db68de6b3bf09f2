//! Events yielded by [`super::PlaybackEngine::speak`].

use serde::Serialize;
use thiserror::Error;

use crate::core::tts::{TTSError, TTSErrorCode};

/// Terminal failure of one `speak()` call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    /// The call's cancellation token fired.
    #[error("Playback aborted")]
    Aborted,

    #[error(transparent)]
    Synthesis(TTSError),

    /// The audio sink failed to play a clip.
    #[error("Audio output failed: {0}")]
    Output(String),

    #[error("No active TTS provider configured")]
    NoProvider,

    #[error("Speech engine '{0}' is not registered")]
    UnknownEngine(String),
}

impl PlaybackError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Aborted => TTSErrorCode::Aborted.as_str(),
            Self::Synthesis(e) => e.code.as_str(),
            Self::Output(_) => "OutputError",
            Self::NoProvider => TTSErrorCode::InvalidProvider.as_str(),
            Self::UnknownEngine(_) => "UnknownEngine",
        }
    }

    /// HTTP-style status, when the failure came from a provider.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Synthesis(e) => Some(e.status),
            Self::Aborted => Some(TTSErrorCode::Aborted.default_status()),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<TTSError> for PlaybackError {
    fn from(error: TTSError) -> Self {
        if error.is_aborted() {
            Self::Aborted
        } else {
            Self::Synthesis(error)
        }
    }
}

/// One step of an utterance's playback.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A segment anchored at `mark` is about to be voiced.
    Boundary { mark: String },
    /// Playback stopped early. Always the last event.
    Error(PlaybackError),
    /// Every segment was played. Always the last event.
    End,
}

impl PlaybackEvent {
    pub fn boundary(mark: impl Into<String>) -> Self {
        Self::Boundary { mark: mark.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Boundary { .. } => "boundary",
            Self::Error(_) => "error",
            Self::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Boundary { .. })
    }

    /// Serializable view for logs and the CLI.
    pub fn record(&self) -> EventRecord {
        match self {
            Self::Boundary { mark } => EventRecord {
                code: self.kind(),
                mark: Some(mark.clone()),
                error: None,
                status: None,
                message: None,
            },
            Self::Error(error) => EventRecord {
                code: self.kind(),
                mark: None,
                error: Some(error.code()),
                status: error.status(),
                message: Some(error.to_string()),
            },
            Self::End => EventRecord {
                code: self.kind(),
                mark: None,
                error: None,
                status: None,
                message: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
