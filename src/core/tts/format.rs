//! Audio formats and content-type handling.

use serde::{Deserialize, Serialize};

// =============================================================================
// Response Format
// =============================================================================

/// Container format requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Mp3,
    Wav,
}

impl ResponseFormat {
    /// API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }

    #[inline]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
        }
    }

    #[inline]
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Parse from string, with fallback to mp3.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "wav" | "wave" | "audio/wav" | "audio/wave" | "audio/x-wav" => Self::Wav,
            _ => Self::Mp3,
        }
    }
}

impl std::fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Content Types
// =============================================================================

/// Identifies mp3 or wav payloads from their leading bytes.
pub fn sniff_audio_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"ID3")
        || (data.len() >= 2 && data[0] == 0xFF && (data[1] & 0xE0) == 0xE0)
    {
        return Some("audio/mpeg");
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WAVE" {
        return Some("audio/wav");
    }
    None
}

/// Strips parameters and lowercases a `Content-Type` value.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// True for content types that can never carry audio, such as the JSON error
/// bodies some providers return with a 200 status.
pub fn is_non_audio(content_type: &str) -> bool {
    let essence = essence(content_type);
    essence.starts_with("text/")
        || essence.starts_with("application/json")
        || essence.ends_with("+json")
        || essence.starts_with("application/xml")
        || essence.ends_with("+xml")
        || essence == "application/problem"
}

/// Picks the content type of a buffered payload.
///
/// A specific audio header wins. Missing or generic headers fall back to
/// sniffing the bytes, then to `fallback`.
pub fn resolve_content_type(header: Option<&str>, data: &[u8], fallback: &str) -> String {
    if let Some(header) = header.map(essence).filter(|h| !h.is_empty()) {
        if header.starts_with("audio/") {
            return header;
        }
    }
    sniff_audio_mime(data)
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}
