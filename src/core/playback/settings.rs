//! Playback settings snapshots.
//!
//! The engine reads provider, rate and voice afresh at the start of every
//! `speak()` call, so changes made while an utterance plays apply to the next
//! one.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::core::tts::ProviderProfile;

/// Default playback rate.
pub const DEFAULT_RATE: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SettingsSnapshot {
    /// Active provider profile, if any.
    pub provider: Option<ProviderProfile>,
    pub rate: f32,
    /// Overrides the profile's default voice.
    pub voice: Option<String>,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            provider: None,
            rate: DEFAULT_RATE,
            voice: None,
        }
    }
}

impl SettingsSnapshot {
    /// Voice to request: the explicit override, else the profile default.
    pub fn effective_voice(&self) -> Option<String> {
        self.voice
            .clone()
            .filter(|voice| !voice.trim().is_empty())
            .or_else(|| self.provider.as_ref().map(|p| p.default_voice.clone()))
    }
}

/// Source of settings snapshots.
pub trait PlaybackSettings: Send + Sync {
    fn snapshot(&self) -> SettingsSnapshot;
}

/// Lock-free settings cell shared between the controller and the engine.
#[derive(Debug, Default)]
pub struct SharedSettings {
    inner: ArcSwap<SettingsSnapshot>,
}

impl SharedSettings {
    pub fn new(snapshot: SettingsSnapshot) -> Self {
        Self {
            inner: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn load(&self) -> Arc<SettingsSnapshot> {
        self.inner.load_full()
    }

    pub fn set_provider(&self, provider: Option<ProviderProfile>) {
        self.update(|snapshot| snapshot.provider = provider.clone());
    }

    /// Non-finite or non-positive rates are ignored.
    pub fn set_rate(&self, rate: f32) {
        if rate.is_finite() && rate > 0.0 {
            self.update(|snapshot| snapshot.rate = rate);
        }
    }

    pub fn set_voice(&self, voice: Option<String>) {
        self.update(|snapshot| snapshot.voice = voice.clone());
    }

    fn update(&self, apply: impl Fn(&mut SettingsSnapshot)) {
        self.inner.rcu(|current| {
            let mut next = SettingsSnapshot::clone(current);
            apply(&mut next);
            next
        });
    }
}

impl PlaybackSettings for SharedSettings {
    fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot::clone(&self.inner.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updates_are_visible_in_next_snapshot() {
        let settings = SharedSettings::default();
        assert_eq!(settings.snapshot().rate, DEFAULT_RATE);

        settings.set_rate(1.5);
        settings.set_voice(Some("nova".to_string()));
        settings.set_provider(Some(ProviderProfile::new("p", "http://localhost")));

        let snapshot = settings.snapshot();
        assert_eq!(snapshot.rate, 1.5);
        assert_eq!(snapshot.effective_voice().as_deref(), Some("nova"));
        assert_eq!(snapshot.provider.unwrap().id, "p");
    }

    #[test]
    fn test_invalid_rate_is_ignored() {
        let settings = SharedSettings::default();
        settings.set_rate(0.0);
        settings.set_rate(f32::NAN);
        assert_eq!(settings.snapshot().rate, DEFAULT_RATE);
    }

    #[test]
    fn test_effective_voice_falls_back_to_profile() {
        let snapshot = SettingsSnapshot {
            provider: Some(
                ProviderProfile::new("p", "http://localhost").with_default_voice("echo"),
            ),
            rate: 1.0,
            voice: Some(" ".to_string()),
        };
        assert_eq!(snapshot.effective_voice().as_deref(), Some("echo"));
    }
}
