//! End-to-end tests of the playback engine over a mocked provider.

mod mock_providers;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use mock_providers::{MockSynthesisClient, RecordingSink, engine, profile, settings_for};
use waav_narrator::core::playback::{
    PlaybackEngine, PlaybackError, PlaybackEvent, RuntimeCapabilities,
};
use waav_narrator::core::scheduler::{AudioScheduler, SchedulerConfig};
use waav_narrator::core::text::{Mark, Utterance};
use waav_narrator::core::tts::{ProviderProfile, TTSError};

fn sentence(i: usize) -> String {
    format!("Sentence number {i} is long enough to stand as a segment of its own.")
}

/// Four marks, each long enough to become its own segment.
fn four_sentences() -> Utterance {
    let mut offset = 0;
    let marks = (0..4)
        .map(|i| {
            let text = sentence(i);
            let mark = Mark::new(i.to_string(), text.clone(), "en", offset);
            offset += text.chars().count() + 1;
            mark
        })
        .collect();
    Utterance::new(marks)
}

fn windowed(id: &str, window: usize) -> ProviderProfile {
    let mut profile = profile(id);
    profile.chunking.prefetch_window = window;
    profile
}

fn boundaries(events: &[PlaybackEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::Boundary { mark } => Some(mark.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_four_segments_with_window_two() {
    let client = Arc::new(MockSynthesisClient::new().with_delay(Duration::from_millis(15)));
    let sink = Arc::new(RecordingSink::new().with_play_delay(Duration::from_millis(5)));
    let engine = engine(
        client.clone(),
        sink.clone(),
        settings_for(windowed("local", 2)),
        RuntimeCapabilities::buffered_only(),
    );

    let events: Vec<PlaybackEvent> = engine
        .speak(four_sentences(), CancellationToken::new(), false)
        .collect()
        .await;

    assert_eq!(boundaries(&events), vec!["0", "1", "2", "3"]);
    assert_eq!(events.last(), Some(&PlaybackEvent::End));
    assert_eq!(events.len(), 5);

    assert!(client.peak_concurrency() <= 2, "peak {}", client.peak_concurrency());
    assert_eq!(client.call_count(), 4);

    let expected: Vec<_> = (0..4).map(|i| MockSynthesisClient::audio_for(&sentence(i))).collect();
    assert_eq!(sink.played_audio(), expected);
    assert!(sink.played().iter().all(|clip| clip.content_type == "audio/mpeg"));
}

#[tokio::test]
async fn test_unauthorized_provider_ends_with_error() {
    let body = r#"{"error":{"message":"Incorrect API key provided"}}"#;
    let client = Arc::new(MockSynthesisClient::new().fail_with(TTSError::from_status(401, body)));
    let sink = Arc::new(RecordingSink::new());
    let engine = engine(
        client,
        sink.clone(),
        settings_for(profile("openai")),
        RuntimeCapabilities::buffered_only(),
    );

    let events: Vec<PlaybackEvent> = engine
        .speak(four_sentences(), CancellationToken::new(), false)
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], PlaybackEvent::boundary("0"));
    let PlaybackEvent::Error(error) = &events[1] else {
        panic!("expected an error event, got {:?}", events[1]);
    };
    assert_eq!(error.status(), Some(401));
    assert_eq!(error.code(), "Unauthorized");
    assert!(error.to_string().contains("Incorrect API key"));
    assert!(sink.played().is_empty());

    // Prefetched segments fail the same way; wait for them to settle.
    let scheduler = engine.scheduler();
    timeout(Duration::from_secs(1), async {
        while scheduler.in_flight_len() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("failed requests should leave the in-flight map");
    assert_eq!(scheduler.cached_len(), 0);
    assert_eq!(scheduler.in_flight_len(), 0);
}

#[tokio::test]
async fn test_cancel_aborts_promptly_and_next_speak_is_clean() {
    let client = Arc::new(MockSynthesisClient::new().with_delay(Duration::from_millis(200)));
    let sink = Arc::new(RecordingSink::new());
    let engine = engine(
        client.clone(),
        sink.clone(),
        settings_for(profile("local")),
        RuntimeCapabilities::buffered_only(),
    );

    let cancel = CancellationToken::new();
    let mut events = engine.speak(four_sentences(), cancel.clone(), false);
    assert_eq!(events.next().await, Some(PlaybackEvent::boundary("0")));

    cancel.cancel();
    let next = timeout(Duration::from_millis(50), events.next())
        .await
        .expect("abort should not wait for the provider");
    assert_eq!(next, Some(PlaybackEvent::Error(PlaybackError::Aborted)));
    assert_eq!(events.next().await, None);
    assert!(sink.stop_count() >= 1);
    assert!(sink.played().is_empty());

    let fresh = Utterance::from_plain_text("A different sentence entirely.", "en");
    let events: Vec<PlaybackEvent> = engine
        .speak(fresh, CancellationToken::new(), false)
        .collect()
        .await;
    assert_eq!(events, vec![PlaybackEvent::boundary("0"), PlaybackEvent::End]);
    assert_eq!(sink.played().len(), 1);
}

#[tokio::test]
async fn test_engine_stop_aborts_current_speak() {
    let client = Arc::new(MockSynthesisClient::new().with_delay(Duration::from_millis(200)));
    let sink = Arc::new(RecordingSink::new());
    let engine = Arc::new(engine(
        client,
        sink.clone(),
        settings_for(profile("local")),
        RuntimeCapabilities::buffered_only(),
    ));

    let mut events = engine.speak(four_sentences(), CancellationToken::new(), false);
    assert_eq!(events.next().await, Some(PlaybackEvent::boundary("0")));

    engine.stop();
    engine.stop();
    let next = timeout(Duration::from_millis(50), events.next()).await.unwrap();
    assert_eq!(next, Some(PlaybackEvent::Error(PlaybackError::Aborted)));
    assert_eq!(engine.scheduler().in_flight_len(), 0);
}

#[tokio::test]
async fn test_preload_warms_first_window_only() {
    let client = Arc::new(MockSynthesisClient::new().with_delay(Duration::from_millis(5)));
    let sink = Arc::new(RecordingSink::new());
    let engine = engine(
        client.clone(),
        sink.clone(),
        settings_for(windowed("local", 2)),
        RuntimeCapabilities::buffered_only(),
    );

    let events: Vec<PlaybackEvent> = engine
        .speak(four_sentences(), CancellationToken::new(), true)
        .collect()
        .await;
    assert_eq!(events, vec![PlaybackEvent::End]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut warmed = client.calls();
    warmed.sort();
    assert_eq!(warmed, vec![sentence(0), sentence(1)]);
    assert_eq!(engine.scheduler().cached_len(), 2);
    assert!(sink.played().is_empty());

    let events: Vec<PlaybackEvent> = engine
        .speak(four_sentences(), CancellationToken::new(), false)
        .collect()
        .await;
    assert_eq!(events.last(), Some(&PlaybackEvent::End));
    assert_eq!(client.call_count(), 4);
}

#[tokio::test]
async fn test_repeated_speak_is_served_from_cache() {
    let client = Arc::new(MockSynthesisClient::new());
    let sink = Arc::new(RecordingSink::new());
    let engine = engine(
        client.clone(),
        sink.clone(),
        settings_for(profile("local")),
        RuntimeCapabilities::buffered_only(),
    );

    for _ in 0..2 {
        let events: Vec<PlaybackEvent> = engine
            .speak(four_sentences(), CancellationToken::new(), false)
            .collect()
            .await;
        assert_eq!(events.last(), Some(&PlaybackEvent::End));
    }

    assert_eq!(client.call_count(), 4);
    assert_eq!(sink.played().len(), 8);
}

#[tokio::test]
async fn test_streamed_segment_is_appended_progressively() {
    let client = Arc::new(MockSynthesisClient::new().with_delay(Duration::from_millis(5)));
    let sink = Arc::new(RecordingSink::new());
    let engine = engine(
        client.clone(),
        sink.clone(),
        settings_for(profile("local").with_stream(true)),
        RuntimeCapabilities::progressive(),
    );

    let events: Vec<PlaybackEvent> = engine
        .speak(four_sentences(), CancellationToken::new(), false)
        .collect()
        .await;
    assert_eq!(boundaries(&events), vec!["0", "1", "2", "3"]);
    assert_eq!(events.last(), Some(&PlaybackEvent::End));

    let played = sink.played();
    assert_eq!(played.len(), 4);
    assert!(played[0].streamed);
    assert_eq!(played[0].data, MockSynthesisClient::audio_for(&sentence(0)));

    // Every segment was requested exactly once, streamed or prefetched.
    let mut calls = client.calls();
    calls.sort();
    let mut expected: Vec<String> = (0..4).map(sentence).collect();
    expected.sort();
    assert_eq!(calls, expected);
    assert!(client.stream_call_count() >= 1);
}

#[tokio::test]
async fn test_rejected_stream_falls_back_to_buffering_same_response() {
    let client = Arc::new(MockSynthesisClient::new());
    let sink = Arc::new(RecordingSink::new().rejecting_streams());
    let engine = engine(
        client.clone(),
        sink.clone(),
        settings_for(profile("local").with_stream(true)),
        RuntimeCapabilities::progressive(),
    );

    let utterance = Utterance::from_plain_text("Only one short segment.", "en");
    let events: Vec<PlaybackEvent> = engine
        .speak(utterance, CancellationToken::new(), false)
        .collect()
        .await;
    assert_eq!(events, vec![PlaybackEvent::boundary("0"), PlaybackEvent::End]);

    assert_eq!(client.call_count(), 1);
    assert_eq!(client.stream_call_count(), 1);

    let played = sink.played();
    assert_eq!(played.len(), 1);
    assert!(!played[0].streamed);
    assert_eq!(played[0].data, MockSynthesisClient::audio_for("Only one short segment."));
    assert_eq!(played[0].content_type, "audio/mpeg");
}

#[tokio::test]
async fn test_append_failure_mid_stream_buffers_the_rest() {
    let client = Arc::new(MockSynthesisClient::new());
    let sink = Arc::new(RecordingSink::new().failing_appends_after(2));
    let engine = engine(
        client.clone(),
        sink.clone(),
        settings_for(profile("local").with_stream(true)),
        RuntimeCapabilities::progressive(),
    );

    let text = "Only one short segment.";
    let utterance = Utterance::from_plain_text(text, "en");
    let events: Vec<PlaybackEvent> = engine
        .speak(utterance, CancellationToken::new(), false)
        .collect()
        .await;
    assert_eq!(events, vec![PlaybackEvent::boundary("0"), PlaybackEvent::End]);

    // The progressive part is heard first, then the buffered remainder.
    let played = sink.played();
    assert_eq!(played.len(), 2);
    assert!(played[0].streamed);
    assert!(!played[1].streamed);
    assert_eq!(played[0].data.len(), 8);
    let mut joined = played[0].data.to_vec();
    joined.extend_from_slice(&played[1].data);
    assert_eq!(joined, MockSynthesisClient::audio_for(text).to_vec());

    // One request only, and its audio was cached.
    assert_eq!(client.call_count(), 1);
    assert_eq!(client.stream_call_count(), 1);
    assert_eq!(engine.scheduler().cached_len(), 1);

    let again: Vec<PlaybackEvent> = engine
        .speak(Utterance::from_plain_text(text, "en"), CancellationToken::new(), false)
        .collect()
        .await;
    assert_eq!(again.last(), Some(&PlaybackEvent::End));
    assert_eq!(client.call_count(), 1);
    assert_eq!(sink.played()[2].data, MockSynthesisClient::audio_for(text));
}

#[tokio::test]
async fn test_stream_releases_its_slot_before_playback_finishes() {
    let client = Arc::new(MockSynthesisClient::new());
    let sink = Arc::new(RecordingSink::new().with_play_delay(Duration::from_millis(300)));
    let scheduler = Arc::new(AudioScheduler::new(
        client.clone(),
        SchedulerConfig {
            max_concurrency: 1,
            ..SchedulerConfig::default()
        },
    ));
    let engine = PlaybackEngine::new(
        scheduler,
        sink.clone(),
        settings_for(profile("local").with_stream(true)),
        RuntimeCapabilities::progressive(),
    );

    let speaking = tokio::spawn(
        engine
            .speak(four_sentences(), CancellationToken::new(), false)
            .collect::<Vec<_>>(),
    );

    // With a single slot, the next segment can only be fetched once the
    // streamed read gave it back, while the first segment is still audible.
    timeout(Duration::from_millis(250), async {
        while client.call_count() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("prefetch should start while the stream is still playing");
    assert!(sink.played().is_empty());

    let events = speaking.await.unwrap();
    assert_eq!(events.last(), Some(&PlaybackEvent::End));
}

#[tokio::test]
async fn test_streamed_audio_without_content_type_uses_profile_format() {
    let client = Arc::new(MockSynthesisClient::new().with_stream_content_type(None));
    let sink = Arc::new(RecordingSink::new());
    let engine = engine(
        client,
        sink.clone(),
        settings_for(profile("local").with_stream(true)),
        RuntimeCapabilities::progressive().with_mime_types(["audio/mpeg"]),
    );

    let utterance = Utterance::from_plain_text("Short.", "en");
    let events: Vec<PlaybackEvent> = engine
        .speak(utterance, CancellationToken::new(), false)
        .collect()
        .await;
    assert_eq!(events.last(), Some(&PlaybackEvent::End));
    assert_eq!(sink.played()[0].content_type, "audio/mpeg");
    assert!(sink.played()[0].streamed);
}

#[tokio::test]
async fn test_missing_provider_and_empty_utterance() {
    let client = Arc::new(MockSynthesisClient::new());
    let sink = Arc::new(RecordingSink::new());

    let no_provider = engine(
        client.clone(),
        sink.clone(),
        Arc::new(Default::default()),
        RuntimeCapabilities::buffered_only(),
    );
    let events: Vec<PlaybackEvent> = no_provider
        .speak(four_sentences(), CancellationToken::new(), false)
        .collect()
        .await;
    assert_eq!(events, vec![PlaybackEvent::Error(PlaybackError::NoProvider)]);

    let configured = engine(
        client.clone(),
        sink,
        settings_for(profile("local")),
        RuntimeCapabilities::buffered_only(),
    );
    let events: Vec<PlaybackEvent> = configured
        .speak(Utterance::from_plain_text("   ", "en"), CancellationToken::new(), false)
        .collect()
        .await;
    assert_eq!(events, vec![PlaybackEvent::End]);
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_marks_are_dispatched_before_boundaries() {
    let client = Arc::new(MockSynthesisClient::new());
    let sink = Arc::new(RecordingSink::new());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);

    let engine = engine(
        client,
        sink,
        settings_for(profile("local")),
        RuntimeCapabilities::buffered_only(),
    )
    .with_dispatcher(Arc::new(move |mark: &Mark| recorder.lock().push(mark.name.clone())));

    let events: Vec<PlaybackEvent> = engine
        .speak(four_sentences(), CancellationToken::new(), false)
        .collect()
        .await;
    assert_eq!(boundaries(&events), *seen.lock());
}
