//! OpenAI-compatible client against a mocked HTTP provider.

use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use waav_narrator::core::tts::{
    OpenAICompatibleClient, ProviderProfile, ResponseFormat, SynthesisClient, SynthesisParams,
    TTSErrorCode,
};

fn profile_for(server: &MockServer) -> ProviderProfile {
    ProviderProfile::new("local", format!("{}/v1", server.uri()))
        .with_api_key("sk-test")
        .with_model("kokoro")
        .with_default_voice("af_bella")
        .with_timeout_ms(2_000)
}

fn client() -> OpenAICompatibleClient {
    OpenAICompatibleClient::new().expect("client")
}

#[tokio::test]
async fn test_speech_returns_audio_with_profile_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "input": "Hello there",
            "model": "kokoro",
            "voice": "af_bella",
            "response_format": "mp3",
            "stream": false
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(b"ID3fake-mp3".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let clip = client()
        .synthesize(&profile_for(&server), &SynthesisParams::new("Hello there"))
        .await
        .unwrap();
    assert_eq!(clip.content_type, "audio/mpeg");
    assert_eq!(clip.data.as_ref(), b"ID3fake-mp3");
}

#[tokio::test]
async fn test_speech_request_overrides_and_clamps_speed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(body_partial_json(json!({
            "voice": "am_adam",
            "speed": 4.0,
            "response_format": "wav"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .set_body_bytes(b"RIFF\0\0\0\0WAVEfmt ".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let params = SynthesisParams::new("Hi")
        .with_voice("am_adam")
        .with_speed(9.0)
        .with_response_format(ResponseFormat::Wav);
    let clip = client()
        .synthesize(&profile_for(&server), &params)
        .await
        .unwrap();
    assert_eq!(clip.content_type, "audio/wav");
}

#[tokio::test]
async fn test_unauthorized_keeps_upstream_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided" }
        })))
        .mount(&server)
        .await;

    let err = client()
        .synthesize(&profile_for(&server), &SynthesisParams::new("Hello"))
        .await
        .unwrap_err();
    assert_eq!(err.code, TTSErrorCode::Unauthorized);
    assert_eq!(err.status, 401);
    assert_eq!(err.message, "Incorrect API key provided");
    assert!(err.details.is_some());
}

#[tokio::test]
async fn test_json_success_body_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "queued" })))
        .mount(&server)
        .await;

    let err = client()
        .synthesize(&profile_for(&server), &SynthesisParams::new("Hello"))
        .await
        .unwrap_err();
    assert_eq!(err.code, TTSErrorCode::UpstreamError);
    assert_eq!(err.status, 502);
    let details = err.details.unwrap();
    assert_eq!(details["upstreamStatus"], 200);
    assert!(details["body"].as_str().unwrap().contains("queued"));
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let profile = profile_for(&server).with_timeout_ms(100);
    let err = client()
        .synthesize(&profile, &SynthesisParams::new("Hello"))
        .await
        .unwrap_err();
    assert_eq!(err.code, TTSErrorCode::Timeout);
    assert_eq!(err.status, 504);
}

#[tokio::test]
async fn test_streamed_speech_yields_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(vec![7u8; 4096]),
        )
        .mount(&server)
        .await;

    let stream = client()
        .synthesize_stream(&profile_for(&server), &SynthesisParams::new("Hello"))
        .await
        .unwrap();
    assert_eq!(stream.content_type.as_deref(), Some("audio/mpeg"));

    let chunks: Vec<_> = stream.chunks.collect().await;
    let total: usize = chunks.iter().map(|chunk| chunk.as_ref().unwrap().len()).sum();
    assert_eq!(total, 4096);
}

#[tokio::test]
async fn test_stalled_stream_body_times_out() {
    // Sends one chunk, then keeps the connection open without finishing the body.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: audio/mpeg\r\n\
                  transfer-encoding: chunked\r\n\r\n4\r\nabcd\r\n",
            )
            .await
            .unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let profile = ProviderProfile::new("stalling", format!("http://{addr}/v1"))
        .with_model("kokoro")
        .with_default_voice("af_bella")
        .with_timeout_ms(300);
    let mut stream = client()
        .synthesize_stream(&profile, &SynthesisParams::new("Hello"))
        .await
        .unwrap();

    let first = stream.chunks.next().await.unwrap().unwrap();
    assert_eq!(first.as_ref(), b"abcd");

    let next = tokio::time::timeout(Duration::from_secs(3), stream.chunks.next())
        .await
        .expect("stalled body must not hang the reader");
    let err = next.unwrap().unwrap_err();
    assert_eq!(err.code, TTSErrorCode::Timeout);
    assert_eq!(err.status, 504);
    assert!(stream.chunks.next().await.is_none());
}

#[tokio::test]
async fn test_voices_are_discovered_filtered_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/audio/voices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "voices": [
                { "id": "af_bella", "name": "Bella", "language": "en-US" },
                { "id": "jf_alpha", "language": "ja-JP" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let profile = profile_for(&server);

    let all = client.list_voices(&profile, None).await.unwrap();
    assert_eq!(all.len(), 2);

    let japanese = client.list_voices(&profile, Some("ja")).await.unwrap();
    assert_eq!(japanese.len(), 1);
    assert_eq!(japanese[0].id, "jf_alpha");
    assert_eq!(japanese[0].name, "jf_alpha");
}

#[tokio::test]
async fn test_missing_voice_endpoint_yields_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/audio/voices"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let voices = client()
        .list_voices(&profile_for(&server), None)
        .await
        .unwrap();
    assert!(voices.is_empty());
}

#[tokio::test]
async fn test_health_lists_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "kokoro" }, { "id": "tts-1" }]
        })))
        .mount(&server)
        .await;

    let report = client().health(&profile_for(&server)).await.unwrap();
    assert!(report.ok);
    assert_eq!(
        report.models,
        Some(vec!["kokoro".to_string(), "tts-1".to_string()])
    );
}

#[tokio::test]
async fn test_health_reports_upstream_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client().health(&profile_for(&server)).await.unwrap_err();
    assert_eq!(err.code, TTSErrorCode::UpstreamError);
    assert_eq!(err.status, 503);
}
