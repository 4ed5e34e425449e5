//! HTTP contract tests for the chat, transcription and speech clients.
//!
//! These verify request shape and response handling against a mock server;
//! the end-to-end typed flow lives in `typed_commands`.

use cabin::audio::Utterance;
use cabin::audio::wav::encode_wav;
use cabin::config::{AudioConfig, LlmConfig, SttConfig, TtsConfig};
use cabin::llm::{ApiChat, ChatClient, ChatMessage};
use cabin::stt::{HttpTranscriber, SpeechToText, Transcript};
use cabin::tts::HttpSpeaker;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn llm_config(server: &MockServer) -> LlmConfig {
    LlmConfig {
        api_url: server.uri(),
        api_model: "qwen3:4b".to_owned(),
        api_key: "sk-test".to_owned(),
        ..LlmConfig::default()
    }
}

fn messages() -> Vec<ChatMessage> {
    vec![ChatMessage::system("You are a car assistant."), ChatMessage::user("hello")]
}

fn speech(seconds: f32) -> Utterance {
    Utterance {
        samples: vec![0.3; (16_000.0 * seconds) as usize],
        sample_rate: 16_000,
    }
}

/// Multipart bodies carry binary audio, so match on a lossy view.
fn body_mentions(needle: &'static str) -> impl Fn(&Request) -> bool + Send + Sync {
    move |request: &Request| String::from_utf8_lossy(&request.body).contains(needle)
}

// ── Chat completions ────────────────────────────────────────────────

#[tokio::test]
async fn chat_request_has_model_roles_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "qwen3:4b",
            "stream": false,
            "messages": [
                {"role": "system", "content": "You are a car assistant."},
                {"role": "user", "content": "hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = ApiChat::new(&llm_config(&server)).unwrap();
    assert_eq!(chat.chat(&messages()).await.unwrap(), "hi");
}

#[tokio::test]
async fn chat_accepts_base_url_with_v1_suffix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = LlmConfig {
        api_url: format!("{}/v1/", server.uri()),
        ..llm_config(&server)
    };
    let chat = ApiChat::new(&config).unwrap();
    assert_eq!(chat.chat(&messages()).await.unwrap(), "ok");
}

#[tokio::test]
async fn chat_strips_reasoning_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "<think>the user wants AC</think>\n{\"tool\": \"ac\"}"}}]
        })))
        .mount(&server)
        .await;

    let chat = ApiChat::new(&llm_config(&server)).unwrap();
    assert_eq!(chat.chat(&messages()).await.unwrap(), r#"{"tool": "ac"}"#);
}

#[tokio::test]
async fn chat_without_content_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let chat = ApiChat::new(&llm_config(&server)).unwrap();
    assert!(chat.chat(&messages()).await.is_err());
}

#[tokio::test]
async fn chat_http_error_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let chat = ApiChat::new(&llm_config(&server)).unwrap();
    let err = chat.chat(&messages()).await.unwrap_err();
    assert!(err.to_string().contains("503"), "{err}");
}

// ── Transcription ───────────────────────────────────────────────────

fn stt_config(server: &MockServer) -> SttConfig {
    SttConfig {
        api_url: server.uri(),
        model: "whisper-1".to_owned(),
        language: Some("en".to_owned()),
        ..SttConfig::default()
    }
}

#[tokio::test]
async fn transcription_posts_wav_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(body_mentions("utterance.wav"))
        .and(body_mentions("whisper-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": " Navigate to the airport. "
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stt = HttpTranscriber::new(&stt_config(&server)).unwrap();
    let transcript = stt.transcribe(&speech(0.5)).await.unwrap();
    assert_eq!(transcript, Transcript::Text("Navigate to the airport.".into()));
}

#[tokio::test]
async fn punctuation_only_transcript_is_unrecognized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": " ... "})))
        .mount(&server)
        .await;

    let stt = HttpTranscriber::new(&stt_config(&server)).unwrap();
    assert_eq!(stt.transcribe(&speech(0.5)).await.unwrap(), Transcript::Unrecognized);
}

#[tokio::test]
async fn transcription_server_error_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let stt = HttpTranscriber::new(&stt_config(&server)).unwrap();
    assert!(stt.transcribe(&speech(0.5)).await.is_err());
}

#[tokio::test]
async fn empty_audio_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "x"})))
        .expect(0)
        .mount(&server)
        .await;

    let stt = HttpTranscriber::new(&stt_config(&server)).unwrap();
    assert_eq!(stt.transcribe(&speech(0.0)).await.unwrap(), Transcript::NoSpeech);
}

// ── Speech synthesis ────────────────────────────────────────────────

fn tts_config(server: &MockServer) -> TtsConfig {
    TtsConfig {
        api_url: server.uri(),
        voice: "alloy".to_owned(),
        rate_wpm: 170,
        ..TtsConfig::default()
    }
}

#[tokio::test]
async fn synthesis_requests_wav_and_decodes_it() {
    let server = MockServer::start().await;
    let tone: Vec<f32> = (0..2400).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(body_partial_json(json!({
            "input": "Headlights on.",
            "voice": "alloy",
            "response_format": "wav",
            "speed": 1.0
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/wav")
                .set_body_bytes(encode_wav(&tone, 24_000).unwrap()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let speaker = HttpSpeaker::new(&tts_config(&server), &AudioConfig::default()).unwrap();
    let (samples, rate) = speaker.synthesize("Headlights on.").await.unwrap();
    assert_eq!(rate, 24_000);
    assert_eq!(samples.len(), tone.len());
    assert!((samples[100] - tone[100]).abs() < 1e-3);
}

#[tokio::test]
async fn synthesis_rejects_non_wav_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not audio"))
        .mount(&server)
        .await;

    let speaker = HttpSpeaker::new(&tts_config(&server), &AudioConfig::default()).unwrap();
    assert!(speaker.synthesize("hello").await.is_err());
}
