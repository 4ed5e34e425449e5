//! At most one session at a time, and every exit path releases the gate and
//! the vehicle's listening/talking flags.

use crate::helpers::{
    Fakes, RecordingTts, ScriptedChat, ScriptedMicrophone, ScriptedStt, ScriptedWakeword,
    eventually, statuses,
};
use cabin::command::FALLBACK_REPLY;
use cabin::{LoopState, SessionOutcome, SessionPhase, VoiceAssistant};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn assert_released(assistant: &VoiceAssistant) {
    let snap = assistant.snapshot();
    assert!(!snap.is_listening, "is_listening left set");
    assert!(!snap.ai_talking, "ai_talking left set");
    assert!(!assistant.is_session_active(), "gate left busy");
}

#[tokio::test]
async fn manual_triggers_while_busy_are_ignored() {
    let fakes = Fakes {
        stt: ScriptedStt::held("turn the lights on"),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    let first = assistant.trigger_listen().expect("first trigger starts a session");
    assert!(eventually(Duration::from_secs(5), || fakes.stt.calls() == 1).await);
    assert!(assistant.is_session_active());
    assert!(assistant.snapshot().is_listening);

    for _ in 0..5 {
        assert!(assistant.trigger_listen().is_none());
    }

    fakes.stt.release();
    let outcome = first.await.unwrap();
    assert_eq!(
        outcome,
        SessionOutcome::Completed {
            heard: "turn the lights on".into(),
            reply: "Headlights on.".into(),
        }
    );
    assert_eq!(fakes.stt.calls(), 1);
    assert_eq!(fakes.microphone.opens(), 1);
    assert_released(&assistant);

    // Free again once the first session is over.
    fakes.stt.release();
    let second = assistant.trigger_listen().expect("gate is free again");
    assert!(matches!(second.await.unwrap(), SessionOutcome::Completed { .. }));
}

#[tokio::test]
async fn wake_and_manual_triggers_never_overlap() {
    let fakes = Fakes {
        stt: ScriptedStt::held("turn the lights on"),
        wakeword: ScriptedWakeword::new(&[], 0.9),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    assert!(assistant.start());
    assert!(eventually(Duration::from_secs(5), || fakes.stt.calls() == 1).await);

    // Wake-word session is holding the gate.
    assert!(assistant.is_session_active());
    assert!(assistant.trigger_listen().is_none());

    // Keep sessions flowing while the button is mashed.
    let done = CancellationToken::new();
    let releaser = {
        let stt = Arc::clone(&fakes.stt);
        let done = done.clone();
        tokio::spawn(async move {
            while !done.is_cancelled() {
                stt.release();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
    };

    let mut manual = Vec::new();
    for _ in 0..50 {
        if let Some(handle) = assistant.trigger_listen() {
            manual.push(handle);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assistant.stop().await;
    for handle in manual {
        handle.await.unwrap();
    }
    done.cancel();
    releaser.await.unwrap();

    assert!(fakes.stt.calls() >= 2);
    assert_eq!(fakes.stt.peak_concurrency(), 1);
    assert_eq!(assistant.loop_state(), LoopState::Stopped);
    assert_released(&assistant);
}

#[tokio::test]
async fn capture_failure_releases_everything() {
    let fakes = Fakes {
        microphone: ScriptedMicrophone::broken(),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();
    assert!(matches!(
        outcome,
        SessionOutcome::Failed {
            phase: SessionPhase::Capture,
            ..
        }
    ));
    assert_released(&assistant);
    assert!(statuses(assistant.status()).iter().any(|s| s.starts_with("Error: ")));
    assert_eq!(fakes.stt.calls(), 0);
    assert_eq!(fakes.chat.calls(), 0);
}

#[tokio::test]
async fn transcription_failure_releases_everything() {
    let fakes = Fakes {
        stt: ScriptedStt::failing(),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();
    assert!(matches!(
        outcome,
        SessionOutcome::Failed {
            phase: SessionPhase::Transcribe,
            ..
        }
    ));
    assert_released(&assistant);
    assert_eq!(fakes.chat.calls(), 0);
}

#[tokio::test]
async fn provider_failure_still_completes_with_fallback() {
    let fakes = Fakes {
        chat: ScriptedChat::failing(),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();
    assert_eq!(
        outcome,
        SessionOutcome::Completed {
            heard: "turn the lights on".into(),
            reply: FALLBACK_REPLY.into(),
        }
    );
    assert_eq!(fakes.tts.spoken(), vec![FALLBACK_REPLY.to_owned()]);
    assert!(!assistant.snapshot().lights_on);
    assert_released(&assistant);
}

#[tokio::test]
async fn dispatch_failure_releases_everything() {
    let fakes = Fakes {
        chat: ScriptedChat::replying(r#"{"tool": "nav", "args": {}}"#),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();
    let SessionOutcome::Failed { phase, error } = outcome else {
        panic!("expected dispatch failure, got {outcome:?}");
    };
    assert_eq!(phase, SessionPhase::Dispatch);
    assert!(error.contains("destination"), "{error}");
    assert!(assistant.snapshot().destination.is_none());
    assert!(fakes.tts.spoken().is_empty());
    assert_released(&assistant);
}

#[tokio::test]
async fn speech_output_failure_releases_everything() {
    let fakes = Fakes {
        tts: RecordingTts::failing(),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();
    assert!(matches!(
        outcome,
        SessionOutcome::Failed {
            phase: SessionPhase::Speak,
            ..
        }
    ));
    // The action itself went through before speaking failed.
    assert!(assistant.snapshot().lights_on);
    assert_released(&assistant);
}
