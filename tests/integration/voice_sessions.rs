//! Spoken sessions started with the listen button.

use crate::helpers::{
    Fakes, FlagObservingTts, ScriptedChat, ScriptedMicrophone, ScriptedStt, statuses, test_config,
};
use cabin::{SessionOutcome, SharedVehicle, VoiceAssistant};
use cabin::session::{SPOKEN_NOT_UNDERSTOOD, STATUS_NOT_UNDERSTOOD, STATUS_TIMEOUT};

#[tokio::test]
async fn spoken_ac_command_runs_end_to_end() {
    let fakes = Fakes {
        chat: ScriptedChat::replying(r#"{"tool": "ac", "args": {"on": "on", "temperature": 18}}"#),
        stt: ScriptedStt::hearing("turn on AC to 18 degrees"),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();

    assert_eq!(
        outcome,
        SessionOutcome::Completed {
            heard: "turn on AC to 18 degrees".into(),
            reply: "AC turned on at 18°C".into(),
        }
    );
    let snap = assistant.snapshot();
    assert!(snap.ac_on);
    assert_eq!(snap.ac_temp, 18);
    assert_eq!(fakes.tts.spoken(), vec!["AC turned on at 18°C".to_owned()]);
    assert_eq!(
        statuses(assistant.status()),
        vec![
            "Listening...".to_owned(),
            "You: turn on AC to 18 degrees".to_owned(),
            "Processing: turn on AC to 18 degrees".to_owned(),
            "Thinking...".to_owned(),
            "AI: AC turned on at 18°C".to_owned(),
        ]
    );
}

#[tokio::test]
async fn silence_times_out_without_transcribing() {
    let fakes = Fakes {
        microphone: ScriptedMicrophone::silent(),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();

    assert_eq!(outcome, SessionOutcome::Timeout);
    assert_eq!(
        statuses(assistant.status()).last().map(String::as_str),
        Some(STATUS_TIMEOUT)
    );
    assert_eq!(fakes.stt.calls(), 0);
    assert_eq!(fakes.chat.calls(), 0);
    assert!(fakes.tts.spoken().is_empty());
    assert!(!assistant.snapshot().is_listening);
}

#[tokio::test]
async fn unrecognized_speech_prompts_the_driver() {
    let fakes = Fakes {
        stt: ScriptedStt::unrecognized(),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();

    assert_eq!(outcome, SessionOutcome::NotUnderstood);
    assert!(statuses(assistant.status()).iter().any(|s| s == STATUS_NOT_UNDERSTOOD));
    assert_eq!(fakes.tts.spoken(), vec![SPOKEN_NOT_UNDERSTOOD.to_owned()]);
    assert_eq!(fakes.chat.calls(), 0);
    let snap = assistant.snapshot();
    assert!(!snap.ai_talking);
    assert!(!snap.is_listening);
}

#[tokio::test]
async fn phrase_limit_truncates_long_speech() {
    let fakes = Fakes {
        // Quiet room, then five seconds of continuous speech.
        microphone: ScriptedMicrophone::with_levels(
            [vec![0.001, 0.001], vec![0.3; 50]].concat(),
        ),
        ..Fakes::lights_on()
    };
    let assistant = fakes.build();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();

    // The recorder still hands over an utterance at the two second limit.
    assert!(matches!(outcome, SessionOutcome::Completed { .. }));
    assert_eq!(fakes.stt.calls(), 1);
}

#[tokio::test]
async fn cancelled_before_start_does_nothing() {
    let fakes = Fakes::lights_on();
    let assistant = fakes.build();
    assistant.stop().await;

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();

    assert_eq!(outcome, SessionOutcome::Cancelled);
    assert_eq!(fakes.microphone.opens(), 0);
    assert!(!assistant.is_session_active());
}

#[tokio::test]
async fn spoken_reply_holds_the_talking_flag() {
    let fakes = Fakes::lights_on();
    let vehicle = SharedVehicle::default();
    let tts = FlagObservingTts::new(&vehicle, false);
    let assistant = VoiceAssistant::builder(test_config())
        .with_chat(fakes.chat.clone())
        .with_microphone(fakes.microphone.clone())
        .with_stt(fakes.stt.clone())
        .with_tts(tts.clone())
        .with_wakeword(fakes.wakeword.clone())
        .with_vehicle(vehicle)
        .build()
        .unwrap();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();

    assert!(matches!(outcome, SessionOutcome::Completed { .. }));
    assert_eq!(tts.talking(), vec![true]);
    assert!(!assistant.snapshot().ai_talking);
}

#[tokio::test]
async fn failed_prompt_speech_is_reported() {
    let fakes = Fakes {
        stt: ScriptedStt::unrecognized(),
        ..Fakes::lights_on()
    };
    let vehicle = SharedVehicle::default();
    let tts = FlagObservingTts::new(&vehicle, true);
    let assistant = VoiceAssistant::builder(test_config())
        .with_chat(fakes.chat.clone())
        .with_microphone(fakes.microphone.clone())
        .with_stt(fakes.stt.clone())
        .with_tts(tts.clone())
        .with_wakeword(fakes.wakeword.clone())
        .with_vehicle(vehicle)
        .build()
        .unwrap();

    let outcome = assistant.trigger_listen().unwrap().await.unwrap();

    assert_eq!(outcome, SessionOutcome::NotUnderstood);
    assert_eq!(tts.talking(), vec![true]);
    assert!(
        statuses(assistant.status())
            .iter()
            .any(|s| s.starts_with("TTS Failed: ") && s.contains("speaker unplugged"))
    );
    assert!(!assistant.snapshot().ai_talking);
}
