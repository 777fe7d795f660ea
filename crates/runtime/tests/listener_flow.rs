//! End-to-end listener flows on a paused tokio clock: the controller is
//! spawned for real and driven through scripted recognition sources, so
//! these tests cover the full path from settings push to presentation.

use std::sync::Arc;

use tokio::time::Duration;

use hotphrase_config::{RuntimeConfig, SettingsSnapshot};
use hotphrase_events::{
    DismissReason, ForwardConfig, RecordingActivityIndicator, RecordingPresentation,
    StaticForwardConfig,
};
use hotphrase_recognizer::{ScriptStep, ScriptedSource};
use hotphrase_runtime::{Collaborators, ListenerController, ListenerHandle, RuntimeState};

struct Fixture {
    handle: ListenerHandle,
    task: tokio::task::JoinHandle<()>,
    recognizer: Arc<ScriptedSource>,
    presentation: Arc<RecordingPresentation>,
    indicator: Arc<RecordingActivityIndicator>,
}

fn spawn_listener(scripts: Vec<Vec<ScriptStep>>) -> Fixture {
    // RUST_LOG=hotphrase_runtime=debug makes a failing flow readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let recognizer = Arc::new(ScriptedSource::new(scripts));
    let presentation = Arc::new(RecordingPresentation::new());
    let indicator = Arc::new(RecordingActivityIndicator::new());
    let forward = Arc::new(StaticForwardConfig::new(ForwardConfig(
        serde_json::json!({"route": "assistant"}),
    )));
    let controller = ListenerController::new(Collaborators {
        recognizer: recognizer.clone(),
        presentation: presentation.clone(),
        indicator: indicator.clone(),
        forward,
    });
    let (handle, task) = controller.spawn();
    Fixture {
        handle,
        task,
        recognizer,
        presentation,
        indicator,
    }
}

fn claw_settings() -> SettingsSnapshot {
    SettingsSnapshot::enabled(RuntimeConfig::with_triggers(["hey claw"]))
}

/// Sleep in small steps (the paused clock auto-advances) until `pred`
/// holds, or fail after ~20 virtual seconds.
async fn settle_until(mut pred: impl FnMut() -> bool) {
    for _ in 0..400 {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached within the settle window");
}

#[tokio::test(start_paused = true)]
async fn trigger_then_silence_presents_the_utterance() {
    let fx = spawn_listener(vec![vec![ScriptStep::text(
        100,
        "hey claw what time is it",
    )]]);
    fx.handle.apply_settings(claw_settings(), true).await.unwrap();

    settle_until(|| !fx.presentation.finals().is_empty()).await;
    // A status round trip guarantees finalization has fully completed.
    let status = fx.handle.status().await.unwrap();

    let finals = fx.presentation.finals();
    assert_eq!(finals.len(), 1);
    let (transcript, forward, delay) = &finals[0];
    assert_eq!(transcript, "what time is it");
    assert_eq!(forward.0["route"], "assistant");
    assert_eq!(*delay, Duration::from_secs(1));

    assert_eq!(fx.indicator.begins(), 1);
    assert_eq!(fx.indicator.ends(), 1);
    // Finalize restarts the recognition source.
    assert_eq!(fx.recognizer.starts(), 2);
    assert_eq!(status.state, RuntimeState::Listening);
}

#[tokio::test(start_paused = true)]
async fn trigger_only_capture_is_dismissed_as_empty() {
    let fx = spawn_listener(vec![vec![ScriptStep::text(100, "hey claw")]]);
    fx.handle.apply_settings(claw_settings(), true).await.unwrap();

    settle_until(|| !fx.presentation.dismissals().is_empty()).await;
    fx.handle.status().await.unwrap();

    assert!(fx.presentation.finals().is_empty());
    assert_eq!(fx.presentation.dismissals(), vec![DismissReason::Empty]);
    assert_eq!(fx.indicator.begins(), 1);
    assert_eq!(fx.indicator.ends(), 1);
    assert_eq!(fx.recognizer.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn growing_partials_end_with_the_full_utterance() {
    let fx = spawn_listener(vec![vec![
        ScriptStep::text(100, "hey claw turn"),
        ScriptStep::text(200, "hey claw turn on the"),
        ScriptStep::text(200, "hey claw turn on the lights"),
    ]]);
    fx.handle.apply_settings(claw_settings(), true).await.unwrap();

    settle_until(|| !fx.presentation.finals().is_empty()).await;

    assert_eq!(
        fx.presentation.partials(),
        vec!["turn on the".to_string(), "turn on the lights".to_string()]
    );
    assert_eq!(fx.presentation.finals()[0].0, "turn on the lights");
    assert_eq!(fx.presentation.finals()[0].2, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn cooldown_suppresses_an_immediate_retrigger() {
    // Second script plays on the post-finalize source: one trigger inside
    // the cooldown window, one after it.
    let fx = spawn_listener(vec![
        vec![ScriptStep::text(100, "hey claw first thing")],
        vec![
            ScriptStep::text(100, "hey claw too soon"),
            ScriptStep::text(500, "hey claw second thing"),
        ],
    ]);
    fx.handle.apply_settings(claw_settings(), true).await.unwrap();

    settle_until(|| fx.presentation.finals().len() == 2).await;

    let finals = fx.presentation.finals();
    assert_eq!(finals[0].0, "first thing");
    assert_eq!(finals[1].0, "second thing");
    assert_eq!(fx.indicator.begins(), 2);
}

#[tokio::test(start_paused = true)]
async fn continuous_speech_hits_the_hard_stop() {
    // Keep feeding updates every 200ms so silence never triggers.
    let mut script = vec![ScriptStep::text(100, "hey claw keep going")];
    for _ in 0..50 {
        script.push(ScriptStep::text(200, "hey claw keep going and going"));
    }
    let fx = spawn_listener(vec![script]);
    fx.handle.apply_settings(claw_settings(), true).await.unwrap();

    settle_until(|| !fx.presentation.finals().is_empty()).await;
    fx.handle.status().await.unwrap();

    assert_eq!(fx.presentation.finals()[0].0, "keep going and going");
    assert_eq!(fx.indicator.ends(), 1);
    assert_eq!(fx.recognizer.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn identical_settings_pushes_reuse_the_live_source() {
    let fx = spawn_listener(Vec::new());
    fx.handle.apply_settings(claw_settings(), true).await.unwrap();
    fx.handle.apply_settings(claw_settings(), true).await.unwrap();
    fx.handle.apply_settings(claw_settings(), true).await.unwrap();

    let status = fx.handle.status().await.unwrap();
    assert_eq!(status.state, RuntimeState::Listening);
    assert_eq!(
        status.active_config,
        Some(RuntimeConfig::with_triggers(["hey claw"]))
    );
    assert_eq!(fx.recognizer.starts(), 1);

    let mut changed = claw_settings();
    changed.config.microphone_id = Some("usb-mic".into());
    fx.handle.apply_settings(changed, true).await.unwrap();
    settle_until(|| fx.recognizer.starts() == 2).await;
}

#[tokio::test(start_paused = true)]
async fn dead_source_stream_is_restarted() {
    let fx = spawn_listener(vec![vec![ScriptStep::close(100)]]);
    fx.handle.apply_settings(claw_settings(), true).await.unwrap();

    settle_until(|| fx.recognizer.starts() == 2).await;
    let status = fx.handle.status().await.unwrap();
    assert_eq!(status.state, RuntimeState::Listening);
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_capture_dismisses_everything() {
    let fx = spawn_listener(vec![vec![ScriptStep::text(100, "hey claw wait for")]]);
    fx.handle.apply_settings(claw_settings(), true).await.unwrap();

    settle_until(|| fx.indicator.begins() == 1).await;

    fx.handle.shutdown().await.unwrap();
    fx.task.await.unwrap();

    assert_eq!(fx.presentation.dismiss_all_count(), 1);
    assert!(fx.presentation.finals().is_empty());
    assert_eq!(fx.indicator.ends(), 1);
    assert!(fx.handle.status().await.is_err());
}
