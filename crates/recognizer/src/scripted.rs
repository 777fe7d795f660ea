//! Scripted recognition source for deterministic tests.
//!
//! Each `start` pops the next script from a queue and replays it on the
//! tokio clock; after the last step the event channel is kept open until
//! `stop` (or `ScriptAction::Close` closes it early, simulating a source
//! that dies mid-run). Start attempts are counted so reconciliation tests
//! can assert that redundant configuration pushes cause zero restarts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hotphrase_config::RuntimeConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{RecognitionSource, RecognizerError, RecognizerEvent, Result};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// What a script step does once its delay elapses.
#[derive(Debug, Clone)]
pub enum ScriptAction {
    /// Emit one recognizer event.
    Emit(RecognizerEvent),
    /// Close the event stream, as if the engine died.
    Close,
}

/// One step of a recognizer script; `after` is relative to the previous step.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub after: Duration,
    pub action: ScriptAction,
}

impl ScriptStep {
    /// Emit a transcript event after `after_ms` milliseconds.
    pub fn text(after_ms: u64, transcript: impl Into<String>) -> Self {
        Self {
            after: Duration::from_millis(after_ms),
            action: ScriptAction::Emit(RecognizerEvent::text(transcript)),
        }
    }

    /// Emit an error-only event after `after_ms` milliseconds.
    pub fn error(after_ms: u64, error: impl Into<String>) -> Self {
        Self {
            after: Duration::from_millis(after_ms),
            action: ScriptAction::Emit(RecognizerEvent::error(error)),
        }
    }

    /// Emit an event with neither transcript nor error.
    pub fn empty(after_ms: u64) -> Self {
        Self {
            after: Duration::from_millis(after_ms),
            action: ScriptAction::Emit(RecognizerEvent::default()),
        }
    }

    /// Close the stream after `after_ms` milliseconds.
    pub fn close(after_ms: u64) -> Self {
        Self {
            after: Duration::from_millis(after_ms),
            action: ScriptAction::Close,
        }
    }
}

/// Test double for [`RecognitionSource`].
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_next_start: AtomicBool,
    cancel: Mutex<CancellationToken>,
    last_config: Mutex<Option<RuntimeConfig>>,
}

impl ScriptedSource {
    /// Build a source whose Nth start replays the Nth script. Starts beyond
    /// the queue get an empty script (a live but silent source).
    pub fn new<I>(scripts: I) -> Self
    where
        I: IntoIterator<Item = Vec<ScriptStep>>,
    {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_next_start: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            last_config: Mutex::new(None),
        }
    }

    /// Source that never emits anything.
    pub fn silent() -> Self {
        Self::new(Vec::<Vec<ScriptStep>>::new())
    }

    /// Number of start attempts, including failed ones.
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of stop calls.
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Make the next start attempt fail with `AudioUnavailable`.
    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    /// Config of the most recent start attempt.
    pub fn last_config(&self) -> Option<RuntimeConfig> {
        self.lock(&self.last_config).clone()
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl RecognitionSource for ScriptedSource {
    async fn start(&self, config: &RuntimeConfig) -> Result<mpsc::Receiver<RecognizerEvent>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.lock(&self.last_config) = Some(config.clone());

        if self.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(RecognizerError::AudioUnavailable(
                "scripted start failure".into(),
            ));
        }

        let run_token = {
            let mut guard = self.lock(&self.cancel);
            guard.cancel();
            *guard = CancellationToken::new();
            guard.child_token()
        };
        let script = self.lock(&self.scripts).pop_front().unwrap_or_default();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        // Anchor the schedule before spawning so step pacing is relative to
        // `start` returning, not to the task's first poll.
        let mut at = tokio::time::Instant::now();
        tokio::spawn(async move {
            for step in script {
                at += step.after;
                tokio::select! {
                    biased;
                    _ = run_token.cancelled() => return,
                    _ = tokio::time::sleep_until(at) => {}
                }
                match step.action {
                    ScriptAction::Emit(event) => {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    ScriptAction::Close => return,
                }
            }
            // Script exhausted: keep the stream open until cancelled so the
            // runtime sees a live but quiet source.
            run_token.cancelled().await;
            drop(tx);
        });

        tracing::debug!("scripted recognition source started");
        Ok(rx)
    }

    async fn stop(&self) {
        self.lock(&self.cancel).cancel();
        self.stops.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("scripted recognition source stopped");
    }
}
