//! Runtime controller: the single-writer state machine that owns capture
//! lifecycle, configuration reconciliation, and recognizer restarts.
//!
//! All mutable state lives in [`ListenerController`], which is driven by
//! exactly one task: settings pushes arrive on the command channel,
//! transcript events on the recognizer stream, and endpoint signals on the
//! monitor channel, all drained through one `select!` loop. Monitor signals
//! are polled first, so a finalize decided for the old recognition source
//! always completes (including the restart) before any event from the new
//! source is processed.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use hotphrase_config::{RuntimeConfig, SettingsSnapshot};
use hotphrase_events::{
    ActivityIndicatorRef, DismissReason, ForwardConfigProviderRef, PresentationSinkRef,
};
use hotphrase_recognizer::{RecognitionSourceRef, RecognizerEvent};

use crate::monitor::{ActivityClock, EndpointMonitor, MonitorParams, StopReason};
use crate::session::CaptureSession;
use crate::{Result, RuntimeError};

/// Absolute maximum capture duration.
const CAPTURE_HARD_STOP: Duration = Duration::from_secs(8);
/// Gap since last speech activity that counts a poll as silent.
const SILENCE_WINDOW: Duration = Duration::from_millis(1000);
/// Endpoint monitor poll interval.
const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Consecutive silent polls required to end a capture.
const SILENCE_STRIKE_THRESHOLD: u8 = 2;
/// Post-finalize window during which new trigger matches are ignored, so the
/// recognizer can settle after the restart.
const TRIGGER_COOLDOWN: Duration = Duration::from_millis(350);
/// Presentation delay when speech continued beyond the trigger phrase.
const REPLY_DELAY_CONTINUED: Duration = Duration::from_secs(1);
/// Presentation delay when only the trigger phrase was heard.
const REPLY_DELAY_TRIGGER_ONLY: Duration = Duration::from_secs(3);
/// Backoff before retrying a failed recognizer start.
const START_RETRY_BACKOFF: Duration = Duration::from_millis(1500);

const COMMAND_CHANNEL_CAPACITY: usize = 16;
const SIGNAL_CHANNEL_CAPACITY: usize = 4;

/// Listener lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Disabled, unpermitted, or failed to start.
    Stopped,
    /// Recognition source running, waiting for a trigger phrase.
    Listening,
    /// A capture session is active and the endpoint monitor is running.
    Capturing,
}

/// Every duration the controller and monitor use, so tests can compress
/// timelines without patching constants.
#[derive(Debug, Clone)]
pub struct TimingPolicy {
    pub hard_stop: Duration,
    pub silence_window: Duration,
    pub poll_interval: Duration,
    pub strike_threshold: u8,
    pub cooldown: Duration,
    pub reply_delay_continued: Duration,
    pub reply_delay_trigger_only: Duration,
    pub start_retry_backoff: Duration,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            hard_stop: CAPTURE_HARD_STOP,
            silence_window: SILENCE_WINDOW,
            poll_interval: MONITOR_POLL_INTERVAL,
            strike_threshold: SILENCE_STRIKE_THRESHOLD,
            cooldown: TRIGGER_COOLDOWN,
            reply_delay_continued: REPLY_DELAY_CONTINUED,
            reply_delay_trigger_only: REPLY_DELAY_TRIGGER_ONLY,
            start_retry_backoff: START_RETRY_BACKOFF,
        }
    }
}

/// Collaborator handles injected at construction.
///
/// Injection replaces the singleton notification pattern so every seam can
/// be a recording double in tests.
pub struct Collaborators {
    pub recognizer: RecognitionSourceRef,
    pub presentation: PresentationSinkRef,
    pub indicator: ActivityIndicatorRef,
    pub forward: ForwardConfigProviderRef,
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: RuntimeState,
    pub active_config: Option<RuntimeConfig>,
}

enum Command {
    ApplySettings {
        snapshot: SettingsSnapshot,
        permission: bool,
    },
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    Shutdown,
}

/// Cloneable handle for pushing settings into the running controller.
#[derive(Clone)]
pub struct ListenerHandle {
    tx: mpsc::Sender<Command>,
}

impl ListenerHandle {
    /// Push a settings snapshot plus the externally-determined permission
    /// decision. Identical config pushes while a source is live are no-ops.
    pub async fn apply_settings(&self, snapshot: SettingsSnapshot, permission: bool) -> Result<()> {
        self.tx
            .send(Command::ApplySettings {
                snapshot,
                permission,
            })
            .await
            .map_err(|_| RuntimeError::ControllerGone)
    }

    /// Current lifecycle state and running config.
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Status { reply })
            .await
            .map_err(|_| RuntimeError::ControllerGone)?;
        rx.await.map_err(|_| RuntimeError::ControllerGone)
    }

    /// Stop everything and end the controller task. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| RuntimeError::ControllerGone)
    }
}

enum Turn {
    Command(Command),
    CommandsClosed,
    Transcript(RecognizerEvent),
    SourceClosed,
    Stop(StopReason),
}

pub struct ListenerController {
    recognizer: RecognitionSourceRef,
    presentation: PresentationSinkRef,
    indicator: ActivityIndicatorRef,
    forward: ForwardConfigProviderRef,
    timing: TimingPolicy,

    state: RuntimeState,
    /// Config of the currently-running recognition source; `None` whenever
    /// no source is live.
    active_config: Option<RuntimeConfig>,
    session: Option<CaptureSession>,
    cooldown_until: Option<Instant>,
    start_retry_after: Option<Instant>,
    activity: ActivityClock,
    monitor: Option<EndpointMonitor>,
    events: Option<mpsc::Receiver<RecognizerEvent>>,
    signal_tx: mpsc::Sender<StopReason>,
    signal_rx: mpsc::Receiver<StopReason>,
}

impl ListenerController {
    pub fn new(collaborators: Collaborators) -> Self {
        Self::with_timing(collaborators, TimingPolicy::default())
    }

    pub fn with_timing(collaborators: Collaborators, timing: TimingPolicy) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        Self {
            recognizer: collaborators.recognizer,
            presentation: collaborators.presentation,
            indicator: collaborators.indicator,
            forward: collaborators.forward,
            timing,
            state: RuntimeState::Stopped,
            active_config: None,
            session: None,
            cooldown_until: None,
            start_retry_after: None,
            activity: ActivityClock::new(),
            monitor: None,
            events: None,
            signal_tx,
            signal_rx,
        }
    }

    /// Spawn the controller task and return its command handle.
    pub fn spawn(self) -> (ListenerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let task = tokio::spawn(self.run(rx));
        (ListenerHandle { tx }, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::info!("wake-phrase listener started");
        loop {
            match self.next_turn(&mut commands).await {
                Turn::Command(Command::ApplySettings {
                    snapshot,
                    permission,
                }) => self.apply_settings(snapshot, permission).await,
                Turn::Command(Command::Status { reply }) => {
                    let _ = reply.send(self.status_snapshot());
                }
                Turn::Command(Command::Shutdown) | Turn::CommandsClosed => {
                    self.stop_all().await;
                    break;
                }
                Turn::Transcript(event) => self.on_transcript(event),
                Turn::SourceClosed => self.on_source_closed().await,
                Turn::Stop(reason) => self.finalize(reason).await,
            }
        }
        tracing::info!("wake-phrase listener stopped");
    }

    /// Wait for the next signal, command, or transcript event.
    ///
    /// `biased` with the monitor signal first pins the ordering guarantee:
    /// a pending stop is always handled before newer transcript events.
    async fn next_turn(&mut self, commands: &mut mpsc::Receiver<Command>) -> Turn {
        loop {
            let turn = match self.events.as_mut() {
                Some(events) => tokio::select! {
                    biased;
                    signal = self.signal_rx.recv() => signal.map(Turn::Stop),
                    command = commands.recv() => Some(match command {
                        Some(command) => Turn::Command(command),
                        None => Turn::CommandsClosed,
                    }),
                    event = events.recv() => Some(match event {
                        Some(event) => Turn::Transcript(event),
                        None => Turn::SourceClosed,
                    }),
                },
                None => tokio::select! {
                    biased;
                    signal = self.signal_rx.recv() => signal.map(Turn::Stop),
                    command = commands.recv() => Some(match command {
                        Some(command) => Turn::Command(command),
                        None => Turn::CommandsClosed,
                    }),
                },
            };
            // `None` from the signal channel cannot happen while the
            // controller holds its own `signal_tx`; never treat it as a
            // shutdown signal.
            if let Some(turn) = turn {
                return turn;
            }
        }
    }

    fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            active_config: self.active_config.clone(),
        }
    }

    /// Reconcile a settings push against the running configuration.
    async fn apply_settings(&mut self, snapshot: SettingsSnapshot, permission: bool) {
        if !snapshot.enabled || !permission {
            if self.state != RuntimeState::Stopped || self.events.is_some() {
                tracing::info!(
                    enabled = snapshot.enabled,
                    permission,
                    "listener disabled, stopping"
                );
                self.stop_all().await;
            }
            return;
        }

        let config = snapshot.config;
        if self.events.is_some()
            && self.state != RuntimeState::Stopped
            && self.active_config.as_ref() == Some(&config)
        {
            tracing::debug!("settings unchanged, keeping live recognition source");
            return;
        }

        self.restart(config).await;
    }

    /// Full stop/start cycle of the recognition source.
    ///
    /// Always clears any capture in flight and passes through `Stopped`
    /// before re-entering `Listening`.
    async fn restart(&mut self, config: RuntimeConfig) {
        self.teardown_capture();
        self.events = None;
        self.active_config = None;
        self.recognizer.stop().await;
        self.state = RuntimeState::Stopped;

        if let Some(retry_after) = self.start_retry_after {
            if Instant::now() < retry_after {
                tracing::debug!("recognizer start backoff active, staying stopped");
                return;
            }
        }

        match self.recognizer.start(&config).await {
            Ok(events) => {
                tracing::info!(
                    triggers = config.triggers.len(),
                    microphone = ?config.microphone_id,
                    locale = ?config.locale_id,
                    "recognition source started"
                );
                self.events = Some(events);
                self.active_config = Some(config);
                self.start_retry_after = None;
                self.state = RuntimeState::Listening;
            }
            Err(error) => {
                tracing::warn!(%error, "recognition source failed to start");
                self.start_retry_after = Some(Instant::now() + self.timing.start_retry_backoff);
                self.state = RuntimeState::Stopped;
            }
        }
    }

    fn on_transcript(&mut self, event: RecognizerEvent) {
        if let Some(error) = &event.error {
            tracing::warn!(%error, "recognition source reported an error");
        }
        let Some(text) = event.transcript else {
            // An error with no transcript causes no state change.
            return;
        };
        if text.is_empty() {
            return;
        }
        self.activity.touch();

        match self.state {
            RuntimeState::Stopped => {}
            RuntimeState::Listening => {
                let matched = self
                    .active_config
                    .as_ref()
                    .is_some_and(|c| hotphrase_trigger::matches(&text, &c.triggers));
                if !matched {
                    return;
                }
                if let Some(until) = self.cooldown_until {
                    if Instant::now() < until {
                        tracing::debug!("trigger match ignored during cooldown");
                        return;
                    }
                }
                self.begin_capture(&text);
            }
            RuntimeState::Capturing => {
                let trimmed = match self.active_config.as_ref() {
                    Some(config) => {
                        hotphrase_trigger::trim_after_trigger(&text, &config.triggers)
                            .trim()
                            .to_string()
                    }
                    None => return,
                };
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                session.apply_update(&trimmed);
                self.presentation.show_partial(session.transcript());
            }
        }
    }

    fn begin_capture(&mut self, text: &str) {
        let remainder = self
            .active_config
            .as_ref()
            .map(|c| hotphrase_trigger::trim_after_trigger(text, &c.triggers))
            .unwrap_or(text)
            .trim()
            .to_string();

        // Discard any signal a previous monitor queued before cancellation.
        while self.signal_rx.try_recv().is_ok() {}
        if let Some(old) = self.monitor.take() {
            old.cancel();
        }

        self.activity.touch();
        let session = CaptureSession::begin(&remainder);
        self.monitor = Some(EndpointMonitor::spawn(
            MonitorParams {
                start: session.started_at(),
                hard_stop: self.timing.hard_stop,
                silence_window: self.timing.silence_window,
                poll_interval: self.timing.poll_interval,
                strike_threshold: self.timing.strike_threshold,
            },
            self.activity.clone(),
            self.signal_tx.clone(),
        ));
        self.indicator.begin_indicator();
        tracing::info!(remainder = %session.transcript(), "capture started");
        self.session = Some(session);
        self.state = RuntimeState::Capturing;
    }

    /// End the active capture and hand off the utterance.
    ///
    /// Idempotent: a stop signal arriving after finalization already ran is
    /// a no-op. Cooldown arming and the recognizer restart are unconditional
    /// tail actions, regardless of what the collaborators do.
    async fn finalize(&mut self, reason: StopReason) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let Some(monitor) = self.monitor.take() {
            monitor.cancel();
        }

        let transcript = session.transcript().trim().to_string();
        let heard_beyond = session.heard_beyond_trigger();
        tracing::info!(
            ?reason,
            heard_beyond,
            chars = transcript.len(),
            "capture finalized"
        );

        self.indicator.end_indicator();
        if transcript.is_empty() {
            self.presentation.dismiss(DismissReason::Empty);
        } else {
            let delay = if heard_beyond {
                self.timing.reply_delay_continued
            } else {
                self.timing.reply_delay_trigger_only
            };
            let forward = self.forward.current();
            self.presentation.present_final(&transcript, forward, delay);
        }

        self.cooldown_until = Some(Instant::now() + self.timing.cooldown);
        match self.active_config.clone() {
            Some(config) => self.restart(config).await,
            None => self.state = RuntimeState::Stopped,
        }
    }

    /// The recognition source stream ended on its own; bring it back.
    async fn on_source_closed(&mut self) {
        tracing::warn!("recognition source stream closed unexpectedly");
        self.events = None;
        match self.active_config.clone() {
            Some(config) => self.restart(config).await,
            None => self.state = RuntimeState::Stopped,
        }
    }

    /// Stop everything: capture, monitor, recognition source. Safe to call
    /// redundantly.
    async fn stop_all(&mut self) {
        self.teardown_capture();
        self.events = None;
        self.active_config = None;
        self.cooldown_until = None;
        self.recognizer.stop().await;
        self.presentation.dismiss_all();
        self.state = RuntimeState::Stopped;
    }

    fn teardown_capture(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.cancel();
        }
        if self.session.take().is_some() {
            self.indicator.end_indicator();
        }
    }
}
