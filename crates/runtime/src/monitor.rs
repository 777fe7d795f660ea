//! Silence/timeout endpoint monitor.
//!
//! A cancellable background task that polls a shared last-activity
//! timestamp and signals the controller when a capture should end. It never
//! touches controller state directly; the stop signal travels through the
//! controller's serialized loop.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Why the monitor ended a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The absolute capture duration bound was reached.
    HardStop,
    /// Two consecutive polls saw no fresh speech activity.
    Silence,
}

/// Shared "last speech activity" timestamp.
///
/// Written by the controller on every non-empty transcript event, read by
/// the monitor each poll.
#[derive(Debug, Clone)]
pub struct ActivityClock {
    last: Arc<Mutex<Instant>>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Record speech activity now.
    pub fn touch(&self) {
        *self.lock() = Instant::now();
    }

    /// Most recent activity timestamp.
    pub fn last(&self) -> Instant {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, Instant> {
        self.last.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MonitorParams {
    pub start: Instant,
    pub hard_stop: Duration,
    pub silence_window: Duration,
    pub poll_interval: Duration,
    pub strike_threshold: u8,
}

/// Handle to a running endpoint monitor task.
///
/// Dropping the handle cancels the task, so a capture can never leak a live
/// monitor.
pub(crate) struct EndpointMonitor {
    cancel: CancellationToken,
}

impl EndpointMonitor {
    pub fn spawn(
        params: MonitorParams,
        activity: ActivityClock,
        signal: mpsc::Sender<StopReason>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.child_token();
        tokio::spawn(run_monitor(params, activity, signal, token));
        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EndpointMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_monitor(
    params: MonitorParams,
    activity: ActivityClock,
    signal: mpsc::Sender<StopReason>,
    cancel: CancellationToken,
) {
    let hard_stop_at = params.start + params.hard_stop;
    let mut ticker = time::interval_at(params.start + params.poll_interval, params.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Strikes accumulate once per poll whose gap exceeds the window, not
    // once per window: two consecutive silent polls end the capture.
    let mut strikes: u8 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("endpoint monitor cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        if now >= hard_stop_at {
            tracing::debug!("capture hit hard stop");
            let _ = signal.send(StopReason::HardStop).await;
            return;
        }
        if now.duration_since(activity.last()) >= params.silence_window {
            strikes += 1;
            if strikes >= params.strike_threshold {
                tracing::debug!(strikes, "capture ended by silence");
                let _ = signal.send(StopReason::Silence).await;
                return;
            }
        } else {
            strikes = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(start: Instant) -> MonitorParams {
        MonitorParams {
            start,
            hard_stop: Duration::from_secs(8),
            silence_window: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(200),
            strike_threshold: 2,
        }
    }

    // Step in sub-poll increments so every tick deadline is reached exactly,
    // instead of several ticks collapsing into one large advance.
    async fn advance(ms: u64) {
        for _ in 0..ms / 100 {
            time::advance(Duration::from_millis(100)).await;
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silence_stops_after_two_consecutive_strikes() {
        let activity = ActivityClock::new();
        let (tx, mut rx) = mpsc::channel(4);
        let _monitor = EndpointMonitor::spawn(params(Instant::now()), activity, tx);

        // Polls at 200..1000ms see gaps below the window; 1000ms is the
        // first strike, 1200ms the second.
        advance(1000).await;
        assert!(rx.try_recv().is_err());
        advance(200).await;
        assert_eq!(rx.try_recv().unwrap(), StopReason::Silence);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_activity_resets_the_strike_count() {
        let activity = ActivityClock::new();
        let (tx, mut rx) = mpsc::channel(4);
        let _monitor = EndpointMonitor::spawn(params(Instant::now()), activity.clone(), tx);

        // One strike at 1000ms, then speech resumes.
        advance(1000).await;
        assert!(rx.try_recv().is_err());
        activity.touch();

        // Gap restarts from the touch: strikes land at 2000ms and 2200ms.
        advance(900).await;
        assert!(rx.try_recv().is_err());
        advance(300).await;
        assert_eq!(rx.try_recv().unwrap(), StopReason::Silence);
    }

    #[tokio::test(start_paused = true)]
    async fn hard_stop_fires_despite_continuous_activity() {
        let activity = ActivityClock::new();
        let (tx, mut rx) = mpsc::channel(4);
        let _monitor = EndpointMonitor::spawn(params(Instant::now()), activity.clone(), tx);

        // Keep touching every 100ms so silence never strikes.
        for _ in 0..79 {
            advance(100).await;
            activity.touch();
            assert!(rx.try_recv().is_err());
        }
        advance(100).await;
        assert_eq!(rx.try_recv().unwrap(), StopReason::HardStop);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_silences_the_monitor() {
        let activity = ActivityClock::new();
        let (tx, mut rx) = mpsc::channel(4);
        let monitor = EndpointMonitor::spawn(params(Instant::now()), activity, tx);

        monitor.cancel();
        advance(10_000).await;
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_the_task() {
        let activity = ActivityClock::new();
        let (tx, mut rx) = mpsc::channel(4);
        let monitor = EndpointMonitor::spawn(params(Instant::now()), activity, tx);

        drop(monitor);
        advance(10_000).await;
        assert_eq!(rx.recv().await, None);
    }
}
