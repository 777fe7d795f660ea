//! Null and recording collaborator implementations.
//!
//! The recording variants capture every call behind a mutex so tests can
//! assert exact notification sequences; the null variants discard
//! everything.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::{
    ActivityIndicator, DismissReason, ForwardConfig, ForwardConfigProvider, PresentationSink,
};

/// A captured presentation notification.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationCall {
    Partial(String),
    Final {
        transcript: String,
        forward: ForwardConfig,
        delay: Duration,
    },
    Dismiss(DismissReason),
    DismissAll,
}

/// Presentation sink that records calls for inspection.
#[derive(Default)]
pub struct RecordingPresentation {
    calls: Mutex<Vec<PresentationCall>>,
}

impl RecordingPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured calls, in notification order.
    pub fn calls(&self) -> Vec<PresentationCall> {
        self.lock().clone()
    }

    /// Captured partial transcripts, in order.
    pub fn partials(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                PresentationCall::Partial(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    /// Captured final presentations as `(transcript, forward, delay)`.
    pub fn finals(&self) -> Vec<(String, ForwardConfig, Duration)> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                PresentationCall::Final {
                    transcript,
                    forward,
                    delay,
                } => Some((transcript.clone(), forward.clone(), *delay)),
                _ => None,
            })
            .collect()
    }

    /// Captured dismissals with a reason.
    pub fn dismissals(&self) -> Vec<DismissReason> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                PresentationCall::Dismiss(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    /// Number of bare `dismiss_all` calls.
    pub fn dismiss_all_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|c| matches!(c, PresentationCall::DismissAll))
            .count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PresentationCall>> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn push(&self, call: PresentationCall) {
        self.lock().push(call);
    }
}

impl PresentationSink for RecordingPresentation {
    fn show_partial(&self, transcript: &str) {
        self.push(PresentationCall::Partial(transcript.to_string()));
    }

    fn present_final(&self, transcript: &str, forward: ForwardConfig, delay: Duration) {
        self.push(PresentationCall::Final {
            transcript: transcript.to_string(),
            forward,
            delay,
        });
    }

    fn dismiss(&self, reason: DismissReason) {
        self.push(PresentationCall::Dismiss(reason));
    }

    fn dismiss_all(&self) {
        self.push(PresentationCall::DismissAll);
    }
}

/// Presentation sink that discards everything.
pub struct NullPresentation;

impl PresentationSink for NullPresentation {
    fn show_partial(&self, _transcript: &str) {}
    fn present_final(&self, _transcript: &str, _forward: ForwardConfig, _delay: Duration) {}
    fn dismiss(&self, _reason: DismissReason) {}
    fn dismiss_all(&self) {}
}

/// Activity indicator counting begin/end pairs.
#[derive(Default)]
pub struct RecordingActivityIndicator {
    begins: AtomicUsize,
    ends: AtomicUsize,
}

impl RecordingActivityIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn ends(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

impl ActivityIndicator for RecordingActivityIndicator {
    fn begin_indicator(&self) {
        self.begins.fetch_add(1, Ordering::SeqCst);
    }

    fn end_indicator(&self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }
}

/// Activity indicator that discards everything.
pub struct NullActivityIndicator;

impl ActivityIndicator for NullActivityIndicator {
    fn begin_indicator(&self) {}
    fn end_indicator(&self) {}
}

/// Provider returning a fixed forward-routing payload.
#[derive(Default)]
pub struct StaticForwardConfig(pub ForwardConfig);

impl StaticForwardConfig {
    pub fn new(forward: ForwardConfig) -> Self {
        Self(forward)
    }
}

impl ForwardConfigProvider for StaticForwardConfig {
    fn current(&self) -> ForwardConfig {
        self.0.clone()
    }
}
