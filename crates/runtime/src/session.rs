//! In-progress utterance capture.

use tokio::time::Instant;

/// Mutable record of exactly one utterance being captured.
///
/// The transcript is replaced wholesale on every recognizer update (engines
/// re-emit the full hypothesis, not deltas). `heard_beyond_trigger` latches
/// true once any update carries two or more whitespace-separated tokens and
/// never reverts within the same capture.
#[derive(Debug)]
pub struct CaptureSession {
    transcript: String,
    started_at: Instant,
    heard_beyond_trigger: bool,
}

impl CaptureSession {
    pub fn begin(initial: &str) -> Self {
        let mut session = Self {
            transcript: String::new(),
            started_at: Instant::now(),
            heard_beyond_trigger: false,
        };
        session.apply_update(initial);
        session
    }

    /// Replace the accumulated transcript with a fresh post-trigger trim.
    pub fn apply_update(&mut self, trimmed: &str) {
        self.transcript.clear();
        self.transcript.push_str(trimmed);
        if !self.heard_beyond_trigger && trimmed.split_whitespace().nth(1).is_some() {
            self.heard_beyond_trigger = true;
        }
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn heard_beyond_trigger(&self) -> bool {
        self.heard_beyond_trigger
    }
}
