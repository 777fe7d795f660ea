//! Recognition-source capability boundary.
//!
//! The runtime owns the lifecycle of a continuous speech recognizer (start,
//! stop, restart) but not the recognition algorithm itself. Any engine that
//! can produce a stream of transcript events fits behind
//! [`RecognitionSource`]; tests use the bundled [`ScriptedSource`].

mod scripted;

pub use scripted::{ScriptAction, ScriptStep, ScriptedSource};

use std::sync::Arc;

use async_trait::async_trait;
use hotphrase_config::RuntimeConfig;
use tokio::sync::mpsc;

/// One event from a running recognition source.
///
/// `error` being present is non-fatal; the transcript field alone drives
/// state downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognizerEvent {
    /// Cumulative transcript hypothesis for the current audio buffer, when
    /// the engine produced one.
    pub transcript: Option<String>,
    /// Engine-reported error text, when any.
    pub error: Option<String>,
}

impl RecognizerEvent {
    /// Event carrying only transcript text.
    pub fn text(transcript: impl Into<String>) -> Self {
        Self {
            transcript: Some(transcript.into()),
            error: None,
        }
    }

    /// Event carrying only an error.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            transcript: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecognizerError {
    #[error("audio input unavailable: {0}")]
    AudioUnavailable(String),
    #[error("recognition source failed to start: {0}")]
    StartFailed(String),
}

pub type Result<T> = std::result::Result<T, RecognizerError>;

/// Continuous speech recognition engine behind a start/stop lifecycle.
///
/// `start` acquires the audio resource and returns the event stream for this
/// run. The receiver closing means the source died; callers are expected to
/// restart. `stop` releases the resource and must be safe to call
/// redundantly.
#[async_trait]
pub trait RecognitionSource: Send + Sync {
    async fn start(&self, config: &RuntimeConfig) -> Result<mpsc::Receiver<RecognizerEvent>>;
    async fn stop(&self);
}

pub type RecognitionSourceRef = Arc<dyn RecognitionSource>;
