//! Collaborator contracts for the wake-phrase runtime.
//!
//! The controller never talks to a presentation layer, activity indicator,
//! or forwarding pipeline directly; it holds `Arc<dyn …>` handles to these
//! trait seams, injected at construction. Notifications are fire-and-forget:
//! every method is infallible from the caller's point of view, so a failing
//! collaborator can never block the finalize tail (cooldown + restart).

mod sinks;

pub use sinks::{
    NullActivityIndicator, NullPresentation, PresentationCall, RecordingActivityIndicator,
    RecordingPresentation, StaticForwardConfig,
};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a pending presentation was dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissReason {
    /// The capture ended with an empty transcript; nothing to forward.
    Empty,
    /// Ordinary dismissal after handling.
    Normal,
}

/// Opaque forward-routing payload.
///
/// Fetched from the [`ForwardConfigProvider`] at finalize time and passed
/// through to the presentation layer uninterpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForwardConfig(pub serde_json::Value);

/// Overlay/notification surface that shows capture progress and results.
pub trait PresentationSink: Send + Sync {
    /// Live transcript update while a capture is in progress.
    fn show_partial(&self, transcript: &str);
    /// Finalized transcript, the forward-routing payload, and how long the
    /// surface should wait before proceeding.
    fn present_final(&self, transcript: &str, forward: ForwardConfig, delay: Duration);
    /// Dismiss whatever is showing, with a reason.
    fn dismiss(&self, reason: DismissReason);
    /// Unconditional dismissal used when the whole runtime stops.
    fn dismiss_all(&self);
}

/// Visual cue that the listener is actively capturing.
pub trait ActivityIndicator: Send + Sync {
    fn begin_indicator(&self);
    fn end_indicator(&self);
}

/// Read-only source of the forward-routing configuration.
///
/// Queried once per finalize so the freshest routing wins.
pub trait ForwardConfigProvider: Send + Sync {
    fn current(&self) -> ForwardConfig;
}

pub type PresentationSinkRef = Arc<dyn PresentationSink>;
pub type ActivityIndicatorRef = Arc<dyn ActivityIndicator>;
pub type ForwardConfigProviderRef = Arc<dyn ForwardConfigProvider>;
