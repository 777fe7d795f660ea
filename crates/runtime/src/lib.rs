//! Wake-phrase listener runtime.
//!
//! The controller is the single writer for all mutable listener state: it
//! drains settings pushes, recognizer transcript events, and endpoint
//! monitor signals through one serialized loop. Captures are bounded by a
//! hard stop and ended early by silence; every finalize unconditionally
//! arms a short trigger cooldown and restarts the recognition source.

mod controller;
mod monitor;
mod session;

pub use controller::{
    Collaborators, ListenerController, ListenerHandle, RuntimeState, StatusSnapshot, TimingPolicy,
};
pub use monitor::{ActivityClock, StopReason};
pub use session::CaptureSession;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("listener controller is no longer running")]
    ControllerGone,
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
