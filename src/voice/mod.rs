//! Voice capture lifecycle
//!
//! [`SpeechLifecycle`] governs when microphone capture is active and
//! guarantees a captured utterance is delivered at most once. The
//! voice-activity capability behind it is the [`VadEngine`] /
//! [`VadSession`] pair; [`MicEngine`] is the shipped implementation
//! (cpal capture + RMS-energy segmentation).

mod lifecycle;
mod mic;

use async_trait::async_trait;

use crate::Result;
use crate::config::VoiceConfig;

pub use lifecycle::{LifecycleState, SpeechLifecycle};
pub use mic::MicEngine;

/// Events produced by a capture session, drained via `poll_event`
#[derive(Debug, Clone)]
pub enum VadEvent {
    /// Speech detected in the capture stream
    SpeechStart,
    /// An utterance completed; carries the captured samples
    SpeechEnd(Vec<f32>),
}

/// Factory for capture sessions
///
/// Opening is asynchronous and may fail (no device, permission
/// denied); nothing touches audio hardware before `open`.
#[async_trait(?Send)]
pub trait VadEngine {
    async fn open(&self, config: &VoiceConfig) -> Result<Box<dyn VadSession>>;
}

/// One live capture session
///
/// Dropping the session releases the microphone.
pub trait VadSession {
    /// Begin capturing
    ///
    /// # Errors
    ///
    /// Returns error if the capture stream cannot be started
    fn start(&mut self) -> Result<()>;

    /// Stop capturing immediately
    fn pause(&mut self);

    /// Drain the next pending event, if any
    fn poll_event(&mut self) -> Option<VadEvent>;
}
