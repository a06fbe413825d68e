//! Speech capture lifecycle controller

use std::sync::Arc;

use super::{VadEngine, VadEvent, VadSession};
use crate::config::VoiceConfig;
use crate::{Error, Result};

/// State of the capture lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No capture capability attached
    Idle,
    /// Capability available, not capturing
    Ready,
    /// Capturing, no speech detected yet
    Listening,
    /// Capturing, speech currently detected
    Speaking,
}

/// Governs when capture is active; single-shot per utterance
///
/// A captured utterance is delivered exactly once, after which the
/// session is torn down and the controller returns to `Ready` — the
/// caller re-arms with `start()`. A `pause()` racing a buffered
/// speech-end cannot cause a late or double delivery: delivery is
/// gated on the armed flag that `pause()` clears.
pub struct SpeechLifecycle {
    engine: Option<Arc<dyn VadEngine>>,
    session: Option<Box<dyn VadSession>>,
    state: LifecycleState,
    armed: bool,
    error: Option<String>,
    config: VoiceConfig,
}

impl SpeechLifecycle {
    /// Create a controller with no capture capability (`Idle`)
    #[must_use]
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            engine: None,
            session: None,
            state: LifecycleState::Idle,
            armed: false,
            error: None,
            config,
        }
    }

    /// Create a controller with a capture capability (`Ready`)
    #[must_use]
    pub fn with_engine(engine: Arc<dyn VadEngine>, config: VoiceConfig) -> Self {
        let mut lifecycle = Self::new(config);
        lifecycle.attach_engine(engine);
        lifecycle
    }

    /// Attach the capture capability, moving `Idle` to `Ready`
    pub fn attach_engine(&mut self, engine: Arc<dyn VadEngine>) {
        self.engine = Some(engine);
        if self.state == LifecycleState::Idle {
            self.state = LifecycleState::Ready;
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Whether the capability is attached and not capturing
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    /// Whether capture is active (listening or speaking)
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::Listening | LifecycleState::Speaking
        )
    }

    /// Whether speech is currently detected
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == LifecycleState::Speaking
    }

    /// Last initialization error, if any
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Arm capture for a single utterance
    ///
    /// Any stale session is torn down first, so two consecutive calls
    /// leave exactly one live session. Initialization failure is
    /// non-fatal: the error is recorded, the controller stays `Ready`
    /// and `start()` may be retried.
    ///
    /// # Errors
    ///
    /// Returns error if no capability is attached or the session
    /// cannot be opened or started
    pub async fn start(&mut self) -> Result<()> {
        let Some(engine) = self.engine.clone() else {
            let msg = "voice capability not available".to_string();
            self.error = Some(msg.clone());
            return Err(Error::Voice(msg));
        };

        // Stale session from a prior arm gets destroyed first.
        self.teardown();

        match engine.open(&self.config).await {
            Ok(mut session) => {
                if let Err(e) = session.start() {
                    self.error = Some(e.to_string());
                    return Err(e);
                }
                self.session = Some(session);
                self.armed = true;
                self.state = LifecycleState::Listening;
                self.error = None;
                tracing::debug!("capture armed");
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                tracing::warn!(error = %e, "opening capture session failed");
                Err(e)
            }
        }
    }

    /// Stop capturing and disarm; safe and idempotent from any state
    pub fn pause(&mut self) {
        self.teardown();
        tracing::debug!("capture paused");
    }

    /// Feed a speech-start event from the active session
    pub fn on_speech_start(&mut self) {
        if self.state == LifecycleState::Listening {
            self.state = LifecycleState::Speaking;
        }
    }

    /// Feed a speech-end event; returns the utterance at most once
    ///
    /// Delivery only happens while armed — a buffered event arriving
    /// after `pause()` (or after a prior delivery) is discarded. The
    /// session is torn down on delivery: capture is single-shot.
    pub fn on_speech_end(&mut self, samples: Vec<f32>) -> Option<Vec<f32>> {
        if !self.armed {
            tracing::debug!("discarding speech-end after disarm");
            return None;
        }
        self.teardown();
        tracing::debug!(samples = samples.len(), "utterance captured");
        Some(samples)
    }

    /// Drain session events and apply transitions
    ///
    /// Returns a completed utterance when one is delivered.
    pub fn pump(&mut self) -> Option<Vec<f32>> {
        loop {
            let event = self.session.as_mut()?.poll_event()?;
            match event {
                VadEvent::SpeechStart => self.on_speech_start(),
                VadEvent::SpeechEnd(samples) => {
                    if let Some(utterance) = self.on_speech_end(samples) {
                        return Some(utterance);
                    }
                }
            }
        }
    }

    fn teardown(&mut self) {
        self.armed = false;
        if let Some(mut session) = self.session.take() {
            session.pause();
        }
        if self.state != LifecycleState::Idle {
            self.state = LifecycleState::Ready;
        }
    }
}

impl Drop for SpeechLifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct ScriptedSession {
        events: VecDeque<VadEvent>,
        live: Arc<AtomicUsize>,
    }

    impl VadSession for ScriptedSession {
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn pause(&mut self) {}
        fn poll_event(&mut self) -> Option<VadEvent> {
            self.events.pop_front()
        }
    }

    impl Drop for ScriptedSession {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct ScriptedEngine {
        events: Vec<VadEvent>,
        fail_opens: AtomicUsize,
        live: Arc<AtomicUsize>,
    }

    impl ScriptedEngine {
        fn new(events: Vec<VadEvent>) -> Self {
            Self {
                events,
                fail_opens: AtomicUsize::new(0),
                live: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing_first(events: Vec<VadEvent>) -> Self {
            let engine = Self::new(events);
            engine.fail_opens.store(1, Ordering::SeqCst);
            engine
        }
    }

    #[async_trait(?Send)]
    impl VadEngine for ScriptedEngine {
        async fn open(&self, _config: &VoiceConfig) -> Result<Box<dyn VadSession>> {
            if self.fail_opens.load(Ordering::SeqCst) > 0 {
                self.fail_opens.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Voice("microphone unavailable".to_string()));
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSession {
                events: self.events.clone().into(),
                live: Arc::clone(&self.live),
            }))
        }
    }

    fn lifecycle_with(engine: ScriptedEngine) -> (SpeechLifecycle, Arc<AtomicUsize>) {
        let live = Arc::clone(&engine.live);
        (
            SpeechLifecycle::with_engine(Arc::new(engine), VoiceConfig::default()),
            live,
        )
    }

    #[tokio::test]
    async fn test_boot_state() {
        let idle = SpeechLifecycle::new(VoiceConfig::default());
        assert_eq!(idle.state(), LifecycleState::Idle);

        let (ready, _) = lifecycle_with(ScriptedEngine::new(vec![]));
        assert_eq!(ready.state(), LifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_start_without_engine_fails() {
        let mut lifecycle = SpeechLifecycle::new(VoiceConfig::default());
        assert!(lifecycle.start().await.is_err());
        assert_eq!(lifecycle.state(), LifecycleState::Idle);
        assert!(lifecycle.last_error().is_some());
    }

    #[tokio::test]
    async fn test_start_twice_leaves_one_live_session() {
        let (mut lifecycle, live) = lifecycle_with(ScriptedEngine::new(vec![]));

        lifecycle.start().await.unwrap();
        lifecycle.start().await.unwrap();

        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), LifecycleState::Listening);
    }

    #[tokio::test]
    async fn test_utterance_delivered_once_then_ready() {
        let (mut lifecycle, live) = lifecycle_with(ScriptedEngine::new(vec![
            VadEvent::SpeechStart,
            VadEvent::SpeechEnd(vec![0.1, 0.2]),
        ]));

        lifecycle.start().await.unwrap();
        let utterance = lifecycle.pump().expect("utterance");
        assert_eq!(utterance, vec![0.1, 0.2]);

        // Single-shot: back to Ready with the session destroyed
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert!(lifecycle.pump().is_none());
    }

    #[tokio::test]
    async fn test_speech_start_transitions_to_speaking() {
        let (mut lifecycle, _) =
            lifecycle_with(ScriptedEngine::new(vec![VadEvent::SpeechStart]));

        lifecycle.start().await.unwrap();
        assert!(lifecycle.pump().is_none());
        assert_eq!(lifecycle.state(), LifecycleState::Speaking);
    }

    #[tokio::test]
    async fn test_pause_gates_buffered_delivery() {
        let (mut lifecycle, live) = lifecycle_with(ScriptedEngine::new(vec![]));

        lifecycle.start().await.unwrap();
        lifecycle.pause();

        // A speech-end buffered before the pause must not deliver
        assert!(lifecycle.on_speech_end(vec![0.5; 100]).is_none());
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pause_is_idempotent() {
        let (mut lifecycle, _) = lifecycle_with(ScriptedEngine::new(vec![]));
        lifecycle.pause();
        lifecycle.pause();
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_open_failure_is_retryable() {
        let (mut lifecycle, _) = lifecycle_with(ScriptedEngine::failing_first(vec![]));

        assert!(lifecycle.start().await.is_err());
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
        assert_eq!(lifecycle.last_error(), Some("voice error: microphone unavailable"));

        // Second attempt succeeds and clears the error
        lifecycle.start().await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Listening);
        assert!(lifecycle.last_error().is_none());
    }
}
