//! Conversation session controller
//!
//! Owns the ordered message log and drives the turn pipeline: append
//! the user's message (provisional for audio, final for text), send
//! the turn to the speech backend, reconcile the reply into the log,
//! and keep the store in sync. Network failure surfaces as a single
//! user-visible error with the failed input retained for manual retry.

use std::sync::Arc;

use crate::audio;
use crate::backend::{SpeechBackend, TurnReply, TurnRequest};
use crate::message::{HistoryEntry, Message, MessageKind, Role, reply_timestamp};
use crate::store::MessageStore;
use crate::{Error, Result};

const AUDIO_TURN_FALLBACK: &str = "Something went wrong while processing the audio.";
const TEXT_TURN_FALLBACK: &str = "Something went wrong while processing the text.";

/// The single most recent failed turn, kept for manual retry
///
/// Overwritten by each new failure; earlier failures are not queued.
#[derive(Debug, Clone)]
pub enum PendingFailure {
    /// Raw utterance samples; retry re-encodes from source
    Audio(Vec<f32>),
    /// Submitted text
    Text(String),
}

#[derive(Clone, Copy)]
enum TurnKind {
    Audio,
    Text,
}

/// Conversation session controller
pub struct Conversation {
    backend: Arc<dyn SpeechBackend>,
    store: Arc<dyn MessageStore>,
    messages: Vec<Message>,
    thinking: bool,
    error: Option<String>,
    last_failed: Option<PendingFailure>,
    sample_rate: u32,
}

impl Conversation {
    /// Create a controller with an empty log
    #[must_use]
    pub fn new(backend: Arc<dyn SpeechBackend>, store: Arc<dyn MessageStore>) -> Self {
        Self {
            backend,
            store,
            messages: Vec::new(),
            thinking: false,
            error: None,
            last_failed: None,
            sample_rate: audio::SAMPLE_RATE,
        }
    }

    /// Override the sample rate used when encoding utterances
    #[must_use]
    pub const fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Create a controller and adopt the persisted history
    ///
    /// Records without an id are dropped; the rest are sorted ascending
    /// by timestamp. A store failure starts the session empty rather
    /// than failing it.
    pub async fn load(backend: Arc<dyn SpeechBackend>, store: Arc<dyn MessageStore>) -> Self {
        let mut session = Self::new(backend, store);

        match session.store.get_all().await {
            Ok(mut messages) => {
                messages.retain(|m| !m.id.is_empty());
                messages.sort_by_key(|m| m.timestamp);
                tracing::debug!(count = messages.len(), "adopted persisted history");
                session.messages = messages;
            }
            Err(e) => {
                tracing::warn!(error = %e, "loading persisted history failed, starting empty");
            }
        }

        session
    }

    /// The ordered message log
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether a turn is currently in flight
    #[must_use]
    pub const fn is_thinking(&self) -> bool {
        self.thinking
    }

    /// The surfaced error, if any
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The remembered failed turn, if any
    #[must_use]
    pub const fn pending_failure(&self) -> Option<&PendingFailure> {
        self.last_failed.as_ref()
    }

    /// Submit a captured utterance as an audio turn
    pub async fn submit_audio(&mut self, samples: Vec<f32>) {
        self.error = None;

        let wav = audio::encode(&samples, self.sample_rate);
        if let Err(e) = self.audio_turn(wav).await {
            self.thinking = false;
            self.error = Some(user_message(&e, TurnKind::Audio));
            self.last_failed = Some(PendingFailure::Audio(samples));
        }
    }

    /// Submit typed text as a text turn; empty input is a no-op
    pub async fn submit_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.error = None;

        if let Err(e) = self.text_turn(text).await {
            self.thinking = false;
            self.error = Some(user_message(&e, TurnKind::Text));
            self.last_failed = Some(PendingFailure::Text(text.to_string()));
        }
    }

    /// Empty the log and the store; not reversible
    pub async fn clear(&mut self) {
        self.messages.clear();
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "clearing message store failed");
        }
    }

    /// Replay the last failed turn, if one is remembered
    pub async fn retry_last(&mut self) {
        let Some(failed) = self.last_failed.take() else {
            return;
        };
        self.error = None;

        match failed {
            PendingFailure::Audio(samples) => self.submit_audio(samples).await,
            PendingFailure::Text(text) => self.submit_text(&text).await,
        }
    }

    /// Drop the surfaced error and the remembered failure
    pub fn dismiss_error(&mut self) {
        self.error = None;
        self.last_failed = None;
    }

    async fn audio_turn(&mut self, wav: Vec<u8>) -> Result<()> {
        // History reflects the log before the provisional append; the
        // utterance itself travels in the audio field.
        let history = self.history();

        let user = Message::new(Role::User, MessageKind::Audio, String::new(), Some(wav.clone()));
        let user_id = user.id.clone();
        let user_ts = user.timestamp;
        self.messages.push(user);
        self.sweep().await;

        self.thinking = true;
        let reply = self
            .backend
            .converse(TurnRequest {
                audio: Some(wav),
                history,
                tts_enabled: true,
            })
            .await?;
        self.thinking = false;

        self.apply_reply(reply, Some(&user_id), user_ts).await;
        Ok(())
    }

    async fn text_turn(&mut self, text: &str) -> Result<()> {
        let user = Message::new(Role::User, MessageKind::Text, text.to_string(), None);
        let user_id = user.id.clone();
        let user_ts = user.timestamp;
        self.messages.push(user);

        // History includes the just-appended user message.
        let history = self.history();
        self.sweep().await;

        self.thinking = true;
        let reply = self
            .backend
            .converse(TurnRequest {
                audio: None,
                history,
                tts_enabled: false,
            })
            .await;

        match reply {
            Ok(reply) => {
                self.thinking = false;
                self.apply_reply(reply, None, user_ts).await;
                Ok(())
            }
            Err(e) => {
                // A partially submitted text turn must not linger.
                self.rollback(&user_id).await;
                Err(e)
            }
        }
    }

    async fn apply_reply(&mut self, reply: TurnReply, provisional_id: Option<&str>, user_ts: i64) {
        match reply {
            TurnReply::Spoken {
                transcript,
                response,
                audio,
            } => {
                if let Some(id) = provisional_id {
                    self.update_content(id, transcript);
                    self.persist_by_id(id).await;
                }

                let mut assistant =
                    Message::new(Role::Assistant, MessageKind::Audio, response, Some(audio));
                assistant.timestamp = reply_timestamp(user_ts);
                match self.store.put(&assistant).await {
                    Ok(()) => assistant.persisted = true,
                    Err(e) => {
                        tracing::warn!(error = %e, id = %assistant.id, "persisting reply failed");
                    }
                }
                self.messages.push(assistant);
            }
            TurnReply::Text {
                transcript,
                response,
            } => {
                if let Some(id) = provisional_id {
                    self.update_content(id, transcript.unwrap_or_default());
                }

                let mut assistant = Message::new(Role::Assistant, MessageKind::Text, response, None);
                assistant.timestamp = reply_timestamp(user_ts);
                self.messages.push(assistant);
            }
        }

        self.sweep().await;
    }

    fn history(&self) -> Vec<HistoryEntry> {
        self.messages.iter().map(Message::history_entry).collect()
    }

    fn update_content(&mut self, id: &str, content: String) {
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) {
            msg.content = content;
            msg.persisted = false;
        }
    }

    async fn persist_by_id(&mut self, id: &str) {
        let Some(idx) = self.messages.iter().position(|m| m.id == id) else {
            return;
        };
        match self.store.put(&self.messages[idx]).await {
            Ok(()) => self.messages[idx].persisted = true,
            Err(e) => tracing::warn!(error = %e, id, "message persistence failed"),
        }
    }

    async fn rollback(&mut self, id: &str) {
        self.messages.retain(|m| m.id != id);
        if let Err(e) = self.store.remove(id).await {
            tracing::warn!(error = %e, id, "removing rolled-back message failed");
        }
    }

    /// Reconciliation pass: write every message that has not yet landed
    /// in the store. Failures leave the flag clear for the next pass.
    async fn sweep(&mut self) {
        for idx in 0..self.messages.len() {
            if self.messages[idx].persisted {
                continue;
            }
            match self.store.put(&self.messages[idx]).await {
                Ok(()) => self.messages[idx].persisted = true,
                Err(e) => {
                    tracing::warn!(error = %e, id = %self.messages[idx].id, "sweep write failed");
                }
            }
        }
    }
}

/// Normalize a turn-pipeline error to a user-visible string
fn user_message(error: &Error, kind: TurnKind) -> String {
    let message = error.to_string();
    if message.is_empty() {
        match kind {
            TurnKind::Audio => AUDIO_TURN_FALLBACK.to_string(),
            TurnKind::Text => TEXT_TURN_FALLBACK.to_string(),
        }
    } else {
        message
    }
}
