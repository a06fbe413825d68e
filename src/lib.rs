//! Parley - Voice and text conversation client core for AI assistants
//!
//! This library provides the conversation core for a voice/text
//! assistant client:
//! - Session control (ordered message log, turn pipeline, retry)
//! - Voice capture lifecycle (single-shot utterance capture)
//! - Local message persistence (`SQLite`)
//! - PCM to WAV containerization
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  Input                          │
//! │     microphone (VAD)    │    typed text         │
//! └───────────┬─────────────┴─────────┬─────────────┘
//!             │ utterance samples     │
//! ┌───────────▼───────────┐           │
//! │    SpeechLifecycle    │           │
//! └───────────┬───────────┘           │
//!             │ WavEncoder            │
//! ┌───────────▼───────────────────────▼─────────────┐
//! │                 Conversation                    │
//! │   message log │ turn pipeline │ retry │ sweep   │
//! └───────┬─────────────────────────────────┬───────┘
//!         │                                 │
//! ┌───────▼────────┐               ┌────────▼───────┐
//! │  MessageStore  │               │ SpeechBackend  │
//! │    (SQLite)    │               │ (HTTP multi-   │
//! │                │               │  part form)    │
//! └────────────────┘               └────────────────┘
//! ```

pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod store;
pub mod voice;

pub use backend::{HttpSpeechBackend, SpeechBackend, TurnReply, TurnRequest};
pub use config::Config;
pub use error::{Error, Result};
pub use message::{HistoryEntry, Message, MessageKind, Role};
pub use session::{Conversation, PendingFailure};
pub use store::{MessageStore, SqliteStore};
pub use voice::{LifecycleState, MicEngine, SpeechLifecycle, VadEngine, VadEvent, VadSession};
