//! Speech backend client
//!
//! Single-endpoint contract: a multipart POST carrying the utterance
//! audio (audio turns), the serialized conversation history, and a
//! `ttsEnabled` flag. Replies come back either as binary audio with
//! URL-encoded `X-Transcript`/`X-Response` headers or as a JSON body.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::message::HistoryEntry;
use crate::{Error, Result};

/// One outbound conversation turn
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Encoded WAV utterance; present for audio turns only
    pub audio: Option<Vec<u8>>,

    /// Conversation history as `{role, content}` pairs. Omitted from
    /// the wire when empty.
    pub history: Vec<HistoryEntry>,

    /// Whether a spoken reply is desired
    pub tts_enabled: bool,
}

/// Backend reply, one of the two success branches
#[derive(Debug, Clone)]
pub enum TurnReply {
    /// Spoken reply: response audio plus recognized/reply text carried
    /// in headers
    Spoken {
        transcript: String,
        response: String,
        audio: Vec<u8>,
    },

    /// Text-only reply
    Text {
        transcript: Option<String>,
        response: String,
    },
}

/// Capability interface the conversation controller depends on
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Submit one turn and await the assistant's reply
    async fn converse(&self, request: TurnRequest) -> Result<TurnReply>;
}

/// `{error}` body of a non-2xx reply
#[derive(serde::Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// JSON body of a text-only reply
#[derive(serde::Deserialize)]
struct TextReplyBody {
    transcript: Option<String>,
    response: String,
}

/// HTTP implementation of [`SpeechBackend`]
pub struct HttpSpeechBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSpeechBackend {
    /// Create a backend client for the given endpoint
    ///
    /// # Errors
    ///
    /// Returns error if no endpoint is configured or the HTTP client
    /// cannot be built
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::Config("speech endpoint is not configured".to_string()))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, endpoint })
    }

    /// Create a backend client from resolved configuration
    ///
    /// # Errors
    ///
    /// Returns error if no endpoint is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.endpoint.clone(),
            Duration::from_secs(config.backend.timeout_secs),
        )
    }
}

#[async_trait]
impl SpeechBackend for HttpSpeechBackend {
    async fn converse(&self, request: TurnRequest) -> Result<TurnReply> {
        let mut form = reqwest::multipart::Form::new();

        if let Some(audio) = request.audio {
            tracing::debug!(audio_bytes = audio.len(), "attaching utterance audio");
            form = form.part(
                "audio",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("speech.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Audio(e.to_string()))?,
            );
        }

        if !request.history.is_empty() {
            form = form.text("messageHistory", serde_json::to_string(&request.history)?);
        }

        form = form.text(
            "ttsEnabled",
            if request.tts_enabled { "true" } else { "false" },
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "backend request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received backend response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| "Processing failed".to_string());
            tracing::error!(status = %status, message, "backend returned error");
            return Err(Error::Backend(message));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.contains("audio") {
            let transcript = header_text(&response, "X-Transcript");
            let reply = header_text(&response, "X-Response");
            let audio = response.bytes().await?.to_vec();
            tracing::debug!(audio_bytes = audio.len(), "spoken reply");
            Ok(TurnReply::Spoken {
                transcript,
                response: reply,
                audio,
            })
        } else {
            let body: TextReplyBody = response.json().await?;
            Ok(TurnReply::Text {
                transcript: body.transcript,
                response: body.response,
            })
        }
    }
}

/// Read a URL-encoded header value, empty string when absent
fn header_text(response: &reqwest::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(decode_component)
        .unwrap_or_default()
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |d| d.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_component() {
        assert_eq!(decode_component("hi%20there"), "hi there");
        assert_eq!(decode_component("plain"), "plain");
        // Invalid escapes fall back to the raw value
        assert_eq!(decode_component("bad%ZZescape"), "bad%ZZescape");
    }

    #[test]
    fn test_text_reply_body_parses() {
        let body: TextReplyBody =
            serde_json::from_str(r#"{"transcript":"hello","response":"hi there"}"#).unwrap();
        assert_eq!(body.transcript.as_deref(), Some("hello"));
        assert_eq!(body.response, "hi there");

        let no_transcript: TextReplyBody =
            serde_json::from_str(r#"{"response":"hi"}"#).unwrap();
        assert!(no_transcript.transcript.is_none());
    }

    #[test]
    fn test_error_body_parses() {
        let body: ErrorBody = serde_json::from_str(r#"{"error":"bad"}"#).unwrap();
        assert_eq!(body.error.as_deref(), Some("bad"));

        let empty: ErrorBody = serde_json::from_str("{}").unwrap();
        assert!(empty.error.is_none());
    }

    #[test]
    fn test_missing_endpoint_is_config_error() {
        let err = HttpSpeechBackend::new(None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = HttpSpeechBackend::new(Some(String::new()), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
