//! Microphone voice-activity engine
//!
//! Captures mono audio from the default input device and segments the
//! sample stream into utterances with an RMS-energy gate: a segment
//! opens once enough speech energy accumulates and closes after a
//! trailing silence window.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};

use super::{VadEngine, VadEvent, VadSession};
use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Engine that opens microphone capture sessions
///
/// Holds no device handles itself; hardware is only touched when a
/// session is opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct MicEngine;

impl MicEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl VadEngine for MicEngine {
    async fn open(&self, config: &VoiceConfig) -> Result<Box<dyn VadSession>> {
        MicSession::open(config).map(|s| Box::new(s) as Box<dyn VadSession>)
    }
}

/// One live microphone session
struct MicSession {
    stream: Option<Stream>,
    buffer: Arc<Mutex<Vec<f32>>>,
    segmenter: Segmenter,
    capturing: bool,
}

impl MicSession {
    fn open(config: &VoiceConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Voice("no input device available".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Voice(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(config.sample_rate)
                    && c.max_sample_rate() >= SampleRate(config.sample_rate)
            })
            .ok_or_else(|| Error::Voice("no suitable capture config found".to_string()))?;

        let stream_config = supported
            .with_sample_rate(SampleRate(config.sample_rate))
            .config();

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let callback_buffer = Arc::clone(&buffer);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = callback_buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Voice(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate,
            "capture session opened"
        );

        Ok(Self {
            stream: Some(stream),
            buffer,
            segmenter: Segmenter::new(config),
            capturing: false,
        })
    }
}

impl VadSession for MicSession {
    fn start(&mut self) -> Result<()> {
        if let Some(stream) = &self.stream {
            stream.play().map_err(|e| Error::Voice(e.to_string()))?;
            self.capturing = true;
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.capturing = false;
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
    }

    fn poll_event(&mut self) -> Option<VadEvent> {
        if self.capturing {
            let chunk = self
                .buffer
                .lock()
                .map(|mut buf| std::mem::take(&mut *buf))
                .unwrap_or_default();
            if !chunk.is_empty() {
                self.segmenter.feed(&chunk);
            }
        }
        self.segmenter.next_event()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    /// Waiting for speech energy
    Waiting,
    /// Energy heard but segment not yet committed
    Pending,
    /// Segment committed; speech-start emitted
    Committed,
}

/// Turns a sample stream into speech-start / speech-end events
struct Segmenter {
    energy_threshold: f32,
    min_speech_samples: usize,
    silence_samples: usize,
    state: SegmentState,
    speech_buffer: Vec<f32>,
    speech_len: usize,
    silence_counter: usize,
    events: VecDeque<VadEvent>,
}

impl Segmenter {
    fn new(config: &VoiceConfig) -> Self {
        let per_ms = config.sample_rate as usize / 1000;
        Self {
            energy_threshold: config.energy_threshold,
            min_speech_samples: config.min_speech_ms as usize * per_ms,
            silence_samples: config.silence_ms as usize * per_ms,
            state: SegmentState::Waiting,
            speech_buffer: Vec::new(),
            speech_len: 0,
            silence_counter: 0,
            events: VecDeque::new(),
        }
    }

    fn feed(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let energy = rms_energy(samples);
        let is_speech = energy > self.energy_threshold;

        match self.state {
            SegmentState::Waiting => {
                if is_speech {
                    self.state = SegmentState::Pending;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.speech_len = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "energy above threshold");
                }
            }
            SegmentState::Pending => {
                self.speech_buffer.extend_from_slice(samples);
                if is_speech {
                    self.speech_len += samples.len();
                    self.silence_counter = 0;
                    if self.speech_len >= self.min_speech_samples {
                        self.state = SegmentState::Committed;
                        self.events.push_back(VadEvent::SpeechStart);
                        tracing::debug!("speech segment committed");
                    }
                } else {
                    self.silence_counter += samples.len();
                    // Brief blip without enough speech: discard quietly
                    if self.silence_counter > self.silence_samples * 2 {
                        self.reset();
                        tracing::trace!("pending segment discarded");
                    }
                }
            }
            SegmentState::Committed => {
                self.speech_buffer.extend_from_slice(samples);
                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                    if self.silence_counter > self.silence_samples {
                        let utterance = std::mem::take(&mut self.speech_buffer);
                        tracing::debug!(samples = utterance.len(), "speech segment complete");
                        self.events.push_back(VadEvent::SpeechEnd(utterance));
                        self.reset();
                    }
                }
            }
        }
    }

    fn next_event(&mut self) -> Option<VadEvent> {
        self.events.pop_front()
    }

    fn reset(&mut self) {
        self.state = SegmentState::Waiting;
        self.speech_buffer.clear();
        self.speech_len = 0;
        self.silence_counter = 0;
    }
}

/// RMS energy of a sample block
#[allow(clippy::cast_precision_loss)]
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> Segmenter {
        Segmenter::new(&VoiceConfig::default())
    }

    fn speech_chunk(len: usize) -> Vec<f32> {
        vec![0.3; len]
    }

    fn silence_chunk(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    #[test]
    fn test_energy_calculation() {
        assert!(rms_energy(&silence_chunk(100)) < 0.001);
        assert!(rms_energy(&speech_chunk(100)) > 0.2);
        assert!((rms_energy(&[]) - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_silence_never_opens_segment() {
        let mut seg = segmenter();
        for _ in 0..20 {
            seg.feed(&silence_chunk(1600));
        }
        assert!(seg.next_event().is_none());
        assert_eq!(seg.state, SegmentState::Waiting);
    }

    #[test]
    fn test_speech_then_silence_emits_one_utterance() {
        let mut seg = segmenter();

        // 500ms of speech at 16kHz
        for _ in 0..5 {
            seg.feed(&speech_chunk(1600));
        }
        assert!(matches!(seg.next_event(), Some(VadEvent::SpeechStart)));

        // 600ms of trailing silence closes the segment
        for _ in 0..6 {
            seg.feed(&silence_chunk(1600));
        }

        match seg.next_event() {
            Some(VadEvent::SpeechEnd(samples)) => {
                // Payload covers the speech span (plus the tail)
                assert!(samples.len() >= 5 * 1600);
            }
            other => panic!("expected SpeechEnd, got {other:?}"),
        }
        assert!(seg.next_event().is_none());
    }

    #[test]
    fn test_short_blip_is_discarded() {
        let mut seg = segmenter();

        // 100ms blip, well under the 300ms minimum
        seg.feed(&speech_chunk(1600));
        for _ in 0..12 {
            seg.feed(&silence_chunk(1600));
        }

        assert!(seg.next_event().is_none());
        assert_eq!(seg.state, SegmentState::Waiting);
    }

    #[test]
    fn test_pause_in_speech_does_not_split_segment() {
        let mut seg = segmenter();

        for _ in 0..5 {
            seg.feed(&speech_chunk(1600));
        }
        let _ = seg.next_event(); // SpeechStart

        // 300ms pause, under the 500ms tail
        for _ in 0..3 {
            seg.feed(&silence_chunk(1600));
        }
        for _ in 0..3 {
            seg.feed(&speech_chunk(1600));
        }
        assert!(seg.next_event().is_none());

        for _ in 0..6 {
            seg.feed(&silence_chunk(1600));
        }
        assert!(matches!(seg.next_event(), Some(VadEvent::SpeechEnd(_))));
    }
}
