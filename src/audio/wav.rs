//! PCM to WAV containerization

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Sample rate used for speech audio (16kHz)
pub const SAMPLE_RATE: u32 = 16_000;

/// Encode f32 samples in [-1.0, 1.0] as a mono 16-bit PCM WAV
///
/// Output is deterministic for identical input. An empty sample slice
/// yields a valid header-only container rather than an error; samples
/// outside the nominal range are clamped.
#[must_use]
pub fn encode(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    write_wav(samples, sample_rate).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "wav encoding failed, emitting empty container");
        write_wav(&[], sample_rate).unwrap_or_default()
    })
}

fn write_wav(samples: &[f32], sample_rate: u32) -> hound::Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(sample_i16)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
