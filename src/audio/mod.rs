//! Audio encoding
//!
//! Raw capture samples are containerized as WAV before leaving the
//! process; everything else about audio (capture, segmentation) lives
//! in `voice`.

pub mod wav;

pub use wav::{SAMPLE_RATE, encode};
