//! Audio decoding crate for Poise
//!
//! Turns recordings into [`Waveform`]s at the sample rate and channel layout
//! the container reports. No resampling and no channel mixing happens here;
//! the analysis decides what to do with the layout.
//!
//! # Formats
//! - **WAV** via hound (file or in-memory bytes)
//! - **MP3, M4A/AAC, OGG, FLAC, AIFF** via symphonia

pub mod file_io;

pub use file_io::{decode_wav_bytes, load_audio_file, waveform_to_wav_bytes};
pub use poise_types::Waveform;
