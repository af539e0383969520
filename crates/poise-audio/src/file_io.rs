//! Audio file I/O

use anyhow::{Context, Result};
use hound::WavReader;
use poise_types::Waveform;
use std::io::{Cursor, Read};
use std::path::Path;

/// Load an audio file as an interleaved waveform at its native sample rate
pub fn load_audio_file(path: impl AsRef<Path>) -> Result<Waveform> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let waveform = match ext.as_str() {
        "wav" | "wave" => {
            let reader = WavReader::open(path)
                .with_context(|| format!("Failed to open WAV file: {:?}", path))?;
            read_wav(reader).with_context(|| format!("Failed to decode WAV file: {:?}", path))?
        }
        "mp3" | "m4a" | "aac" | "ogg" | "flac" | "aif" | "aiff" => load_with_symphonia(path)?,
        _ => anyhow::bail!("Unsupported audio format: {:?}", path),
    };

    tracing::debug!(
        "Loaded {:?}: {} frames, {} channel(s) @ {}Hz ({:.2}s)",
        path,
        waveform.frame_count(),
        waveform.channels,
        waveform.sample_rate,
        waveform.duration_secs()
    );

    Ok(waveform)
}

/// Decode an in-memory WAV recording
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<Waveform> {
    let reader = WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV header")?;
    read_wav(reader).context("Failed to decode WAV data")
}

/// Encode a waveform as 16-bit PCM WAV bytes
pub fn waveform_to_wav_bytes(waveform: &Waveform) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: waveform.channels,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in &waveform.samples {
            // Convert f32 (-1.0 to 1.0) to i16
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(sample_i16)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Read every sample of a WAV stream. A truncated or corrupt data chunk is an error.
fn read_wav<R: Read>(reader: WavReader<R>) -> Result<Waveform> {
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(Waveform::new(samples, spec.channels, spec.sample_rate))
}

/// Load audio file using symphonia (supports mp3, m4a, ogg, flac, aiff)
fn load_with_symphonia(path: &Path) -> Result<Waveform> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {:?}", path))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Failed to probe audio format: {:?}", path))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found")?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Unknown sample rate")?;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("Skipping undecodable packet in {:?}: {}", path, e);
                continue;
            }
            Err(e) => return Err(e).context("Failed to decode audio packet"),
        };

        let spec = *decoded.spec();
        if channels.is_none() {
            channels = Some(spec.channels.count());
        }

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let channels = channels.context("Unknown channel count")?;
    if samples.is_empty() {
        anyhow::bail!("No audio samples decoded from {:?}", path);
    }

    Ok(Waveform::new(samples, channels as u16, sample_rate))
}
