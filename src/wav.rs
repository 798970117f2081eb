//! WAV decode/encode for impulse responses and diagnostic dumps.

use std::path::Path;

use tracing::info;

use crate::{AudioClip, CavernError, Result};

/// Read a mono or stereo WAV file into a planar [`AudioClip`].
///
/// Integer samples (16/24/32 bit) are converted to float in `[-1, 1]`;
/// anything other than one or two channels is a configuration error.
pub fn read_clip<P: AsRef<Path>>(path: P) -> Result<AudioClip> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.channels > 2 {
        return Err(CavernError::UnsupportedChannels(spec.channels));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let channels = spec.channels as usize;
    let frames = interleaved.len() / channels;
    let clip = if channels == 1 {
        AudioClip::mono(interleaved, spec.sample_rate)
    } else {
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for frame in interleaved.chunks_exact(2) {
            left.push(frame[0]);
            right.push(frame[1]);
        }
        AudioClip::stereo(left, right, spec.sample_rate)?
    };

    info!(
        "loaded {}: {} channel(s), {} frames, {} Hz ({:.2}s)",
        path.display(),
        clip.num_channels(),
        clip.frames(),
        clip.sample_rate(),
        clip.frames() as f32 / clip.sample_rate() as f32
    );
    Ok(clip)
}

/// Write a clip as 16-bit PCM WAV. Samples are clamped to `[-1, 1]`.
pub fn write_clip<P: AsRef<Path>>(path: P, clip: &AudioClip) -> Result<()> {
    let spec = hound::WavSpec {
        channels: clip.num_channels() as u16,
        sample_rate: clip.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for frame in 0..clip.frames() {
        for ch in 0..clip.num_channels() {
            let sample = clip.channel(ch)[frame].clamp(-1.0, 1.0);
            writer.write_sample((sample * i16::MAX as f32) as i16)?;
        }
    }
    writer.finalize()?;
    info!("wrote {} ({} frames)", path.as_ref().display(), clip.frames());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");

        let left: Vec<f32> = (0..512).map(|i| (i as f32 * 0.02).sin() * 0.8).collect();
        let right: Vec<f32> = (0..512).map(|i| (i as f32 * 0.03).cos() * 0.5).collect();
        let clip = AudioClip::stereo(left, right, 44_100).unwrap();

        write_clip(&path, &clip).unwrap();
        let loaded = read_clip(&path).unwrap();

        assert_eq!(loaded.num_channels(), 2);
        assert_eq!(loaded.frames(), 512);
        assert_eq!(loaded.sample_rate(), 44_100);
        for i in 0..512 {
            // 16-bit quantization tolerance
            assert!(
                (loaded.channel(0)[i] - clip.channel(0)[i]).abs() < 1e-3,
                "left sample {} drifted",
                i
            );
            assert!((loaded.channel(1)[i] - clip.channel(1)[i]).abs() < 1e-3);
        }
    }
}
