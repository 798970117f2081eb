//! Planar audio buffers passed between the pipeline stages.

use crate::{spectral, CavernError, Result};

/// One or two channels of float samples at a fixed sample rate.
///
/// Channels are stored planar (not interleaved) and always have equal length.
/// A clip is owned by whichever stage currently holds it; stages hand clips
/// onward by value.
#[derive(Debug, Clone)]
pub struct AudioClip {
    sample_rate: u32,
    frames: usize,
    channels: Vec<Vec<f32>>,
}

impl AudioClip {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        let frames = samples.len();
        Self {
            sample_rate,
            frames,
            channels: vec![samples],
        }
    }

    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if left.len() != right.len() {
            return Err(CavernError::ChannelMismatch {
                left: left.len(),
                right: right.len(),
            });
        }
        let frames = left.len();
        Ok(Self {
            sample_rate,
            frames,
            channels: vec![left, right],
        })
    }

    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.first().map_or(0, Vec::len);
        debug_assert!(channels.iter().all(|c| c.len() == frames));
        Self {
            sample_rate,
            frames,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn is_stereo(&self) -> bool {
        self.channels.len() == 2
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |max, &s| max.max(s.abs()))
    }

    /// Scale all channels so the peak equals `target`. No-op on silence.
    pub fn normalize_to(&mut self, target: f32) {
        let peak = self.peak();
        if peak > 0.0 {
            let scale = target / peak;
            for channel in &mut self.channels {
                for sample in channel.iter_mut() {
                    *sample *= scale;
                }
            }
        }
    }

    /// Extend every channel with zeros to the next power-of-two frame count.
    pub fn zero_pad_to_power_of_two(&mut self) {
        let padded = spectral::next_power_of_two(self.frames.max(1));
        for channel in &mut self.channels {
            channel.resize(padded, 0.0);
        }
        self.frames = padded;
    }
}
