//! Impulse block store: the partitioned, frequency-domain form of an impulse.
//!
//! A store is built whole from a zero-padded impulse clip and is immutable
//! afterwards; reloading an impulse means building a fresh store and swapping
//! it in. Each block keeps its time-domain samples (first half data, second
//! half zeros for convolution headroom) and one precomputed complex spectrum
//! per channel, plus a shared FFT plan for its length that the realtime
//! workers reuse.

use std::collections::HashMap;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use tracing::debug;

use crate::partition::{determine_block_lengths, PartitionPlan};
use crate::spectral::FftPair;
use crate::{AudioClip, CavernError, Result, MIN_BLOCK_SIZE};

/// One partition of the impulse with its precomputed spectrum.
pub struct ImpulseBlock {
    stored_len: usize,
    fft: Arc<FftPair>,
    time: Vec<Vec<f32>>,
    spectra: Vec<Vec<Complex<f32>>>,
}

impl ImpulseBlock {
    /// Stored length: twice the number of impulse frames the block holds.
    pub fn len(&self) -> usize {
        self.stored_len
    }

    pub fn is_empty(&self) -> bool {
        self.stored_len == 0
    }

    /// FFT plan matching this block's stored length.
    pub fn fft(&self) -> &Arc<FftPair> {
        &self.fft
    }

    /// Time-domain samples for `channel`; the second half is always zero.
    pub fn time(&self, channel: usize) -> &[f32] {
        &self.time[channel]
    }

    /// Precomputed spectrum for `channel`, length equal to [`len`](Self::len).
    pub fn spectrum(&self, channel: usize) -> &[Complex<f32>] {
        &self.spectra[channel]
    }
}

/// The full set of partitioned impulse blocks for one impulse response.
pub struct ImpulseBlocks {
    plan: PartitionPlan,
    blocks: Vec<ImpulseBlock>,
    channels: usize,
    frames: usize,
    sample_rate: u32,
}

impl ImpulseBlocks {
    /// Partition `clip` per its plan and precompute every block spectrum.
    ///
    /// The clip must already be zero-padded to a power-of-two length of at
    /// least `4 * MIN_BLOCK_SIZE` frames.
    pub fn build(clip: &AudioClip) -> Result<Self> {
        let frames = clip.frames();
        if !frames.is_power_of_two() {
            return Err(CavernError::InvalidSize(frames));
        }
        if frames < 4 * MIN_BLOCK_SIZE {
            return Err(CavernError::ImpulseTooShort {
                got: frames,
                need: 4 * MIN_BLOCK_SIZE,
            });
        }

        let plan = determine_block_lengths(frames);
        let channels = clip.num_channels();

        let mut planner = FftPlanner::new();
        let mut plans: HashMap<usize, Arc<FftPair>> = HashMap::new();

        let mut blocks = Vec::with_capacity(plan.len());
        let mut offset = 0usize;
        for index in 0..plan.len() {
            let stored_len = plan.block_lengths()[index];
            let nominal = stored_len / 2;
            let fft = match plans.get(&stored_len) {
                Some(pair) => pair.clone(),
                None => {
                    let pair = Arc::new(FftPair::new(&mut planner, stored_len)?);
                    plans.insert(stored_len, pair.clone());
                    pair
                }
            };

            let mut time = Vec::with_capacity(channels);
            let mut spectra = Vec::with_capacity(channels);
            let mut scratch = fft.make_scratch();
            for ch in 0..channels {
                let source = clip.channel(ch);
                let mut samples = vec![0.0f32; stored_len];
                let take = nominal.min(source.len().saturating_sub(offset));
                samples[..take].copy_from_slice(&source[offset..offset + take]);

                let mut spectrum: Vec<Complex<f32>> =
                    samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
                fft.forward(&mut spectrum, &mut scratch);

                time.push(samples);
                spectra.push(spectrum);
            }

            blocks.push(ImpulseBlock {
                stored_len,
                fft,
                time,
                spectra,
            });
            offset += nominal;
        }

        debug!(
            "impulse store built: {} blocks, {} frames, max factor {}",
            blocks.len(),
            frames,
            plan.max_factor()
        );

        Ok(Self {
            plan,
            blocks,
            channels,
            frames,
            sample_rate: clip.sample_rate(),
        })
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: usize) -> &ImpulseBlock {
        &self.blocks[index]
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Padded impulse length in frames.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
