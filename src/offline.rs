//! One-shot (non-realtime) convolution of whole clips.
//!
//! Used by the `render` subcommand and by tests as a reference for the
//! realtime path. Both directions of the scaling convention are explicit
//! here: the inverse transform's `n` gain is divided out immediately.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::spectral::{complex_multiply_in_place, next_power_of_two, FftPair};
use crate::{AudioClip, CavernError, Result};

/// Linear convolution via a single zero-padded FFT.
///
/// Output length is `signal.len() + impulse.len() - 1`.
pub fn fft_convolve(signal: &[f32], impulse: &[f32]) -> Result<Vec<f32>> {
    if signal.is_empty() || impulse.is_empty() {
        return Err(CavernError::EmptyBuffer);
    }
    let out_len = signal.len() + impulse.len() - 1;
    let n = next_power_of_two(out_len);
    let mut planner = FftPlanner::new();
    let fft = FftPair::new(&mut planner, n)?;
    let mut scratch = fft.make_scratch();

    let mut x: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n];
    for (slot, &s) in x.iter_mut().zip(signal) {
        slot.re = s;
    }
    let mut h: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n];
    for (slot, &s) in h.iter_mut().zip(impulse) {
        slot.re = s;
    }

    fft.forward(&mut x, &mut scratch);
    fft.forward(&mut h, &mut scratch);
    complex_multiply_in_place(&mut x, &h);
    fft.inverse(&mut x, &mut scratch);

    let scale = 1.0 / n as f32;
    Ok(x[..out_len].iter().map(|c| c.re * scale).collect())
}

/// Direct time-domain convolution. O(n*m); kept as the validation reference
/// for the FFT path.
pub fn time_convolve(signal: &[f32], impulse: &[f32]) -> Result<Vec<f32>> {
    if signal.is_empty() || impulse.is_empty() {
        return Err(CavernError::EmptyBuffer);
    }
    let mut output = vec![0.0f32; signal.len() + impulse.len() - 1];
    for (i, &s) in signal.iter().enumerate() {
        for (j, &h) in impulse.iter().enumerate() {
            output[i + j] += s * h;
        }
    }
    Ok(output)
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |max, &s| max.max(s.abs()))
}

/// Convolve a dry recording with an impulse response and mix.
///
/// A mono side is broadcast against a stereo one. The wet signal's peak is
/// matched to the dry signal's before mixing, and the final clip is
/// peak-normalized.
pub fn render(dry: &AudioClip, impulse: &AudioClip, wet: f32) -> Result<AudioClip> {
    let wet_level = wet.clamp(0.0, 1.0);
    let channels = dry.num_channels().max(impulse.num_channels());

    let mut outputs = Vec::with_capacity(channels);
    for ch in 0..channels {
        let d = dry.channel(ch.min(dry.num_channels() - 1));
        let h = impulse.channel(ch.min(impulse.num_channels() - 1));
        let mut y = fft_convolve(d, h)?;

        let wet_peak = peak(&y);
        if wet_peak > 0.0 {
            let match_dry = peak(d) / wet_peak;
            for v in y.iter_mut() {
                *v *= match_dry * wet_level;
            }
        }
        for (slot, &s) in y.iter_mut().zip(d) {
            *slot += s * (1.0 - wet_level);
        }
        outputs.push(y);
    }

    let mut clip = AudioClip::from_channels(outputs, dry.sample_rate());
    clip.normalize_to(1.0);
    Ok(clip)
}
