//! Offline impulse synthesis.
//!
//! A recorded impulse is reduced to a time-varying spectral envelope, each
//! frequency bin is fitted with an exponential decay, the smooth decay curves
//! shape blocks of white noise, the recorded amplitude envelope is reapplied,
//! and the recorded attack is crossfaded onto the synthesized tail. The same
//! pipeline reruns from the editable per-bin curve whenever the impulse is
//! recomputed, so a hand-drawn frequency response can replace the extracted
//! one.

use rand::Rng;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use tracing::info;

use crate::spectral::{hann_window, FftPair};
use crate::{
    AudioClip, CavernError, Result, ENVELOPE_BINS, ENVELOPE_FFT_SIZE, MIN_BLOCK_SIZE,
    SAMPLES_PER_MS,
};

/// Vertical span of the editable curve, in display units.
pub const CURVE_SPAN: f32 = 6.0;

/// Magnitude every bin decays toward at the last block.
pub const CURVE_FLOOR: f32 = 1.0e-4;

/// Floor applied to magnitudes before taking a logarithm.
const MAGNITUDE_FLOOR: f32 = 1.0e-6;

/// Tunable parameters of the synthesis pipeline.
#[derive(Debug, Clone)]
pub struct SynthesisParams {
    /// Samples of the recorded impulse kept verbatim before the crossfade.
    pub crossover_point: usize,
    /// Length of the recorded/synthesized crossfade region in samples.
    pub crossover_length: usize,
    /// Peak of the synthesized tail before the final normalization.
    pub gain_factor: f32,
    /// Averaging window of the amplitude envelope, in samples.
    pub smoothing_window: usize,
    /// Keep the recorded attack (early reflections) at all.
    pub use_recorded_attack: bool,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            crossover_point: 50 * SAMPLES_PER_MS,
            crossover_length: 200 * SAMPLES_PER_MS,
            gain_factor: 0.4,
            smoothing_window: 2048,
            use_recorded_attack: true,
        }
    }
}

/// Per-bin exponential decay values, evaluated for every envelope block.
pub struct DecayFit {
    values: Vec<Vec<f32>>,
}

impl DecayFit {
    pub fn value(&self, bin: usize, block: usize) -> f32 {
        self.values[bin][block]
    }

    pub fn num_blocks(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    /// Fit values at block 0, one per editable bin.
    pub fn first_block(&self) -> Vec<f32> {
        self.values.iter().map(|row| row[0]).collect()
    }
}

/// The editable per-bin frequency envelope, in display units `[-SPAN, 0]`.
///
/// This is the model behind the hand-drawn curve: zero means the bin starts
/// at the reference magnitude `g_max`, `-SPAN` means silence. Drawing a value
/// ramps the neighboring bins within the smoothing radius, like dragging a
/// soft brush across the curve.
#[derive(Debug, Clone)]
pub struct EnvelopeCurve {
    values: Vec<f32>,
    smoothing_radius: usize,
}

impl EnvelopeCurve {
    pub fn flat() -> Self {
        Self {
            values: vec![0.0; ENVELOPE_BINS],
            smoothing_radius: 10,
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn smoothing_radius(&self) -> usize {
        self.smoothing_radius
    }

    pub fn set_smoothing_radius(&mut self, radius: usize) {
        self.smoothing_radius = radius.clamp(1, ENVELOPE_BINS / 2);
    }

    /// Overwrite the curve from a fit's first-block magnitudes.
    pub fn reset_from_fit(&mut self, first_block: &[f32], g_max: f32) {
        let g_max = g_max.max(MAGNITUDE_FLOOR);
        for (value, &fit) in self.values.iter_mut().zip(first_block) {
            *value = (fit * CURVE_SPAN / g_max - CURVE_SPAN).clamp(-CURVE_SPAN, 0.0);
        }
    }

    /// Set one bin, ramping neighbors within the smoothing radius toward it.
    pub fn draw(&mut self, bin: usize, value: f32) {
        let bins = self.values.len();
        if bin >= bins {
            return;
        }
        let value = value.clamp(-CURVE_SPAN, 0.0);
        self.values[bin] = value;

        let radius = self.smoothing_radius;
        if radius > 0 && bin >= radius && bin + radius < bins {
            let left = self.values[bin - radius];
            let right = self.values[bin + radius];
            let inc_left = (value - left) / radius as f32;
            let inc_right = (value - right) / radius as f32;
            for i in 1..radius {
                self.values[bin - i] = value - i as f32 * inc_left;
                self.values[bin + i] = value - i as f32 * inc_right;
            }
        }
    }

    /// Perturb every bin by up to ±2.5%, keeping values inside `(-SPAN, 0)`.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        for value in self.values.iter_mut() {
            let factor = (rng.gen_range(0.0f32..1.0) - 0.5) * 0.05 + 1.0;
            let candidate = *value * factor;
            if candidate < 0.0 && candidate > -CURVE_SPAN {
                *value = candidate;
            }
        }
    }
}

/// Least-squares exponential fit `A * e^(b * k)` of a magnitude series.
///
/// Magnitudes are floor-clamped before the logarithm so a silent bin cannot
/// inject non-finite values into the fit.
pub fn exponential_decay_fit(series: &[f32]) -> (f32, f32) {
    let n = series.len();
    if n == 0 {
        return (MAGNITUDE_FLOOR, 0.0);
    }
    if n == 1 {
        return (series[0].max(MAGNITUDE_FLOOR), 0.0);
    }

    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut sum_xx = 0.0f64;
    let mut sum_xy = 0.0f64;
    for (k, &m) in series.iter().enumerate() {
        let x = k as f64;
        let y = (m.max(MAGNITUDE_FLOOR) as f64).ln();
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
    }
    let n = n as f64;
    let b = (n * sum_xy - sum_x * sum_y) / (n * sum_xx - sum_x * sum_x);
    let a = (sum_y - b * sum_x) / n;
    (a.exp() as f32, b as f32)
}

/// Magnitude rows of fixed-size FFT blocks across the impulse (time axis).
fn spectral_envelope(samples: &[f32]) -> Vec<Vec<f32>> {
    let num_blocks = samples.len() / ENVELOPE_FFT_SIZE;
    let mut planner = FftPlanner::new();
    let fft = FftPair::new(&mut planner, ENVELOPE_FFT_SIZE).expect("power-of-two envelope FFT");
    let mut scratch = fft.make_scratch();

    let mut rows = Vec::with_capacity(num_blocks);
    for block in 0..num_blocks {
        let start = block * ENVELOPE_FFT_SIZE;
        let mut buffer: Vec<Complex<f32>> = samples[start..start + ENVELOPE_FFT_SIZE]
            .iter()
            .map(|&s| Complex::new(s, 0.0))
            .collect();
        fft.forward(&mut buffer, &mut scratch);
        rows.push(buffer.iter().map(|c| c.norm()).collect());
    }
    rows
}

/// Fit every bin's magnitude-over-time with an exponential and extrapolate it
/// across all blocks, including the zero-padded tail.
///
/// Only the `nonzero_blocks` prefix (recorded energy) participates in the
/// fit. Returns the fit and the largest block-0 value, the reference
/// magnitude the editable curve is normalized against.
fn fit_envelope(rows: &[Vec<f32>], num_blocks: usize, nonzero_blocks: usize) -> (DecayFit, f32) {
    let prefix = nonzero_blocks.min(rows.len()).max(1);
    let mut values = Vec::with_capacity(ENVELOPE_BINS);
    let mut g_max = 0.0f32;
    for bin in 0..ENVELOPE_BINS {
        let series: Vec<f32> = rows[..prefix].iter().map(|row| row[bin]).collect();
        let (a, b) = exponential_decay_fit(&series);
        let row: Vec<f32> = (0..num_blocks).map(|k| a * (b * k as f32).exp()).collect();
        if row[0] > g_max {
            g_max = row[0];
        }
        values.push(row);
    }
    (DecayFit { values }, g_max)
}

/// Evaluate the decay implied by a drawn curve: start at the curve's
/// magnitude and decay geometrically to [`CURVE_FLOOR`] at the last block.
fn fit_from_curve(curve: &EnvelopeCurve, g_max: f32, num_blocks: usize) -> DecayFit {
    let num_blocks = num_blocks.max(2);
    let g_max = g_max.max(MAGNITUDE_FLOOR);
    let values = curve
        .values()
        .iter()
        .map(|&v| {
            let a = ((v + CURVE_SPAN) * g_max / CURVE_SPAN).max(MAGNITUDE_FLOOR);
            let ratio = (CURVE_FLOOR / a).powf(1.0 / (num_blocks - 1) as f32);
            (0..num_blocks).map(|k| a * ratio.powi(k as i32)).collect()
        })
        .collect();
    DecayFit { values }
}

/// Shape fresh white noise with the per-bin decay fit.
///
/// Each envelope block gets its own noise buffer of twice the block length;
/// the lower half-spectrum is scaled by the bin's fit value for that block
/// (mirrored to the upper half for conjugate symmetry), and the windowed
/// inverse transforms overlap-add at 50% into the output.
fn shaped_noise<R: Rng>(frames: usize, fit: &DecayFit, rng: &mut R) -> Vec<f32> {
    let n = 2 * ENVELOPE_FFT_SIZE;
    let mut planner = FftPlanner::new();
    let fft = FftPair::new(&mut planner, n).expect("power-of-two noise FFT");
    let mut scratch = fft.make_scratch();
    let window = hann_window(n);

    let num_blocks = (frames / ENVELOPE_FFT_SIZE).min(fit.num_blocks());
    let mut output = vec![0.0f32; frames];
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n];

    for block in 0..num_blocks {
        for sample in buffer.iter_mut() {
            *sample = Complex::new(rng.gen_range(-1.0f32..1.0), 0.0);
        }
        fft.forward(&mut buffer, &mut scratch);

        for j in 0..ENVELOPE_FFT_SIZE {
            let bin = if j < ENVELOPE_BINS {
                j
            } else {
                ENVELOPE_FFT_SIZE - j - 1
            };
            let gain = fit.value(bin, block);
            buffer[2 * j] *= gain;
            buffer[2 * j + 1] *= gain;
        }

        fft.inverse(&mut buffer, &mut scratch);

        let scale = 1.0 / n as f32;
        let start = block * ENVELOPE_FFT_SIZE;
        for (j, &w) in window.iter().enumerate() {
            if start + j >= frames {
                break;
            }
            output[start + j] += buffer[j].re * scale * w;
        }
    }
    output
}

/// Coarse absolute-amplitude envelope: block averages, linearly interpolated,
/// floor-clamped so later divisions and logarithms stay finite.
fn amplitude_envelope(samples: &[f32], window: usize) -> Vec<f32> {
    let frames = samples.len();
    let blocks = frames / window;
    if blocks < 2 {
        let mean = samples.iter().map(|s| s.abs()).sum::<f32>() / frames.max(1) as f32;
        return vec![mean.max(MAGNITUDE_FLOOR); frames];
    }

    let averages: Vec<f32> = (0..blocks)
        .map(|i| {
            samples[i * window..(i + 1) * window]
                .iter()
                .map(|s| s.abs())
                .sum::<f32>()
                / window as f32
        })
        .collect();

    let mut envelope = vec![0.0f32; frames];
    for i in 0..blocks - 1 {
        let increment = (averages[i + 1] - averages[i]) / window as f32;
        for j in 0..window {
            envelope[i * window + j] = averages[i] + j as f32 * increment;
        }
    }
    // Hold the last average across the remaining tail.
    for value in envelope.iter_mut().skip((blocks - 1) * window) {
        *value = averages[blocks - 1];
    }
    for value in envelope.iter_mut() {
        if *value < MAGNITUDE_FLOOR {
            *value = MAGNITUDE_FLOOR;
        }
    }
    envelope
}

/// Scalar exponential fit of the amplitude envelope itself.
fn scalar_exponential_fit(envelope: &[f32]) -> Vec<f32> {
    let (a, b) = exponential_decay_fit(envelope);
    (0..envelope.len())
        .map(|i| a * (b * i as f32).exp())
        .collect()
}

/// Multiply the shaped noise by the envelope's deviation from its own
/// exponential fit, then set its peak to `gain_factor`.
fn apply_amplitude_envelope(buffer: &mut [f32], envelope: &[f32], gain_factor: f32) {
    if envelope.is_empty() {
        return;
    }
    let fit = scalar_exponential_fit(envelope);
    let last = envelope.len() - 1;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let k = i.min(last);
        *sample *= envelope[k] / fit[k].max(MAGNITUDE_FLOOR);
    }

    let peak = buffer.iter().fold(0.0f32, |max, &s| max.max(s.abs()));
    if peak > 0.0 {
        let scale = gain_factor / peak;
        for sample in buffer.iter_mut() {
            *sample *= scale;
        }
    }
}

/// Keep the recorded impulse verbatim up to the crossover point, then fade
/// between recorded and synthesized signal with complementary Hann halves.
///
/// At the crossover boundary the synthesized weight is exactly zero, so the
/// output equals the recorded impulse there and blends continuously into the
/// tail.
fn crossfade_attack(synth: &mut [f32], recorded: &[f32], params: &SynthesisParams) {
    if !params.use_recorded_attack {
        return;
    }
    let point = params.crossover_point.min(synth.len()).min(recorded.len());
    synth[..point].copy_from_slice(&recorded[..point]);

    let length = params.crossover_length;
    let window = hann_window(length * 2);
    for i in 0..length {
        let index = point + i;
        if index >= synth.len() {
            break;
        }
        let original = if index < recorded.len() {
            recorded[index] * window[length + i]
        } else {
            0.0
        };
        synth[index] = original + synth[index] * window[i];
    }
}

/// Synthesis state carried across reloads: the recorded impulse, the editable
/// curves, the amplitude envelope and the normalization reference.
pub struct Synthesizer {
    params: SynthesisParams,
    recorded: AudioClip,
    curves: Vec<EnvelopeCurve>,
    g_max: f32,
    amp_envelope: Vec<f32>,
    target_frames: usize,
}

impl Synthesizer {
    /// Run the full pipeline on a recorded impulse.
    ///
    /// Returns the synthesizer state (for later edits and reloads) and the
    /// synthesized impulse, zero-padded to a power of two and peak-normalized.
    pub fn from_clip(mut clip: AudioClip, params: SynthesisParams) -> Result<(Self, AudioClip)> {
        if clip.frames() < 4 * MIN_BLOCK_SIZE {
            return Err(CavernError::ImpulseTooShort {
                got: clip.frames(),
                need: 4 * MIN_BLOCK_SIZE,
            });
        }

        let original_frames = clip.frames();
        clip.normalize_to(1.0);
        clip.zero_pad_to_power_of_two();
        let frames = clip.frames();

        let num_blocks = frames / ENVELOPE_FFT_SIZE;
        let nonzero_blocks = original_frames.div_ceil(ENVELOPE_FFT_SIZE);

        let mut fits = Vec::with_capacity(clip.num_channels());
        let mut g_max = 0.0f32;
        for ch in 0..clip.num_channels() {
            let rows = spectral_envelope(clip.channel(ch));
            let (fit, channel_max) = fit_envelope(&rows, num_blocks, nonzero_blocks);
            g_max = g_max.max(channel_max);
            fits.push(fit);
        }

        let mut curves = vec![EnvelopeCurve::flat(); clip.num_channels()];
        for (curve, fit) in curves.iter_mut().zip(&fits) {
            curve.reset_from_fit(&fit.first_block(), g_max);
        }

        let amp_envelope = amplitude_envelope(clip.channel(0), params.smoothing_window);

        let mut rng = rand::thread_rng();
        let mut channels = Vec::with_capacity(clip.num_channels());
        for (ch, fit) in fits.iter().enumerate() {
            let mut synth = shaped_noise(frames, fit, &mut rng);
            apply_amplitude_envelope(&mut synth, &amp_envelope, params.gain_factor);
            crossfade_attack(&mut synth, clip.channel(ch), &params);
            channels.push(synth);
        }

        let mut result = AudioClip::from_channels(channels, clip.sample_rate());
        result.normalize_to(1.0);

        info!(
            "impulse synthesized: {} frames, {} channel(s), {} envelope blocks",
            result.frames(),
            result.num_channels(),
            num_blocks
        );

        let state = Self {
            params,
            recorded: clip,
            curves,
            g_max,
            amp_envelope,
            target_frames: frames,
        };
        Ok((state, result))
    }

    /// Rebuild the impulse from the current curves at the target length.
    ///
    /// This is the reload path: the decay of every bin is taken from the
    /// drawn curve rather than re-extracted from the recording, so user edits
    /// survive. The rest of the pipeline is identical.
    pub fn resynthesize(&mut self) -> Result<AudioClip> {
        let target = self.target_frames.max(4 * MIN_BLOCK_SIZE);
        let num_blocks = (target / ENVELOPE_FFT_SIZE).max(2);

        let mut rng = rand::thread_rng();
        let mut channels = Vec::with_capacity(self.curves.len());
        for ch in 0..self.curves.len() {
            let fit = fit_from_curve(&self.curves[ch], self.g_max, num_blocks);
            self.curves[ch].reset_from_fit(&fit.first_block(), self.g_max);

            let mut synth = shaped_noise(target, &fit, &mut rng);
            apply_amplitude_envelope(&mut synth, &self.amp_envelope, self.params.gain_factor);
            crossfade_attack(&mut synth, self.recorded.channel(ch), &self.params);
            channels.push(synth);
        }

        let mut result = AudioClip::from_channels(channels, self.recorded.sample_rate());
        result.normalize_to(1.0);
        result.zero_pad_to_power_of_two();

        info!(
            "impulse resynthesized: {} frames ({:.2}s)",
            result.frames(),
            result.frames() as f32 / result.sample_rate() as f32
        );
        Ok(result)
    }

    pub fn params(&self) -> &SynthesisParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut SynthesisParams {
        &mut self.params
    }

    /// Normalized, zero-padded recorded impulse the attack is taken from.
    pub fn recorded(&self) -> &AudioClip {
        &self.recorded
    }

    pub fn curve(&self, channel: usize) -> &EnvelopeCurve {
        &self.curves[channel]
    }

    pub fn curve_mut(&mut self, channel: usize) -> &mut EnvelopeCurve {
        &mut self.curves[channel]
    }

    pub fn target_frames(&self) -> usize {
        self.target_frames
    }

    /// Change the impulse length used by the next resynthesis.
    pub fn set_target_frames(&mut self, frames: usize) {
        self.target_frames = frames.max(4 * MIN_BLOCK_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn exponential_fit_recovers_clean_decay() {
        // m[k] = 5 * e^(-0.3k) must fit back to A=5, b=-0.3 within 1%.
        let series: Vec<f32> = (0..40).map(|k| 5.0 * (-0.3 * k as f32).exp()).collect();
        let (a, b) = exponential_decay_fit(&series);
        assert!((a - 5.0).abs() / 5.0 < 0.01, "A drifted: {}", a);
        assert!((b + 0.3).abs() / 0.3 < 0.01, "b drifted: {}", b);
    }

    #[test]
    fn exponential_fit_survives_silent_bins() {
        let (a, b) = exponential_decay_fit(&[0.0, 0.0, 0.0, 0.0]);
        assert!(a.is_finite() && b.is_finite());
        assert!(a > 0.0);
    }

    #[test]
    fn crossfade_is_continuous_at_the_boundary() {
        let params = SynthesisParams {
            crossover_point: 100,
            crossover_length: 200,
            ..SynthesisParams::default()
        };
        let recorded = vec![1.0f32; 1000];
        let mut synth = vec![0.5f32; 1000];
        crossfade_attack(&mut synth, &recorded, &params);

        // The synthesized window weight is zero at the boundary sample.
        assert!(
            (synth[100] - 1.0).abs() < 1e-6,
            "boundary sample must equal the recorded impulse, got {}",
            synth[100]
        );
        // No step larger than one windowed increment through the blend.
        for i in 99..300 {
            assert!(
                (synth[i + 1] - synth[i]).abs() < 0.05,
                "discontinuity at {}: {} -> {}",
                i,
                synth[i],
                synth[i + 1]
            );
        }
        // Past the fade the tail is purely synthesized.
        assert!((synth[400] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn amplitude_envelope_is_clamped_and_interpolated() {
        let mut samples = vec![0.0f32; 4096];
        for s in samples.iter_mut().take(1024) {
            *s = 1.0;
        }
        let envelope = amplitude_envelope(&samples, 256);
        assert_eq!(envelope.len(), samples.len());
        assert!(envelope.iter().all(|&v| v >= 1.0e-6), "floor clamp missing");
        // Interpolation descends across the silent region instead of stepping.
        assert!(envelope[1024] < envelope[900]);
    }

    #[test]
    fn shaped_noise_follows_the_fit_decay() {
        let mut rng = StdRng::seed_from_u64(7);
        let num_blocks = 64;
        let row: Vec<f32> = (0..num_blocks)
            .map(|k| 10.0 * (-0.2 * k as f32).exp())
            .collect();
        let fit = DecayFit {
            values: vec![row; ENVELOPE_BINS],
        };
        let noise = shaped_noise(num_blocks * ENVELOPE_FFT_SIZE, &fit, &mut rng);

        let energy = |range: std::ops::Range<usize>| -> f32 {
            noise[range].iter().map(|s| s * s).sum()
        };
        let head = energy(0..ENVELOPE_FFT_SIZE * 8);
        let tail = energy(ENVELOPE_FFT_SIZE * 48..ENVELOPE_FFT_SIZE * 56);
        assert!(head > tail * 10.0, "head {} should dwarf tail {}", head, tail);
        assert!(noise.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn curve_draw_ramps_neighbors() {
        let mut curve = EnvelopeCurve::flat();
        curve.set_smoothing_radius(4);
        for v in 0..ENVELOPE_BINS {
            curve.draw(v, -3.0);
        }
        curve.draw(32, -1.0);
        assert!((curve.values()[32] + 1.0).abs() < 1e-6);
        // Ramp from -1 at the center back to -3 at the radius edge.
        assert!(curve.values()[33] > curve.values()[35]);
        assert!((curve.values()[36] + 3.0).abs() < 1e-6);
    }

    #[test]
    fn curve_randomize_stays_in_range() {
        let mut curve = EnvelopeCurve::flat();
        for v in 0..ENVELOPE_BINS {
            curve.draw(v, -2.0);
        }
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            curve.randomize(&mut rng);
        }
        assert!(curve
            .values()
            .iter()
            .all(|&v| (-CURVE_SPAN..=0.0).contains(&v)));
    }

    fn decaying_noise_clip(frames: usize) -> AudioClip {
        let mut rng = StdRng::seed_from_u64(3);
        let samples: Vec<f32> = (0..frames)
            .map(|i| {
                let t = i as f32 / 44_100.0;
                rng.gen_range(-1.0f32..1.0) * (-4.0 * t).exp()
            })
            .collect();
        AudioClip::mono(samples, 44_100)
    }

    #[test]
    fn full_pipeline_produces_normalized_padded_impulse() {
        let clip = decaying_noise_clip(22_050);
        let (state, synth) = Synthesizer::from_clip(clip, SynthesisParams::default()).unwrap();

        assert!(synth.frames().is_power_of_two());
        assert!(synth.frames() >= 22_050);
        assert!((synth.peak() - 1.0).abs() < 1e-3);
        assert!(synth.channel(0).iter().all(|s| s.is_finite()));
        assert!(state
            .curve(0)
            .values()
            .iter()
            .all(|&v| (-CURVE_SPAN..=0.0).contains(&v)));
    }

    #[test]
    fn resynthesis_honors_target_length() {
        let clip = decaying_noise_clip(22_050);
        let (mut state, _) = Synthesizer::from_clip(clip, SynthesisParams::default()).unwrap();

        state.set_target_frames(65_536);
        let rebuilt = state.resynthesize().unwrap();
        assert_eq!(rebuilt.frames(), 65_536);
        assert!((rebuilt.peak() - 1.0).abs() < 1e-3);
    }
}
