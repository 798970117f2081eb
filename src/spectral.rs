//! FFT primitives shared by the block store, the workers and the synthesizer.
//!
//! All transforms run in place over `Complex<f32>` with a caller-visible
//! scratch buffer. The inverse transform is **not** amplitude-normalized: a
//! round trip `ifft(fft(x))` yields `n * x`. Every consumer applies its own
//! documented scale; nothing here divides implicitly.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::{CavernError, Result};

/// A matched forward/inverse transform pair for one power-of-two length.
///
/// Plans are cheap to clone (`Arc` internally) and are shared between the
/// block store and the realtime workers so no planning happens on the audio
/// path.
#[derive(Clone)]
pub struct FftPair {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    len: usize,
}

impl FftPair {
    pub fn new(planner: &mut FftPlanner<f32>, len: usize) -> Result<Self> {
        if !len.is_power_of_two() {
            return Err(CavernError::InvalidSize(len));
        }
        Ok(Self {
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocate a scratch buffer large enough for either direction.
    pub fn make_scratch(&self) -> Vec<Complex<f32>> {
        let len = self
            .forward
            .get_inplace_scratch_len()
            .max(self.inverse.get_inplace_scratch_len());
        vec![Complex::new(0.0, 0.0); len]
    }

    /// In-place forward transform.
    pub fn forward(&self, buffer: &mut [Complex<f32>], scratch: &mut [Complex<f32>]) {
        self.forward.process_with_scratch(buffer, scratch);
    }

    /// In-place inverse transform. Unnormalized: `ifft(fft(x)) == n * x`.
    pub fn inverse(&self, buffer: &mut [Complex<f32>], scratch: &mut [Complex<f32>]) {
        self.inverse.process_with_scratch(buffer, scratch);
    }
}

/// Pointwise complex multiply of `a` by `b`, in place.
pub fn complex_multiply_in_place(a: &mut [Complex<f32>], b: &[Complex<f32>]) {
    for (x, &y) in a.iter_mut().zip(b) {
        *x *= y;
    }
}

/// Hann window of the given length, first sample zero.
pub fn hann_window(len: usize) -> Vec<f32> {
    let delta = 2.0 * std::f64::consts::PI / len as f64;
    (0..len)
        .map(|i| (0.5 * (1.0 - (delta * i as f64).cos())) as f32)
        .collect()
}

/// Smallest power of two that is >= `n`.
pub fn next_power_of_two(n: usize) -> usize {
    n.next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_scales_by_length() {
        // ifft(fft(x)) must equal n * x for any power-of-two n.
        for n in [4usize, 64, 256] {
            let mut planner = FftPlanner::new();
            let pair = FftPair::new(&mut planner, n).unwrap();
            let original: Vec<Complex<f32>> = (0..n)
                .map(|i| Complex::new((i as f32 * 0.37).sin(), (i as f32 * 0.11).cos()))
                .collect();
            let mut buffer = original.clone();
            let mut scratch = pair.make_scratch();
            pair.forward(&mut buffer, &mut scratch);
            pair.inverse(&mut buffer, &mut scratch);
            for (got, want) in buffer.iter().zip(&original) {
                let scaled = want * n as f32;
                assert!(
                    (got.re - scaled.re).abs() < 1e-2 && (got.im - scaled.im).abs() < 1e-2,
                    "round trip mismatch at n={}: got {:?}, want {:?}",
                    n,
                    got,
                    scaled
                );
            }
        }
    }

    #[test]
    fn rejects_non_power_of_two() {
        let mut planner = FftPlanner::new();
        assert!(matches!(
            FftPair::new(&mut planner, 100),
            Err(CavernError::InvalidSize(100))
        ));
    }

    #[test]
    fn hann_window_endpoints_and_peak() {
        let w = hann_window(256);
        assert!(w[0].abs() < 1e-6, "window must start at zero");
        assert!((w[128] - 1.0).abs() < 1e-6, "window must peak at the midpoint");
        // Complementary halves sum to one across the overlap.
        for i in 0..128 {
            assert!((w[i] + w[i + 128] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn next_power_of_two_values() {
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(3), 4);
        assert_eq!(next_power_of_two(128), 128);
        assert_eq!(next_power_of_two(176_400), 262_144);
    }
}
