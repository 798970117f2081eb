//! Non-uniform block partitioning of a long impulse response.
//!
//! The impulse is covered by a first block of `2 * MIN_BLOCK_SIZE` frames and
//! then blocks of `MIN_BLOCK_SIZE` whose nominal size doubles every other
//! step (1, 1, 2, 2, 4, 4, ...). Each block is stored at twice its nominal
//! length so there is room for linear convolution after zero-padding. Recent
//! audio is convolved with the small blocks at low latency while the decaying
//! tail uses progressively larger FFTs.

use crate::MIN_BLOCK_SIZE;

/// Ordered sequence of stored block lengths covering an impulse response.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    stored: Vec<usize>,
    max_factor: usize,
}

/// Compute the partition plan for an impulse of `ir_frames` frames.
///
/// Stored lengths are all powers of two. The cumulative nominal length
/// (stored / 2) always reaches at least `ir_frames`.
pub fn determine_block_lengths(ir_frames: usize) -> PartitionPlan {
    let mut stored = Vec::new();
    let mut remaining = ir_frames as isize;

    // First block is fixed at twice the minimum size, stored doubled again
    // to leave convolution headroom.
    let mut block_size = 2 * MIN_BLOCK_SIZE;
    stored.push(block_size * 2);
    remaining -= block_size as isize;

    block_size = MIN_BLOCK_SIZE;
    let mut double_next = false;
    while remaining > 0 {
        remaining -= block_size as isize;
        stored.push(block_size * 2);
        if double_next {
            block_size *= 2;
            double_next = false;
        } else {
            double_next = true;
        }
    }

    // Highest power-of-two partition factor reachable by the scheduler.
    let blocks = ir_frames / MIN_BLOCK_SIZE;
    let mut max_factor = 1;
    while max_factor * 2 <= blocks / 4 {
        max_factor *= 2;
    }

    PartitionPlan { stored, max_factor }
}

impl PartitionPlan {
    /// Stored (zero-pad-ready) block lengths, each twice the nominal length.
    pub fn block_lengths(&self) -> &[usize] {
        &self.stored
    }

    /// Nominal length of block `index`: the number of impulse frames it holds.
    pub fn nominal_length(&self, index: usize) -> usize {
        self.stored[index] / 2
    }

    /// Sum of nominal block lengths.
    pub fn nominal_total(&self) -> usize {
        self.stored.iter().map(|s| s / 2).sum()
    }

    pub fn len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    /// Highest partition factor, in units of `MIN_BLOCK_SIZE`.
    pub fn max_factor(&self) -> usize {
        self.max_factor
    }

    /// All powers of two up to and including `max_factor`, in order.
    ///
    /// Factor index `j` owns blocks `2j + 1` and `2j + 2`; block 0 is
    /// convolution headroom the scheduler never references.
    pub fn factors(&self) -> Vec<usize> {
        let mut factors = Vec::new();
        let mut f = 1;
        while f <= self.max_factor {
            factors.push(f);
            f *= 2;
        }
        factors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_impulse_with_powers_of_two() {
        for frames in [4 * MIN_BLOCK_SIZE, 44_100, 176_400, 262_144] {
            let plan = determine_block_lengths(frames);
            assert!(
                plan.nominal_total() >= frames,
                "plan for {} frames only covers {}",
                frames,
                plan.nominal_total()
            );
            for &len in plan.block_lengths() {
                assert!(len.is_power_of_two(), "block length {} not a power of two", len);
            }
        }
    }

    #[test]
    fn four_second_mono_impulse() {
        // 4 seconds at 44.1kHz with a 128-frame minimum block.
        let plan = determine_block_lengths(176_400);
        assert_eq!(plan.block_lengths()[0], 512);
        assert!(plan.nominal_total() >= 176_400);
    }

    #[test]
    fn block_sizes_double_every_other_step() {
        let plan = determine_block_lengths(16 * MIN_BLOCK_SIZE);
        let nominals: Vec<usize> = (0..plan.len()).map(|i| plan.nominal_length(i)).collect();
        assert_eq!(
            nominals,
            vec![
                2 * MIN_BLOCK_SIZE,
                MIN_BLOCK_SIZE,
                MIN_BLOCK_SIZE,
                2 * MIN_BLOCK_SIZE,
                2 * MIN_BLOCK_SIZE,
                4 * MIN_BLOCK_SIZE,
                4 * MIN_BLOCK_SIZE,
            ]
        );
    }

    #[test]
    fn factor_blocks_line_up_for_power_of_two_lengths() {
        // For power-of-two impulse lengths the plan covers exactly, and every
        // factor's two blocks have stored length 2 * MIN_BLOCK_SIZE * factor.
        for frames in [512usize, 1024, 4096, 262_144] {
            let plan = determine_block_lengths(frames);
            let factors = plan.factors();
            assert_eq!(plan.len(), 2 * factors.len() + 1);
            assert_eq!(plan.nominal_total(), frames);
            assert_eq!(plan.max_factor(), frames / MIN_BLOCK_SIZE / 4);
            for (j, &f) in factors.iter().enumerate() {
                assert_eq!(plan.block_lengths()[2 * j + 1], 2 * MIN_BLOCK_SIZE * f);
                assert_eq!(plan.block_lengths()[2 * j + 2], 2 * MIN_BLOCK_SIZE * f);
            }
        }
    }
}
