//! One-shot convolution tasks and the pool that runs them.
//!
//! Workers are created once at startup and fed over a bounded channel, so
//! the audio callback never spawns threads and never blocks: if the queue is
//! full the task is dropped and logged. Each task FFTs a window of buffered
//! input, multiplies it against one precomputed impulse block spectrum,
//! inverse-transforms, waits for its deadline cycle on the snapshot's clock,
//! and accumulates the real part into the output ring.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use rustfft::num_complex::Complex;
use tracing::error;

use crate::engine::IrSnapshot;
use crate::spectral::{complex_multiply_in_place, FftPair};
use crate::MIN_BLOCK_SIZE;

/// One scheduled convolution: a window of input against one impulse block.
pub struct ConvolutionTask {
    /// Range of the input ring to convolve, inclusive on both ends.
    pub first_sample: usize,
    pub last_sample: usize,
    /// Index of the precomputed impulse block to multiply against.
    pub block_index: usize,
    /// Cycles from creation until the result is due.
    pub cycles_to_completion: u32,
    /// Cycle value the task was scheduled for.
    pub cycle: u32,
    /// The impulse state this task belongs to. A task outlives a reload
    /// harmlessly: it finishes into its own snapshot's retired buffers.
    pub snapshot: Arc<IrSnapshot>,
}

enum Job {
    Run(ConvolutionTask),
    Shutdown,
}

struct Worker {
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Receiver<Job>) -> Self {
        let thread = thread::Builder::new()
            .name(format!("conv-worker-{}", id))
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    match job {
                        Job::Run(task) => execute(task),
                        Job::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn convolution worker");
        Self {
            thread: Some(thread),
        }
    }
}

/// Fixed-size pool of convolution workers behind a bounded task queue.
pub struct WorkerPool {
    workers: Vec<Worker>,
    sender: Sender<Job>,
}

impl WorkerPool {
    pub fn new(num_workers: usize, queue_depth: usize) -> Self {
        assert!(num_workers > 0, "need at least one worker");
        let (sender, receiver) = bounded(queue_depth);
        let workers = (0..num_workers)
            .map(|id| Worker::new(id, receiver.clone()))
            .collect();
        Self { workers, sender }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Hand a task to the pool without ever blocking the caller.
    pub fn submit(&self, task: ConvolutionTask) {
        match self.sender.try_send(Job::Run(task)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                error!("convolution queue full; dropping a task");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for _ in &self.workers {
            let _ = self.sender.send(Job::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

/// Zero-pad `samples` to the transform length, FFT, multiply by `spectrum`,
/// and inverse-transform. The result carries the transform's `n * x` gain;
/// the caller applies its own scale.
pub fn convolve_segment(
    samples: &[f32],
    spectrum: &[Complex<f32>],
    fft: &FftPair,
) -> Vec<Complex<f32>> {
    debug_assert_eq!(fft.len(), spectrum.len());
    let mut buffer = vec![Complex::new(0.0f32, 0.0); fft.len()];
    for (slot, &sample) in buffer.iter_mut().zip(samples) {
        slot.re = sample;
    }
    let mut scratch = fft.make_scratch();
    fft.forward(&mut buffer, &mut scratch);
    complex_multiply_in_place(&mut buffer, spectrum);
    fft.inverse(&mut buffer, &mut scratch);
    buffer
}

fn execute(task: ConvolutionTask) {
    let snapshot = &task.snapshot;
    let period = 2 * snapshot.max_factor as u32;
    let mut target = (task.cycle + task.cycles_to_completion - 1) % period;
    if target == 0 {
        target = period;
    }

    let samples: Vec<f32> = {
        let ring = snapshot.input.read().unwrap();
        ring[task.first_sample..=task.last_sample].to_vec()
    };
    // Larger partitions arrive with proportionally larger transform gain;
    // dividing by the factor keeps every block's contribution weight equal.
    let volume_factor = (samples.len() / MIN_BLOCK_SIZE) as f32;

    let block = snapshot.blocks.block(task.block_index);
    let channels = snapshot.blocks.channels();
    let results: Vec<Vec<Complex<f32>>> = (0..channels)
        .map(|ch| convolve_segment(&samples, block.spectrum(ch), block.fft()))
        .collect();

    if !snapshot.clock.wait_until(target) {
        // The snapshot retired while we were computing; nothing to deliver.
        return;
    }

    for (ch, result) in results.iter().enumerate() {
        let mut ring = snapshot.output[ch].lock().unwrap();
        for (slot, value) in ring.iter_mut().zip(result.iter()) {
            let contribution = value.re / volume_factor;
            // A degenerate value is clamped, never allowed to poison the ring.
            if contribution.is_finite() {
                *slot += contribution;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    #[test]
    fn unit_impulse_reproduces_the_signal() {
        // Convolving with a unit impulse at position 0, scaled for the
        // unnormalized inverse transform, must reproduce the input.
        let n = 256;
        let mut planner = FftPlanner::new();
        let fft = FftPair::new(&mut planner, n).unwrap();

        let mut impulse: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n];
        impulse[0].re = 1.0;
        let mut scratch = fft.make_scratch();
        fft.forward(&mut impulse, &mut scratch);

        let signal: Vec<f32> = (0..n / 2).map(|i| (i as f32 * 0.1).sin()).collect();
        let result = convolve_segment(&signal, &impulse, &fft);

        for (i, &s) in signal.iter().enumerate() {
            let got = result[i].re / n as f32;
            assert!(
                (got - s).abs() < 1e-4,
                "sample {}: got {}, want {}",
                i,
                got,
                s
            );
        }
        for value in &result[signal.len()..] {
            assert!((value.re / n as f32).abs() < 1e-4);
        }
    }

    #[test]
    fn shifted_impulse_delays_the_signal() {
        let n = 256;
        let mut planner = FftPlanner::new();
        let fft = FftPair::new(&mut planner, n).unwrap();

        let delay = 16;
        let mut impulse: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n];
        impulse[delay].re = 1.0;
        let mut scratch = fft.make_scratch();
        fft.forward(&mut impulse, &mut scratch);

        let signal: Vec<f32> = (0..n / 2).map(|i| (i as f32 * 0.07).cos()).collect();
        let result = convolve_segment(&signal, &impulse, &fft);

        for (i, &s) in signal.iter().enumerate() {
            let got = result[i + delay].re / n as f32;
            assert!((got - s).abs() < 1e-4, "delayed sample {} drifted", i);
        }
    }

    #[test]
    fn pool_shuts_down_cleanly() {
        let pool = WorkerPool::new(2, 8);
        assert_eq!(pool.num_workers(), 2);
        drop(pool);
    }
}
