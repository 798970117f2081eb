//! The real-time convolution engine.
//!
//! All state tied to one impulse response (the block store, the cycle clock
//! and the input/output ring buffers) lives in an immutable [`IrSnapshot`]
//! behind an `ArcSwap`. Reloading the impulse builds a fresh snapshot and
//! swaps it in; workers still holding the old snapshot finish into its
//! retired buffers, so stale contributions can never reach the live output.
//!
//! Per audio callback the engine reads (and gates) the output ring head,
//! shifts the input ring and appends the captured block, enqueues two
//! convolution tasks for every partition factor that divides the upcoming
//! cycle, shifts the output rings, and finally advances the cycle clock. The
//! clock advance is last so a same-cycle worker's accumulate always lands
//! after the shift.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use arc_swap::ArcSwap;
use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::impulse::ImpulseBlocks;
use crate::worker::{ConvolutionTask, WorkerPool};
use crate::{MIN_BLOCK_SIZE, SAMPLE_RATE};

/// Fixed parameters of the realtime engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Frames delivered per device callback.
    pub block_length: usize,
    pub sample_rate: u32,
    /// Level trim applied when copying the output ring to the device.
    pub output_level: f32,
    /// Average output magnitude above which a cycle is muted.
    pub loudness_ceiling: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_length: MIN_BLOCK_SIZE,
            sample_rate: SAMPLE_RATE,
            output_level: 1.0e-5,
            loudness_ceiling: 0.5,
        }
    }
}

/// The global cycle counter, one tick per audio callback.
///
/// Values run `1..=period` (period = `2 * max_factor`) and wrap. Workers park
/// on the condition variable until the counter equals their precomputed
/// target cycle; the callback's advance broadcasts. The counter is the sole
/// synchronization signal between producer and consumers.
pub struct CycleClock {
    period: u32,
    cycle: Mutex<u32>,
    advanced: Condvar,
    retired: AtomicBool,
}

impl CycleClock {
    pub fn new(period: u32) -> Self {
        Self {
            period: period.max(1),
            cycle: Mutex::new(0),
            advanced: Condvar::new(),
            retired: AtomicBool::new(false),
        }
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn current(&self) -> u32 {
        *self.cycle.lock().unwrap()
    }

    /// The value the counter will take on the next advance.
    pub fn next_value(&self) -> u32 {
        let cycle = *self.cycle.lock().unwrap();
        if cycle + 1 > self.period {
            1
        } else {
            cycle + 1
        }
    }

    /// Increment (with wrap) and wake every waiting worker.
    pub fn advance(&self) -> u32 {
        let mut cycle = self.cycle.lock().unwrap();
        *cycle = if *cycle + 1 > self.period { 1 } else { *cycle + 1 };
        let value = *cycle;
        drop(cycle);
        self.advanced.notify_all();
        value
    }

    /// Block until the counter equals `target`.
    ///
    /// Returns `false` if the clock was retired first (its snapshot left the
    /// signal path), in which case the caller must discard its result.
    pub fn wait_until(&self, target: u32) -> bool {
        let mut cycle = self.cycle.lock().unwrap();
        loop {
            if self.retired.load(Ordering::Acquire) {
                return false;
            }
            if *cycle == target {
                return true;
            }
            cycle = self.advanced.wait(cycle).unwrap();
        }
    }

    /// Permanently release every waiter. Called when the snapshot retires.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        let _guard = self.cycle.lock().unwrap();
        self.advanced.notify_all();
    }
}

/// Everything derived from one impulse response, swapped as a unit on reload.
pub struct IrSnapshot {
    pub blocks: ImpulseBlocks,
    pub clock: CycleClock,
    /// Mono capture history; workers read windows of it.
    pub input: RwLock<Vec<f32>>,
    /// One accumulation ring per output channel.
    pub output: Vec<Mutex<Vec<f32>>>,
    pub factors: Vec<usize>,
    pub max_factor: usize,
    /// Index of the most recent sample in the input ring.
    pub end_sample: usize,
}

impl IrSnapshot {
    pub fn new(blocks: ImpulseBlocks) -> Self {
        let input_len = blocks.frames() / 4;
        let output_len = input_len * 2;
        let factors = blocks.plan().factors();
        let max_factor = blocks.plan().max_factor();
        let channels = blocks.channels();
        Self {
            clock: CycleClock::new(2 * max_factor as u32),
            input: RwLock::new(vec![0.0; input_len]),
            output: (0..channels)
                .map(|_| Mutex::new(vec![0.0; output_len]))
                .collect(),
            factors,
            max_factor,
            end_sample: input_len - 1,
            blocks,
        }
    }
}

/// What the loudness gate decided for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Pass,
    Mute,
    MuteAndReload,
}

/// Safety valve against runaway gain from a mis-synthesized impulse.
///
/// Cycles whose average output magnitude exceeds the ceiling are muted; after
/// a threshold of consecutive loud cycles, one impulse reload is requested
/// and the count starts over.
pub struct LoudnessGuard {
    ceiling: f32,
    threshold: u32,
    consecutive: u32,
}

impl LoudnessGuard {
    pub fn new(ceiling: f32, threshold: u32) -> Self {
        Self {
            ceiling,
            threshold,
            consecutive: 0,
        }
    }

    pub fn observe(&mut self, average: f32) -> GuardVerdict {
        if average > self.ceiling {
            self.consecutive += 1;
            if self.consecutive > self.threshold {
                self.consecutive = 0;
                GuardVerdict::MuteAndReload
            } else {
                GuardVerdict::Mute
            }
        } else {
            self.consecutive = 0;
            GuardVerdict::Pass
        }
    }
}

/// Owns the live impulse snapshot, the worker pool and the per-cycle
/// scheduling. One instance is shared between the audio callback and the
/// reload service.
pub struct ConvolutionEngine {
    config: EngineConfig,
    snapshot: ArcSwap<IrSnapshot>,
    pool: WorkerPool,
    reloading: AtomicBool,
    guard: Mutex<LoudnessGuard>,
    peak_bits: AtomicU32,
    reload_tx: Sender<()>,
}

impl ConvolutionEngine {
    /// Build an engine around an impulse block store.
    ///
    /// Returns the engine and the receiver on which reload requests arrive;
    /// the caller runs resynthesis off the audio thread and hands the result
    /// back through [`install`](Self::install).
    pub fn new(blocks: ImpulseBlocks, config: EngineConfig) -> (Arc<Self>, Receiver<()>) {
        // The partition plan and the scheduling arithmetic are both in units
        // of the minimum block size.
        debug_assert_eq!(config.block_length, MIN_BLOCK_SIZE);
        let workers = num_cpus::get().saturating_sub(1).max(2);
        let threshold = config.sample_rate / (2 * config.block_length as u32);
        let (reload_tx, reload_rx) = bounded(1);
        let engine = Arc::new(Self {
            guard: Mutex::new(LoudnessGuard::new(config.loudness_ceiling, threshold)),
            snapshot: ArcSwap::from_pointee(IrSnapshot::new(blocks)),
            pool: WorkerPool::new(workers, 256),
            reloading: AtomicBool::new(false),
            peak_bits: AtomicU32::new(0),
            reload_tx,
            config,
        });
        info!(
            "engine ready: {} worker(s), loudness threshold {} cycles",
            engine.pool.num_workers(),
            threshold
        );
        (engine, reload_rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Output channel count of the current impulse.
    pub fn channels(&self) -> usize {
        self.snapshot.load().blocks.channels()
    }

    /// Ask the reload service for a resynthesis. Coalesces repeat requests.
    pub fn request_reload(&self) {
        if self.reload_tx.try_send(()).is_ok() {
            info!("impulse reload requested");
        }
    }

    /// Enter the reloading state: output falls silent and the current
    /// snapshot's waiters are released.
    pub fn begin_reload(&self) {
        self.reloading.store(true, Ordering::Release);
        self.snapshot.load().clock.retire();
    }

    /// Swap in a freshly built block store and resume output.
    pub fn install(&self, blocks: ImpulseBlocks) {
        let snapshot = Arc::new(IrSnapshot::new(blocks));
        let old = self.snapshot.swap(snapshot);
        old.clock.retire();
        self.reloading.store(false, Ordering::Release);
        info!("impulse installed");
    }

    /// Abort a reload and keep the previous impulse.
    pub fn cancel_reload(&self) {
        self.reloading.store(false, Ordering::Release);
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading.load(Ordering::Acquire)
    }

    /// One audio cycle: consume `input` (mono, `block_length` frames) and
    /// fill `output` (`block_length * channels`, interleaved).
    pub fn process_block(&self, input: &[f32], output: &mut [f32]) {
        if self.reloading.load(Ordering::Acquire) {
            output.fill(0.0);
            return;
        }

        let block = self.config.block_length;
        let level = self.config.output_level;
        let snapshot = self.snapshot.load_full();
        let channels = snapshot.blocks.channels();
        debug_assert_eq!(output.len(), block * channels);

        // Gate on the average magnitude of the outgoing block, then copy the
        // ring head to the device.
        let mut loudest = 0.0f32;
        for ring in &snapshot.output {
            let ring = ring.lock().unwrap();
            let average =
                ring[..block].iter().map(|s| (s * level).abs()).sum::<f32>() / block as f32;
            loudest = loudest.max(average);
        }

        let peak = f32::from_bits(self.peak_bits.load(Ordering::Relaxed));
        if loudest > peak {
            self.peak_bits.store(loudest.to_bits(), Ordering::Relaxed);
            debug!("new loudest output average: {:.5}", loudest);
        }

        match self.guard.lock().unwrap().observe(loudest) {
            GuardVerdict::Pass => {
                for (ch, ring) in snapshot.output.iter().enumerate() {
                    let ring = ring.lock().unwrap();
                    for i in 0..block {
                        output[i * channels + ch] = ring[i] * level;
                    }
                }
            }
            GuardVerdict::Mute => {
                output.fill(0.0);
                warn!("output too loud ({:.3}); muted this cycle", loudest);
            }
            GuardVerdict::MuteAndReload => {
                output.fill(0.0);
                warn!("output stayed too loud; forcing an impulse reload");
                self.request_reload();
            }
        }

        // Shift the capture history left and append the new block.
        {
            let mut ring = snapshot.input.write().unwrap();
            let len = ring.len();
            ring.copy_within(block.., 0);
            let tail = &mut ring[len - block..];
            let copied = input.len().min(block);
            tail[..copied].copy_from_slice(&input[..copied]);
            tail[copied..].fill(0.0);
        }

        // Two tasks per partition factor that divides the upcoming cycle:
        // the factor's even block due in `factor` cycles and its odd block
        // due in `2 * factor`.
        let cycle = snapshot.clock.next_value();
        for (j, &factor) in snapshot.factors.iter().enumerate() {
            if cycle % factor as u32 == 0 {
                let first_sample = 1 + snapshot.end_sample - block * factor;
                for (block_index, deadline) in
                    [(2 * j + 1, factor as u32), (2 * j + 2, 2 * factor as u32)]
                {
                    self.pool.submit(ConvolutionTask {
                        first_sample,
                        last_sample: snapshot.end_sample,
                        block_index,
                        cycles_to_completion: deadline,
                        cycle,
                        snapshot: snapshot.clone(),
                    });
                }
            }
        }

        // Shift the output rings; the vacated tail accumulates contributions
        // from workers as they complete.
        for ring in &snapshot.output {
            let mut ring = ring.lock().unwrap();
            let len = ring.len();
            ring.copy_within(block.., 0);
            ring[len - block..].fill(0.0);
        }

        snapshot.clock.advance();
    }
}

impl Drop for ConvolutionEngine {
    fn drop(&mut self) {
        // Release any worker still parked on the clock so the pool can join.
        self.snapshot.load().clock.retire();
    }
}
