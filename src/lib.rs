//! # Cavern - Real-Time Convolution Reverb
//!
//! Cavern convolves a live microphone signal with a long impulse response to
//! simulate acoustic spaces, while the impulse itself can be resynthesized on
//! the fly from a spectral model of a recorded room.
//!
//! ## Architecture
//!
//! The impulse response is divided into exponentially growing blocks
//! ([`partition`]), each of which is transformed to the frequency domain once
//! ([`impulse`]). On every fixed-size audio callback the engine ([`engine`])
//! schedules one-shot convolution tasks ([`worker`]) against the blocks whose
//! partition factor divides the current cycle; each task multiplies a window
//! of buffered input against a precomputed block spectrum and accumulates its
//! result into the output ring buffer at the correct future cycle. Small
//! blocks keep the most recent audio at low latency; large blocks carry the
//! decaying tail cheaply.
//!
//! The impulse itself comes from [`synth`]: a recorded impulse is reduced to
//! per-frequency-bin exponential decay curves, the curves shape white noise,
//! an amplitude envelope and the recorded attack are reapplied, and the
//! result feeds back into the block store. The curves can be edited and the
//! impulse rebuilt while audio keeps running.

pub mod audio;
pub mod clip;
pub mod engine;
pub mod impulse;
pub mod offline;
pub mod partition;
pub mod spectral;
pub mod synth;
pub mod wav;
pub mod worker;

pub use clip::AudioClip;
pub use engine::{ConvolutionEngine, EngineConfig};
pub use impulse::ImpulseBlocks;
pub use partition::{determine_block_lengths, PartitionPlan};
pub use synth::{SynthesisParams, Synthesizer};

/// Sample rate the engine runs at.
pub const SAMPLE_RATE: u32 = 44_100;

/// Frames per audio-device callback, and the smallest convolution partition.
pub const MIN_BLOCK_SIZE: usize = 128;

/// Block size used when extracting the impulse's spectral envelope.
pub const ENVELOPE_FFT_SIZE: usize = MIN_BLOCK_SIZE;

/// Number of editable frequency bins (the lower half-spectrum).
pub const ENVELOPE_BINS: usize = ENVELOPE_FFT_SIZE / 2;

/// Samples per millisecond at [`SAMPLE_RATE`].
pub const SAMPLES_PER_MS: usize = SAMPLE_RATE as usize / 1000;

/// Errors reported by the engine and its collaborators.
///
/// Configuration errors abort startup; device errors are fatal at the call
/// site that detected them. Runtime loudness conditions are recovered
/// automatically by the engine and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum CavernError {
    #[error("audio file error: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported channel count {0}: only mono and stereo impulses are supported")]
    UnsupportedChannels(u16),

    #[error("impulse too short: {got} frames, need at least {need}")]
    ImpulseTooShort { got: usize, need: usize },

    #[error("channel length mismatch: {left} vs {right} frames")]
    ChannelMismatch { left: usize, right: usize },

    #[error("FFT length {0} is not a power of two")]
    InvalidSize(usize),

    #[error("cannot convolve an empty buffer")]
    EmptyBuffer,

    #[error("no audio {0} device available")]
    NoDevice(&'static str),

    #[error("failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("failed to start audio stream: {0}")]
    StreamPlay(String),
}

pub type Result<T> = std::result::Result<T, CavernError>;
