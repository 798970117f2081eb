//! Audio device boundary: a duplex pair of cpal streams.
//!
//! The input stream captures mono frames and pushes them into a lock-free
//! SPSC ring; the output stream pops one block per callback and drives the
//! engine cycle. Both streams run at a fixed sample rate with a fixed
//! `MIN_BLOCK_SIZE` buffer so the engine's partition timing holds.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use tracing::{error, info};

use crate::engine::{ConvolutionEngine, EngineConfig};
use crate::{CavernError, Result};

/// Keeps the duplex streams alive. Drop this to stop audio.
pub struct AudioStreams {
    _input: Stream,
    _output: Stream,
    sample_rate: u32,
}

impl AudioStreams {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Open and start the duplex streams on the default devices.
pub fn start_duplex(engine: Arc<ConvolutionEngine>, config: &EngineConfig) -> Result<AudioStreams> {
    let host = cpal::default_host();
    let block = config.block_length;
    let channels = engine.channels();

    let input_device = host
        .default_input_device()
        .ok_or(CavernError::NoDevice("input"))?;
    let output_device = host
        .default_output_device()
        .ok_or(CavernError::NoDevice("output"))?;
    info!(
        "input device: {}",
        input_device.name().unwrap_or_else(|_| "unknown".into())
    );
    info!(
        "output device: {}",
        output_device.name().unwrap_or_else(|_| "unknown".into())
    );

    let input_config = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: BufferSize::Fixed(block as u32),
    };
    let output_config = StreamConfig {
        channels: channels as u16,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: BufferSize::Fixed(block as u32),
    };

    // Capture transport: input callback produces, output callback consumes.
    let (mut producer, mut consumer) = HeapRb::<f32>::new(block * 8).split();

    let input_stream = input_device
        .build_input_stream(
            &input_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // On overrun the oldest pending frames win; the output side
                // fills any gap with silence.
                let _ = producer.push_slice(data);
            },
            |err| error!("input stream error: {}", err),
            None,
        )
        .map_err(|e| CavernError::StreamBuild(e.to_string()))?;

    let mut capture = vec![0.0f32; block];
    let output_stream = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(block * channels) {
                    if chunk.len() == block * channels {
                        let popped = consumer.pop_slice(&mut capture);
                        capture[popped..].fill(0.0);
                        engine.process_block(&capture, chunk);
                    } else {
                        chunk.fill(0.0);
                    }
                }
            },
            |err| error!("output stream error: {}", err),
            None,
        )
        .map_err(|e| CavernError::StreamBuild(e.to_string()))?;

    input_stream
        .play()
        .map_err(|e| CavernError::StreamPlay(e.to_string()))?;
    output_stream
        .play()
        .map_err(|e| CavernError::StreamPlay(e.to_string()))?;

    let latency_ms = block as f32 / config.sample_rate as f32 * 1000.0;
    info!(
        "duplex streams running: {} Hz, {} frames (~{:.1}ms), {} output channel(s)",
        config.sample_rate, block, latency_ms, channels
    );

    Ok(AudioStreams {
        _input: input_stream,
        _output: output_stream,
        sample_rate: config.sample_rate,
    })
}
