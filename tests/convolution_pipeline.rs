//! End-to-end tests across the partition/store/engine/synthesis pipeline.

use std::thread;
use std::time::Duration;

use cavern::engine::ConvolutionEngine;
use cavern::{
    determine_block_lengths, offline, AudioClip, EngineConfig, ImpulseBlocks, SynthesisParams,
    Synthesizer, MIN_BLOCK_SIZE,
};

#[test]
fn four_second_mono_reverb_tail_scenario() {
    // A 4-second mono impulse at 44.1kHz with the 128-frame minimum block.
    let frames = 4 * 44_100;
    let plan = determine_block_lengths(frames);
    assert_eq!(plan.block_lengths()[0], 512, "first stored block");
    assert!(plan.nominal_total() >= frames, "plan must cover the impulse");

    // After padding, the store holds one frequency-domain block per plan
    // entry with spectrum length equal to the stored (doubled) block length.
    let mut clip = AudioClip::mono(
        (0..frames).map(|i| ((i % 311) as f32 / 311.0) - 0.5).collect(),
        44_100,
    );
    clip.zero_pad_to_power_of_two();
    let blocks = ImpulseBlocks::build(&clip).unwrap();
    assert_eq!(blocks.num_blocks(), blocks.plan().len());
    for i in 0..blocks.num_blocks() {
        let block = blocks.block(i);
        assert_eq!(block.spectrum(0).len(), block.len());
        assert_eq!(block.len(), blocks.plan().block_lengths()[i]);
    }
}

#[test]
fn partition_zero_padding_holds_after_build() {
    let mut clip = AudioClip::mono(vec![0.3; 3000], 44_100);
    clip.zero_pad_to_power_of_two();
    let blocks = ImpulseBlocks::build(&clip).unwrap();
    for i in 0..blocks.num_blocks() {
        let block = blocks.block(i);
        let nominal = block.len() / 2;
        assert!(
            block.time(0)[nominal..].iter().all(|&s| s == 0.0),
            "block {} lost its zero padding",
            i
        );
    }
}

#[test]
fn fft_and_time_convolution_agree() {
    let signal: Vec<f32> = (0..500).map(|i| (i as f32 * 0.21).sin() * 0.7).collect();
    let impulse: Vec<f32> = (0..64).map(|i| (-0.1 * i as f32).exp() * 0.5).collect();
    let fast = offline::fft_convolve(&signal, &impulse).unwrap();
    let slow = offline::time_convolve(&signal, &impulse).unwrap();
    for (i, (a, b)) in fast.iter().zip(&slow).enumerate() {
        assert!((a - b).abs() < 1e-3, "sample {}: {} vs {}", i, a, b);
    }
}

fn delta_impulse_engine() -> (std::sync::Arc<ConvolutionEngine>, crossbeam::channel::Receiver<()>)
{
    // Impulse with a single spike at the start of the first scheduled block.
    let mut samples = vec![0.0f32; 4096];
    samples[2 * MIN_BLOCK_SIZE] = 1.0;
    let clip = AudioClip::mono(samples, 44_100);
    let blocks = ImpulseBlocks::build(&clip).unwrap();
    ConvolutionEngine::new(blocks, EngineConfig::default())
}

#[test]
fn engine_carries_an_impulse_to_the_output() {
    let (engine, _reload_rx) = delta_impulse_engine();
    let block = engine.config().block_length;

    let mut impulse_in = vec![0.0f32; block];
    impulse_in[0] = 1.0;
    let silence = vec![0.0f32; block];
    let mut output = vec![0.0f32; block];

    let mut energy = 0.0f32;
    for cycle in 0..12 {
        let input = if cycle == 0 { &impulse_in } else { &silence };
        engine.process_block(input, &mut output);
        assert!(
            output.iter().all(|s| s.is_finite()),
            "non-finite output at cycle {}",
            cycle
        );
        energy += output.iter().map(|s| s * s).sum::<f32>();
        // Give the workers time to land their contributions.
        thread::sleep(Duration::from_millis(5));
    }
    assert!(energy > 0.0, "the impulse never reached the output");
}

#[test]
fn engine_outputs_silence_while_reloading() {
    let (engine, _reload_rx) = delta_impulse_engine();
    let block = engine.config().block_length;
    let mut input = vec![0.0f32; block];
    input[0] = 1.0;
    let mut output = vec![1.0f32; block];

    engine.begin_reload();
    engine.process_block(&input, &mut output);
    assert!(
        output.iter().all(|&s| s == 0.0),
        "reloading engine must emit silence"
    );

    // Installing a fresh store resumes processing.
    let mut samples = vec![0.0f32; 4096];
    samples[2 * MIN_BLOCK_SIZE] = 1.0;
    let blocks = ImpulseBlocks::build(&AudioClip::mono(samples, 44_100)).unwrap();
    engine.install(blocks);
    assert!(!engine.is_reloading());
    engine.process_block(&input, &mut output);
    assert!(output.iter().all(|s| s.is_finite()));
}

#[test]
fn synthesized_impulse_feeds_the_engine() {
    // The synthesis output must be directly usable as an engine impulse.
    let samples: Vec<f32> = (0..11_025i64)
        .map(|i| {
            let t = i as f32 / 44_100.0;
            ((i * 2654435761 % 1000) as f32 / 500.0 - 1.0) * (-6.0 * t).exp()
        })
        .collect();
    let clip = AudioClip::mono(samples, 44_100);

    let (_state, synthesized) = Synthesizer::from_clip(clip, SynthesisParams::default()).unwrap();
    let blocks = ImpulseBlocks::build(&synthesized).unwrap();
    assert_eq!(blocks.channels(), 1);

    let (engine, _reload_rx) = ConvolutionEngine::new(blocks, EngineConfig::default());
    let block = engine.config().block_length;
    let input = vec![0.1f32; block];
    let mut output = vec![0.0f32; block];
    for _ in 0..4 {
        engine.process_block(&input, &mut output);
        thread::sleep(Duration::from_millis(5));
    }
    assert!(output.iter().all(|s| s.is_finite()));
}
