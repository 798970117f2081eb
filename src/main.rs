//! Cavern CLI - live convolution reverb and offline rendering.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use cavern::engine::ConvolutionEngine;
use cavern::{audio, offline, wav, EngineConfig, ImpulseBlocks, SynthesisParams, Synthesizer};

#[derive(Parser)]
#[command(name = "cavern")]
#[command(about = "Real-time convolution reverb with resynthesizable impulses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live reverb on the default input/output devices
    Live {
        /// Impulse response WAV file (mono or stereo)
        impulse: PathBuf,

        /// Resynthesize the impulse to this length in seconds
        #[arg(long)]
        ir_seconds: Option<f32>,

        /// Write the synthesized impulse to a WAV file for inspection
        #[arg(long)]
        export_ir: Option<PathBuf>,

        /// Smoothing radius applied to envelope curve edits
        #[arg(long, default_value = "10")]
        smoothing: usize,
    },

    /// Convolve a recording with an impulse response offline
    Render {
        /// Dry input WAV file
        input: PathBuf,

        /// Impulse response WAV file
        impulse: PathBuf,

        /// Output WAV path
        output: PathBuf,

        /// Wet/dry mix (0.0 = dry, 1.0 = wet)
        #[arg(short, long, default_value = "1.0")]
        wet: f32,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Live {
            impulse,
            ir_seconds,
            export_ir,
            smoothing,
        } => run_live(impulse, ir_seconds, export_ir, smoothing),
        Commands::Render {
            input,
            impulse,
            output,
            wet,
        } => run_render(input, impulse, output, wet),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run_live(
    impulse: PathBuf,
    ir_seconds: Option<f32>,
    export_ir: Option<PathBuf>,
    smoothing: usize,
) -> cavern::Result<()> {
    let clip = wav::read_clip(&impulse)?;
    let sample_rate = clip.sample_rate();
    let channels = clip.num_channels();

    let (mut synth, mut synthesized) = Synthesizer::from_clip(clip, SynthesisParams::default())?;
    for ch in 0..channels {
        synth.curve_mut(ch).set_smoothing_radius(smoothing);
    }

    if let Some(seconds) = ir_seconds {
        synth.set_target_frames((seconds * sample_rate as f32) as usize);
        synthesized = synth.resynthesize()?;
    }
    if let Some(path) = &export_ir {
        wav::write_clip(path, &synthesized)?;
    }

    let blocks = ImpulseBlocks::build(&synthesized)?;
    let config = EngineConfig::default();
    let (engine, reload_rx) = ConvolutionEngine::new(blocks, config.clone());
    let streams = audio::start_duplex(engine.clone(), &config)?;

    // Reload service: resynthesis runs here, never on the audio thread.
    let reload_engine = engine.clone();
    thread::spawn(move || {
        for () in reload_rx.iter() {
            reload_engine.begin_reload();
            match synth
                .resynthesize()
                .and_then(|clip| ImpulseBlocks::build(&clip))
            {
                Ok(blocks) => reload_engine.install(blocks),
                Err(e) => {
                    error!("impulse reload failed: {}", e);
                    reload_engine.cancel_reload();
                }
            }
        }
    });

    println!("Press 'q' then Enter to quit.");
    for line in io::stdin().lock().lines() {
        let line = line.unwrap_or_default();
        if line.trim() == "q" {
            break;
        }
        println!("Press 'q' then Enter to quit.");
    }

    drop(streams);
    info!("stopped");
    Ok(())
}

fn run_render(input: PathBuf, impulse: PathBuf, output: PathBuf, wet: f32) -> cavern::Result<()> {
    let dry = wav::read_clip(&input)?;
    let ir = wav::read_clip(&impulse)?;
    let rendered = offline::render(&dry, &ir, wet)?;
    wav::write_clip(&output, &rendered)?;
    info!(
        "rendered {} frames at wet level {:.2}",
        rendered.frames(),
        wet.clamp(0.0, 1.0)
    );
    Ok(())
}
