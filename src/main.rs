// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stepdeck::audio::{self, AudioMixer, SampleBuffer};
use stepdeck::config::Deck;
use stepdeck::editor::BufferEditor;
use stepdeck::render::{OfflineRenderer, RenderOptions};
use stepdeck::samples::{SampleBank, Voice, VoicePlayer};
use stepdeck::sequencer::{presets, Pattern, Preset, StepScheduler, Tempo, Transport};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A look-ahead drum sequencer and sample editor."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the built-in presets, plus any from the given deck config.
    Presets {
        /// The path to the deck config.
        config_path: Option<PathBuf>,
    },
    /// Plays a loop through the configured audio device.
    Jam {
        /// The path to the deck config.
        config_path: PathBuf,
        /// The preset to load into the first pattern slot.
        #[arg(short, long)]
        preset: Option<String>,
        /// How many bars to play.
        #[arg(short, long, default_value_t = 4)]
        bars: u32,
        /// An audio file to play at the top of every bar.
        #[arg(short, long)]
        melody: Option<PathBuf>,
    },
    /// Renders one bar of a loop to a WAV file.
    Render {
        /// The path to the deck config.
        config_path: PathBuf,
        /// The preset to render.
        #[arg(short, long)]
        preset: Option<String>,
        /// Overrides the preset's tempo.
        #[arg(long)]
        bpm: Option<u32>,
        /// An audio file mixed in from the start of the bar.
        #[arg(short, long)]
        melody: Option<PathBuf>,
        /// Leave the melody out.
        #[arg(long, conflicts_with = "melody_only")]
        drums_only: bool,
        /// Leave the drums out.
        #[arg(long)]
        melody_only: bool,
        /// Where to write the file. Defaults to stepdeck-<bpm>bpm.wav in the output directory.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Cuts the range [start, end) seconds out of an audio file and saves it as WAV.
    Cut {
        /// The audio file to edit.
        input: PathBuf,
        /// Selection start in seconds.
        start: f64,
        /// Selection end in seconds.
        end: f64,
        /// Where to write the file. Defaults to <input-stem>-edit.wav next to the input.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Prints information about an audio file.
    Info {
        /// The audio file to inspect.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Presets { config_path } => {
            let all = match config_path {
                Some(path) => Deck::deserialize(&path)?.presets()?,
                None => presets::builtin(),
            };
            println!("Presets (count: {}):", all.len());
            for preset in all {
                println!("- {} ({})", preset.name, preset.tempo);
                print_pattern(&preset.pattern);
            }
        }
        Commands::Jam {
            config_path,
            preset,
            bars,
            melody,
        } => {
            let deck = Deck::deserialize(&config_path)?;
            let preset = choose_preset(&deck, preset.as_deref())?;
            let output = audio::open_output(deck.audio())?;
            info!(output = %output, "Audio output open");

            let bank = Arc::new(SampleBank::new(deck.audio().sample_rate()));
            bank.load(deck.sample_sources()).await;

            let bus = Arc::new(output.mixer().clone());
            let player = VoicePlayer::new(bank, bus, deck.sequencer().voice_gain());
            let scheduler = StepScheduler::new(
                player,
                deck.sequencer().tempo(),
                deck.sequencer().look_ahead()?,
            );
            let transport = Transport::spawn(scheduler, deck.sequencer().poll_interval()?);
            let handle = transport.handle();

            let mut tempo = deck.sequencer().tempo();
            if let Some(preset) = preset {
                tempo = preset.tempo;
                handle.load_preset(preset).await?;
            }
            if let Some(path) = melody {
                handle.set_melody(Some(Arc::new(load_melody(&path)?))).await?;
            }

            handle.start().await?;
            for bar in 1..=bars {
                tokio::time::sleep(Duration::from_secs_f64(tempo.seconds_per_bar())).await;
                let snapshot = handle.snapshot().await?;
                info!(bar, step = snapshot.step, bpm = snapshot.tempo.bpm(), "Bar played");
            }
            handle.stop().await?;
            transport.shutdown().await?;
        }
        Commands::Render {
            config_path,
            preset,
            bpm,
            melody,
            drums_only,
            melody_only,
            out,
        } => {
            let deck = Deck::deserialize(&config_path)?;
            let (pattern, mut tempo) = match choose_preset(&deck, preset.as_deref())? {
                Some(preset) => (preset.pattern, preset.tempo),
                None => (Pattern::empty(), deck.sequencer().tempo()),
            };
            if let Some(bpm) = bpm {
                tempo = Tempo::new(bpm);
            }
            let melody = melody
                .map(|path| load_melody(&path).map(Arc::new))
                .transpose()?;

            let bank = Arc::new(SampleBank::new(deck.audio().sample_rate()));
            bank.load(deck.sample_sources()).await;
            let renderer = OfflineRenderer::new(
                bank,
                deck.audio().channels(),
                deck.audio().sample_rate(),
                deck.sequencer().voice_gain(),
            );
            let options = RenderOptions {
                drums_only,
                melody_only,
            };

            let out = out.unwrap_or_else(|| {
                deck.output_dir()
                    .join(format!("stepdeck-{}bpm.wav", tempo.bpm()))
            });
            let result = match renderer.render_async(pattern, tempo, melody, options).await {
                Ok(buffer) => {
                    stepdeck::wav::write_file(&out, &buffer).map_err(Box::<dyn Error>::from)
                }
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                error!(err = e.as_ref(), "Render failed");
                std::process::exit(1);
            }
            println!("Wrote {}", out.display());
        }
        Commands::Cut {
            input,
            start,
            end,
            out,
        } => {
            let bytes = fs::read(&input)?;
            let hint = input.extension().and_then(|ext| ext.to_str());
            // Nothing is played, the mixer only provides a clock.
            let mut editor = BufferEditor::new(Arc::new(AudioMixer::new(1, 44100)));
            editor.load(bytes, hint).await?;

            let before = editor.duration();
            editor.set_selection(start, end);
            if !editor.cut() {
                println!("Selection is empty, nothing to cut.");
                return Ok(());
            }

            let out = out.unwrap_or_else(|| edit_path(&input));
            if editor.buffer().is_none() {
                println!("Cut removed the whole file, nothing to write.");
                return Ok(());
            }
            editor.write_wav(&out)?;
            println!(
                "Cut {:.3}s -> {:.3}s, wrote {}",
                before,
                editor.duration(),
                out.display()
            );
        }
        Commands::Info { path } => {
            let buffer = audio::decode_file(&path)?;
            print_info(&path, &buffer);
        }
    }

    Ok(())
}

fn choose_preset(deck: &Deck, name: Option<&str>) -> Result<Option<Preset>, Box<dyn Error>> {
    let Some(name) = name else {
        return Ok(None);
    };
    let all = deck.presets()?;
    match presets::find(&all, name) {
        Some(preset) => Ok(Some(preset.clone())),
        None => Err(format!("no preset named {}", name).into()),
    }
}

fn load_melody(path: &Path) -> Result<SampleBuffer, Box<dyn Error>> {
    Ok(audio::decode_file(path)?)
}

fn edit_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    input.with_file_name(format!("{}-edit.wav", stem))
}

fn print_pattern(pattern: &Pattern) {
    for (voice, row) in Voice::ALL.iter().zip(pattern.to_string().lines()) {
        println!("    {:<10} {}", voice.name(), row);
    }
}

fn print_info(path: &Path, buffer: &SampleBuffer) {
    println!("{}:", path.display());
    println!("  Channels:    {}", buffer.channel_count());
    println!("  Sample rate: {} Hz", buffer.sample_rate());
    println!("  Frames:      {}", buffer.frame_count());
    println!("  Duration:    {:.3}s", buffer.duration_secs());
    println!("  Peak:        {:.3}", buffer.peak());
}
