//! trackbox CLI: headless playback and WAV export of the built-in demo.
//!
//! Usage:
//!   tb-cli info
//!   tb-cli play --song --seconds 20
//!   tb-cli render out.wav --song --format float32
//!   tb-cli --config trackbox.toml render out.wav --patch rom1a.syx --voice 3

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use std::{fs, thread};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tb_ir::{Edit, Instrument, InstrumentKind, Step};
use tb_master::{demo_project, Controller, ControllerError, EngineConfig, PlayMode, SampleFormat};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Track the `--sample` instrument plays on.
const SAMPLE_TRACK: usize = 4;
/// The demo's FM lead, target of `--patch`.
const LEAD: usize = 3;

#[derive(Debug, Parser)]
#[command(name = "tb-cli", version, about = "Headless trackbox playback and WAV export")]
struct Cli {
    /// TOML file with `[engine]` and `[render]` tables
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Override the configured sample rate
    #[arg(long, global = true)]
    sample_rate: Option<u32>,
    /// Override the configured maximum block size
    #[arg(long, global = true)]
    block: Option<usize>,
    /// Debug logging (RUST_LOG is ignored)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the demo project's layout
    Info,
    /// Play the demo on the default output device
    Play {
        #[command(flatten)]
        source: Source,
        /// Stop after this many seconds instead of one pass
        #[arg(long)]
        seconds: Option<f32>,
    },
    /// Render the demo to a WAV file
    Render {
        output: PathBuf,
        #[command(flatten)]
        source: Source,
        /// Render this many seconds instead of one pass
        #[arg(long)]
        seconds: Option<f32>,
        #[arg(long, value_enum)]
        format: Option<WavFormat>,
    },
}

#[derive(Debug, Args)]
struct Source {
    /// Play the song arrangement instead of pattern 0
    #[arg(long)]
    song: bool,
    /// WAV file to play on an extra sampler track
    #[arg(long, value_name = "WAV")]
    sample: Option<PathBuf>,
    /// DX7 sysex (or bare patch) to load into the FM lead
    #[arg(long, value_name = "SYX")]
    patch: Option<PathBuf>,
    /// Voice to take from a bank
    #[arg(long, default_value_t = 0)]
    voice: usize,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
enum WavFormat {
    #[default]
    Int16,
    Float32,
}

impl From<WavFormat> for SampleFormat {
    fn from(f: WavFormat) -> Self {
        match f {
            WavFormat::Int16 => SampleFormat::Int16,
            WavFormat::Float32 => SampleFormat::Float32,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    engine: EngineConfig,
    render: RenderConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RenderConfig {
    format: WavFormat,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("{path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("{path}: {source}")]
    Config { path: PathBuf, source: toml::de::Error },
    #[error("{0} is not a usable sample")]
    Sample(PathBuf),
    #[error("no room for another instrument")]
    Instruments,
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

fn read(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| CliError::Read { path: path.to_owned(), source })
}

fn load_config(cli: &Cli) -> Result<ConfigFile, CliError> {
    let mut config = match &cli.config {
        Some(path) => {
            let text =
                fs::read_to_string(path).map_err(|source| CliError::Read { path: path.clone(), source })?;
            toml::from_str(&text).map_err(|source| CliError::Config { path: path.clone(), source })?
        }
        None => ConfigFile::default(),
    };
    if let Some(rate) = cli.sample_rate {
        config.engine.sample_rate = rate;
    }
    if let Some(block) = cli.block {
        config.engine.max_block_size = block;
    }
    Ok(config)
}

/// The demo project with the `--sample` and `--patch` additions applied.
fn build(engine: EngineConfig, source: &Source) -> Result<Controller, CliError> {
    let mut ctrl = Controller::new(demo_project(), engine)?;

    if let Some(path) = &source.patch {
        let count = ctrl.import_patch(LEAD, &read(path)?, source.voice)?;
        info!(voice = source.voice, count, file = %path.display(), "patch loaded");
    }

    if let Some(path) = &source.sample {
        let bytes = read(path)?;
        let index = ctrl.project().instruments.len();
        if !ctrl.apply(Edit::AddInstrument(Instrument::new("sample", InstrumentKind::Sampler))) {
            return Err(CliError::Instruments);
        }
        if !ctrl.load_wav(index, &bytes)? {
            return Err(CliError::Sample(path.clone()));
        }
        for pattern in 0..ctrl.project().patterns.len() {
            for row in [0, 8] {
                let step = Step::note(60, index as u8);
                ctrl.apply(Edit::SetStep { pattern, row, track: SAMPLE_TRACK, step });
            }
        }
        for row in 0..ctrl.project().song().len() {
            ctrl.apply(Edit::SetSongCell { column: SAMPLE_TRACK, row, chain: Some(0) });
        }
    }
    Ok(ctrl)
}

fn mode(source: &Source) -> PlayMode {
    if source.song {
        PlayMode::Song
    } else {
        PlayMode::Pattern
    }
}

fn frames(ctrl: &Controller, mode: PlayMode, seconds: Option<f32>) -> usize {
    match seconds {
        Some(s) => (s.max(0.0) * ctrl.sample_rate() as f32) as usize,
        None => ctrl.arrangement_frames(mode, 0),
    }
}

fn info() {
    let project = demo_project();
    println!("Title:       {}", project.title);
    println!("Tempo:       {} BPM", project.tempo());
    println!("Patterns:    {}", project.patterns.len());
    println!("Chains:      {}", project.chains.len());
    println!("Song rows:   {}", project.song().len());
    for (i, inst) in project.instruments.iter().enumerate() {
        println!("  {:02X} {:<10} {}", i, inst.name, inst.kind().name());
    }
    let rate = EngineConfig::default().sample_rate;
    for mode in [PlayMode::Pattern, PlayMode::Song] {
        let frames = tb_master::arrangement_frames(&project, mode, 0, rate);
        println!("{:?} pass: {:.1}s", mode, frames as f32 / rate as f32);
    }
}

fn play(config: ConfigFile, source: &Source, seconds: Option<f32>) -> Result<(), CliError> {
    let mut ctrl = build(config.engine, source)?;
    let mode = mode(source);
    ctrl.set_play_mode(mode)?;
    ctrl.play()?;
    ctrl.start_audio()?;

    let length = Duration::from_secs_f32(frames(&ctrl, mode, seconds) as f32 / ctrl.sample_rate() as f32);
    println!("Playing {:?} for {:.1}s...", mode, length.as_secs_f32());
    println!();

    let started = Instant::now();
    while started.elapsed() < length {
        let pos = ctrl.position();
        let (l, r) = ctrl.playhead().peak();
        print!(
            "\rSong: {:02X} | Pat: {:02X} | Row: {:02X} | Peak: {:.2} {:.2}",
            pos.song_row, pos.pattern, pos.row, l, r
        );
        let _ = std::io::stdout().flush();
        ctrl.collect();
        thread::sleep(Duration::from_millis(20));
    }

    ctrl.stop()?;
    // let the release tails ring out
    thread::sleep(Duration::from_millis(300));
    ctrl.stop_audio()?;
    println!("\rDone.{:50}", "");
    Ok(())
}

fn render(
    config: ConfigFile,
    source: &Source,
    output: &Path,
    seconds: Option<f32>,
    format: Option<WavFormat>,
) -> Result<(), CliError> {
    let ctrl = build(config.engine, source)?;
    let mode = mode(source);
    let frames = frames(&ctrl, mode, seconds);
    let format = format.unwrap_or(config.render.format);
    println!("Rendering {} frames to {} at {} Hz...", frames, output.display(), ctrl.sample_rate());

    let wav = ctrl.render_to_wav(mode, frames, format.into())?;
    fs::write(output, &wav).map_err(|source| CliError::Write { path: output.to_owned(), source })?;
    println!("Wrote {} bytes.", wav.len());
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    match &cli.command {
        Command::Info => {
            info();
            Ok(())
        }
        Command::Play { source, seconds } => play(config, source, *seconds),
        Command::Render { output, source, seconds, format } => render(config, source, output, *seconds, *format),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
