use chord2midi::config::StrategyPreference;
use chord2midi::{ChordToMidi, ChordVocabulary, Config, PipelineOutcome};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::PathBuf;

/// Chord-to-MIDI Transcription System
#[derive(Parser)]
#[command(name = "chord2midi")]
#[command(about = "Recognise the chord progression of a recording and export it as MIDI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze audio files and generate MIDI output
    Analyze {
        /// Input audio files (WAV/MP3/FLAC/OGG/M4A)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory for results
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip the HMM model and use template matching only
        #[arg(long)]
        fallback_only: bool,

        /// Number of files processed in parallel
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Quiet output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
    /// List recognisable chords and their MIDI notes
    Vocabulary,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            inputs,
            output,
            config,
            fallback_only,
            jobs,
            verbose,
            quiet,
        } => {
            if verbose && quiet {
                anyhow::bail!("Cannot specify both --verbose and --quiet");
            }
            init_logging(verbose, quiet);

            // Load configuration
            let mut config = if let Some(config_path) = config {
                chord2midi::config::load_config(config_path)?
            } else {
                Config::default()
            };
            if fallback_only {
                config.classifier.strategy = StrategyPreference::FallbackOnly;
            }

            let processor = ChordToMidi::new(config)?;
            if !processor.capabilities().hmm_available() {
                log::info!("Using template matching for chord recognition");
            }

            let jobs = jobs.unwrap_or_else(rayon::current_num_threads).max(1);
            let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;

            let outcomes: Vec<PipelineOutcome> = pool.install(|| {
                inputs
                    .par_iter()
                    .map(|input| processor.run(input, &output))
                    .collect()
            });

            let mut failed = 0;
            for (input, outcome) in inputs.iter().zip(&outcomes) {
                let mut body = outcome.to_response();
                body["input"] = serde_json::Value::from(input.display().to_string());
                println!("{}", serde_json::to_string_pretty(&body)?);
                if !outcome.is_done() {
                    failed += 1;
                }
            }

            if failed > 0 {
                anyhow::bail!("{} of {} inputs failed", failed, inputs.len());
            }
        }
        Commands::ValidateConfig { config } => {
            let config = chord2midi::config::load_config(config)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        Commands::Vocabulary => {
            let config = Config::default();
            let vocabulary = ChordVocabulary::shared();
            for template in vocabulary.templates() {
                println!(
                    "{:<6} {:?}",
                    template.label,
                    template.chord.midi_notes(config.midi.base_octave)
                );
            }
        }
    }

    Ok(())
}
