//! Configuration system for the chord-to-MIDI processor

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub audio: AudioConfig,
    pub chroma: ChromaConfig,
    pub classifier: ClassifierConfig,
    pub midi: MidiConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            audio: AudioConfig::default(),
            chroma: ChromaConfig::default(),
            classifier: ClassifierConfig::default(),
            midi: MidiConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Audio decoding and preprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Every input is resampled to this rate before analysis
    pub analysis_sample_rate: u32,
    /// Target peak after normalisation (linear, 0 disables)
    pub normalize_peak: f32,
    /// Inputs longer than this are rejected
    pub max_duration_sec: f32,
    /// Frames whose input level is below this (dBFS, before normalisation) are silent
    pub silence_floor_dbfs: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            analysis_sample_rate: 22050,
            normalize_peak: 0.9,
            max_duration_sec: 3600.0,
            silence_floor_dbfs: -60.0,
        }
    }
}

/// Chroma / spectral feature configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaConfig {
    pub n_fft: usize,
    /// Frame hop in samples; frame duration is `hop_length / analysis_sample_rate`
    pub hop_length: usize,
    pub window: String,
    /// Lowest frequency folded into the semitone spectrogram (Hz)
    pub min_freq: f32,
    /// Highest frequency folded into the semitone spectrogram (Hz)
    pub max_freq: f32,
    /// Moving-average width over chroma frames (1 disables)
    pub smoothing_frames: usize,
    /// Frames quieter than this fraction of the loudest frame are silent
    pub silence_threshold: f32,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            n_fft: 4096,
            hop_length: 2048,
            window: "hann".to_string(),
            min_freq: 55.0,
            max_freq: 1760.0,
            smoothing_frames: 3,
            silence_threshold: 1e-3,
        }
    }
}

/// Strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPreference {
    /// Use the HMM model when available, template matching otherwise
    Auto,
    /// Never attempt the HMM model
    FallbackOnly,
}

/// Chord classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub strategy: StrategyPreference,
    /// Interior segments shorter than this are absorbed into a neighbour
    pub min_segment_sec: f32,
    pub hmm: HmmConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyPreference::Auto,
            min_segment_sec: 0.25,
            hmm: HmmConfig::default(),
        }
    }
}

/// HMM chord model configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HmmConfig {
    /// Optional JSON model file; the built-in model is used when unset
    pub model_path: Option<PathBuf>,
}

/// MIDI rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Pulses per quarter note
    pub ppq: u16,
    /// Fixed tempo used to convert seconds to ticks
    pub tempo_bpm: f32,
    pub velocity: u8,
    /// General MIDI program (0 = Acoustic Grand Piano)
    pub program: u8,
    pub channel: u8,
    /// Octave of the chord root, with C4 = 60
    pub base_octave: i8,
    pub track_name: String,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            ppq: 480,
            tempo_bpm: 120.0,
            velocity: 100,
            program: 0,
            channel: 0,
            base_octave: 4,
            track_name: "Chords".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Write `<artifact>.json` with the segment list next to the MIDI file
    pub write_analysis_json: bool,
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.audio.analysis_sample_rate < 8000 {
        anyhow::bail!("audio.analysis_sample_rate must be at least 8000 Hz");
    }
    if !config.audio.silence_floor_dbfs.is_finite() || config.audio.silence_floor_dbfs > 0.0 {
        anyhow::bail!("audio.silence_floor_dbfs must be a finite level <= 0 dBFS");
    }
    if config.chroma.n_fft < 256 || !config.chroma.n_fft.is_power_of_two() {
        anyhow::bail!("chroma.n_fft must be a power of two >= 256");
    }
    if config.chroma.hop_length == 0 || config.chroma.hop_length > config.chroma.n_fft {
        anyhow::bail!("chroma.hop_length must be in 1..=n_fft");
    }
    let nyquist = config.audio.analysis_sample_rate as f32 / 2.0;
    if config.chroma.min_freq <= 0.0
        || config.chroma.min_freq >= config.chroma.max_freq
        || config.chroma.max_freq > nyquist
    {
        anyhow::bail!("chroma frequency range must satisfy 0 < min_freq < max_freq <= nyquist");
    }
    if !(0.0..1.0).contains(&config.chroma.silence_threshold) {
        anyhow::bail!("chroma.silence_threshold must be in [0, 1)");
    }
    if config.chroma.smoothing_frames == 0 {
        anyhow::bail!("chroma.smoothing_frames must be >= 1");
    }
    if config.classifier.min_segment_sec < 0.0 {
        anyhow::bail!("classifier.min_segment_sec must be non-negative");
    }
    if config.midi.tempo_bpm <= 0.0 || config.midi.ppq == 0 || config.midi.ppq > 0x7FFF {
        anyhow::bail!("midi.tempo_bpm must be positive and midi.ppq in 1..=32767");
    }
    if config.midi.velocity == 0 || config.midi.velocity > 127 || config.midi.program > 127 {
        anyhow::bail!("midi.velocity must be in 1..=127 and midi.program in 0..=127");
    }
    if config.midi.channel > 15 {
        anyhow::bail!("midi.channel must be in 0..=15");
    }
    if !(0..=8).contains(&config.midi.base_octave) {
        anyhow::bail!("midi.base_octave must be in 0..=8");
    }
    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
