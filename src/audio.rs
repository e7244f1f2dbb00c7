//! Audio I/O and per-request analysis state

use crate::analysis::{ChordSegment, RecognitionResult};
use crate::chroma::ChordFeatures;
use crate::config::Config;
use crate::error::{ChordError, Result as ChordErrorResult};
use hound::WavReader;
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded audio: interleaved samples at a fixed rate
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Number of sample frames (samples per channel)
    pub fn n_frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_sec(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.n_frames() as f32 / self.sample_rate as f32
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Waveform {
        if self.channels == 1 {
            return self.clone();
        }
        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Waveform::new(samples, self.sample_rate, 1)
    }

    /// Linear-interpolation resampling of a mono waveform
    pub fn resample(&self, target_rate: u32) -> Waveform {
        debug_assert_eq!(self.channels, 1);
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return Waveform::new(self.samples.clone(), target_rate, 1);
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = ((self.samples.len() as f64) / ratio).round().max(1.0) as usize;
        let last = self.samples.len() - 1;
        let samples = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = (pos.floor() as usize).min(last);
                let next = (idx + 1).min(last);
                let frac = (pos - idx as f64) as f32;
                self.samples[idx] * (1.0 - frac) + self.samples[next] * frac
            })
            .collect();
        Waveform::new(samples, target_rate, 1)
    }
}

/// Per-request analysis state threaded through the passes
#[derive(Debug, Clone)]
pub struct AudioState {
    /// Mono samples at the analysis rate
    pub y: Vec<f32>,
    /// Analysis sample rate in Hz
    pub sr: u32,
    /// Source file, when loaded from disk
    pub source: Option<PathBuf>,
    /// Gain applied by peak normalisation; `y / gain` is the input level
    pub gain: f32,

    // Pass 0: feature extraction
    pub features: Option<ChordFeatures>,

    // Pass 1: chord classification
    pub segments: Vec<ChordSegment>,
    pub recognition: Option<RecognitionResult>,

    // Pass 2: MIDI export
    pub midi_path: Option<PathBuf>,
}

impl AudioState {
    /// Decode an audio file and prepare it for analysis
    pub fn load<P: AsRef<Path>>(path: P, config: &Config) -> ChordErrorResult<Self> {
        let path = path.as_ref();
        let waveform = load_audio_file(path)?;
        let mut state = Self::from_waveform(&waveform, config)?;
        state.source = Some(path.to_path_buf());
        Ok(state)
    }

    /// Downmix, resample and normalise an already-decoded waveform
    pub fn from_waveform(waveform: &Waveform, config: &Config) -> ChordErrorResult<Self> {
        if waveform.n_frames() == 0 {
            return Err(ChordError::Decode("audio contains no samples".to_string()));
        }
        if waveform.sample_rate == 0 {
            return Err(ChordError::Decode("audio has a zero sample rate".to_string()));
        }
        let duration = waveform.duration_sec();
        if duration > config.audio.max_duration_sec {
            return Err(ChordError::InputValidation(format!(
                "Audio too long: {:.1}s (maximum {:.1}s)",
                duration, config.audio.max_duration_sec
            )));
        }

        let mono = waveform
            .to_mono()
            .resample(config.audio.analysis_sample_rate);
        let mut y = mono.samples;
        if y.iter().any(|x| !x.is_finite()) {
            return Err(ChordError::Decode("audio contains non-finite samples".to_string()));
        }
        let input_peak = peak_level(&y);
        if input_peak > 0.99 {
            log::warn!("Audio may be clipped (peak = {:.3})", input_peak);
        }
        let gain = normalize_peak(&mut y, config.audio.normalize_peak);

        log::debug!(
            "Prepared {:.2}s of audio ({} ch @ {} Hz -> mono @ {} Hz)",
            duration,
            waveform.channels,
            waveform.sample_rate,
            mono.sample_rate
        );

        let mut state = Self::from_test_samples(y, mono.sample_rate);
        state.gain = gain;
        Ok(state)
    }

    /// Create a state directly from mono samples already at the analysis rate
    pub fn from_test_samples(samples: Vec<f32>, sr: u32) -> Self {
        AudioState {
            y: samples,
            sr,
            source: None,
            gain: 1.0,
            features: None,
            segments: Vec::new(),
            recognition: None,
            midi_path: None,
        }
    }

    /// Get audio duration in seconds
    pub fn duration_sec(&self) -> f32 {
        self.y.len() as f32 / self.sr as f32
    }

    /// Get number of samples
    pub fn n_samples(&self) -> usize {
        self.y.len()
    }
}

/// Load an audio file into a waveform at its native rate and channel count
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> ChordErrorResult<Waveform> {
    let path = path.as_ref();

    let metadata = std::fs::metadata(path)
        .map_err(|e| ChordError::Decode(format!("cannot open {}: {}", path.display(), e)))?;
    if metadata.len() == 0 {
        return Err(ChordError::Decode(format!(
            "zero-length file: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    let waveform = match extension.as_str() {
        "wav" | "wave" => load_wav_file(path)?,
        _ => load_compressed_file(path, &extension)?,
    };

    if waveform.n_frames() == 0 {
        return Err(ChordError::Decode(format!(
            "no audio samples decoded from {}",
            path.display()
        )));
    }
    Ok(waveform)
}

/// Load WAV file
fn load_wav_file(path: &Path) -> ChordErrorResult<Waveform> {
    let reader = WavReader::open(path).map_err(|e| ChordError::Decode(e.to_string()))?;
    let spec = reader.spec();

    if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
        return Err(ChordError::Decode(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| {
                    s.map(|s| s as f32 / max_value)
                        .map_err(|e| ChordError::Decode(format!("WAV sample error: {}", e)))
                })
                .collect::<ChordErrorResult<Vec<f32>>>()?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map_err(|e| ChordError::Decode(format!("WAV sample error: {}", e))))
            .collect::<ChordErrorResult<Vec<f32>>>()?,
    };

    Ok(Waveform::new(samples, spec.sample_rate, spec.channels))
}

/// Load any container/codec symphonia can probe (MP3, FLAC, OGG, M4A, ...)
fn load_compressed_file(path: &Path, extension: &str) -> ChordErrorResult<Waveform> {
    let src = File::open(path)
        .map_err(|e| ChordError::Decode(format!("cannot open {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if !extension.is_empty() {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ChordError::Decode(format!("unrecognised audio container: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ChordError::Decode("no supported audio track found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ChordError::Decode(format!("unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut skipped_packets = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(ChordError::Decode(format!("demux error: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // Corrupt packets are skipped; the file fails only if nothing decodes
            Err(SymphoniaError::DecodeError(e)) => {
                skipped_packets += 1;
                log::debug!("Skipping corrupt packet: {}", e);
            }
            Err(e) => return Err(ChordError::Decode(format!("decode error: {}", e))),
        }
    }

    if skipped_packets > 0 {
        log::warn!(
            "Skipped {} undecodable packets in {}",
            skipped_packets,
            path.display()
        );
    }
    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(ChordError::Decode(format!(
            "no decodable audio in {}",
            path.display()
        )));
    }

    Ok(Waveform::new(samples, sample_rate, channels))
}

/// Scale samples so the absolute peak equals `target`; silence is left untouched.
///
/// Returns the gain applied (1.0 when nothing changed).
pub fn normalize_peak(samples: &mut [f32], target: f32) -> f32 {
    if target <= 0.0 {
        return 1.0;
    }
    let peak = peak_level(samples);
    if peak < 1e-9 {
        return 1.0;
    }
    let gain = target / peak;
    for s in samples.iter_mut() {
        *s *= gain;
    }
    gain
}

/// Absolute peak of a signal
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, &x| m.max(x.abs()))
}

/// Convert dBFS to a linear amplitude
pub fn dbfs_to_linear(dbfs: f32) -> f32 {
    10f32.powf(dbfs / 20.0)
}

/// RMS level of a signal
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_to_mono_averages_channels() {
        let stereo = Waveform::new(vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 44100, 2);
        let mono = stereo.to_mono();
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_resample_preserves_duration() {
        let sr = 44100;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let wave = Waveform::new(samples, sr, 1);
        let resampled = wave.resample(22050);
        assert_eq!(resampled.sample_rate, 22050);
        assert!((resampled.duration_sec() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_peak() {
        let mut samples = vec![0.1, -0.2, 0.05];
        let gain = normalize_peak(&mut samples, 0.9);
        assert!((samples[1] + 0.9).abs() < 1e-6);
        assert!((gain - 4.5).abs() < 1e-5);

        let mut silent = vec![0.0; 4];
        assert_eq!(normalize_peak(&mut silent, 0.9), 1.0);
        assert!(silent.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[1.0, -1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_quiet_input_records_gain() {
        let config = Config::default();
        let quiet = Waveform::new(vec![1e-4, -1e-4, 5e-5, 0.0], 22050, 1);
        let state = AudioState::from_waveform(&quiet, &config).unwrap();
        assert!((state.gain - 9000.0).abs() < 1.0);
        assert!((peak_level(&state.y) - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_empty_waveform_is_decode_error() {
        let config = Config::default();
        let empty = Waveform::new(Vec::new(), 44100, 2);
        let err = AudioState::from_waveform(&empty, &config).unwrap_err();
        assert_eq!(err.kind(), "DecodeError");
    }
}
