//! Chroma feature extraction
//!
//! Folds the semitone spectrogram into 12 pitch classes per frame. The
//! semitone spectrogram itself is kept alongside the chroma because the HMM
//! classifier reads bass and treble registers separately.

use crate::audio::rms;
use crate::chord::PITCH_CLASSES;
use crate::config::ChromaConfig;
use crate::error::{ChordError, Result as ChordErrorResult};
use crate::spectral::{magnitude_spectrogram, semitone_spectrogram, stft};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// One 12-bin pitch-class energy vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChromaFrame {
    /// Position on the hop grid
    pub index: usize,
    /// Non-negative energy per pitch class, C = 0
    pub energies: [f32; PITCH_CLASSES],
}

impl ChromaFrame {
    pub fn new(index: usize, energies: [f32; PITCH_CLASSES]) -> Self {
        Self { index, energies }
    }

    pub fn total_energy(&self) -> f32 {
        self.energies.iter().sum()
    }

    pub fn norm(&self) -> f32 {
        self.energies.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

/// Everything the classifiers need for one request
#[derive(Debug, Clone)]
pub struct ChordFeatures {
    pub chroma: Vec<ChromaFrame>,
    /// Per-pitch energies, shape `(n_pitches, n_frames)`
    pub semitones: Array2<f32>,
    /// MIDI number of `semitones` row 0
    pub lowest_pitch: u8,
    /// Frames whose energy falls below the silence threshold
    pub silent: Vec<bool>,
    /// Seconds per frame (`hop_length / sample_rate`)
    pub frame_duration: f32,
    /// Length of the analysed audio in seconds
    pub duration: f32,
}

impl ChordFeatures {
    /// Assemble features from precomputed chroma frames.
    ///
    /// The semitone spectrogram is synthesised by placing each pitch class
    /// energy in a single octave; useful when chroma comes from elsewhere.
    pub fn from_chroma(
        chroma: Vec<ChromaFrame>,
        frame_duration: f32,
        silence_threshold: f32,
    ) -> Self {
        let n_frames = chroma.len();
        let lowest_pitch = 48;
        let mut semitones = Array2::<f32>::zeros((PITCH_CLASSES * 2, n_frames));
        for (t, frame) in chroma.iter().enumerate() {
            for (pc, &e) in frame.energies.iter().enumerate() {
                semitones[[pc, t]] = e * 0.5;
                semitones[[pc + PITCH_CLASSES, t]] = e;
            }
        }
        let silent = silence_mask(&chroma, silence_threshold);
        Self {
            duration: n_frames as f32 * frame_duration,
            chroma,
            semitones,
            lowest_pitch,
            silent,
            frame_duration,
        }
    }

    pub fn n_frames(&self) -> usize {
        self.chroma.len()
    }

    /// Time span `[start, end)` of frame `idx`, clipped to the audio duration
    pub fn frame_span(&self, idx: usize) -> (f32, f32) {
        let start = idx as f32 * self.frame_duration;
        let end = ((idx + 1) as f32 * self.frame_duration).min(self.duration);
        (start, end.max(start))
    }

    /// Mark frames silent whose level falls below `floor`.
    ///
    /// `levels` holds one RMS value per frame on the same hop grid.
    pub fn mark_quiet_frames(&mut self, levels: &[f32], floor: f32) -> usize {
        let mut marked = 0;
        for (silent, &level) in self.silent.iter_mut().zip(levels) {
            if !*silent && level < floor {
                *silent = true;
                marked += 1;
            }
        }
        marked
    }

    /// Reject feature sets no classifier can work with
    pub fn validate(&self) -> ChordErrorResult<()> {
        if self.chroma.is_empty() {
            return Err(ChordError::Recognition("no chroma frames".to_string()));
        }
        if self.frame_duration <= 0.0 || !self.frame_duration.is_finite() {
            return Err(ChordError::Recognition(format!(
                "invalid frame duration {}",
                self.frame_duration
            )));
        }
        let non_finite = self
            .chroma
            .iter()
            .any(|f| f.energies.iter().any(|e| !e.is_finite() || *e < 0.0));
        if non_finite {
            return Err(ChordError::Recognition(
                "chroma contains negative or non-finite energies".to_string(),
            ));
        }
        Ok(())
    }
}

/// Extract chroma and semitone features from mono samples
pub fn extract_features(
    y: &[f32],
    sr: u32,
    config: &ChromaConfig,
) -> ChordErrorResult<ChordFeatures> {
    if y.is_empty() {
        return Err(ChordError::Decode("cannot extract features from empty audio".to_string()));
    }

    let stft_data = stft(y, config.n_fft, config.hop_length, &config.window, sr);
    let mag_spec = magnitude_spectrogram(&stft_data);
    let (semitones, lowest_pitch) =
        semitone_spectrogram(&mag_spec, &stft_data.freqs, config.min_freq, config.max_freq);

    let raw = fold_to_chroma(&semitones, lowest_pitch);
    let energies = smooth_chroma(&raw, config.smoothing_frames);

    let chroma: Vec<ChromaFrame> = energies
        .into_iter()
        .enumerate()
        .map(|(index, e)| ChromaFrame::new(index, e))
        .collect();
    let silent = silence_mask(&chroma, config.silence_threshold);

    let frame_duration = config.hop_length as f32 / sr as f32;
    let duration = y.len() as f32 / sr as f32;

    log::debug!(
        "Extracted {} chroma frames ({:.3}s each) over {:.2}s",
        chroma.len(),
        frame_duration,
        duration
    );

    Ok(ChordFeatures {
        chroma,
        semitones,
        lowest_pitch,
        silent,
        frame_duration,
        duration,
    })
}

/// Absolute energy below which a frame is always silent
const SILENCE_FLOOR: f32 = 1e-9;

/// Flag frames quieter than `relative_threshold` times the loudest frame
pub fn silence_mask(chroma: &[ChromaFrame], relative_threshold: f32) -> Vec<bool> {
    let loudest = chroma
        .iter()
        .map(ChromaFrame::total_energy)
        .fold(0.0f32, f32::max);
    let threshold = (loudest * relative_threshold).max(SILENCE_FLOOR);
    chroma.iter().map(|f| f.total_energy() < threshold).collect()
}

/// RMS of each hop interval `[i * hop, (i + 1) * hop)`
pub fn hop_levels(y: &[f32], hop_length: usize) -> Vec<f32> {
    if hop_length == 0 {
        return Vec::new();
    }
    y.chunks(hop_length).map(rms).collect()
}

/// Sum semitone rows into their pitch class
pub fn fold_to_chroma(semitones: &Array2<f32>, lowest_pitch: u8) -> Vec<[f32; PITCH_CLASSES]> {
    let n_frames = semitones.shape()[1];
    let mut out = vec![[0.0f32; PITCH_CLASSES]; n_frames];
    for (row, pitch_row) in semitones.outer_iter().enumerate() {
        let pc = (lowest_pitch as usize + row) % PITCH_CLASSES;
        for (t, &e) in pitch_row.iter().enumerate() {
            out[t][pc] += e;
        }
    }
    out
}

/// Centred moving average over `width` frames
pub fn smooth_chroma(frames: &[[f32; PITCH_CLASSES]], width: usize) -> Vec<[f32; PITCH_CLASSES]> {
    if width <= 1 || frames.len() < 2 {
        return frames.to_vec();
    }
    let half = width / 2;
    (0..frames.len())
        .map(|t| {
            let lo = t.saturating_sub(half);
            let hi = (t + half + 1).min(frames.len());
            let mut acc = [0.0f32; PITCH_CLASSES];
            for frame in &frames[lo..hi] {
                for (a, &e) in acc.iter_mut().zip(frame) {
                    *a += e;
                }
            }
            let n = (hi - lo) as f32;
            acc.map(|a| a / n)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freqs: &[f32], seconds: f32, sr: u32) -> Vec<f32> {
        let n = (seconds * sr as f32) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sr as f32;
                freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum::<f32>() / freqs.len() as f32
            })
            .collect()
    }

    #[test]
    fn test_a440_lands_in_pitch_class_a() {
        let config = ChromaConfig::default();
        let y = tone(&[440.0], 1.0, 22050);
        let features = extract_features(&y, 22050, &config).unwrap();
        let frame = &features.chroma[features.n_frames() / 2];
        let best = (0..PITCH_CLASSES)
            .max_by(|&a, &b| frame.energies[a].partial_cmp(&frame.energies[b]).unwrap())
            .unwrap();
        assert_eq!(best, 9);
    }

    #[test]
    fn test_frame_indices_increase_and_cover_duration() {
        let config = ChromaConfig::default();
        let y = tone(&[261.63], 2.3, 22050);
        let features = extract_features(&y, 22050, &config).unwrap();
        for (i, f) in features.chroma.iter().enumerate() {
            assert_eq!(f.index, i);
        }
        let (_, last_end) = features.frame_span(features.n_frames() - 1);
        assert!((last_end - features.duration).abs() < 1e-4);
        assert!(features.n_frames() as f32 * features.frame_duration >= features.duration);
    }

    #[test]
    fn test_silence_is_flagged() {
        let config = ChromaConfig::default();
        let y = vec![0.0; 22050];
        let features = extract_features(&y, 22050, &config).unwrap();
        assert!(features.silent.iter().all(|&s| s));
    }

    #[test]
    fn test_quiet_frames_follow_absolute_level() {
        let config = ChromaConfig::default();
        let quiet: Vec<f32> = tone(&[440.0], 1.0, 22050).iter().map(|s| s * 1e-4).collect();
        let mut features = extract_features(&quiet, 22050, &config).unwrap();
        // A uniformly quiet signal has no relatively silent frames
        assert!(features.silent.iter().all(|&s| !s));

        let levels = hop_levels(&quiet, config.hop_length);
        assert_eq!(levels.len(), features.n_frames());
        assert_eq!(features.mark_quiet_frames(&levels, 1e-3), features.n_frames());
        assert!(features.silent.iter().all(|&s| s));

        let loud = tone(&[440.0], 1.0, 22050);
        let mut features = extract_features(&loud, 22050, &config).unwrap();
        assert_eq!(features.mark_quiet_frames(&hop_levels(&loud, config.hop_length), 1e-3), 0);
    }

    #[test]
    fn test_smoothing_keeps_length_and_averages() {
        let mut a = [0.0; PITCH_CLASSES];
        a[0] = 3.0;
        let frames = vec![[0.0; PITCH_CLASSES], a, [0.0; PITCH_CLASSES]];
        let smoothed = smooth_chroma(&frames, 3);
        assert_eq!(smoothed.len(), 3);
        assert!((smoothed[1][0] - 1.0).abs() < 1e-6);
        assert!((smoothed[0][0] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_empty_and_nan() {
        let empty = ChordFeatures::from_chroma(Vec::new(), 0.1, 1e-3);
        assert!(empty.validate().is_err());

        let mut bad = [0.0; PITCH_CLASSES];
        bad[3] = f32::NAN;
        let nan = ChordFeatures::from_chroma(vec![ChromaFrame::new(0, bad)], 0.1, 1e-3);
        assert_eq!(nan.validate().unwrap_err().kind(), "RecognitionError");
    }
}
