//! HMM chord recogniser
//!
//! Hidden states are the vocabulary chords plus a no-chord state. Emissions
//! combine a treble chroma template match with a bass-root term read from the
//! low register of the semitone spectrogram; a sticky transition matrix and
//! Viterbi decoding keep the state path from flickering between frames.

use super::segments::labels_to_segments;
use crate::analysis::ChordSegment;
use crate::chord::{ChordVocabulary, NO_CHORD, PITCH_CLASSES};
use crate::chroma::ChordFeatures;
use crate::error::{ChordError, Result as ChordErrorResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Parameters of the chord HMM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordModel {
    pub version: String,
    /// Probability of staying in the same state between frames
    pub self_transition: f32,
    /// Emission sharpness applied to template cosine similarity
    pub concentration: f32,
    /// Weight of the bass-root term
    pub bass_weight: f32,
    /// Pitches below this MIDI number count as bass
    pub bass_split_pitch: u8,
    /// Cosine similarity the no-chord state scores on non-silent frames
    pub no_chord_similarity: f32,
}

impl Default for ChordModel {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ChordModel {
    /// Parameters shipped with the crate
    pub fn builtin() -> Self {
        Self {
            version: "builtin-1".to_string(),
            self_transition: 0.9,
            concentration: 12.0,
            bass_weight: 2.0,
            bass_split_pitch: 48,
            no_chord_similarity: 0.55,
        }
    }

    /// Load model parameters from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> ChordErrorResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChordError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        let model: ChordModel = serde_json::from_str(&content)
            .map_err(|e| ChordError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> ChordErrorResult<()> {
        if !(self.self_transition > 0.0 && self.self_transition < 1.0) {
            return Err(ChordError::ModelLoad(
                "self_transition must be in (0, 1)".to_string(),
            ));
        }
        if !(self.concentration.is_finite() && self.concentration > 0.0) {
            return Err(ChordError::ModelLoad(
                "concentration must be positive".to_string(),
            ));
        }
        if !self.bass_weight.is_finite() || self.bass_weight < 0.0 {
            return Err(ChordError::ModelLoad(
                "bass_weight must be non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.no_chord_similarity) {
            return Err(ChordError::ModelLoad(
                "no_chord_similarity must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// HMM classifier bound to a vocabulary and model
#[derive(Debug, Clone)]
pub struct HmmClassifier {
    vocabulary: Arc<ChordVocabulary>,
    model: Arc<ChordModel>,
    min_segment_sec: f32,
}

impl HmmClassifier {
    pub fn new(vocabulary: Arc<ChordVocabulary>, model: Arc<ChordModel>, min_segment_sec: f32) -> Self {
        Self {
            vocabulary,
            model,
            min_segment_sec,
        }
    }

    /// Number of hidden states (chords + no-chord)
    pub fn n_states(&self) -> usize {
        self.vocabulary.len() + 1
    }

    fn no_chord_state(&self) -> usize {
        self.vocabulary.len()
    }

    /// Split the semitone spectrogram into bass and treble chroma per frame
    fn register_chroma(
        &self,
        features: &ChordFeatures,
    ) -> (Vec<[f32; PITCH_CLASSES]>, Vec<[f32; PITCH_CLASSES]>) {
        let n_frames = features.semitones.shape()[1];
        let mut bass = vec![[0.0f32; PITCH_CLASSES]; n_frames];
        let mut treble = vec![[0.0f32; PITCH_CLASSES]; n_frames];
        for (row, energies) in features.semitones.outer_iter().enumerate() {
            let pitch = features.lowest_pitch as usize + row;
            let pc = pitch % PITCH_CLASSES;
            let target = if pitch < self.model.bass_split_pitch as usize {
                &mut bass
            } else {
                &mut treble
            };
            for (t, &e) in energies.iter().enumerate() {
                target[t][pc] += e;
            }
        }
        (bass, treble)
    }

    /// Per-frame log emission probabilities, shape `(n_frames, n_states)`
    pub fn emission_log_probs(&self, features: &ChordFeatures) -> ChordErrorResult<Array2<f32>> {
        let n_frames = features.n_frames();
        if features.semitones.shape()[1] != n_frames {
            return Err(ChordError::Recognition(format!(
                "semitone spectrogram has {} frames, chroma has {}",
                features.semitones.shape()[1],
                n_frames
            )));
        }

        let (bass, treble) = self.register_chroma(features);
        let n_states = self.n_states();
        let no_chord = self.no_chord_state();
        let mut log_probs = Array2::<f32>::zeros((n_frames, n_states));

        for t in 0..n_frames {
            let silent = features.silent.get(t).copied().unwrap_or(false);
            let treble_norm = treble[t].iter().map(|x| x * x).sum::<f32>().sqrt();
            let bass_total: f32 = bass[t].iter().sum();
            let treble_total: f32 = treble[t].iter().sum();

            let mut scores = vec![0.0f32; n_states];
            if silent || treble_norm <= 0.0 {
                scores[no_chord] = self.model.concentration;
            } else {
                // Bass only counts when it carries a meaningful share of the energy
                let bass_share = if bass_total > 0.05 * (bass_total + treble_total) {
                    Some(bass_total)
                } else {
                    None
                };
                for (j, template) in self.vocabulary.templates().iter().enumerate() {
                    let dot: f32 = treble[t].iter().zip(&template.mask).map(|(e, m)| e * m).sum();
                    let cosine = dot / (treble_norm * template.norm);
                    let bass_term = bass_share
                        .map(|total| bass[t][template.chord.root as usize] / total)
                        .unwrap_or(1.0 / PITCH_CLASSES as f32);
                    scores[j] =
                        self.model.concentration * cosine + self.model.bass_weight * bass_term;
                }
                scores[no_chord] = self.model.concentration * self.model.no_chord_similarity
                    + self.model.bass_weight / PITCH_CLASSES as f32;
            }

            let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let log_norm = max + scores.iter().map(|s| (s - max).exp()).sum::<f32>().ln();
            for (j, s) in scores.iter().enumerate() {
                log_probs[[t, j]] = s - log_norm;
            }
        }

        if log_probs.iter().any(|v| !v.is_finite()) {
            return Err(ChordError::Recognition(
                "non-finite emission probabilities".to_string(),
            ));
        }
        Ok(log_probs)
    }

    /// Most likely state path under the sticky transition model
    pub fn viterbi(&self, emissions: &Array2<f32>) -> Vec<usize> {
        let n_frames = emissions.shape()[0];
        let n_states = emissions.shape()[1];
        if n_frames == 0 || n_states == 0 {
            return Vec::new();
        }

        let log_stay = self.model.self_transition.ln();
        let log_switch = ((1.0 - self.model.self_transition) / (n_states - 1).max(1) as f32).ln();
        let log_init = -(n_states as f32).ln();

        let mut delta: Vec<f32> = (0..n_states)
            .map(|j| log_init + emissions[[0, j]])
            .collect();
        let mut backptr = Array2::<usize>::zeros((n_frames, n_states));

        for t in 1..n_frames {
            // Switching cost is uniform, so only the best and runner-up
            // previous states can be the optimal "other" predecessor.
            let (best, second) = top_two(&delta);
            let mut next = vec![0.0f32; n_states];
            for j in 0..n_states {
                let other = if j == best { second } else { best };
                let stay_score = delta[j] + log_stay;
                let switch_score = delta[other] + log_switch;
                let (score, from) = if stay_score >= switch_score {
                    (stay_score, j)
                } else {
                    (switch_score, other)
                };
                next[j] = score + emissions[[t, j]];
                backptr[[t, j]] = from;
            }
            delta = next;
        }

        let mut state = top_two(&delta).0;
        let mut path = vec![0usize; n_frames];
        for t in (0..n_frames).rev() {
            path[t] = state;
            state = backptr[[t, state]];
        }
        path
    }

    pub fn classify(&self, features: &ChordFeatures) -> ChordErrorResult<Vec<ChordSegment>> {
        features.validate()?;
        self.model.validate()?;

        let emissions = self.emission_log_probs(features)?;
        let path = self.viterbi(&emissions);
        let no_chord = self.no_chord_state();
        let labels: Vec<&str> = path
            .iter()
            .map(|&s| {
                if s == no_chord {
                    NO_CHORD
                } else {
                    self.vocabulary.label(s)
                }
            })
            .collect();

        Ok(labels_to_segments(&labels, features, self.min_segment_sec))
    }
}

/// Indices of the largest and second-largest values; lower index wins ties
fn top_two(values: &[f32]) -> (usize, usize) {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    let mut second = if best == 0 { 1.min(values.len() - 1) } else { 0 };
    for (i, &v) in values.iter().enumerate() {
        if i != best && v > values[second] {
            second = i;
        }
    }
    (best, second)
}
