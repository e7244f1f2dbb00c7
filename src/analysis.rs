//! Recognition results and analysis export

use crate::audio::AudioState;
use crate::chord::is_no_chord;
use crate::error::{ChordError, Result as ChordErrorResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A labelled time span of the audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSegment {
    pub label: String,
    /// Seconds from the start of the audio
    pub start_time: f32,
    pub end_time: f32,
}

impl ChordSegment {
    pub fn new(label: impl Into<String>, start_time: f32, end_time: f32) -> Self {
        Self {
            label: label.into(),
            start_time,
            end_time,
        }
    }

    pub fn duration(&self) -> f32 {
        self.end_time - self.start_time
    }

    /// True for silence / no-chord spans, which emit no notes
    pub fn is_no_chord(&self) -> bool {
        is_no_chord(&self.label)
    }
}

/// Which strategy produced a recognition result.
///
/// Serialized with the identifiers the web front-end already expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecognitionMethod {
    /// HMM chord model with Viterbi decoding
    #[serde(rename = "madmom")]
    Hmm,
    /// Chroma template matching
    #[serde(rename = "librosa")]
    Template,
}

impl RecognitionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionMethod::Hmm => "madmom",
            RecognitionMethod::Template => "librosa",
        }
    }
}

impl fmt::Display for RecognitionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chord labels (one per merged segment) and the method that produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub chords: Vec<String>,
    pub method: RecognitionMethod,
}

impl RecognitionResult {
    pub fn from_segments(segments: &[ChordSegment], method: RecognitionMethod) -> Self {
        Self {
            chords: segments.iter().map(|s| s.label.clone()).collect(),
            method,
        }
    }
}

/// Check the segment-sequence invariants: positive length, contiguous,
/// and no two neighbours sharing a label.
pub fn check_segments(segments: &[ChordSegment]) -> Result<(), String> {
    for (i, seg) in segments.iter().enumerate() {
        if seg.end_time <= seg.start_time {
            return Err(format!(
                "segment {} '{}' has non-positive length ({} -> {})",
                i, seg.label, seg.start_time, seg.end_time
            ));
        }
    }
    for (i, pair) in segments.windows(2).enumerate() {
        if (pair[1].start_time - pair[0].end_time).abs() > 1e-4 {
            return Err(format!(
                "segments {} and {} are not contiguous ({} vs {})",
                i,
                i + 1,
                pair[0].end_time,
                pair[1].start_time
            ));
        }
        if pair[0].label == pair[1].label {
            return Err(format!(
                "segments {} and {} share label '{}'",
                i,
                i + 1,
                pair[0].label
            ));
        }
    }
    Ok(())
}

/// On-disk analysis sidecar
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub version: String,
    pub source: Option<PathBuf>,
    pub duration_seconds: f32,
    pub sample_rate: u32,
    pub method: Option<RecognitionMethod>,
    pub segments: Vec<ChordSegment>,
}

/// Build the analysis sidecar structure
pub fn build_analysis_results(state: &AudioState) -> AnalysisResults {
    AnalysisResults {
        version: env!("CARGO_PKG_VERSION").to_string(),
        source: state.source.clone(),
        duration_seconds: state.duration_sec(),
        sample_rate: state.sr,
        method: state.recognition.as_ref().map(|r| r.method),
        segments: state.segments.clone(),
    }
}

/// Write the segment list as JSON next to a MIDI artifact
pub fn export_analysis(state: &AudioState, midi_path: &Path) -> ChordErrorResult<PathBuf> {
    let analysis_path = midi_path.with_extension("json");
    let analysis = build_analysis_results(state);
    let json = serde_json::to_string_pretty(&analysis)
        .map_err(|e| ChordError::Encode(format!("analysis serialization: {}", e)))?;
    std::fs::write(&analysis_path, json).map_err(|e| {
        ChordError::Encode(format!(
            "cannot write {}: {}",
            analysis_path.display(),
            e
        ))
    })?;

    log::info!("Exported analysis results to {}", analysis_path.display());
    Ok(analysis_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_identifiers() {
        assert_eq!(
            serde_json::to_string(&RecognitionMethod::Hmm).unwrap(),
            "\"madmom\""
        );
        assert_eq!(
            serde_json::to_string(&RecognitionMethod::Template).unwrap(),
            "\"librosa\""
        );
        assert_eq!(RecognitionMethod::Template.to_string(), "librosa");
    }

    #[test]
    fn test_result_keeps_one_label_per_segment() {
        let segments = vec![
            ChordSegment::new("C", 0.0, 1.0),
            ChordSegment::new("G", 1.0, 2.0),
            ChordSegment::new("C", 2.0, 3.0),
        ];
        let result = RecognitionResult::from_segments(&segments, RecognitionMethod::Template);
        assert_eq!(result.chords, vec!["C", "G", "C"]);
    }

    #[test]
    fn test_check_segments() {
        let good = vec![ChordSegment::new("C", 0.0, 1.0), ChordSegment::new("N", 1.0, 1.5)];
        assert!(check_segments(&good).is_ok());

        let gap = vec![ChordSegment::new("C", 0.0, 1.0), ChordSegment::new("G", 1.2, 2.0)];
        assert!(check_segments(&gap).is_err());

        let dup = vec![ChordSegment::new("C", 0.0, 1.0), ChordSegment::new("C", 1.0, 2.0)];
        assert!(check_segments(&dup).is_err());

        let empty = vec![ChordSegment::new("C", 1.0, 1.0)];
        assert!(check_segments(&empty).is_err());
    }
}
