//! Request lifecycle: stage tracking and the outcome reported to callers

use crate::analysis::{ChordSegment, RecognitionResult};
use crate::error::{ChordError, Result as ChordErrorResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of one request.
///
/// `Received → Extracting → Classifying → Encoding → Done`, with `Failed`
/// reachable from any working stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Extracting,
    Classifying,
    Encoding,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Extracting => "extracting",
            Stage::Classifying => "classifying",
            Stage::Encoding => "encoding",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Stage that follows a successful `self`
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Received => Some(Stage::Extracting),
            Stage::Extracting => Some(Stage::Classifying),
            Stage::Classifying => Some(Stage::Encoding),
            Stage::Encoding => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful result of a request
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub recognition: RecognitionResult,
    pub segments: Vec<ChordSegment>,
    pub midi_path: PathBuf,
}

/// Where and why a request failed
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: ChordError,
}

/// Tracks the stages a request has visited and refuses illegal moves
#[derive(Debug, Clone)]
pub struct StageTracker {
    visited: Vec<Stage>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            visited: vec![Stage::Received],
        }
    }

    pub fn current(&self) -> Stage {
        self.visited.last().copied().unwrap_or(Stage::Received)
    }

    /// Move to the next stage in order; returns the stage entered
    pub fn advance(&mut self) -> Option<Stage> {
        let next = self.current().next()?;
        self.visited.push(next);
        log::debug!("stage -> {}", next);
        Some(next)
    }

    /// Record a failure raised while in the current stage
    pub fn fail(&mut self, error: ChordError) -> StageFailure {
        let stage = self.current();
        if !stage.is_terminal() {
            self.visited.push(Stage::Failed);
        }
        StageFailure { stage, error }
    }

    pub fn visited(&self) -> &[Stage] {
        &self.visited
    }

    pub fn into_visited(self) -> Vec<Stage> {
        self.visited
    }
}

/// Terminal state of one request with the path it took
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub stages: Vec<Stage>,
    pub result: std::result::Result<Analysis, StageFailure>,
}

impl PipelineOutcome {
    pub fn is_done(&self) -> bool {
        self.result.is_ok()
    }

    pub fn final_stage(&self) -> Stage {
        if self.is_done() {
            Stage::Done
        } else {
            Stage::Failed
        }
    }

    pub fn visited(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.result.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> ChordErrorResult<Analysis> {
        self.result.map_err(|f| f.error)
    }

    /// Payload for the presentation layer
    pub fn to_response(&self) -> Value {
        match &self.result {
            Ok(analysis) => {
                let method = analysis.recognition.method;
                json!({
                    "chords": analysis.recognition.chords,
                    "method": method,
                    "midi_file_path": analysis.midi_path.display().to_string(),
                    "message": format!(
                        "Chord recognition complete ({}); MIDI written with {} chords",
                        method,
                        analysis.segments.iter().filter(|s| !s.is_no_chord()).count()
                    ),
                    "segments": analysis.segments,
                })
            }
            Err(failure) => json!({
                "error": failure.error.kind(),
                "details": failure.error.detail(),
                "stage": failure.stage,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RecognitionMethod;

    #[test]
    fn test_stages_advance_in_order() {
        let mut tracker = StageTracker::new();
        assert_eq!(tracker.advance(), Some(Stage::Extracting));
        assert_eq!(tracker.advance(), Some(Stage::Classifying));
        assert_eq!(tracker.advance(), Some(Stage::Encoding));
        assert_eq!(tracker.advance(), Some(Stage::Done));
        assert_eq!(tracker.advance(), None);
        assert_eq!(tracker.current(), Stage::Done);
    }

    #[test]
    fn test_failure_records_originating_stage() {
        let mut tracker = StageTracker::new();
        tracker.advance();
        let failure = tracker.fail(ChordError::Decode("bad header".into()));
        assert_eq!(failure.stage, Stage::Extracting);
        assert_eq!(tracker.current(), Stage::Failed);
        assert_eq!(tracker.advance(), None);
        assert!(!tracker.visited().contains(&Stage::Classifying));
    }

    #[test]
    fn test_success_response_shape() {
        let segments = vec![
            ChordSegment::new("C", 0.0, 1.0),
            ChordSegment::new("N", 1.0, 2.0),
        ];
        let outcome = PipelineOutcome {
            stages: vec![Stage::Received, Stage::Done],
            result: Ok(Analysis {
                recognition: RecognitionResult::from_segments(&segments, RecognitionMethod::Hmm),
                segments,
                midi_path: PathBuf::from("out/x_chords.mid"),
            }),
        };
        let body = outcome.to_response();
        assert_eq!(body["method"], "madmom");
        assert_eq!(body["chords"], json!(["C", "N"]));
        assert_eq!(body["midi_file_path"], "out/x_chords.mid");
        assert_eq!(body["segments"][0]["label"], "C");
        assert!(body.get("error").is_none());
    }

    #[test]
    fn test_failure_response_shape() {
        let outcome = PipelineOutcome {
            stages: vec![Stage::Received, Stage::Extracting, Stage::Failed],
            result: Err(StageFailure {
                stage: Stage::Extracting,
                error: ChordError::Decode("zero-length file".into()),
            }),
        };
        assert_eq!(outcome.final_stage(), Stage::Failed);
        let body = outcome.to_response();
        assert_eq!(body["error"], "DecodeError");
        assert_eq!(body["details"], "zero-length file");
        assert_eq!(body["stage"], "extracting");
    }
}
