//! Chord-to-MIDI Transcription System
//!
//! Decodes an audio recording, recognises the chord progression over time
//! and renders it as a block-chord MIDI file.

pub mod analysis;
pub mod audio;
pub mod chord;
pub mod chroma;
pub mod classifier;
pub mod config;
pub mod error;
pub mod midi;
pub mod passes;
pub mod pipeline;
pub mod spectral;

pub use analysis::{ChordSegment, RecognitionMethod, RecognitionResult};
pub use audio::AudioState;
pub use chord::ChordVocabulary;
pub use classifier::Capabilities;
pub use config::Config;
pub use error::{ChordError, Result as ChordErrorResult};
pub use pipeline::{Analysis, PipelineOutcome, Stage};

use pipeline::StageTracker;
use std::path::Path;
use std::sync::Arc;

/// Main processing pipeline for chord-to-MIDI conversion
#[derive(Debug, Clone)]
pub struct ChordToMidi {
    config: Config,
    vocabulary: Arc<ChordVocabulary>,
    capabilities: Capabilities,
}

impl ChordToMidi {
    /// Create a processor, probing which recognition strategies are available
    pub fn new(config: Config) -> ChordErrorResult<Self> {
        let capabilities = Capabilities::probe(&config);
        Self::with_capabilities(config, capabilities)
    }

    /// Create a processor with explicitly supplied capabilities
    pub fn with_capabilities(config: Config, capabilities: Capabilities) -> ChordErrorResult<Self> {
        validate(&config)?;
        Ok(Self {
            config,
            vocabulary: ChordVocabulary::shared(),
            capabilities,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Process an audio file, reporting the stage reached on failure
    pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(&self, input_path: P, output_dir: Q) -> PipelineOutcome {
        let input_path = input_path.as_ref();
        log::debug!("Received {}", input_path.display());

        let mut tracker = StageTracker::new();
        tracker.advance();
        let state = match AudioState::load(input_path, &self.config) {
            Ok(state) => state,
            Err(e) => return self.failed(tracker, e),
        };
        self.run_from_extraction(tracker, state, output_dir.as_ref())
    }

    /// Process already-decoded audio held in `state`
    pub fn run_state<Q: AsRef<Path>>(&self, state: AudioState, output_dir: Q) -> PipelineOutcome {
        let mut tracker = StageTracker::new();
        tracker.advance();
        self.run_from_extraction(tracker, state, output_dir.as_ref())
    }

    /// Process an audio file and return the analysis
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_dir: Q,
    ) -> ChordErrorResult<Analysis> {
        self.run(input_path, output_dir).into_result()
    }

    fn run_from_extraction(
        &self,
        mut tracker: StageTracker,
        mut state: AudioState,
        output_dir: &Path,
    ) -> PipelineOutcome {
        match self.run_pipeline(&mut tracker, &mut state, output_dir) {
            Ok(analysis) => {
                tracker.advance();
                log::info!(
                    "Recognised {} chord segments via {} -> {}",
                    analysis.segments.len(),
                    analysis.recognition.method,
                    analysis.midi_path.display()
                );
                PipelineOutcome {
                    stages: tracker.into_visited(),
                    result: Ok(analysis),
                }
            }
            Err(e) => self.failed(tracker, e),
        }
    }

    /// Execute the passes in order; the tracker is already in `Extracting`
    fn run_pipeline(
        &self,
        tracker: &mut StageTracker,
        state: &mut AudioState,
        output_dir: &Path,
    ) -> ChordErrorResult<Analysis> {
        // Pass 0: Feature Extraction
        passes::pass_0::run(state, &self.config)?;

        // Pass 1: Chord Classification
        tracker.advance();
        passes::pass_1::run(state, &self.config, &self.capabilities, &self.vocabulary)?;

        // Pass 2: MIDI Export
        tracker.advance();
        passes::pass_2::run(state, &self.config, output_dir)?;

        let (Some(recognition), Some(midi_path)) = (state.recognition.take(), state.midi_path.take())
        else {
            return Err(ChordError::Encode("pipeline finished without an artifact".to_string()));
        };
        Ok(Analysis {
            recognition,
            segments: std::mem::take(&mut state.segments),
            midi_path,
        })
    }

    fn failed(&self, mut tracker: StageTracker, error: ChordError) -> PipelineOutcome {
        let failure = tracker.fail(error);
        log::error!("Failed while {}: {}", failure.stage, failure.error);
        PipelineOutcome {
            stages: tracker.into_visited(),
            result: Err(failure),
        }
    }
}

fn validate(config: &Config) -> ChordErrorResult<()> {
    config::validate_config(config).map_err(|e| ChordError::ConfigValidation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let mut config = Config::default();
        config.chroma.hop_length = 0;
        let err = ChordToMidi::with_capabilities(config, Capabilities::unavailable()).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
        assert!(err.detail().contains("hop_length"));
    }
}
