//! Pass 1: Chord Classification

use crate::analysis::RecognitionResult;
use crate::audio::AudioState;
use crate::chord::ChordVocabulary;
use crate::classifier::{recognize, Capabilities};
use crate::config::Config;
use crate::error::{ChordError, Result as ChordErrorResult};
use std::sync::Arc;

pub fn run(
    state: &mut AudioState,
    config: &Config,
    capabilities: &Capabilities,
    vocabulary: &Arc<ChordVocabulary>,
) -> ChordErrorResult<()> {
    log::debug!("Pass 1: Chord Classification");

    let features = state.features.as_ref().ok_or_else(|| {
        ChordError::Recognition("features have not been extracted".to_string())
    })?;

    if !capabilities.hmm_available() {
        log::debug!("  HMM model unavailable, template matching only");
    }

    let (segments, method) = recognize(features, capabilities, vocabulary, config)?;
    let recognition = RecognitionResult::from_segments(&segments, method);

    log::debug!(
        "  ✓ {} segments via {}: {}",
        segments.len(),
        method,
        recognition.chords.join(" ")
    );

    state.segments = segments;
    state.recognition = Some(recognition);
    Ok(())
}
