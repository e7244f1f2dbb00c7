//! Template-matching chord classifier

use super::segments::labels_to_segments;
use crate::analysis::ChordSegment;
use crate::chord::{ChordVocabulary, NO_CHORD};
use crate::chroma::{ChordFeatures, ChromaFrame};
use crate::error::Result as ChordErrorResult;
use std::sync::Arc;

/// Cosine similarity of each chroma frame against every chord template
#[derive(Debug, Clone)]
pub struct TemplateClassifier {
    vocabulary: Arc<ChordVocabulary>,
    min_segment_sec: f32,
}

impl TemplateClassifier {
    pub fn new(vocabulary: Arc<ChordVocabulary>, min_segment_sec: f32) -> Self {
        Self {
            vocabulary,
            min_segment_sec,
        }
    }

    /// Cosine similarity of `frame` with every template, in vocabulary order
    pub fn scores(&self, frame: &ChromaFrame) -> Vec<f32> {
        let frame_norm = frame.norm();
        self.vocabulary
            .templates()
            .iter()
            .map(|t| {
                if frame_norm <= 0.0 || t.norm <= 0.0 {
                    return 0.0;
                }
                let dot: f32 = frame
                    .energies
                    .iter()
                    .zip(&t.mask)
                    .map(|(e, m)| e * m)
                    .sum();
                dot / (frame_norm * t.norm)
            })
            .collect()
    }

    /// Index of the best-matching template; the earliest wins a tie
    pub fn best_template(&self, frame: &ChromaFrame) -> Option<usize> {
        let scores = self.scores(frame);
        let mut best: Option<(usize, f32)> = None;
        for (idx, &score) in scores.iter().enumerate() {
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((idx, score)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Chord label for a single frame
    pub fn label_frame(&self, frame: &ChromaFrame, silent: bool) -> &str {
        if silent || frame.norm() <= 0.0 {
            return NO_CHORD;
        }
        match self.best_template(frame) {
            Some(idx) => self.vocabulary.label(idx),
            None => NO_CHORD,
        }
    }

    pub fn classify(&self, features: &ChordFeatures) -> ChordErrorResult<Vec<ChordSegment>> {
        features.validate()?;

        let labels: Vec<&str> = features
            .chroma
            .iter()
            .enumerate()
            .map(|(idx, frame)| {
                let silent = features.silent.get(idx).copied().unwrap_or(false);
                self.label_frame(frame, silent)
            })
            .collect();

        Ok(labels_to_segments(&labels, features, self.min_segment_sec))
    }
}
