//! Chord classification strategies and the selection policy between them

pub mod hmm;
pub mod segments;
pub mod template;

pub use hmm::{ChordModel, HmmClassifier};
pub use template::TemplateClassifier;

use crate::analysis::{check_segments, ChordSegment, RecognitionMethod};
use crate::chord::ChordVocabulary;
use crate::chroma::ChordFeatures;
use crate::config::{Config, StrategyPreference};
use crate::error::{ChordError, Result as ChordErrorResult};
use std::sync::{Arc, OnceLock};

/// The two interchangeable recognition strategies
#[derive(Debug, Clone)]
pub enum Classifier {
    Hmm(HmmClassifier),
    Template(TemplateClassifier),
}

impl Classifier {
    pub fn method(&self) -> RecognitionMethod {
        match self {
            Classifier::Hmm(_) => RecognitionMethod::Hmm,
            Classifier::Template(_) => RecognitionMethod::Template,
        }
    }

    /// Label the features and return merged, contiguous segments
    pub fn classify(&self, features: &ChordFeatures) -> ChordErrorResult<Vec<ChordSegment>> {
        let segments = match self {
            Classifier::Hmm(c) => c.classify(features)?,
            Classifier::Template(c) => c.classify(features)?,
        };
        if segments.is_empty() {
            return Err(ChordError::Recognition("no segments produced".to_string()));
        }
        check_segments(&segments).map_err(ChordError::Recognition)?;
        Ok(segments)
    }
}

/// Optional capabilities available to this process
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// Model for the HMM strategy; `None` means the strategy is unavailable
    pub hmm_model: Option<Arc<ChordModel>>,
}

static HMM_MODEL: OnceLock<Option<Arc<ChordModel>>> = OnceLock::new();

impl Capabilities {
    /// Probe for the HMM model once per process.
    ///
    /// The first call loads `classifier.hmm.model_path` (or the built-in
    /// model) and caches the outcome; later calls reuse it regardless of
    /// their config. `fallback_only` bypasses the cache and always reports
    /// the strategy as unavailable.
    pub fn probe(config: &Config) -> Self {
        if config.classifier.strategy == StrategyPreference::FallbackOnly {
            return Self::unavailable();
        }
        let hmm_model = HMM_MODEL
            .get_or_init(|| probe_hmm_model(config))
            .clone();
        Self { hmm_model }
    }

    /// No optional strategies
    pub fn unavailable() -> Self {
        Self { hmm_model: None }
    }

    /// HMM strategy backed by the given model
    pub fn with_model(model: ChordModel) -> Self {
        Self {
            hmm_model: Some(Arc::new(model)),
        }
    }

    pub fn hmm_available(&self) -> bool {
        self.hmm_model.is_some()
    }
}

fn probe_hmm_model(config: &Config) -> Option<Arc<ChordModel>> {
    let model = match &config.classifier.hmm.model_path {
        Some(path) => ChordModel::load(path),
        None => Ok(ChordModel::builtin()),
    };
    match model {
        Ok(model) => {
            log::info!("HMM chord model available ({})", model.version);
            Some(Arc::new(model))
        }
        Err(e) => {
            log::warn!("HMM chord model unavailable, using template matching: {}", e);
            None
        }
    }
}

/// Classifiers to try, in order of preference
pub fn strategy_chain(
    capabilities: &Capabilities,
    vocabulary: &Arc<ChordVocabulary>,
    config: &Config,
) -> Vec<Classifier> {
    let min_segment = config.classifier.min_segment_sec;
    let mut chain = Vec::with_capacity(2);
    if let Some(model) = &capabilities.hmm_model {
        chain.push(Classifier::Hmm(HmmClassifier::new(
            vocabulary.clone(),
            model.clone(),
            min_segment,
        )));
    }
    chain.push(Classifier::Template(TemplateClassifier::new(
        vocabulary.clone(),
        min_segment,
    )));
    chain
}

/// Run the preferred strategy, falling back on failure.
///
/// Fails with `Recognition` only when every strategy in the chain failed.
pub fn recognize(
    features: &ChordFeatures,
    capabilities: &Capabilities,
    vocabulary: &Arc<ChordVocabulary>,
    config: &Config,
) -> ChordErrorResult<(Vec<ChordSegment>, RecognitionMethod)> {
    let mut failures = Vec::new();
    for classifier in strategy_chain(capabilities, vocabulary, config) {
        let method = classifier.method();
        match classifier.classify(features) {
            Ok(segments) => {
                log::debug!("{} produced {} segments", method, segments.len());
                return Ok((segments, method));
            }
            Err(e) => {
                log::warn!("{} recognition failed: {}", method, e.detail());
                failures.push(format!("{}: {}", method, e.detail()));
            }
        }
    }
    Err(ChordError::Recognition(failures.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::PITCH_CLASSES;
    use crate::chroma::ChromaFrame;

    fn c_major_features(n: usize) -> ChordFeatures {
        let mut e = [0.0; PITCH_CLASSES];
        e[0] = 1.0;
        e[4] = 1.0;
        e[7] = 1.0;
        let frames = (0..n).map(|i| ChromaFrame::new(i, e)).collect();
        ChordFeatures::from_chroma(frames, 0.1, 1e-3)
    }

    #[test]
    fn test_chain_order() {
        let vocab = ChordVocabulary::shared();
        let config = Config::default();
        let chain = strategy_chain(&Capabilities::with_model(ChordModel::builtin()), &vocab, &config);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].method(), RecognitionMethod::Hmm);
        assert_eq!(chain[1].method(), RecognitionMethod::Template);

        let chain = strategy_chain(&Capabilities::unavailable(), &vocab, &config);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].method(), RecognitionMethod::Template);
    }

    #[test]
    fn test_hmm_failure_falls_back_to_templates() {
        let vocab = ChordVocabulary::shared();
        let config = Config::default();
        let mut features = c_major_features(5);
        // Break only what the HMM reads
        features.semitones = ndarray::Array2::zeros((24, 2));
        let (segments, method) = recognize(
            &features,
            &Capabilities::with_model(ChordModel::builtin()),
            &vocab,
            &config,
        )
        .unwrap();
        assert_eq!(method, RecognitionMethod::Template);
        assert_eq!(segments[0].label, "C");
    }

    #[test]
    fn test_both_failing_is_recognition_error() {
        let vocab = ChordVocabulary::shared();
        let config = Config::default();
        let features = ChordFeatures::from_chroma(Vec::new(), 0.1, 1e-3);
        let err = recognize(
            &features,
            &Capabilities::with_model(ChordModel::builtin()),
            &vocab,
            &config,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "RecognitionError");
        assert!(err.detail().contains("madmom"));
        assert!(err.detail().contains("librosa"));
    }

    #[test]
    fn test_fallback_only_reports_unavailable() {
        let mut config = Config::default();
        config.classifier.strategy = StrategyPreference::FallbackOnly;
        assert!(!Capabilities::probe(&config).hmm_available());
    }
}
