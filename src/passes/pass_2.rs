//! Pass 2: MIDI Export

use crate::analysis::export_analysis;
use crate::audio::AudioState;
use crate::config::Config;
use crate::error::{ChordError, Result as ChordErrorResult};
use crate::midi::export_midi;
use std::path::Path;

/// Write the analysis sidecar; on failure the MIDI artifact is removed too
fn write_sidecar(state: &AudioState, midi_path: &Path) -> ChordErrorResult<()> {
    if let Err(e) = export_analysis(state, midi_path) {
        if let Err(rm) = std::fs::remove_file(midi_path) {
            log::warn!("Could not remove {}: {}", midi_path.display(), rm);
        }
        return Err(e);
    }
    Ok(())
}

pub fn run(state: &mut AudioState, config: &Config, output_dir: &Path) -> ChordErrorResult<()> {
    log::debug!("Pass 2: MIDI Export");

    if state.recognition.is_none() {
        return Err(ChordError::Encode("no recognition result to encode".to_string()));
    }

    let midi_path = export_midi(
        &state.segments,
        state.source.as_deref(),
        output_dir,
        &config.midi,
    )?;

    if config.export.write_analysis_json {
        write_sidecar(state, &midi_path)?;
    }

    log::debug!("  ✓ MIDI written to {}", midi_path.display());
    state.midi_path = Some(midi_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ChordSegment, RecognitionMethod, RecognitionResult};

    fn recognised_state() -> AudioState {
        let mut state = AudioState::from_test_samples(vec![0.0; 22050], 22050);
        state.segments = vec![
            ChordSegment::new("C", 0.0, 0.5),
            ChordSegment::new("G", 0.5, 1.0),
        ];
        state.recognition = Some(RecognitionResult::from_segments(
            &state.segments,
            RecognitionMethod::Template,
        ));
        state
    }

    #[test]
    fn test_writes_midi_and_optional_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.export.write_analysis_json = true;

        let mut state = recognised_state();
        run(&mut state, &config, dir.path()).unwrap();

        let midi_path = state.midi_path.clone().unwrap();
        assert!(midi_path.exists());
        assert!(midi_path.with_extension("json").exists());
    }

    #[test]
    fn test_failed_sidecar_removes_midi() {
        let dir = tempfile::tempdir().unwrap();
        let midi_path = dir.path().join("song_chords.mid");
        std::fs::write(&midi_path, b"MThd").unwrap();
        // A directory where the sidecar should go makes the write fail
        std::fs::create_dir(dir.path().join("song_chords.json")).unwrap();

        let err = write_sidecar(&recognised_state(), &midi_path).unwrap_err();
        assert_eq!(err.kind(), "EncodeError");
        assert!(!midi_path.exists());
    }

    #[test]
    fn test_refuses_unrecognised_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AudioState::from_test_samples(vec![0.0; 100], 22050);
        let err = run(&mut state, &Config::default(), dir.path()).unwrap_err();
        assert_eq!(err.kind(), "EncodeError");
        assert!(state.midi_path.is_none());
    }
}
