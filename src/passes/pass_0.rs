//! Pass 0: Feature Extraction

use crate::audio::{dbfs_to_linear, rms, AudioState};
use crate::chroma::{extract_features, hop_levels};
use crate::config::Config;
use crate::error::Result as ChordErrorResult;

pub fn run(state: &mut AudioState, config: &Config) -> ChordErrorResult<()> {
    log::debug!("Pass 0: Feature Extraction");
    log::debug!(
        "  {} samples @ {} Hz, RMS {:.4}",
        state.n_samples(),
        state.sr,
        rms(&state.y)
    );

    let mut features = extract_features(&state.y, state.sr, &config.chroma)?;

    // `y` is peak-normalised; the floor applies to the input level
    let floor = dbfs_to_linear(config.audio.silence_floor_dbfs) * state.gain;
    let quiet = features.mark_quiet_frames(&hop_levels(&state.y, config.chroma.hop_length), floor);
    if quiet > 0 {
        log::debug!(
            "  {} frames below {:.0} dBFS",
            quiet,
            config.audio.silence_floor_dbfs
        );
    }

    let silent = features.silent.iter().filter(|&&s| s).count();
    log::debug!(
        "  ✓ {} chroma frames, {} silent, lowest pitch {}",
        features.n_frames(),
        silent,
        features.lowest_pitch
    );

    state.features = Some(features);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_cover_the_audio() {
        let sr = 22050;
        let y: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin() * 0.5)
            .collect();
        let mut state = AudioState::from_test_samples(y, sr);
        run(&mut state, &Config::default()).unwrap();

        let features = state.features.as_ref().unwrap();
        let covered = features.n_frames() as f32 * features.frame_duration;
        assert!(covered >= features.duration);
        assert!(covered - features.duration < features.frame_duration);
    }

    #[test]
    fn test_dither_level_input_is_all_silent() {
        let config = Config::default();
        let dither: Vec<f32> = (0..22050)
            .map(|i| if i % 2 == 0 { 3e-5 } else { -3e-5 })
            .collect();
        let waveform = crate::audio::Waveform::new(dither, 22050, 1);
        let mut state = AudioState::from_waveform(&waveform, &config).unwrap();
        run(&mut state, &config).unwrap();

        let features = state.features.as_ref().unwrap();
        assert!(features.silent.iter().all(|&s| s));
    }

    #[test]
    fn test_empty_audio_fails() {
        let mut state = AudioState::from_test_samples(Vec::new(), 22050);
        let err = run(&mut state, &Config::default()).unwrap_err();
        assert_eq!(err.kind(), "DecodeError");
        assert!(state.features.is_none());
    }
}
