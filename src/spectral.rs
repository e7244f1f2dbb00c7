//! Spectral processing utilities (STFT, windows, semitone pooling)

use ndarray::Array2;
use rustfft::{num_complex::Complex32, FftPlanner};

/// STFT data structure
#[derive(Debug, Clone)]
pub struct StftData {
    /// Complex spectrum, shape (n_fft / 2 + 1, n_frames)
    pub s: Array2<Complex32>,
    pub freqs: Vec<f32>,
}

impl StftData {
    pub fn n_frames(&self) -> usize {
        self.s.shape()[1]
    }
}

/// Number of frames on the hop grid covering `n_samples`
pub fn frame_count(n_samples: usize, hop_length: usize) -> usize {
    n_samples.div_ceil(hop_length)
}

/// Compute the STFT of an audio signal on a hop grid.
///
/// Frame `i` describes the hop interval `[i * hop, (i + 1) * hop)`; its
/// analysis window is centred on that interval and zero-padded at the edges,
/// so every sample belongs to exactly one frame.
pub fn stft(y: &[f32], n_fft: usize, hop_length: usize, window: &str, sample_rate: u32) -> StftData {
    let n_frames = frame_count(y.len(), hop_length);
    let n_bins = n_fft / 2 + 1;
    let mut s = Array2::<Complex32>::zeros((n_bins, n_frames));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);
    let window_fn = generate_window(window, n_fft);

    let pad = n_fft / 2;
    let padded_len = n_frames * hop_length + n_fft + hop_length;
    let mut padded = vec![0.0f32; padded_len];
    padded[pad..pad + y.len()].copy_from_slice(y);

    let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];
    for frame_idx in 0..n_frames {
        let start = frame_idx * hop_length + hop_length / 2;
        for (slot, (&sample, &win)) in frame
            .iter_mut()
            .zip(padded[start..start + n_fft].iter().zip(&window_fn))
        {
            *slot = Complex32::new(sample * win, 0.0);
        }

        fft.process(&mut frame);

        for (i, &val) in frame[..n_bins].iter().enumerate() {
            s[[i, frame_idx]] = val;
        }
    }

    let freqs: Vec<f32> = (0..n_bins)
        .map(|i| i as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    StftData { s, freqs }
}

/// Generate window function
pub fn generate_window(window_type: &str, size: usize) -> Vec<f32> {
    match window_type {
        "hann" => (0..size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
            })
            .collect(),
        "hamming" => (0..size)
            .map(|i| {
                0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()
            })
            .collect(),
        _ => vec![1.0; size], // Rectangular window as fallback
    }
}

/// Compute magnitude spectrogram
pub fn magnitude_spectrogram(stft_data: &StftData) -> Array2<f32> {
    stft_data.s.map(|c| c.norm())
}

/// Fractional MIDI pitch of a frequency (A4 = 440 Hz = 69)
pub fn hz_to_midi(freq: f32) -> f32 {
    69.0 + 12.0 * (freq / 440.0).log2()
}

/// Pool a magnitude spectrogram into one row per MIDI pitch.
///
/// Returns the pooled energies (shape `(n_pitches, n_frames)`) and the MIDI
/// number of row 0. Only bins inside `[min_freq, max_freq]` contribute, as
/// squared magnitude.
pub fn semitone_spectrogram(
    mag_spec: &Array2<f32>,
    freqs: &[f32],
    min_freq: f32,
    max_freq: f32,
) -> (Array2<f32>, u8) {
    let lowest = hz_to_midi(min_freq).round().max(0.0) as usize;
    let highest = hz_to_midi(max_freq).round().min(127.0) as usize;
    let n_pitches = highest.saturating_sub(lowest) + 1;
    let n_frames = mag_spec.shape()[1];
    let mut pooled = Array2::<f32>::zeros((n_pitches, n_frames));

    for (bin, &freq) in freqs.iter().enumerate() {
        if freq < min_freq || freq > max_freq {
            continue;
        }
        let pitch = hz_to_midi(freq).round() as usize;
        if pitch < lowest || pitch > highest {
            continue;
        }
        let row = pitch - lowest;
        for t in 0..n_frames {
            let m = mag_spec[[bin, t]];
            pooled[[row, t]] += m * m;
        }
    }

    (pooled, lowest as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_frame_grid_covers_signal() {
        assert_eq!(frame_count(0, 512), 0);
        assert_eq!(frame_count(1, 512), 1);
        assert_eq!(frame_count(1024, 512), 2);
        assert_eq!(frame_count(1025, 512), 3);

        let y = vec![0.0; 5000];
        let data = stft(&y, 1024, 512, "hann", 22050);
        assert_eq!(data.n_frames(), 10);
        assert_eq!(data.s.shape()[0], 513);
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let sr = 22050;
        let y: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let data = stft(&y, 4096, 2048, "hann", sr as u32);
        let mag = magnitude_spectrogram(&data);
        let mid = data.n_frames() / 2;
        let peak_bin = (0..mag.shape()[0])
            .max_by(|&a, &b| mag[[a, mid]].partial_cmp(&mag[[b, mid]]).unwrap())
            .unwrap();
        assert!((data.freqs[peak_bin] - 440.0).abs() < 10.0);
    }

    #[test]
    fn test_semitone_pooling_maps_a4() {
        let sr = 22050;
        let y: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let data = stft(&y, 4096, 2048, "hann", sr as u32);
        let mag = magnitude_spectrogram(&data);
        let (pooled, lowest) = semitone_spectrogram(&mag, &data.freqs, 55.0, 1760.0);
        assert_eq!(lowest, 33);
        let mid = data.n_frames() / 2;
        let peak_row = (0..pooled.shape()[0])
            .max_by(|&a, &b| pooled[[a, mid]].partial_cmp(&pooled[[b, mid]]).unwrap())
            .unwrap();
        assert_eq!(lowest as usize + peak_row, 69);
    }

    #[test]
    fn test_hz_to_midi() {
        assert!((hz_to_midi(440.0) - 69.0).abs() < 1e-4);
        assert!((hz_to_midi(261.63) - 60.0).abs() < 1e-2);
    }
}
