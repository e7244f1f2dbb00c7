//! MIDI export functionality

use crate::analysis::ChordSegment;
use crate::chord::notes_for_label;
use crate::config::MidiConfig;
use crate::error::{ChordError, Result as ChordErrorResult};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A note event at an absolute tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub tick: u32,
    pub key: u8,
    /// `true` for note-on, `false` for note-off
    pub on: bool,
}

/// Block-chord note events derived from a segment list
#[derive(Debug, Clone, Default)]
pub struct MidiTrack {
    pub events: Vec<NoteEvent>,
    /// Number of chords that produced notes
    pub blocks: usize,
    /// Tick of the last segment end, including no-chord spans
    pub end_tick: u32,
}

/// Convert seconds to ticks at a fixed tempo
pub fn seconds_to_ticks(seconds: f32, config: &MidiConfig) -> u32 {
    let ticks_per_sec = config.ppq as f64 * config.tempo_bpm as f64 / 60.0;
    (seconds.max(0.0) as f64 * ticks_per_sec).round() as u32
}

impl MidiTrack {
    /// One block chord per non-silent segment, held for the segment's span
    pub fn from_segments(segments: &[ChordSegment], config: &MidiConfig) -> Self {
        let mut events = Vec::new();
        let mut blocks = 0;
        let mut end_tick = 0;

        for segment in segments {
            let start = seconds_to_ticks(segment.start_time, config);
            let end = seconds_to_ticks(segment.end_time, config);
            end_tick = end_tick.max(end);
            if segment.is_no_chord() || end <= start {
                continue;
            }
            let notes = notes_for_label(&segment.label, config.base_octave);
            if notes.is_empty() {
                continue;
            }
            blocks += 1;
            for &key in &notes {
                events.push(NoteEvent { tick: start, key, on: true });
                events.push(NoteEvent { tick: end, key, on: false });
            }
        }

        // Offs before ons at the same tick so repeated pitches retrigger cleanly
        events.sort_by_key(|e| (e.tick, e.on, e.key));

        MidiTrack {
            events,
            blocks,
            end_tick,
        }
    }

    pub fn note_count(&self) -> usize {
        self.events.iter().filter(|e| e.on).count()
    }

    /// Serialize as a single-track Standard MIDI File
    pub fn to_smf_bytes(&self, config: &MidiConfig) -> ChordErrorResult<Vec<u8>> {
        let channel = u4::from(config.channel.min(15));
        let tempo_uspq = (60_000_000.0 / config.tempo_bpm as f64).round() as u32;

        let mut track_events = vec![
            TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(config.track_name.as_bytes())),
            },
            TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(
                    tempo_uspq.min(0x00FF_FFFF),
                ))),
            },
            TrackEvent {
                delta: u28::from(0),
                // 4/4, 24 MIDI clocks per click, 8 32nd notes per quarter
                kind: TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
            },
            TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::ProgramChange {
                        program: u7::from(config.program.min(127)),
                    },
                },
            },
        ];

        let velocity = u7::from(config.velocity.min(127));
        let mut current_tick = 0u32;
        for event in &self.events {
            let delta = event.tick - current_tick;
            current_tick = event.tick;
            let message = if event.on {
                MidiMessage::NoteOn {
                    key: u7::from(event.key),
                    vel: velocity,
                }
            } else {
                MidiMessage::NoteOff {
                    key: u7::from(event.key),
                    vel: u7::from(0),
                }
            };
            track_events.push(TrackEvent {
                delta: u28::from(delta),
                kind: TrackEventKind::Midi { channel, message },
            });
        }

        // End of track
        track_events.push(TrackEvent {
            delta: u28::from(self.end_tick.saturating_sub(current_tick)),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let smf = Smf {
            header: Header {
                format: Format::SingleTrack,
                timing: Timing::Metrical(u15::from(config.ppq)),
            },
            tracks: vec![track_events],
        };

        let mut bytes = Vec::new();
        smf.write_std(&mut bytes)
            .map_err(|e| ChordError::Encode(format!("Failed to write MIDI data: {}", e)))?;
        Ok(bytes)
    }
}

/// Encode segments to Standard MIDI File bytes
pub fn encode_segments(segments: &[ChordSegment], config: &MidiConfig) -> ChordErrorResult<Vec<u8>> {
    MidiTrack::from_segments(segments, config).to_smf_bytes(config)
}

/// Unique artifact name for one request
pub fn artifact_file_name(input: Option<&Path>) -> String {
    let stem: String = input
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or("audio")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}_chords.mid", stem, uuid::Uuid::new_v4().simple())
}

/// Encode segments and write them to `output_dir`.
///
/// The file appears under its final name only once fully written.
pub fn export_midi(
    segments: &[ChordSegment],
    input: Option<&Path>,
    output_dir: &Path,
    config: &MidiConfig,
) -> ChordErrorResult<PathBuf> {
    let track = MidiTrack::from_segments(segments, config);
    let bytes = track.to_smf_bytes(config)?;

    std::fs::create_dir_all(output_dir).map_err(|e| {
        ChordError::Encode(format!("cannot create {}: {}", output_dir.display(), e))
    })?;

    let midi_path = output_dir.join(artifact_file_name(input));
    let mut tmp = tempfile::Builder::new()
        .prefix(".chord2midi-")
        .suffix(".part")
        .tempfile_in(output_dir)
        .map_err(|e| ChordError::Encode(format!("cannot create temp file: {}", e)))?;
    tmp.write_all(&bytes)
        .map_err(|e| ChordError::Encode(format!("cannot write MIDI data: {}", e)))?;
    tmp.flush()
        .map_err(|e| ChordError::Encode(format!("cannot write MIDI data: {}", e)))?;
    tmp.persist(&midi_path)
        .map_err(|e| ChordError::Encode(format!("cannot finalise {}: {}", midi_path.display(), e)))?;

    log::info!(
        "Exported {} chord blocks ({} notes) to {}",
        track.blocks,
        track.note_count(),
        midi_path.display()
    );
    Ok(midi_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_ons(bytes: &[u8]) -> Vec<(u32, u8)> {
        let smf = Smf::parse(bytes).unwrap();
        let mut tick = 0u32;
        let mut ons = Vec::new();
        for event in &smf.tracks[0] {
            tick += event.delta.as_int();
            if let TrackEventKind::Midi {
                message: MidiMessage::NoteOn { key, vel },
                ..
            } = &event.kind
            {
                if vel.as_int() > 0 {
                    ons.push((tick, key.as_int()));
                }
            }
        }
        ons
    }

    #[test]
    fn test_seconds_to_ticks() {
        let config = MidiConfig::default();
        // 120 bpm, 480 ppq -> 960 ticks per second
        assert_eq!(seconds_to_ticks(1.0, &config), 960);
        assert_eq!(seconds_to_ticks(0.5, &config), 480);
        assert_eq!(seconds_to_ticks(-1.0, &config), 0);
    }

    #[test]
    fn test_empty_segments_produce_valid_file() {
        let config = MidiConfig::default();
        let bytes = encode_segments(&[], &config).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);
        assert!(note_ons(&bytes).is_empty());
    }

    #[test]
    fn test_block_chords_and_no_chord_gaps() {
        let config = MidiConfig::default();
        let segments = vec![
            ChordSegment::new("C", 0.0, 1.0),
            ChordSegment::new("N", 1.0, 2.0),
            ChordSegment::new("Am", 2.0, 3.0),
        ];
        let track = MidiTrack::from_segments(&segments, &config);
        assert_eq!(track.blocks, 2);
        assert_eq!(track.note_count(), 6);
        assert_eq!(track.end_tick, 2880);

        let ons = note_ons(&track.to_smf_bytes(&config).unwrap());
        assert_eq!(
            ons,
            vec![(0, 60), (0, 64), (0, 67), (1920, 57), (1920, 60), (1920, 64)]
        );
    }

    #[test]
    fn test_note_off_precedes_retrigger() {
        let config = MidiConfig::default();
        let segments = vec![
            ChordSegment::new("C", 0.0, 1.0),
            ChordSegment::new("Am", 1.0, 2.0),
        ];
        let track = MidiTrack::from_segments(&segments, &config);
        let at_boundary: Vec<_> = track.events.iter().filter(|e| e.tick == 960).collect();
        let first_on = at_boundary.iter().position(|e| e.on).unwrap();
        assert!(at_boundary[..first_on].iter().all(|e| !e.on));
        assert_eq!(first_on, 3);
    }

    #[test]
    fn test_artifact_names_are_unique() {
        let input = Path::new("/tmp/my song.mp3");
        let a = artifact_file_name(Some(input));
        let b = artifact_file_name(Some(input));
        assert_ne!(a, b);
        assert!(a.starts_with("my_song_"));
        assert!(a.ends_with("_chords.mid"));
    }

    #[test]
    fn test_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = MidiConfig::default();
        let segments = vec![ChordSegment::new("G", 0.0, 2.0)];
        let path = export_midi(&segments, None, dir.path(), &config).unwrap();
        assert!(path.exists());
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(note_ons(&bytes).len(), 3);
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().ends_with(".part"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
    }
}
