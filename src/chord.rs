//! Chord vocabulary: labels, pitch-class templates and MIDI voicings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Number of pitch classes in a chroma vector
pub const PITCH_CLASSES: usize = 12;

/// Label used for silence or harmonically ambiguous spans
pub const NO_CHORD: &str = "N";

/// Sharp spellings indexed by pitch class (C = 0)
pub const NOTE_NAMES: [&str; PITCH_CLASSES] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Chord qualities in vocabulary order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordQuality {
    Major,
    Minor,
    DominantSeventh,
    Diminished,
    Augmented,
}

impl ChordQuality {
    pub const ALL: [ChordQuality; 5] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::DominantSeventh,
        ChordQuality::Diminished,
        ChordQuality::Augmented,
    ];

    /// Semitone intervals above the root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::DominantSeventh => &[0, 4, 7, 10],
            ChordQuality::Diminished => &[0, 3, 6],
            ChordQuality::Augmented => &[0, 4, 8],
        }
    }

    /// Suffix appended to the root in chord labels
    pub fn suffix(&self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::DominantSeventh => "7",
            ChordQuality::Diminished => "dim",
            ChordQuality::Augmented => "aug",
        }
    }

    fn parse_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "" | "maj" | "major" => Some(ChordQuality::Major),
            "m" | "min" | "minor" => Some(ChordQuality::Minor),
            "7" | "dom7" => Some(ChordQuality::DominantSeventh),
            "dim" | "o" => Some(ChordQuality::Diminished),
            "aug" | "+" => Some(ChordQuality::Augmented),
            _ => None,
        }
    }
}

/// A chord: root pitch class plus quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    /// Root pitch class, 0 = C
    pub root: u8,
    pub quality: ChordQuality,
}

impl Chord {
    pub fn new(root: u8, quality: ChordQuality) -> Self {
        Self {
            root: root % PITCH_CLASSES as u8,
            quality,
        }
    }

    /// Pitch classes belonging to the chord
    pub fn pitch_classes(&self) -> Vec<u8> {
        self.quality
            .intervals()
            .iter()
            .map(|&i| (self.root + i) % PITCH_CLASSES as u8)
            .collect()
    }

    /// MIDI note numbers for a close-position voicing.
    ///
    /// The root sits in `base_octave` (C4 = 60); roots A, A# and B drop an
    /// octave so every voicing stays around middle C.
    pub fn midi_notes(&self, base_octave: i8) -> Vec<u8> {
        let mut root_note = (base_octave as i16 + 1) * 12 + self.root as i16;
        if self.root >= 9 {
            root_note -= 12;
        }
        let mut notes: Vec<u8> = self
            .quality
            .intervals()
            .iter()
            .map(|&i| root_note + i as i16)
            .filter(|n| (0..=127).contains(n))
            .map(|n| n as u8)
            .collect();
        notes.sort_unstable();
        notes.dedup();
        notes
    }

    pub fn label(&self) -> String {
        format!("{}{}", NOTE_NAMES[self.root as usize], self.quality.suffix())
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Chord {
    type Err = String;

    /// Parses `C`, `C#m`, `Dbmin`, `G7`, `Bdim`, `Eaug` and `A:min`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars
            .next()
            .ok_or_else(|| "empty chord label".to_string())?;
        let natural: i8 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(format!("unknown root in chord '{}'", s)),
        };

        let rest = &s[letter.len_utf8()..];
        let (accidental, rest) = match rest.chars().next() {
            Some('#') => (1, &rest[1..]),
            Some('b') => (-1, &rest[1..]),
            _ => (0, rest),
        };
        let root = (natural + accidental).rem_euclid(PITCH_CLASSES as i8) as u8;

        let suffix = rest.strip_prefix(':').unwrap_or(rest);
        let quality = ChordQuality::parse_suffix(suffix)
            .ok_or_else(|| format!("unknown chord quality '{}' in '{}'", suffix, s))?;

        Ok(Chord::new(root, quality))
    }
}

/// Returns true for the no-chord label and its common spellings
pub fn is_no_chord(label: &str) -> bool {
    let label = label.trim();
    label.is_empty() || label.eq_ignore_ascii_case("n") || label.eq_ignore_ascii_case("x")
}

/// MIDI notes for a chord label; no-chord and unparseable labels give none
pub fn notes_for_label(label: &str, base_octave: i8) -> Vec<u8> {
    if is_no_chord(label) {
        return Vec::new();
    }
    match label.parse::<Chord>() {
        Ok(chord) => chord.midi_notes(base_octave),
        Err(e) => {
            log::warn!("Skipping unparseable chord label: {}", e);
            Vec::new()
        }
    }
}

/// Reference pitch-class pattern for one chord
#[derive(Debug, Clone)]
pub struct ChordTemplate {
    pub chord: Chord,
    pub label: String,
    /// Binary pitch-class mask
    pub mask: [f32; PITCH_CLASSES],
    /// L2 norm of `mask`
    pub norm: f32,
}

impl ChordTemplate {
    pub fn new(chord: Chord) -> Self {
        let mut mask = [0.0; PITCH_CLASSES];
        for pc in chord.pitch_classes() {
            mask[pc as usize] = 1.0;
        }
        let norm = mask.iter().map(|x| x * x).sum::<f32>().sqrt();
        Self {
            chord,
            label: chord.label(),
            mask,
            norm,
        }
    }
}

/// Fixed, ordered chord vocabulary.
///
/// Order is all majors C..B, then minors, sevenths, diminished and augmented.
/// Classifiers break score ties in favour of the earlier entry.
#[derive(Debug, Clone)]
pub struct ChordVocabulary {
    templates: Vec<ChordTemplate>,
}

static SHARED_VOCABULARY: OnceLock<Arc<ChordVocabulary>> = OnceLock::new();

impl ChordVocabulary {
    /// Build the full vocabulary
    pub fn standard() -> Self {
        Self::with_qualities(&ChordQuality::ALL)
    }

    /// Build a vocabulary restricted to the given qualities, in the given order
    pub fn with_qualities(qualities: &[ChordQuality]) -> Self {
        let templates = qualities
            .iter()
            .flat_map(|&q| (0..PITCH_CLASSES as u8).map(move |root| Chord::new(root, q)))
            .map(ChordTemplate::new)
            .collect();
        Self { templates }
    }

    /// Process-wide standard vocabulary, built on first use
    pub fn shared() -> Arc<ChordVocabulary> {
        SHARED_VOCABULARY
            .get_or_init(|| Arc::new(ChordVocabulary::standard()))
            .clone()
    }

    pub fn templates(&self) -> &[ChordTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn label(&self, idx: usize) -> &str {
        &self.templates[idx].label
    }
}
