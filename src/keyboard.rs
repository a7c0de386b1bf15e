//! # Keyboard Model
//!
//! A fixed five-band virtual piano used by both the preview keyboard and the
//! range setter. Each band holds twelve keys ordered A, A#, B, C, ... G#, so
//! the three keys below C carry an octave number one less than the band's
//! nominal octave (the `low` band runs A1..G#2).
//!
//! The key table is computed once into a process-wide immutable table and is
//! never mutated afterwards.
//!
//! This module also carries the band-prefixed note naming used by stored
//! ranges and by the analysis service (`mid1C`, `hiA#`, ...), together with
//! conversions to and from MIDI note numbers.

use once_cell::sync::Lazy;

use crate::error::{PitchError, Result};

/// Horizontal spacing of white keys, in layout units (pixels).
pub const WHITE_KEY_WIDTH: f32 = 56.0;
/// Width of a black key; black keys are centred on the preceding white-key boundary.
pub const BLACK_KEY_WIDTH: f32 = 35.0;
/// Number of keys per band.
pub const KEYS_PER_BAND: usize = 12;

/// Colour of a key on the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    White,
    Black,
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyKind::White => write!(f, "white"),
            KeyKind::Black => write!(f, "black"),
        }
    }
}

/// One of the five named bands of the virtual keyboard, low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OctaveBand {
    Low,
    Mid1,
    Mid2,
    Hi,
    HiHi,
}

impl OctaveBand {
    /// All bands from lowest to highest.
    pub const ALL: [OctaveBand; 5] = [
        OctaveBand::Low,
        OctaveBand::Mid1,
        OctaveBand::Mid2,
        OctaveBand::Hi,
        OctaveBand::HiHi,
    ];

    /// Band prefix used in display names (`mid1` in `mid1C`).
    pub fn label(self) -> &'static str {
        match self {
            OctaveBand::Low => "low",
            OctaveBand::Mid1 => "mid1",
            OctaveBand::Mid2 => "mid2",
            OctaveBand::Hi => "hi",
            OctaveBand::HiHi => "hihi",
        }
    }

    /// Nominal octave number: the octave of the band's C key.
    pub fn number(self) -> i8 {
        match self {
            OctaveBand::Low => 2,
            OctaveBand::Mid1 => 3,
            OctaveBand::Mid2 => 4,
            OctaveBand::Hi => 5,
            OctaveBand::HiHi => 6,
        }
    }
}

impl std::fmt::Display for OctaveBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Pitch classes in keyboard order, with their key colour.
const PITCH_CLASSES: [(&str, KeyKind); KEYS_PER_BAND] = [
    ("A", KeyKind::White),
    ("A#", KeyKind::Black),
    ("B", KeyKind::White),
    ("C", KeyKind::White),
    ("C#", KeyKind::Black),
    ("D", KeyKind::White),
    ("D#", KeyKind::Black),
    ("E", KeyKind::White),
    ("F", KeyKind::White),
    ("F#", KeyKind::Black),
    ("G", KeyKind::White),
    ("G#", KeyKind::Black),
];

/// Semitone offset from C, in C-based ordering.
const NOTE_NAMES_FROM_C: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Band prefixes used by the analysis service, covering the whole MIDI range.
/// Index is the prefix's octave value.
const BAND_PREFIXES: [&str; 9] = [
    "lowlowlow", "lowlow", "low", "mid1", "mid2", "hi", "hihi", "hihihi", "hihihihi",
];

/// One playable key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    /// Pitch class name (`"A"`, `"C#"`, ...).
    pub note: &'static str,
    pub kind: KeyKind,
    pub band: OctaveBand,
    /// Numeric octave in standard numbering.
    pub octave: i8,
    /// Note name plus numeric octave, e.g. `"A2"`, `"C#4"`. Unique on the keyboard.
    pub id: String,
}

impl Key {
    /// Label of the band this key belongs to.
    pub fn octave_label(&self) -> &'static str {
        self.band.label()
    }

    /// Band label plus pitch class, e.g. `"mid1C"`. This is the form stored
    /// for a user's range.
    pub fn display_name(&self) -> String {
        format!("{}{}", self.band.label(), self.note)
    }

    /// Standard MIDI note number (A4 = 69).
    pub fn midi(&self) -> i32 {
        (self.octave as i32 + 1) * 12 + semitone_from_c(self.note).unwrap_or(0)
    }

    /// Equal-temperament frequency with A4 = 440 Hz.
    pub fn frequency(&self) -> f32 {
        440.0 * 2.0_f32.powf((self.midi() - 69) as f32 / 12.0)
    }

    /// True for natural notes.
    pub fn is_white(&self) -> bool {
        self.kind == KeyKind::White
    }
}

static KEYBOARD: Lazy<Vec<Key>> = Lazy::new(|| {
    OctaveBand::ALL
        .iter()
        .flat_map(|&band| {
            PITCH_CLASSES.iter().map(move |&(note, kind)| {
                // A, A# and B sit below C in standard octave numbering.
                let octave = if matches!(note, "A" | "A#" | "B") {
                    band.number() - 1
                } else {
                    band.number()
                };
                Key {
                    note,
                    kind,
                    band,
                    octave,
                    id: format!("{note}{octave}"),
                }
            })
        })
        .collect()
});

/// The full ordered key sequence, low to high.
pub fn keyboard() -> &'static [Key] {
    &KEYBOARD
}

/// Returns an owned copy of the ordered key sequence. Identical on every call.
pub fn build_keyboard() -> Vec<Key> {
    KEYBOARD.clone()
}

/// Horizontal offset of the key at `index`.
///
/// White keys sit at `ordinal * 56` where `ordinal` counts only the white
/// keys before them; black keys are centred on that boundary
/// (`ordinal * 56 - 35 / 2`).
pub fn layout_of(index: usize) -> Result<f32> {
    let keys = keyboard();
    let key = keys.get(index).ok_or_else(|| {
        PitchError::validation(format!(
            "key index {index} is out of bounds (keyboard has {} keys)",
            keys.len()
        ))
    })?;
    let white_before = keys[..index].iter().filter(|k| k.is_white()).count() as f32;
    Ok(match key.kind {
        KeyKind::White => white_before * WHITE_KEY_WIDTH,
        KeyKind::Black => white_before * WHITE_KEY_WIDTH - BLACK_KEY_WIDTH / 2.0,
    })
}

/// Total width of the rendered keyboard.
pub fn keyboard_width() -> f32 {
    keyboard().iter().filter(|k| k.is_white()).count() as f32 * WHITE_KEY_WIDTH
}

/// Looks up a key by id (`"C4"`), case-insensitively.
pub fn find_key(id: &str) -> Option<&'static Key> {
    let id = id.trim();
    keyboard().iter().find(|k| k.id.eq_ignore_ascii_case(id))
}

/// Looks up a key by its display form (`"mid1C"`), case-insensitively.
pub fn parse_display(name: &str) -> Option<&'static Key> {
    let name = name.trim();
    keyboard()
        .iter()
        .find(|k| k.display_name().eq_ignore_ascii_case(name))
}

/// Resolves either an id or a display form to a key.
pub fn resolve_key(name: &str) -> Result<&'static Key> {
    find_key(name)
        .or_else(|| parse_display(name))
        .ok_or_else(|| PitchError::validation(format!("unknown key '{name}'")))
}

fn semitone_from_c(note: &str) -> Option<i32> {
    NOTE_NAMES_FROM_C
        .iter()
        .position(|n| n.eq_ignore_ascii_case(note))
        .map(|p| p as i32)
}

/// Converts a band-prefixed note name (`"mid1C"`, `"hihiA#"`) to a MIDI number.
///
/// A, A# and B are counted one octave lower than the band prefix, matching
/// the keyboard layout. Returns `None` for unknown prefixes or notes.
pub fn note_name_to_midi(name: &str) -> Option<i32> {
    let name = name.trim().to_ascii_lowercase();
    let split = if name.ends_with('#') {
        name.len().checked_sub(2)?
    } else {
        name.len().checked_sub(1)?
    };
    if !name.is_char_boundary(split) {
        return None;
    }
    let (prefix, note) = name.split_at(split);
    let octave = BAND_PREFIXES.iter().position(|p| *p == prefix)? as i32;
    let semitone = semitone_from_c(note)?;
    if semitone >= 9 {
        Some(octave * 12 + semitone)
    } else {
        Some((octave + 1) * 12 + semitone)
    }
}

/// Converts a MIDI number to the band-prefixed naming. `None` outside 0..=127.
pub fn midi_to_display(midi: i32) -> Option<String> {
    if !(0..=127).contains(&midi) {
        return None;
    }
    let note = NOTE_NAMES_FROM_C[(midi % 12) as usize];
    let band = if midi <= 20 {
        0
    } else {
        (((midi - 21) / 12) + 1).min(8) as usize
    };
    Some(format!("{}{}", BAND_PREFIXES[band], note))
}
