/// Pitch table - maps grid rows to frequencies and note names
///
/// Row 0 is the highest pitch; every row below it is one semitone lower.

/// MIDI note of row 0 (B6)
pub const TOP_NOTE: u8 = 95;

const REFERENCE_NOTE: i32 = 69; // A4
const REFERENCE_FREQUENCY: f32 = 440.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PitchEntry {
    pub index: usize,
    pub frequency: f32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PitchTable {
    entries: Vec<PitchEntry>,
}

impl PitchTable {
    /// Builds up to `max_size` descending chromatic pitches starting at `TOP_NOTE`.
    /// Stops early rather than going below MIDI note 0, so the table may be
    /// shorter than requested.
    pub fn generate(max_size: usize) -> Self {
        let entries = (0..max_size)
            .map_while(|index| {
                let note = TOP_NOTE.checked_sub(u8::try_from(index).ok()?)?;
                Some(PitchEntry {
                    index,
                    frequency: midi_note_to_frequency(note),
                    name: midi_note_name(note),
                })
            })
            .collect();

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `None` for rows the table does not reach; those rows stay silent.
    pub fn frequency(&self, row: usize) -> Option<f32> {
        self.entries.get(row).map(|e| e.frequency)
    }

    pub fn name(&self, row: usize) -> Option<&str> {
        self.entries.get(row).map(|e| e.name.as_str())
    }

    /// Names of the first `rows` pitches
    pub fn names(&self, rows: usize) -> Vec<&str> {
        self.entries
            .iter()
            .take(rows)
            .map(|e| e.name.as_str())
            .collect()
    }
}

pub fn midi_note_to_frequency(note: u8) -> f32 {
    REFERENCE_FREQUENCY * 2.0_f32.powf((note as i32 - REFERENCE_NOTE) as f32 / 12.0)
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_descend_from_top_note() {
        let table = PitchTable::generate(64);
        assert_eq!(table.len(), 64);
        assert_eq!(table.name(0), Some("B6"));
        assert_eq!(table.name(1), Some("A#6"));
        assert_eq!(table.name(26), Some("A4"));
        assert!((table.frequency(26).unwrap() - 440.0).abs() < 1e-3);
        for row in 1..table.len() {
            assert!(table.frequency(row).unwrap() < table.frequency(row - 1).unwrap());
        }
    }

    #[test]
    fn test_octave_doubles_frequency() {
        let table = PitchTable::generate(13);
        let ratio = table.frequency(0).unwrap() / table.frequency(12).unwrap();
        assert!((ratio - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_stops_at_lowest_note() {
        let table = PitchTable::generate(200);
        assert_eq!(table.len(), TOP_NOTE as usize + 1);
        assert_eq!(table.name(table.len() - 1), Some("C-1"));
        assert_eq!(table.frequency(table.len()), None);
    }

    #[test]
    fn test_names_subset() {
        let table = PitchTable::generate(64);
        assert_eq!(table.names(3), vec!["B6", "A#6", "A6"]);
    }
}
