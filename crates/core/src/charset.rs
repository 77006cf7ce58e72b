//! Character table: character ↔ dot/dash representation lookup
//!
//! Representations use `.` for a dot and `-` for a dash. The table covers
//! letters, digits, common punctuation, and single-character prosign
//! aliases. Reverse lookup goes through a lazily-built hash map so decoding
//! is O(1) per character.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Dot symbol within a representation.
pub const DOT: char = '.';

/// Dash symbol within a representation.
pub const DASH: char = '-';

/// Longest representation in the table (the 6-symbol punctuation marks and
/// the 7-symbol '$' are the practical ceiling).
pub const MAX_REPRESENTATION_LEN: usize = 7;

/// The full character table. Letters are stored uppercase; lookups
/// case-fold.
static CHARACTER_TABLE: &[(char, &str)] = &[
    // Letters
    ('A', ".-"),
    ('B', "-..."),
    ('C', "-.-."),
    ('D', "-.."),
    ('E', "."),
    ('F', "..-."),
    ('G', "--."),
    ('H', "...."),
    ('I', ".."),
    ('J', ".---"),
    ('K', "-.-"),
    ('L', ".-.."),
    ('M', "--"),
    ('N', "-."),
    ('O', "---"),
    ('P', ".--."),
    ('Q', "--.-"),
    ('R', ".-."),
    ('S', "..."),
    ('T', "-"),
    ('U', "..-"),
    ('V', "...-"),
    ('W', ".--"),
    ('X', "-..-"),
    ('Y', "-.--"),
    ('Z', "--.."),
    // Numbers
    ('0', "-----"),
    ('1', ".----"),
    ('2', "..---"),
    ('3', "...--"),
    ('4', "....-"),
    ('5', "....."),
    ('6', "-...."),
    ('7', "--..."),
    ('8', "---.."),
    ('9', "----."),
    // Punctuation
    ('"', ".-..-."),
    ('\'', ".----."),
    ('$', "...-..-"),
    ('(', "-.--."),
    (')', "-.--.-"),
    ('+', ".-.-."),
    (',', "--..--"),
    ('-', "-....-"),
    ('.', ".-.-.-"),
    ('/', "-..-."),
    (':', "---..."),
    (';', "-.-.-."),
    ('=', "-...-"),
    ('?', "..--.."),
    ('_', "..--.-"),
    ('@', ".--.-."),
    // Prosign aliases
    ('<', "...-.-"), // SK (end of contact)
    ('>', "-...-.-"), // BK (break)
    ('!', "...-."),  // SN (understood)
    ('&', ".-..."),  // AS (wait)
    ('^', "-.-.-"),  // KA (attention)
    ('~', ".-.-"),   // AA (new line)
];

fn forward_table() -> &'static HashMap<char, &'static str> {
    static TABLE: OnceLock<HashMap<char, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| CHARACTER_TABLE.iter().copied().collect())
}

fn reverse_table() -> &'static HashMap<&'static str, char> {
    static TABLE: OnceLock<HashMap<&'static str, char>> = OnceLock::new();
    TABLE.get_or_init(|| CHARACTER_TABLE.iter().map(|&(c, r)| (r, c)).collect())
}

/// Look up the representation of a character, case-folding letters.
pub fn to_representation(character: char) -> Option<&'static str> {
    forward_table()
        .get(&character.to_ascii_uppercase())
        .copied()
}

/// Look up the character a representation decodes to.
pub fn to_character(representation: &str) -> Option<char> {
    reverse_table().get(representation).copied()
}

/// True if `representation` is non-empty, within the length ceiling, and
/// contains only dot/dash symbols. Says nothing about whether any character
/// is assigned to it.
pub fn is_valid_representation(representation: &str) -> bool {
    !representation.is_empty()
        && representation.len() <= MAX_REPRESENTATION_LEN
        && representation.chars().all(|c| c == DOT || c == DASH)
}

/// True if the character is sendable. Space is always valid; it maps to an
/// inter-word space rather than a representation.
pub fn is_valid_character(character: char) -> bool {
    character == ' ' || forward_table().contains_key(&character.to_ascii_uppercase())
}

/// All characters in the table, for enumeration in tests and tools.
pub fn characters() -> impl Iterator<Item = char> {
    CHARACTER_TABLE.iter().map(|&(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_lookups() {
        assert_eq!(to_representation('A'), Some(".-"));
        assert_eq!(to_representation('a'), Some(".-"));
        assert_eq!(to_representation('0'), Some("-----"));
        assert_eq!(to_representation('#'), None);
        assert_eq!(to_character(".-"), Some('A'));
        assert_eq!(to_character("......."), None);
    }

    #[test]
    fn round_trip_all_characters() {
        for c in characters() {
            let repr = to_representation(c).expect("listed character");
            assert_eq!(to_character(repr), Some(c.to_ascii_uppercase()));
        }
    }

    #[test]
    fn representation_syntax() {
        assert!(is_valid_representation(".-"));
        assert!(is_valid_representation("-------"));
        assert!(!is_valid_representation(""));
        assert!(!is_valid_representation(".-x"));
        assert!(!is_valid_representation("--------")); // over the ceiling
    }

    #[test]
    fn space_is_always_valid() {
        assert!(is_valid_character(' '));
        assert!(is_valid_character('q'));
        assert!(!is_valid_character('#'));
    }

    #[test]
    fn no_representation_exceeds_ceiling() {
        for c in characters() {
            let repr = to_representation(c).unwrap();
            assert!(repr.len() <= MAX_REPRESENTATION_LEN, "{c}: {repr}");
        }
    }

    #[test]
    fn representations_are_unique() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for c in characters() {
            let repr = to_representation(c).unwrap();
            assert!(seen.insert(repr), "duplicate representation {repr} for {c}");
        }
    }
}
