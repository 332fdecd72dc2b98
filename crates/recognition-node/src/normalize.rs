//! Canonicalization of raw OCR text into validated plate strings.
//!
//! Normalization runs in a fixed order: strip non-alphanumeric noise,
//! uppercase, position-aware confusion-table substitution, then format
//! validation. Substitutions carry a confidence penalty so a heavily
//! corrected read scores below a clean one.

use crate::error::RecognitionError;
use serde::{Deserialize, Serialize};

/// Character class expected at one plate position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharClass {
    Digit,
    Letter,
    Alnum,
}

/// Positional template for one plate format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateFormat {
    /// Format tag carried into the emitted event (e.g., "national-10")
    pub tag: String,

    /// Expected character class per position; the length doubles as the
    /// required plate length
    pub positions: Vec<CharClass>,
}

impl PlateFormat {
    /// An all-digit format of the given length
    pub fn numeric(tag: impl Into<String>, len: usize) -> Self {
        Self {
            tag: tag.into(),
            positions: vec![CharClass::Digit; len],
        }
    }

    /// National registration numbers: 10 or 11 digits
    pub fn defaults() -> Vec<PlateFormat> {
        vec![
            PlateFormat::numeric("national-10", 10),
            PlateFormat::numeric("national-11", 11),
        ]
    }
}

/// A canonicalized, format-validated plate reading
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPlate {
    /// Canonical text; only characters from the format's alphabet
    pub text: String,

    /// Tag of the format the text validated against
    pub format: String,

    /// Confidence penalty accrued from substitutions, already capped
    pub penalty: f32,

    /// Number of characters replaced via the confusion table
    pub substitutions: u32,
}

/// Common OCR confusions on plates, keyed by what the position demands
fn digit_for_letter(c: char) -> Option<char> {
    match c {
        'O' => Some('0'),
        'I' => Some('1'),
        'S' => Some('5'),
        'B' => Some('8'),
        'G' => Some('6'),
        'J' => Some('3'),
        'A' => Some('4'),
        _ => None,
    }
}

fn letter_for_digit(c: char) -> Option<char> {
    match c {
        '0' => Some('O'),
        '1' => Some('I'),
        '5' => Some('S'),
        '8' => Some('B'),
        '6' => Some('G'),
        '3' => Some('J'),
        '4' => Some('A'),
        _ => None,
    }
}

fn class_matches(c: char, class: CharClass) -> bool {
    match class {
        CharClass::Digit => c.is_ascii_digit(),
        CharClass::Letter => c.is_ascii_uppercase(),
        CharClass::Alnum => c.is_ascii_alphanumeric(),
    }
}

pub struct TextNormalizer {
    formats: Vec<PlateFormat>,
    penalty_per_substitution: f32,
    max_penalty: f32,
}

impl TextNormalizer {
    pub fn new(formats: Vec<PlateFormat>, penalty_per_substitution: f32, max_penalty: f32) -> Self {
        Self {
            formats,
            penalty_per_substitution,
            max_penalty,
        }
    }

    /// Normalize against every configured format; among the formats that
    /// accept the text, the one needing the fewest substitutions wins.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedPlate, RecognitionError> {
        let cleaned = clean(raw);
        if cleaned.is_empty() {
            return Err(RecognitionError::Normalization(
                "no alphanumeric content in reading".to_string(),
            ));
        }

        let mut best: Option<NormalizedPlate> = None;
        for format in &self.formats {
            if let Some(candidate) = self.apply(&cleaned, format) {
                let better = match &best {
                    Some(current) => candidate.substitutions < current.substitutions,
                    None => true,
                };
                if better {
                    best = Some(candidate);
                }
            }
        }

        best.ok_or_else(|| {
            RecognitionError::Normalization(format!("'{}' fits no known plate format", cleaned))
        })
    }

    /// Normalize against a single declared format
    pub fn normalize_as(
        &self,
        raw: &str,
        format: &PlateFormat,
    ) -> Result<NormalizedPlate, RecognitionError> {
        let cleaned = clean(raw);
        self.apply(&cleaned, format).ok_or_else(|| {
            RecognitionError::Normalization(format!(
                "'{}' does not satisfy format '{}'",
                cleaned, format.tag
            ))
        })
    }

    fn apply(&self, cleaned: &str, format: &PlateFormat) -> Option<NormalizedPlate> {
        if cleaned.chars().count() != format.positions.len() {
            return None;
        }

        let mut text = String::with_capacity(format.positions.len());
        let mut substitutions = 0u32;

        for (c, &class) in cleaned.chars().zip(format.positions.iter()) {
            if class_matches(c, class) {
                text.push(c);
                continue;
            }

            let substituted = match class {
                CharClass::Digit => digit_for_letter(c),
                CharClass::Letter => letter_for_digit(c),
                CharClass::Alnum => None,
            };

            match substituted {
                Some(s) => {
                    text.push(s);
                    substitutions += 1;
                }
                None => return None,
            }
        }

        let penalty =
            (substitutions as f32 * self.penalty_per_substitution).min(self.max_penalty);

        Some(NormalizedPlate {
            text,
            format: format.tag.clone(),
            penalty,
            substitutions,
        })
    }
}

/// Strip non-alphanumeric noise and uppercase
fn clean(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(formats: Vec<PlateFormat>) -> TextNormalizer {
        TextNormalizer::new(formats, 0.03, 0.15)
    }

    fn mixed_format() -> PlateFormat {
        // digit digit digit letter letter digit
        PlateFormat {
            tag: "test-mixed".to_string(),
            positions: vec![
                CharClass::Digit,
                CharClass::Digit,
                CharClass::Digit,
                CharClass::Letter,
                CharClass::Letter,
                CharClass::Digit,
            ],
        }
    }

    #[test]
    fn test_position_aware_substitution() {
        let n = normalizer(vec![mixed_format()]);
        let plate = n.normalize("1O2AB3").unwrap();

        assert_eq!(plate.text, "102AB3");
        assert_eq!(plate.substitutions, 1);
        assert!((plate.penalty - 0.03).abs() < 1e-6);
        assert_eq!(plate.format, "test-mixed");
    }

    #[test]
    fn test_strip_and_uppercase() {
        let n = normalizer(vec![mixed_format()]);
        let plate = n.normalize(" 1o2-a b3 ").unwrap();
        assert_eq!(plate.text, "102AB3");
    }

    #[test]
    fn test_penalty_capped() {
        // Six letter positions all read as digits: 6 * 0.03 > cap
        let format = PlateFormat {
            tag: "letters".to_string(),
            positions: vec![CharClass::Letter; 6],
        };
        let n = normalizer(vec![format]);
        let plate = n.normalize("015863").unwrap();

        assert_eq!(plate.text, "OISBGJ");
        assert_eq!(plate.substitutions, 6);
        assert!((plate.penalty - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_unfixable_character_rejects() {
        let n = normalizer(vec![mixed_format()]);
        // 'X' has no digit counterpart, so position 0 cannot be satisfied
        let err = n.normalize("XO2AB3").unwrap_err();
        assert!(matches!(err, RecognitionError::Normalization(_)));
    }

    #[test]
    fn test_wrong_length_rejects() {
        let n = normalizer(vec![mixed_format()]);
        assert!(n.normalize("102AB34").is_err());
        assert!(n.normalize("").is_err());
    }

    #[test]
    fn test_fewest_substitutions_format_wins() {
        // "012345" fits all-digit cleanly, and all-letter only via six subs
        let n = normalizer(vec![
            PlateFormat {
                tag: "letters".to_string(),
                positions: vec![CharClass::Letter; 6],
            },
            PlateFormat::numeric("digits", 6),
        ]);
        let plate = n.normalize("012345").unwrap();
        assert_eq!(plate.format, "digits");
        assert_eq!(plate.substitutions, 0);
    }

    #[test]
    fn test_default_national_formats() {
        let n = normalizer(PlateFormat::defaults());
        let plate = n.normalize("0123456789").unwrap();
        assert_eq!(plate.format, "national-10");

        let plate = n.normalize("01234567891").unwrap();
        assert_eq!(plate.format, "national-11");
    }

    #[test]
    fn test_canonical_alphabet_only() {
        let n = normalizer(PlateFormat::defaults());
        // 'O' and 'I' resolve to digits in digit positions
        let plate = n.normalize("O12345678I").unwrap();
        assert_eq!(plate.text, "0123456781");
        assert!(plate.text.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_normalize_as_declared_format() {
        let n = normalizer(PlateFormat::defaults());
        let declared = mixed_format();
        let plate = n.normalize_as("1O2AB3", &declared).unwrap();
        assert_eq!(plate.text, "102AB3");

        assert!(n.normalize_as("0123456789", &declared).is_err());
    }
}
