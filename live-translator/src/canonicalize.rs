//! Terminology canonicalization for machine translation output.
//!
//! Generic translators spell out terms that operators know by their
//! abbreviation. Matches are case-insensitive and whole-word.

use lazy_static::lazy_static;
use regex::Regex;

/// Verbose phrase and its canonical form, applied in order
pub const CANONICAL_TERMS: &[(&str, &str)] = &[
    ("Servo motor", "Servo"),
    ("Motor drive", "Drive"),
    ("Programmable logic controller", "PLC"),
    ("Human machine interface", "HMI"),
    ("Variable frequency drive", "VFD"),
    ("Input/Output", "I/O"),
];

lazy_static! {
    static ref RULES: Vec<(Regex, &'static str)> = CANONICAL_TERMS
        .iter()
        .map(|(phrase, canonical)| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(phrase).replace(' ', r"[\s-]+"));
            (Regex::new(&pattern).unwrap(), *canonical)
        })
        .collect();
}

/// Apply every substitution to `text`
pub fn canonicalize(text: &str) -> String {
    let mut current = text.to_string();
    for (pattern, canonical) in RULES.iter() {
        let replaced = pattern.replace_all(&current, *canonical).into_owned();
        current = replaced;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviates_known_phrases() {
        assert_eq!(canonicalize("Servo motor overload"), "Servo overload");
        assert_eq!(
            canonicalize("programmable logic controller fault"),
            "PLC fault"
        );
        assert_eq!(canonicalize("Human-machine interface"), "HMI");
        assert_eq!(canonicalize("Input/Output module"), "I/O module");
    }

    #[test]
    fn test_leaves_other_text_alone() {
        assert_eq!(canonicalize("Emergency stop"), "Emergency stop");
        assert_eq!(canonicalize("Servomotors"), "Servomotors");
    }

    #[test]
    fn test_rules_apply_in_order() {
        assert_eq!(canonicalize("Servo motor drive"), "Servo drive");
        assert_eq!(canonicalize("Variable frequency drive"), "VFD");
    }
}
