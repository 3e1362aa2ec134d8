use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl LetterGrade {
    pub fn from_percentage(percentage: Decimal) -> Self {
        if percentage >= Decimal::from(86) {
            LetterGrade::A
        } else if percentage >= Decimal::from(71) {
            LetterGrade::B
        } else if percentage >= Decimal::from(56) {
            LetterGrade::C
        } else if percentage >= Decimal::from(41) {
            LetterGrade::D
        } else if percentage >= Decimal::from(31) {
            LetterGrade::E
        } else {
            LetterGrade::F
        }
    }

    /// Five-point scale. D, E and F all map to 2.
    pub fn numeric(&self) -> u8 {
        match self {
            LetterGrade::A => 5,
            LetterGrade::B => 4,
            LetterGrade::C => 3,
            LetterGrade::D | LetterGrade::E | LetterGrade::F => 2,
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::E => "E",
            LetterGrade::F => "F",
        };
        f.write_str(letter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    #[test]
    fn letter_boundaries_are_inclusive_from_below() {
        let cases = [
            (pct(86, 0), LetterGrade::A),
            (pct(8599, 2), LetterGrade::B),
            (pct(71, 0), LetterGrade::B),
            (pct(7099, 2), LetterGrade::C),
            (pct(56, 0), LetterGrade::C),
            (pct(5599, 2), LetterGrade::D),
            (pct(41, 0), LetterGrade::D),
            (pct(4099, 2), LetterGrade::E),
            (pct(31, 0), LetterGrade::E),
            (pct(3099, 2), LetterGrade::F),
            (pct(100, 0), LetterGrade::A),
            (Decimal::ZERO, LetterGrade::F),
        ];
        for (percentage, expected) in cases {
            assert_eq!(LetterGrade::from_percentage(percentage), expected, "{}", percentage);
        }
    }

    #[test]
    fn numeric_scale_collapses_the_bottom_grades() {
        assert_eq!(LetterGrade::A.numeric(), 5);
        assert_eq!(LetterGrade::B.numeric(), 4);
        assert_eq!(LetterGrade::C.numeric(), 3);
        assert_eq!(LetterGrade::D.numeric(), 2);
        assert_eq!(LetterGrade::E.numeric(), 2);
        assert_eq!(LetterGrade::F.numeric(), 2);
    }
}
