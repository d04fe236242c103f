use std::fmt::Display;
use std::str::FromStr;

use serde::{
    Deserialize,
    Serialize,
};

use crate::error::QuantError;

#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum ReadType {
    SingleEnd,
    PairedEnd,
}

/// Relative orientation of the two mates of a paired-end fragment.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum MateOrientation {
    /// Both mates on the same strand.
    Same,
    /// Mates point away from each other.
    Away,
    /// Mates point toward each other.
    Toward,
    /// Single-end reads.
    None,
}

/// Strand of origin of the first (or only) read.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum Strandedness {
    /// Read 1 sense, read 2 antisense.
    SA,
    /// Read 1 antisense, read 2 sense.
    AS,
    /// Single-end sense.
    S,
    /// Single-end antisense.
    A,
    /// Unstranded.
    U,
}

/// Describes the expected layout of the sequencing library, e.g. `IU` or
/// `SR`.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub struct LibraryFormat {
    pub read_type:    ReadType,
    pub orientation:  MateOrientation,
    pub strandedness: Strandedness,
}

impl LibraryFormat {
    pub fn new(
        read_type: ReadType,
        orientation: MateOrientation,
        strandedness: Strandedness,
    ) -> Self {
        Self {
            read_type,
            orientation,
            strandedness,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.read_type == ReadType::PairedEnd
    }

    /// Whether a fragment whose first read maps in orientation `read1_fwd`
    /// (and, for pairs, whose second read maps in `read2_fwd`) agrees with
    /// this format.
    pub fn is_compatible(
        &self,
        read1_fwd: bool,
        read2_fwd: Option<bool>,
    ) -> bool {
        let strand_ok = match self.strandedness {
            Strandedness::U => true,
            Strandedness::S | Strandedness::SA => read1_fwd,
            Strandedness::A | Strandedness::AS => !read1_fwd,
        };
        let orientation_ok = match (self.orientation, read2_fwd) {
            (_, None) | (MateOrientation::None, _) => true,
            (MateOrientation::Same, Some(r2)) => r2 == read1_fwd,
            (MateOrientation::Toward | MateOrientation::Away, Some(r2)) => r2 != read1_fwd,
        };
        strand_ok && orientation_ok
    }

    /// Compatibility of a fragment of which a single mate aligned in
    /// orientation `read_fwd`. A lone read2 is checked against the strand
    /// read1 is expected on, which the mate orientation determines.
    pub fn is_compatible_orphan(
        &self,
        read_fwd: bool,
        is_read1: bool,
    ) -> bool {
        let read1_fwd = match (is_read1, self.orientation) {
            (true, _) | (false, MateOrientation::Same | MateOrientation::None) => read_fwd,
            (false, MateOrientation::Toward | MateOrientation::Away) => !read_fwd,
        };
        self.is_compatible(read1_fwd, None)
    }
}

impl Default for LibraryFormat {
    fn default() -> Self {
        Self::new(ReadType::PairedEnd, MateOrientation::Toward, Strandedness::U)
    }
}

impl FromStr for LibraryFormat {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        let (orientation, rest) = match code.chars().next() {
            Some('I') => (MateOrientation::Toward, &code[1..]),
            Some('O') => (MateOrientation::Away, &code[1..]),
            Some('M') => (MateOrientation::Same, &code[1..]),
            _ => (MateOrientation::None, code.as_str()),
        };
        let paired = orientation != MateOrientation::None;
        let strandedness = match (rest, paired) {
            ("U", _) => Strandedness::U,
            ("SF", true) => Strandedness::SA,
            ("SR", true) => Strandedness::AS,
            ("SF", false) => Strandedness::S,
            ("SR", false) => Strandedness::A,
            _ => return Err(QuantError::InvalidLibraryFormat(s.to_string())),
        };
        let read_type = if paired {
            ReadType::PairedEnd
        }
        else {
            ReadType::SingleEnd
        };
        Ok(Self::new(read_type, orientation, strandedness))
    }
}

impl Display for LibraryFormat {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let orientation = match self.orientation {
            MateOrientation::Toward => "I",
            MateOrientation::Away => "O",
            MateOrientation::Same => "M",
            MateOrientation::None => "",
        };
        let strandedness = match self.strandedness {
            Strandedness::U => "U",
            Strandedness::SA | Strandedness::S => "SF",
            Strandedness::AS | Strandedness::A => "SR",
        };
        write!(f, "{}{}", orientation, strandedness)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("U")]
    #[case("SF")]
    #[case("SR")]
    #[case("IU")]
    #[case("ISF")]
    #[case("ISR")]
    #[case("OU")]
    #[case("OSF")]
    #[case("OSR")]
    #[case("MU")]
    #[case("MSF")]
    #[case("MSR")]
    fn codes_round_trip(#[case] code: &str) {
        let fmt: LibraryFormat = code.parse().unwrap();
        assert_eq!(fmt.to_string(), code);
    }

    #[rstest]
    #[case("")]
    #[case("X")]
    #[case("ISX")]
    #[case("IS")]
    fn bad_codes_are_rejected(#[case] code: &str) {
        assert!(matches!(
            code.parse::<LibraryFormat>(),
            Err(QuantError::InvalidLibraryFormat(_))
        ));
    }

    #[test]
    fn paired_stranded_compatibility() {
        let isr: LibraryFormat = "ISR".parse().unwrap();
        assert!(isr.is_paired());
        assert!(isr.is_compatible(false, Some(true)));
        assert!(!isr.is_compatible(true, Some(false)));
        assert!(!isr.is_compatible(false, Some(false)));

        let iu: LibraryFormat = "IU".parse().unwrap();
        assert!(iu.is_compatible(true, Some(false)));
        assert!(iu.is_compatible(false, Some(true)));
        assert!(iu.is_compatible(true, None));
    }

    #[rstest]
    #[case("ISR", true, false, true)]
    #[case("ISR", true, true, false)]
    #[case("ISR", false, false, false)]
    #[case("ISR", false, true, true)]
    #[case("ISF", false, false, true)]
    #[case("ISF", false, true, false)]
    #[case("OSR", false, true, true)]
    #[case("MSR", false, false, true)]
    #[case("IU", false, true, true)]
    fn orphan_compatibility(
        #[case] code: &str,
        #[case] is_read1: bool,
        #[case] read_fwd: bool,
        #[case] expected: bool,
    ) {
        let fmt: LibraryFormat = code.parse().unwrap();
        assert_eq!(fmt.is_compatible_orphan(read_fwd, is_read1), expected);
    }

    #[test]
    fn single_end_strand() {
        let sf: LibraryFormat = "sf".parse().unwrap();
        assert!(!sf.is_paired());
        assert!(sf.is_compatible(true, None));
        assert!(!sf.is_compatible(false, None));
    }
}
