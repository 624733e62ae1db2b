use super::kind::{EntityKind, SequenceScope};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;

/// Width the sequence component is zero-padded to.
pub const SEQUENCE_WIDTH: usize = 8;

static CASE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CASE-(\d{4})-(\d+)$").expect("case identifier regex"));
static CALL_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)/(\d{4})$").expect("call identifier regex"));

/// A stored identifier whose sequence component could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedIdentifier {
    pub kind: EntityKind,
    pub raw: String,
}

impl fmt::Display for MalformedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed {} identifier: {:?}", self.kind, self.raw)
    }
}

impl std::error::Error for MalformedIdentifier {}

/// One case or call number.
///
/// Formats as `CASE-2025-00000001` or `00000001/2025`. Sequences above
/// `99_999_999` keep all their digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocatedIdentifier {
    pub kind: EntityKind,
    pub year: i32,
    pub sequence: u64,
}

impl AllocatedIdentifier {
    pub fn new(kind: EntityKind, year: i32, sequence: u64) -> Self {
        Self {
            kind,
            year,
            sequence,
        }
    }

    pub fn scope(&self) -> SequenceScope {
        SequenceScope::new(self.kind, self.year)
    }

    /// Parse a stored identifier of a known kind.
    pub fn parse(kind: EntityKind, raw: &str) -> Result<Self, MalformedIdentifier> {
        let malformed = || MalformedIdentifier {
            kind,
            raw: raw.to_string(),
        };
        let (year, sequence) = match kind {
            EntityKind::Case => {
                let caps = CASE_IDENTIFIER.captures(raw).ok_or_else(malformed)?;
                (caps.get(1), caps.get(2))
            }
            EntityKind::Call => {
                let caps = CALL_IDENTIFIER.captures(raw).ok_or_else(malformed)?;
                (caps.get(2), caps.get(1))
            }
        };
        let year = year
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .ok_or_else(malformed)?;
        let sequence = sequence
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .ok_or_else(malformed)?;
        Ok(Self::new(kind, year, sequence))
    }

    /// Parse an identifier of either kind.
    pub fn parse_any(raw: &str) -> Result<Self, MalformedIdentifier> {
        let kind = if raw.starts_with("CASE-") {
            EntityKind::Case
        } else {
            EntityKind::Call
        };
        Self::parse(kind, raw)
    }
}

impl fmt::Display for AllocatedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntityKind::Case => write!(
                f,
                "CASE-{}-{:0width$}",
                self.year,
                self.sequence,
                width = SEQUENCE_WIDTH
            ),
            EntityKind::Call => write!(
                f,
                "{:0width$}/{}",
                self.sequence,
                self.year,
                width = SEQUENCE_WIDTH
            ),
        }
    }
}

impl Serialize for AllocatedIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
