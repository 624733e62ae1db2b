use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of record that receives a sequential identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Call-centre case, `CASE-YYYY-NNNNNNNN`
    Case,
    /// Inbound/outbound call, `NNNNNNNN/YYYY`
    Call,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Case, EntityKind::Call];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Case => "case",
            EntityKind::Call => "call",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "case" | "cases" => Ok(EntityKind::Case),
            "call" | "calls" => Ok(EntityKind::Call),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// `(entity kind, year)`: the range inside which sequence numbers are
/// unique and increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceScope {
    pub kind: EntityKind,
    pub year: i32,
}

impl SequenceScope {
    pub fn new(kind: EntityKind, year: i32) -> Self {
        Self { kind, year }
    }

    /// SQL `LIKE` pattern selecting the scope's identifiers.
    pub fn like_pattern(&self) -> String {
        match self.kind {
            EntityKind::Case => format!("CASE-{}-%", self.year),
            EntityKind::Call => format!("%/{}", self.year),
        }
    }

    /// Same selection as [`like_pattern`](Self::like_pattern), for in-process stores.
    pub fn matches(&self, identifier: &str) -> bool {
        match self.kind {
            EntityKind::Case => identifier.starts_with(&format!("CASE-{}-", self.year)),
            EntityKind::Call => identifier.ends_with(&format!("/{}", self.year)),
        }
    }

    /// Key for `pg_advisory_xact_lock`. Stable across processes.
    pub fn lock_key(&self) -> i64 {
        let tag: i64 = match self.kind {
            EntityKind::Case => 1,
            EntityKind::Call => 2,
        };
        // 0x5152 ("SR") namespaces the key away from other advisory lock users.
        (0x5152_i64 << 40) | (tag << 32) | i64::from(self.year as u32)
    }
}

impl fmt::Display for SequenceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_from_str() {
        assert_eq!("case".parse::<EntityKind>(), Ok(EntityKind::Case));
        assert_eq!("CALLS".parse::<EntityKind>(), Ok(EntityKind::Call));
        assert!("ticket".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_scope_matches_own_year_only() {
        let cases = SequenceScope::new(EntityKind::Case, 2025);
        assert!(cases.matches("CASE-2025-00000007"));
        assert!(!cases.matches("CASE-2024-00000007"));
        assert!(!cases.matches("00000007/2025"));

        let calls = SequenceScope::new(EntityKind::Call, 2025);
        assert!(calls.matches("00000007/2025"));
        assert!(!calls.matches("00000007/2024"));
        assert!(!calls.matches("CASE-2025-00000007"));
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(
            SequenceScope::new(EntityKind::Case, 2025).like_pattern(),
            "CASE-2025-%"
        );
        assert_eq!(
            SequenceScope::new(EntityKind::Call, 2025).like_pattern(),
            "%/2025"
        );
    }

    #[test]
    fn test_lock_keys_differ_per_scope() {
        let a = SequenceScope::new(EntityKind::Case, 2025).lock_key();
        let b = SequenceScope::new(EntityKind::Call, 2025).lock_key();
        let c = SequenceScope::new(EntityKind::Case, 2026).lock_key();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
