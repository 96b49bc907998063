//! One ledger line per issued identifier: `id<TAB>kind<TAB>rfc3339`.

use chrono::{DateTime, Utc};

/// A persisted identifier issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierRecord {
    pub id: String,
    /// Owning kind. Absent for lines written by legacy ledgers.
    pub kind: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl IdentifierRecord {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: Some(kind.into()),
            issued_at: Some(Utc::now()),
        }
    }

    pub fn to_line(&self) -> String {
        match (&self.kind, &self.issued_at) {
            (Some(kind), Some(at)) => format!("{}\t{}\t{}", self.id, kind, at.to_rfc3339()),
            (Some(kind), None) => format!("{}\t{}", self.id, kind),
            (None, _) => self.id.clone(),
        }
    }

    /// Parse one line. Returns `None` for blank lines. An unreadable
    /// timestamp is dropped rather than failing the whole ledger.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.split('\t');
        let id = fields.next()?.trim();
        if id.is_empty() {
            return None;
        }
        let kind = fields
            .next()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        let issued_at = fields.next().and_then(|ts| match DateTime::parse_from_rfc3339(ts.trim()) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(id, timestamp = ts, error = %e, "Ignoring unreadable ledger timestamp");
                None
            }
        });
        Some(Self {
            id: id.to_string(),
            kind,
            issued_at,
        })
    }
}

/// Identifiers are written verbatim on a ledger line.
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|c| c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_line_round_trips() {
        let record = IdentifierRecord::new("Person/abc", "Person");
        let parsed = IdentifierRecord::parse_line(&record.to_line()).unwrap();
        assert_eq!(parsed.id, "Person/abc");
        assert_eq!(parsed.kind.as_deref(), Some("Person"));
        assert!(parsed.issued_at.is_some());
    }

    #[test]
    fn test_legacy_bare_lines_are_accepted() {
        let parsed = IdentifierRecord::parse_line("Person/17\n").unwrap();
        assert_eq!(parsed.id, "Person/17");
        assert!(parsed.kind.is_none());
        assert!(parsed.issued_at.is_none());
        assert!(IdentifierRecord::parse_line("   \n").is_none());
    }

    #[test]
    fn test_bad_timestamp_keeps_the_identifier() {
        let parsed = IdentifierRecord::parse_line("Person/1\tPerson\tyesterday").unwrap();
        assert_eq!(parsed.kind.as_deref(), Some("Person"));
        assert!(parsed.issued_at.is_none());
    }

    #[test]
    fn test_identifiers_must_fit_on_a_line() {
        assert!(is_valid_identifier("Person/0a1b"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("Person 1"));
        assert!(!is_valid_identifier("Person/1\tx"));
    }
}
