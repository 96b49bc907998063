//! Identifier generators.

use std::collections::HashMap;

use uuid::Uuid;

use crate::record::IdentifierRecord;

/// Produces candidate identifiers. Candidates are checked against the
/// issued set by the registry, so a generator may repeat itself.
///
/// Always called under the registry's writer lock.
pub trait IdGenerator: Send + Sync {
    fn generate(&mut self, kind: &str) -> String;

    /// Called for every record loaded from the ledger and every new issuance.
    fn observe(&mut self, _record: &IdentifierRecord) {}
}

/// `Kind/<32 lowercase hex>` from a v4 UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomToken;

impl IdGenerator for RandomToken {
    fn generate(&mut self, kind: &str) -> String {
        format!("{kind}/{}", Uuid::new_v4().simple())
    }
}

/// `Kind/<n>` with one counter per kind, restored from the ledger.
#[derive(Debug, Default, Clone)]
pub struct KindCounter {
    last: HashMap<String, u64>,
}

impl KindCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for KindCounter {
    fn generate(&mut self, kind: &str) -> String {
        let next = self.last.entry(kind.to_string()).or_insert(0);
        *next += 1;
        format!("{kind}/{next}")
    }

    fn observe(&mut self, record: &IdentifierRecord) {
        let Some((kind, suffix)) = record.id.rsplit_once('/') else {
            return;
        };
        let Ok(n) = suffix.parse::<u64>() else {
            return;
        };
        let last = self.last.entry(kind.to_string()).or_insert(0);
        *last = (*last).max(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_tokens_are_kind_prefixed_hex() {
        let id = RandomToken.generate("Person");
        let (kind, token) = id.split_once('/').unwrap();
        assert_eq!(kind, "Person");
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_counter_continues_after_observed_ids() {
        let mut counter = KindCounter::new();
        counter.observe(&IdentifierRecord::new("Person/7", "Person"));
        counter.observe(&IdentifierRecord::new("Person/3", "Person"));
        counter.observe(&IdentifierRecord::new("Person/abc", "Person"));
        assert_eq!(counter.generate("Person"), "Person/8");
        assert_eq!(counter.generate("Organization"), "Organization/1");
        assert_eq!(counter.generate("Person"), "Person/9");
    }
}
