//! Filter policy evaluation: decides who gets recorded

use crate::config::{CheckBy, FilterPolicy, RecordMode};
use replayvault_core::Participant;

impl FilterPolicy {
    /// The participant attribute this policy compares
    fn key<'a>(&self, participant: &'a Participant) -> &'a str {
        match self.check_by {
            CheckBy::Name => &participant.name,
            CheckBy::Id => &participant.id,
        }
    }

    /// Blacklist records everyone not listed; whitelist records only listed participants
    pub fn should_record(&self, participant: &Participant) -> bool {
        let listed = self.list.contains(self.key(participant));
        match self.record_mode {
            RecordMode::Blacklist => !listed,
            RecordMode::Whitelist => listed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn policy(record_mode: RecordMode, check_by: CheckBy, list: &[&str]) -> FilterPolicy {
        FilterPolicy {
            record_mode,
            check_by,
            list: list.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
        }
    }

    fn named(name: &str) -> Participant {
        Participant::new(name, format!("{}-id", name))
    }

    #[test]
    fn test_blacklist_by_name() {
        let policy = policy(RecordMode::Blacklist, CheckBy::Name, &["alice"]);
        assert!(!policy.should_record(&named("alice")));
        assert!(policy.should_record(&named("bob")));
    }

    #[test]
    fn test_whitelist_by_name() {
        let policy = policy(RecordMode::Whitelist, CheckBy::Name, &["alice"]);
        assert!(policy.should_record(&named("alice")));
        assert!(!policy.should_record(&named("bob")));
    }

    #[test]
    fn test_check_by_id_ignores_name() {
        let policy = policy(RecordMode::Whitelist, CheckBy::Id, &["bob-id"]);
        assert!(policy.should_record(&Participant::new("renamed", "bob-id")));
        assert!(!policy.should_record(&Participant::new("bob-id", "other")));
    }

    #[test]
    fn test_empty_lists() {
        let blacklist = policy(RecordMode::Blacklist, CheckBy::Name, &[]);
        let whitelist = policy(RecordMode::Whitelist, CheckBy::Name, &[]);
        assert!(blacklist.should_record(&named("anyone")));
        assert!(!whitelist.should_record(&named("anyone")));
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let policy = policy(RecordMode::Blacklist, CheckBy::Name, &["alice"]);
        assert!(policy.should_record(&named("Alice")));
    }
}
