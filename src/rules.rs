//! User-authored rules, the first cascade layer. Pattern rules and
//! per-sender overrides live in the store; matches are authoritative
//! (confidence 1.0).

use anyhow::{bail, Result};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{Action, Classification, EmailType, SenderStats, Source, UserRule};
use crate::patterns::wildcard_match;
use crate::store::Store;

struct RuleCache {
    rules: Vec<UserRule>,
    dirty: bool,
}

/// Matches senders against user-defined rules and overrides.
pub struct RulesMatcher {
    store: Arc<dyn Store>,
    cache: Mutex<RuleCache>,
}

impl RulesMatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        RulesMatcher {
            store,
            cache: Mutex::new(RuleCache {
                rules: Vec::new(),
                dirty: true,
            }),
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, RuleCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Force the next match to re-read rules from the store.
    pub fn reload(&self) {
        self.lock_cache().dirty = true;
    }

    /// Check the sender against pattern rules, then the stored per-sender
    /// override. Rules with unparseable actions are skipped, not fatal.
    pub fn matches(&self, sender: &SenderStats) -> Result<Option<Classification>> {
        {
            let mut cache = self.lock_cache();
            if cache.dirty {
                cache.rules = self.store.get_rules()?;
                cache.dirty = false;
            }

            for rule in &cache.rules {
                let action = match Action::parse(&rule.action) {
                    Some(a) => a,
                    None => {
                        log::warn!(
                            "Skipping rule '{}' with invalid action '{}'",
                            rule.pattern,
                            rule.action
                        );
                        continue;
                    }
                };

                if wildcard_match(&sender.domain, &rule.pattern) {
                    return Ok(Some(Classification {
                        email_type: EmailType::Unknown,
                        action,
                        confidence: 1.0,
                        reasoning: format!("Matched user rule: {}", rule.pattern),
                        source: Source::UserRule,
                    }));
                }
            }
        }

        // Per-sender override beats pattern logic for that one domain
        if let Some(override_raw) = self.store.get_user_override(&sender.domain)? {
            match Action::parse(&override_raw) {
                Some(action) => {
                    return Ok(Some(Classification {
                        email_type: EmailType::Unknown,
                        action,
                        confidence: 1.0,
                        reasoning: "User override".to_string(),
                        source: Source::UserRule,
                    }));
                }
                None => {
                    log::warn!(
                        "Skipping override for {} with invalid action '{override_raw}'",
                        sender.domain
                    );
                }
            }
        }

        Ok(None)
    }

    /// Add a rule. Only keep/unsub/block are valid rule actions.
    pub fn add_rule(&self, pattern: &str, action: &str) -> Result<()> {
        match Action::parse(action) {
            Some(Action::Keep | Action::Unsub | Action::Block) => {}
            _ => bail!("Invalid rule action: {action}"),
        }
        self.store.add_rule(pattern, action)?;
        self.reload();
        Ok(())
    }

    pub fn remove_rule(&self, pattern: &str) -> Result<bool> {
        let removed = self.store.delete_rule(pattern)?;
        self.reload();
        Ok(removed)
    }

    pub fn get_rules(&self) -> Result<Vec<UserRule>> {
        self.store.get_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn matcher() -> (Arc<SqliteStore>, RulesMatcher) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let matcher = RulesMatcher::new(store.clone());
        (store, matcher)
    }

    #[test]
    fn test_rule_match_is_authoritative() {
        let (_store, matcher) = matcher();
        matcher.add_rule("*.employer.com", "keep").unwrap();

        let result = matcher
            .matches(&SenderStats::new("payroll.employer.com"))
            .unwrap()
            .unwrap();
        assert_eq!(result.action, Action::Keep);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.source, Source::UserRule);
    }

    #[test]
    fn test_no_rules_no_match() {
        let (_store, matcher) = matcher();
        assert!(matcher.matches(&SenderStats::new("example.com")).unwrap().is_none());
    }

    #[test]
    fn test_invalid_stored_action_skipped() {
        let (store, matcher) = matcher();
        // Written behind the validating API, as an older version might have
        store.add_rule("*.example.com", "nuke").unwrap();
        store.add_rule("*.example.com.au", "keep").unwrap();

        assert!(matcher.matches(&SenderStats::new("mail.example.com")).unwrap().is_none());
        assert!(matcher
            .matches(&SenderStats::new("mail.example.com.au"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_user_override_applies() {
        let (store, matcher) = matcher();
        store.set_user_override("annoying.example.com", "block").unwrap();

        let result = matcher
            .matches(&SenderStats::new("annoying.example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(result.action, Action::Block);
        assert_eq!(result.reasoning, "User override");
    }

    #[test]
    fn test_invalid_override_skipped() {
        let (store, matcher) = matcher();
        store.set_user_override("example.com", "smite").unwrap();
        assert!(matcher.matches(&SenderStats::new("example.com")).unwrap().is_none());
    }

    #[test]
    fn test_add_rule_validates_action() {
        let (_store, matcher) = matcher();
        assert!(matcher.add_rule("*.example.com", "keep").is_ok());
        assert!(matcher.add_rule("*.example.com", "review").is_err());
        assert!(matcher.add_rule("*.example.com", "delete").is_err());
    }

    #[test]
    fn test_remove_rule_reloads_cache() {
        let (_store, matcher) = matcher();
        matcher.add_rule("promo.*", "unsub").unwrap();
        assert!(matcher.matches(&SenderStats::new("promo.shop.com")).unwrap().is_some());

        assert!(matcher.remove_rule("promo.*").unwrap());
        assert!(matcher.matches(&SenderStats::new("promo.shop.com")).unwrap().is_none());
    }
}
