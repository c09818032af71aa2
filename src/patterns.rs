//! Preset pattern matching, the second cascade layer. Ships with a default
//! pattern set; a JSON file can replace it wholesale.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{Action, Classification, EmailType, SenderStats, Source};

/// Check a domain against a single pattern. Grammar, in precedence order:
/// exact match, `*.X` suffix, `X.*` prefix, then general shell-style glob.
pub fn wildcard_match(value: &str, pattern: &str) -> bool {
    let value = value.to_lowercase();
    let pattern = pattern.to_lowercase();

    if value == pattern {
        return true;
    }

    // "marketing.*" matches subdomain-style prefixes like marketing.acme.com
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return value.starts_with(&format!("{prefix}."));
    }

    // "*.acme.com" matches acme.com itself and any subdomain of it
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return value == suffix || value.ends_with(&format!(".{suffix}"));
    }

    // "*bank*" and friends: translate to an anchored regex
    if pattern.contains('*') {
        return glob_match(&value, &pattern);
    }

    false
}

fn glob_match(value: &str, pattern: &str) -> bool {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            _ => translated.push_str(&regex::escape(&ch.to_string())),
        }
    }
    translated.push('$');

    match Regex::new(&translated) {
        Ok(re) => re.is_match(value),
        Err(e) => {
            log::warn!("Unusable glob pattern '{pattern}': {e}");
            false
        }
    }
}

/// The three preset pools, checked block -> keep -> unsub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSet {
    #[serde(default)]
    pub block_patterns: Vec<String>,
    #[serde(default)]
    pub keep_patterns: Vec<String>,
    #[serde(default)]
    pub unsub_patterns: Vec<String>,
}

impl Default for PatternSet {
    fn default() -> Self {
        PatternSet {
            block_patterns: to_strings(&["*.spam.com", "*.junk.com"]),
            keep_patterns: to_strings(&[
                // Government
                "*.gov",
                "*.gov.uk",
                "*.gov.au",
                // Banking and finance
                "*bank*",
                "*credit*",
                "*finance*",
                "*.visa.com",
                "*.mastercard.com",
                "*.paypal.com",
                "*.stripe.com",
                // Health
                "*health*",
                "*medical*",
                "*hospital*",
                "*clinic*",
                "*pharmacy*",
                // Major transactional services
                "*.amazon.com",
                "*.apple.com",
                "*.google.com",
                "*.microsoft.com",
                "*.github.com",
                // Security and account notices
                "security.*",
                "alert.*",
                "alerts.*",
                "verify.*",
                "verification.*",
                "confirm.*",
                "confirmation.*",
                "receipt.*",
                "receipts.*",
                "order.*",
                "orders.*",
                "shipping.*",
                "delivery.*",
            ]),
            unsub_patterns: to_strings(&[
                // Marketing subdomain prefixes
                "marketing.*",
                "promo.*",
                "promotions.*",
                "newsletter.*",
                "news.*",
                "deals.*",
                "offers.*",
                "sales.*",
                "noreply.*",
                "no-reply.*",
                "donotreply.*",
                "updates.*",
                "info.*",
                "hello.*",
                "team.*",
                // Bulk mail platforms
                "*.mailchimp.com",
                "*.sendgrid.net",
                "*.klaviyo.com",
                "*.sailthru.com",
                "*.exacttarget.com",
                "*.constantcontact.com",
                "*.campaign-archive.com",
            ]),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Matches senders against the preset pools with fixed per-pool confidence.
pub struct PatternMatcher {
    patterns: PatternSet,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(PatternSet::default())
    }
}

impl PatternMatcher {
    pub fn new(patterns: PatternSet) -> Self {
        PatternMatcher { patterns }
    }

    /// Load a pattern set from a JSON file, replacing the defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read patterns: {}", path.as_ref().display()))?;
        let patterns: PatternSet = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse patterns: {}", path.as_ref().display()))?;
        Ok(Self::new(patterns))
    }

    /// Check the pools in fixed order. Returns None when nothing matches so
    /// the cascade can continue.
    pub fn matches(&self, sender: &SenderStats) -> Option<Classification> {
        let domain = sender.domain.to_lowercase();

        for pattern in &self.patterns.block_patterns {
            if wildcard_match(&domain, pattern) {
                return Some(Classification {
                    email_type: EmailType::Marketing,
                    action: Action::Block,
                    confidence: 0.95,
                    reasoning: format!("Matched block pattern: {pattern}"),
                    source: Source::Preset,
                });
            }
        }

        for pattern in &self.patterns.keep_patterns {
            if wildcard_match(&domain, pattern) {
                return Some(Classification {
                    email_type: EmailType::Transactional,
                    action: Action::Keep,
                    confidence: 0.90,
                    reasoning: format!("Matched keep pattern: {pattern}"),
                    source: Source::Preset,
                });
            }
        }

        for pattern in &self.patterns.unsub_patterns {
            if wildcard_match(&domain, pattern) {
                return Some(Classification {
                    email_type: EmailType::Marketing,
                    action: Action::Unsub,
                    confidence: 0.85,
                    reasoning: format!("Matched unsub pattern: {pattern}"),
                    source: Source::Preset,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(wildcard_match("example.com", "example.com"));
        assert!(wildcard_match("Example.COM", "example.com"));
        assert!(!wildcard_match("example.com", "example.org"));
    }

    #[test]
    fn test_suffix_match() {
        assert!(wildcard_match("mail.example.com", "*.example.com"));
        assert!(wildcard_match("example.com", "*.example.com"));
        assert!(!wildcard_match("notexample.com", "*.example.com"));
    }

    #[test]
    fn test_prefix_match() {
        assert!(wildcard_match("marketing.acme.com", "marketing.*"));
        assert!(!wildcard_match("acme.com", "marketing.*"));
        assert!(!wildcard_match("marketingx.acme.com", "marketing.*"));
    }

    #[test]
    fn test_contains_glob() {
        assert!(wildcard_match("mybank.com", "*bank*"));
        assert!(wildcard_match("alerts.bank.com", "*bank*"));
        assert!(!wildcard_match("example.com", "*bank*"));
    }

    #[test]
    fn test_glob_escapes_regex_metachars() {
        // Dots in patterns are literal, not regex wildcards
        assert!(!wildcard_match("exampleXcom", "example.c*"));
        assert!(wildcard_match("example.com", "example.c*"));
    }

    #[test]
    fn test_gov_domain_kept_with_preset_confidence() {
        let matcher = PatternMatcher::default();
        let sender = SenderStats::new("irs.gov");

        let result = matcher.matches(&sender).unwrap();
        assert_eq!(result.action, Action::Keep);
        assert!((result.confidence - 0.90).abs() < f64::EPSILON);
        assert_eq!(result.source, Source::Preset);
    }

    #[test]
    fn test_block_pool_checked_before_keep() {
        let matcher = PatternMatcher::new(PatternSet {
            block_patterns: vec!["*.example.com".to_string()],
            keep_patterns: vec!["*.example.com".to_string()],
            unsub_patterns: vec![],
        });
        let sender = SenderStats::new("mail.example.com");

        let result = matcher.matches(&sender).unwrap();
        assert_eq!(result.action, Action::Block);
        assert!((result.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_marketing_prefix_unsubbed() {
        let matcher = PatternMatcher::default();
        let sender = SenderStats::new("promo.store.com");

        let result = matcher.matches(&sender).unwrap();
        assert_eq!(result.action, Action::Unsub);
        assert!((result.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_match_falls_through() {
        let matcher = PatternMatcher::default();
        let sender = SenderStats::new("random-startup.xyz");
        assert!(matcher.matches(&sender).is_none());
    }
}
