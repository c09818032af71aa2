//! Heuristic scoring, the fourth cascade layer. Scores a sender 0-100
//! (higher = more likely unwanted) from behavioral signals, adjusted by
//! learned preference weights, and abstains inside the dead zone between
//! the keep and unsub thresholds.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use crate::config::{ScoringConfig, ThresholdConfig};
use crate::learner::PreferenceLearner;
use crate::models::{Action, Classification, EmailType, SenderStats, Source};

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|e| panic!("invalid built-in pattern '{p}': {e}"))
        })
        .collect()
}

lazy_static! {
    static ref SPAM_SUBJECT_PATTERNS: Vec<Regex> = compile_all(&[
        r"\b(sale|deals?|discount|off|free|limited|urgent|act now)\b",
        r"\d+%\s*(off|discount)",
        r"(exclusive|special)\s+offer",
        r"(last chance|final|ends? (today|soon|tonight))",
        r"(winner|won|prize|congratulations)",
        r"(click here|open now|don't miss)",
        r"^\s*re:\s*re:", // fake reply chains
        r"[A-Z]{5,}",     // excessive caps
        r"[!?]{2,}",      // excessive punctuation
    ]);
    static ref SAFE_SUBJECT_PATTERNS: Vec<Regex> = compile_all(&[
        r"(order|receipt|invoice|confirmation|shipping|delivery|tracking)",
        r"(password|verify|verification|security|2fa|two-factor|login)",
        r"(account|statement|billing|payment)",
        r"(welcome to|thanks for signing up)",
        r"#\d{5,}", // order numbers
    ]);
    static ref COLD_OUTREACH_PATTERNS: Vec<Regex> = compile_all(&[
        r"(quick question|following up|reaching out|touch base)",
        r"(i noticed|i saw|i found)",
        r"(your company|your team|your business)",
        r"(demo|call|meeting|chat|connect)",
    ]);
    static ref SPAM_SENDER_PATTERNS: Vec<Regex> = compile_all(&[
        r"^(marketing|promo|sales|deals|offers|newsletter|news|info|hello|team|noreply|no-reply|donotreply)@",
        r"^.*-(noreply|marketing|promo)@",
    ]);
    static ref SAFE_SENDER_PATTERNS: Vec<Regex> = compile_all(&[
        r"^(security|alerts?|notifications?|receipts?|orders?|shipping|delivery|support|help|service)@",
        r"^(verify|verification|confirm|confirmation)@",
    ]);
}

fn any_match(patterns: &[Regex], haystack: &str) -> bool {
    patterns.iter().any(|p| p.is_match(haystack))
}

/// Scores senders with rule-based heuristics plus learned adjustments.
pub struct HeuristicScorer {
    learner: Arc<PreferenceLearner>,
    scoring: ScoringConfig,
    thresholds: ThresholdConfig,
}

impl HeuristicScorer {
    pub fn new(
        learner: Arc<PreferenceLearner>,
        scoring: ScoringConfig,
        thresholds: ThresholdConfig,
    ) -> Self {
        HeuristicScorer {
            learner,
            scoring,
            thresholds,
        }
    }

    /// Spam score for a sender, clamped to 0-100. Higher = more likely
    /// unwanted marketing. Signals are additive and order-independent.
    pub fn score(&self, sender: &SenderStats) -> i32 {
        let cfg = &self.scoring;
        let adjustments = self.learner.get_preference_adjustments(sender);

        let mut score = cfg.base_score;

        // Learned keyword boost, capped so no keyword set dominates
        score += adjustments
            .keyword_boost
            .clamp(-cfg.keyword_boost_max, cfg.keyword_boost_max);

        // Open rate band, scaled by the learned open-rate weight
        let open_rate = sender.open_rate();
        let open_rate_adjustment = if open_rate == 0.0
            && sender.total_emails >= cfg.min_emails_for_never_opened
        {
            cfg.open_rate_never_opened
        } else if open_rate < 10.0 {
            cfg.open_rate_very_low
        } else if open_rate < 25.0 {
            cfg.open_rate_low
        } else if open_rate < 50.0 {
            cfg.open_rate_moderate
        } else if open_rate <= 75.0 {
            cfg.open_rate_high
        } else {
            cfg.open_rate_very_high
        };
        score += (open_rate_adjustment as f64 * adjustments.open_rate_weight) as i32;

        // Volume band, scaled by the learned volume weight
        let volume_adjustment = if sender.total_emails > 50 {
            cfg.volume_high
        } else if sender.total_emails > 20 {
            cfg.volume_medium
        } else {
            0
        };
        score += (volume_adjustment as f64 * adjustments.volume_weight) as i32;

        // Subject families: at most one delta per family per subject
        for subject in &sender.sample_subjects {
            let subject_lower = subject.to_lowercase();

            if any_match(&SPAM_SUBJECT_PATTERNS, &subject_lower) {
                score += cfg.subject_spam_pattern;
            }
            if any_match(&SAFE_SUBJECT_PATTERNS, &subject_lower) {
                score += cfg.subject_safe_pattern;
            }
            if any_match(&COLD_OUTREACH_PATTERNS, &subject_lower) {
                score += cfg.subject_cold_outreach;
            }
        }

        // Sender address prefixes, at most one match per pool
        let domain = sender.domain.to_lowercase();
        if any_match(&SPAM_SENDER_PATTERNS, &domain) {
            score += cfg.domain_spam_pattern;
        }
        if any_match(&SAFE_SENDER_PATTERNS, &domain) {
            score += cfg.domain_safe_pattern;
        }

        // No unsubscribe mechanism reads as a weak keep signal
        if !sender.has_unsubscribe {
            score += cfg.no_unsubscribe_link;
        }

        score.clamp(0, 100)
    }

    /// Classify when the score clears a threshold; None inside the dead
    /// zone so the cascade falls through to review.
    pub fn classify(&self, sender: &SenderStats) -> Option<Classification> {
        let score = self.score(sender);
        let unsub_threshold = self.thresholds.unsub_score_threshold;
        let keep_threshold = self.thresholds.keep_score_threshold;

        if score >= unsub_threshold {
            let is_cold = self.is_cold_outreach(sender);
            let action = if is_cold { Action::Block } else { Action::Unsub };
            log::debug!(
                "Heuristics classified {} as {} (score: {score} >= {unsub_threshold})",
                sender.domain,
                action.as_str()
            );
            return Some(Classification {
                email_type: if is_cold {
                    EmailType::ColdOutreach
                } else {
                    EmailType::Marketing
                },
                action,
                confidence: (score as f64 / 100.0).min(0.90),
                reasoning: format!(
                    "Heuristic score: {score}/100 (threshold: {unsub_threshold}){}",
                    if is_cold { " (cold outreach detected)" } else { "" }
                ),
                source: Source::Heuristics,
            });
        }

        if score <= keep_threshold {
            log::debug!(
                "Heuristics classified {} as keep (score: {score} <= {keep_threshold})",
                sender.domain
            );
            return Some(Classification {
                email_type: EmailType::Transactional,
                action: Action::Keep,
                confidence: ((100 - score) as f64 / 100.0).min(0.90),
                reasoning: format!("Heuristic score: {score}/100 (threshold: {keep_threshold})"),
                source: Source::Heuristics,
            });
        }

        log::debug!(
            "Heuristics uncertain for {} (score: {score}, range: {keep_threshold}-{unsub_threshold})",
            sender.domain
        );
        None
    }

    fn is_cold_outreach(&self, sender: &SenderStats) -> bool {
        sender
            .sample_subjects
            .iter()
            .any(|s| any_match(&COLD_OUTREACH_PATTERNS, &s.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn scorer() -> HeuristicScorer {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let learner = Arc::new(PreferenceLearner::new(store));
        HeuristicScorer::new(learner, ScoringConfig::default(), ThresholdConfig::default())
    }

    fn sender(domain: &str, total: u32, seen: u32, subjects: &[&str]) -> SenderStats {
        let mut stats = SenderStats::new(domain);
        stats.total_emails = total;
        stats.seen_emails = seen;
        stats.sample_subjects = subjects.iter().map(|s| s.to_string()).collect();
        stats
    }

    #[test]
    fn test_score_stays_in_bounds() {
        let scorer = scorer();
        let spammy = sender(
            "promo.megadeals.com",
            200,
            0,
            &[
                "50% OFF SALE!!!",
                "LAST CHANCE - ends tonight",
                "You're a WINNER! Claim your prize",
                "EXCLUSIVE offer, don't miss",
                "FINAL discount, act now",
            ],
        );
        let score = scorer.score(&spammy);
        assert!((0..=100).contains(&score));

        let clean = sender("example.com", 0, 0, &[]);
        assert!((0..=100).contains(&scorer.score(&clean)));
    }

    #[test]
    fn test_dead_zone_returns_none() {
        let scorer = scorer();
        // A middling sender: some engagement, neutral subjects
        let middling = sender("updates.example.com", 10, 3, &[]);
        let score = scorer.score(&middling);
        let result = scorer.classify(&middling);
        if (26..75).contains(&score) {
            assert!(result.is_none());
        } else {
            assert!(result.is_some());
        }
    }

    #[test]
    fn test_classify_none_iff_between_thresholds() {
        let scorer = scorer();
        for (domain, total, seen, subjects) in [
            ("promo.store.com", 20, 0, vec!["50% OFF SALE!", "Limited Time Offer"]),
            ("newsletter.goodsite.com", 10, 8, vec!["Weekly Update"]),
            ("updates.example.com", 10, 3, vec![]),
            ("noisy.sender.net", 60, 1, vec!["MEGA SALE!!"]),
        ] {
            let s = sender(domain, total, seen, &subjects);
            let score = scorer.score(&s);
            let uncertain = score > 25 && score < 75;
            assert_eq!(scorer.classify(&s).is_none(), uncertain, "domain: {domain}");
        }
    }

    #[test]
    fn test_promo_sender_scores_high() {
        let scorer = scorer();
        let s = sender(
            "promo.store.com",
            20,
            0,
            &["50% OFF SALE!", "Limited Time Offer"],
        );
        let score = scorer.score(&s);
        assert!(score >= 70, "score was {score}");

        let result = scorer.classify(&s).unwrap();
        assert!(matches!(result.action, Action::Unsub | Action::Block));
        assert_eq!(result.source, Source::Heuristics);
    }

    #[test]
    fn test_engaged_newsletter_scores_low() {
        let scorer = scorer();
        let s = sender("newsletter.goodsite.com", 10, 8, &["Weekly Update"]);
        let score = scorer.score(&s);
        assert!(score <= 40, "score was {score}");

        let result = scorer.classify(&s).unwrap();
        assert_eq!(result.action, Action::Keep);
    }

    #[test]
    fn test_cold_outreach_escalates_to_block() {
        let scorer = scorer();
        let s = sender(
            "growth.salesbot.io",
            10,
            0,
            &[
                "Quick question about your company",
                "Following up on my last email",
                "ACT NOW - free demo",
            ],
        );
        let result = scorer.classify(&s).unwrap();
        assert_eq!(result.action, Action::Block);
        assert_eq!(result.email_type, EmailType::ColdOutreach);
    }

    #[test]
    fn test_confidence_capped_at_ninety_percent() {
        let scorer = scorer();
        let s = sender(
            "promo.megadeals.com",
            200,
            0,
            &["50% OFF SALE!!!", "WINNER! Claim your prize now"],
        );
        if let Some(c) = scorer.classify(&s) {
            assert!(c.confidence <= 0.90);
        }
    }

    #[test]
    fn test_missing_unsubscribe_lowers_score() {
        let scorer = scorer();
        let mut with_unsub = sender("example.com", 10, 5, &[]);
        with_unsub.has_unsubscribe = true;
        let without_unsub = sender("example.com", 10, 5, &[]);

        assert!(scorer.score(&without_unsub) < scorer.score(&with_unsub));
    }
}
