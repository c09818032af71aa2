use serde::{Deserialize, Serialize};

/// Heuristic scoring weights. All scores start at `base_score` (50 =
/// neutral); positive adjustments push toward unsub, negative toward keep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_base_score")]
    pub base_score: i32,

    // Open rate adjustments
    #[serde(default = "default_open_rate_never_opened")]
    pub open_rate_never_opened: i32,
    #[serde(default = "default_open_rate_very_low")]
    pub open_rate_very_low: i32,
    #[serde(default = "default_open_rate_low")]
    pub open_rate_low: i32,
    #[serde(default = "default_open_rate_moderate")]
    pub open_rate_moderate: i32,
    #[serde(default = "default_open_rate_high")]
    pub open_rate_high: i32,
    #[serde(default = "default_open_rate_very_high")]
    pub open_rate_very_high: i32,

    // Volume adjustments
    #[serde(default = "default_volume_high")]
    pub volume_high: i32,
    #[serde(default = "default_volume_medium")]
    pub volume_medium: i32,

    // Subject pattern adjustments, applied at most once per family per subject
    #[serde(default = "default_subject_spam_pattern")]
    pub subject_spam_pattern: i32,
    #[serde(default = "default_subject_safe_pattern")]
    pub subject_safe_pattern: i32,
    #[serde(default = "default_subject_cold_outreach")]
    pub subject_cold_outreach: i32,

    // Domain pattern adjustments
    #[serde(default = "default_domain_spam_pattern")]
    pub domain_spam_pattern: i32,
    #[serde(default = "default_domain_safe_pattern")]
    pub domain_safe_pattern: i32,

    /// Missing unsubscribe mechanism reads as a weak keep signal.
    #[serde(default = "default_no_unsubscribe_link")]
    pub no_unsubscribe_link: i32,

    /// Cap on the absolute learned keyword boost.
    #[serde(default = "default_keyword_boost_max")]
    pub keyword_boost_max: i32,

    /// Minimum emails before a 0% open rate counts as never-opened.
    #[serde(default = "default_min_emails_for_never_opened")]
    pub min_emails_for_never_opened: u32,
}

fn default_base_score() -> i32 {
    50
}
fn default_open_rate_never_opened() -> i32 {
    25
}
fn default_open_rate_very_low() -> i32 {
    15
}
fn default_open_rate_low() -> i32 {
    5
}
fn default_open_rate_moderate() -> i32 {
    -10
}
fn default_open_rate_high() -> i32 {
    -20
}
fn default_open_rate_very_high() -> i32 {
    -30
}
fn default_volume_high() -> i32 {
    10
}
fn default_volume_medium() -> i32 {
    5
}
fn default_subject_spam_pattern() -> i32 {
    5
}
fn default_subject_safe_pattern() -> i32 {
    -10
}
fn default_subject_cold_outreach() -> i32 {
    15
}
fn default_domain_spam_pattern() -> i32 {
    10
}
fn default_domain_safe_pattern() -> i32 {
    -15
}
fn default_no_unsubscribe_link() -> i32 {
    -5
}
fn default_keyword_boost_max() -> i32 {
    30
}
fn default_min_emails_for_never_opened() -> u32 {
    5
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            base_score: default_base_score(),
            open_rate_never_opened: default_open_rate_never_opened(),
            open_rate_very_low: default_open_rate_very_low(),
            open_rate_low: default_open_rate_low(),
            open_rate_moderate: default_open_rate_moderate(),
            open_rate_high: default_open_rate_high(),
            open_rate_very_high: default_open_rate_very_high(),
            volume_high: default_volume_high(),
            volume_medium: default_volume_medium(),
            subject_spam_pattern: default_subject_spam_pattern(),
            subject_safe_pattern: default_subject_safe_pattern(),
            subject_cold_outreach: default_subject_cold_outreach(),
            domain_spam_pattern: default_domain_spam_pattern(),
            domain_safe_pattern: default_domain_safe_pattern(),
            no_unsubscribe_link: default_no_unsubscribe_link(),
            keyword_boost_max: default_keyword_boost_max(),
            min_emails_for_never_opened: default_min_emails_for_never_opened(),
        }
    }
}

/// Thresholds gating automatic action and heuristic decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Minimum confidence before auto-unsubscribing or blocking.
    #[serde(default = "default_unsub_confidence")]
    pub unsub_confidence: f64,
    /// Minimum confidence before auto-keeping.
    #[serde(default = "default_keep_confidence")]
    pub keep_confidence: f64,
    /// Heuristic score at or above which a sender is unsub/block material.
    #[serde(default = "default_unsub_score_threshold")]
    pub unsub_score_threshold: i32,
    /// Heuristic score at or below which a sender is keep material.
    #[serde(default = "default_keep_score_threshold")]
    pub keep_score_threshold: i32,
}

fn default_unsub_confidence() -> f64 {
    0.80
}
fn default_keep_confidence() -> f64 {
    0.80
}
fn default_unsub_score_threshold() -> i32 {
    75
}
fn default_keep_score_threshold() -> i32 {
    25
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            unsub_confidence: default_unsub_confidence(),
            keep_confidence: default_keep_confidence(),
            unsub_score_threshold: default_unsub_score_threshold(),
            keep_score_threshold: default_keep_score_threshold(),
        }
    }
}

/// How the caller wants decisions applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Act automatically once confidence thresholds are met.
    #[default]
    HandsOff,
    /// Act automatically but surface every decision.
    Notify,
    /// Never act without explicit confirmation.
    Confirm,
}

/// Configuration handed to the classification engine at construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub operation_mode: OperationMode,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}
