//! Online preference learning. Every finalized user decision nudges three
//! preference families: per-keyword keep rates, an open-rate weight, and a
//! volume weight. The heuristic scorer reads them back as adjustments.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{Action, PreferenceSource, SenderStats, UserAction, UserPreference};
use crate::store::Store;

const DEFAULT_OPEN_RATE_WEIGHT: f64 = 1.0;
const DEFAULT_VOLUME_WEIGHT: f64 = 1.0;

/// Half-life of the recency decay: an action this many days old carries
/// weight 1/e relative to one made now.
const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

/// Minimum observations before a keyword preference influences scoring.
const MIN_SAMPLES_FOR_CONFIDENCE: u32 = 3;

/// Keep rate above which a keyword counts as a keep signal (and below
/// `1 - threshold`, an unsub signal).
const KEYWORD_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Weight features are clamped to this range.
const WEIGHT_MIN: f64 = 0.2;
const WEIGHT_MAX: f64 = 1.5;

const TLDS: &[&str] = &[
    "com", "org", "net", "io", "co", "ai", "app", "dev", "edu", "gov", "mil", "us", "uk", "ca",
    "au", "de", "fr",
];
const SKIP_TOKENS: &[&str] = &["www", "mail", "email", "smtp", "mx"];

/// Adjustments the scorer applies on top of its configured deltas.
#[derive(Debug, Clone, Copy)]
pub struct PreferenceAdjustments {
    pub open_rate_weight: f64,
    pub volume_weight: f64,
    pub keyword_boost: i32,
}

impl Default for PreferenceAdjustments {
    fn default() -> Self {
        PreferenceAdjustments {
            open_rate_weight: DEFAULT_OPEN_RATE_WEIGHT,
            volume_weight: DEFAULT_VOLUME_WEIGHT,
            keyword_boost: 0,
        }
    }
}

/// In-process view of the stored preferences. Writes mark it dirty; the
/// next read reloads from the store, so reads always see the last write
/// made through this learner.
struct PreferenceCache {
    entries: HashMap<String, UserPreference>,
    dirty: bool,
}

impl PreferenceCache {
    fn new() -> Self {
        PreferenceCache {
            entries: HashMap::new(),
            dirty: true,
        }
    }

    fn invalidate(&mut self) {
        self.dirty = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalImportance {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordPattern {
    pub keyword: String,
    /// Whether the user tends to keep or unsub senders with this keyword.
    pub tendency: Action,
    /// "strongly" when the keep rate sits far from neutral.
    pub strongly: bool,
    pub sample_count: u32,
}

/// Human-facing report of what the learner has picked up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSummary {
    pub total_actions: u32,
    pub total_corrections: u32,
    pub open_rate_importance: SignalImportance,
    pub volume_sensitivity: SignalImportance,
    pub keyword_patterns: Vec<KeywordPattern>,
}

/// Learns scoring adjustments from the user action log. One instance is
/// shared (via `Arc`) between the scorer and the engine.
pub struct PreferenceLearner {
    store: Arc<dyn Store>,
    cache: Mutex<PreferenceCache>,
}

impl PreferenceLearner {
    pub fn new(store: Arc<dyn Store>) -> Self {
        PreferenceLearner {
            store,
            cache: Mutex::new(PreferenceCache::new()),
        }
    }

    /// Drop the cached view. Used for test isolation and after external
    /// writes to the preference store.
    pub fn reset(&self) {
        self.lock_cache().invalidate();
    }

    fn lock_cache(&self) -> MutexGuard<'_, PreferenceCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Main learning entry point, called once per finalized user decision.
    pub fn update_from_action(&self, action: &UserAction) -> Result<()> {
        self.update_keyword_preferences(action)?;
        self.update_weight_preference(
            "open_rate_weight",
            DEFAULT_OPEN_RATE_WEIGHT,
            Self::goes_against_open_rate(action),
        )?;
        self.update_weight_preference(
            "volume_weight",
            DEFAULT_VOLUME_WEIGHT,
            Self::goes_against_volume(action),
        )?;

        // Invalidate only after all rows are written
        self.lock_cache().invalidate();
        Ok(())
    }

    fn update_keyword_preferences(&self, action: &UserAction) -> Result<()> {
        let observation = if action.action == Action::Keep { 1.0 } else { 0.0 };

        for keyword in extract_keywords(&action.domain) {
            let feature = format!("keyword:{keyword}");

            let updated = match self.store.get_user_preference(&feature)? {
                Some(existing) => {
                    // Recency-weighted moving average: the weight scales the
                    // value blend only; sample_count still steps by one.
                    let weight = recency_weight(action.timestamp);
                    let total_weight = existing.sample_count as f64 + weight;
                    let value = (existing.value * existing.sample_count as f64
                        + observation * weight)
                        / total_weight;
                    UserPreference {
                        feature,
                        value,
                        confidence: confidence_for_samples(existing.sample_count + 1),
                        sample_count: existing.sample_count + 1,
                        last_updated: Utc::now(),
                        source: PreferenceSource::Learned,
                    }
                }
                None => UserPreference {
                    feature,
                    value: observation,
                    confidence: confidence_for_samples(1),
                    sample_count: 1,
                    last_updated: Utc::now(),
                    source: PreferenceSource::Learned,
                },
            };
            log::debug!(
                "Learned {} = {:.3} ({} samples)",
                updated.feature,
                updated.value,
                updated.sample_count
            );
            self.store.set_user_preference(&updated)?;
        }
        Ok(())
    }

    /// Shared update rule for the open-rate and volume weight features.
    /// `goes_against` is None when the action lacks the relevant signal,
    /// in which case the update is skipped entirely.
    fn update_weight_preference(
        &self,
        feature: &str,
        default_value: f64,
        goes_against: Option<bool>,
    ) -> Result<()> {
        let goes_against = match goes_against {
            Some(g) => g,
            None => return Ok(()),
        };

        let updated = match self.store.get_user_preference(feature)? {
            Some(existing) => {
                let adjustment = if goes_against { -0.05 } else { 0.02 };
                UserPreference {
                    feature: feature.to_string(),
                    value: (existing.value + adjustment).clamp(WEIGHT_MIN, WEIGHT_MAX),
                    confidence: confidence_for_samples(existing.sample_count + 1),
                    sample_count: existing.sample_count + 1,
                    last_updated: Utc::now(),
                    source: PreferenceSource::Learned,
                }
            }
            None => {
                let value = if goes_against {
                    default_value - 0.05
                } else {
                    default_value
                };
                UserPreference {
                    feature: feature.to_string(),
                    value,
                    confidence: confidence_for_samples(1),
                    sample_count: 1,
                    last_updated: Utc::now(),
                    source: PreferenceSource::Learned,
                }
            }
        };
        self.store.set_user_preference(&updated)?;
        Ok(())
    }

    /// Keeping a rarely-opened sender, or unsubbing a well-read one, means
    /// the user does not follow the open-rate heuristic.
    fn goes_against_open_rate(action: &UserAction) -> Option<bool> {
        let open_rate = action.open_rate?;
        Some(
            (open_rate < 20.0 && action.action == Action::Keep)
                || (open_rate > 50.0 && action.action == Action::Unsub),
        )
    }

    fn goes_against_volume(action: &UserAction) -> Option<bool> {
        let email_count = action.email_count?;
        Some(
            (email_count > 30 && action.action == Action::Keep)
                || (email_count < 10 && action.action == Action::Unsub),
        )
    }

    /// Adjustments for scoring one sender. A cache miss or unreadable
    /// store degrades to the documented defaults; scoring never fails.
    pub fn get_preference_adjustments(&self, sender: &SenderStats) -> PreferenceAdjustments {
        let mut cache = self.lock_cache();
        if cache.dirty {
            match self.store.get_all_preferences() {
                Ok(prefs) => {
                    cache.entries = prefs.into_iter().map(|p| (p.feature.clone(), p)).collect();
                    cache.dirty = false;
                }
                Err(e) => {
                    log::error!("Failed to load preferences, using defaults: {e}");
                    return PreferenceAdjustments::default();
                }
            }
        }

        PreferenceAdjustments {
            open_rate_weight: cache
                .entries
                .get("open_rate_weight")
                .map(|p| p.value)
                .unwrap_or(DEFAULT_OPEN_RATE_WEIGHT),
            volume_weight: cache
                .entries
                .get("volume_weight")
                .map(|p| p.value)
                .unwrap_or(DEFAULT_VOLUME_WEIGHT),
            keyword_boost: keyword_boost(&sender.domain, &cache.entries),
        }
    }

    /// Report what has been learned so far.
    pub fn get_learning_summary(&self) -> Result<LearningSummary> {
        let stats = self.store.learning_stats()?;

        let importance = |feature: &str| -> Result<SignalImportance> {
            Ok(match self.store.get_user_preference(feature)? {
                Some(p) if p.value < 0.7 => SignalImportance::Low,
                Some(p) if p.value > 1.2 => SignalImportance::High,
                _ => SignalImportance::Normal,
            })
        };

        let mut keyword_patterns = Vec::new();
        for pref in self.store.get_preferences_by_prefix("keyword:")? {
            if pref.confidence >= 0.5 && pref.sample_count >= MIN_SAMPLES_FOR_CONFIDENCE {
                keyword_patterns.push(KeywordPattern {
                    keyword: pref.feature.trim_start_matches("keyword:").to_string(),
                    tendency: if pref.value > 0.5 { Action::Keep } else { Action::Unsub },
                    strongly: (pref.value - 0.5).abs() > 0.3,
                    sample_count: pref.sample_count,
                });
            }
        }

        Ok(LearningSummary {
            total_actions: stats.total_actions,
            total_corrections: stats.total_corrections,
            open_rate_importance: importance("open_rate_weight")?,
            volume_sensitivity: importance("volume_weight")?,
            keyword_patterns,
        })
    }
}

/// Meaningful tokens from a domain name: split on `.`/`-`/`_`, drop short
/// tokens, TLDs, and infrastructure labels.
pub fn extract_keywords(domain: &str) -> Vec<String> {
    domain
        .to_lowercase()
        .split(['.', '-', '_'])
        .filter(|part| part.len() >= 3 && !TLDS.contains(part) && !SKIP_TOKENS.contains(part))
        .map(|part| part.to_string())
        .collect()
}

fn recency_weight(timestamp: DateTime<Utc>) -> f64 {
    let days_ago = (Utc::now() - timestamp).num_days() as f64;
    (-days_ago / RECENCY_HALF_LIFE_DAYS).exp()
}

/// Asymptotic confidence from evidence volume: ~0.28 at 1 sample, ~0.63
/// at 3, ~0.96 at 10. One formula for every feature type, so confidence
/// stays comparable across them.
fn confidence_for_samples(sample_count: u32) -> f64 {
    1.0 - (-(sample_count as f64) / 3.0).exp()
}

/// Sum of keyword contributions for a domain, gated on evidence and
/// clamped to +/-30 so no keyword set can dominate the score.
fn keyword_boost(domain: &str, preferences: &HashMap<String, UserPreference>) -> i32 {
    let mut total_boost = 0i32;

    for keyword in extract_keywords(domain) {
        let feature = format!("keyword:{keyword}");
        let pref = match preferences.get(&feature) {
            Some(p) if p.confidence >= 0.5 && p.sample_count >= MIN_SAMPLES_FOR_CONFIDENCE => p,
            _ => continue,
        };

        // Keep rate translates to a score shift: toward keep is negative,
        // toward unsub positive.
        if pref.value > KEYWORD_CONFIDENCE_THRESHOLD {
            total_boost -= ((pref.value - 0.5) * 20.0) as i32;
        } else if pref.value < 1.0 - KEYWORD_CONFIDENCE_THRESHOLD {
            total_boost += ((0.5 - pref.value) * 20.0) as i32;
        }
    }

    total_boost.clamp(-30, 30)
}
