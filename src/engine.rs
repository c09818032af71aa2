//! Cascade orchestrator. Layers, in priority order: user rules, preset
//! patterns, the AI collaborator, heuristic scoring, and a review fallback
//! that guarantees every sender gets an answer.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ClassifierConfig, OperationMode};
use crate::heuristics::HeuristicScorer;
use crate::learner::PreferenceLearner;
use crate::models::{Action, Classification, EmailType, SenderStats, Source};
use crate::patterns::PatternMatcher;
use crate::rules::RulesMatcher;
use crate::store::Store;

/// External AI classification layer. The engine treats it purely as a
/// priority-3 oracle behind a confidence gate; provider selection, retries,
/// and transport are the implementor's problem.
pub trait AiClassifier: Send + Sync {
    fn is_available(&self) -> bool;
    fn classify_single(&self, sender: &SenderStats) -> Option<Classification>;
    fn classify_batch(&self, senders: &[SenderStats]) -> HashMap<String, Classification>;
}

pub struct ClassificationEngine {
    config: ClassifierConfig,
    rules: RulesMatcher,
    patterns: PatternMatcher,
    ai: Option<Box<dyn AiClassifier>>,
    heuristics: HeuristicScorer,
}

impl ClassificationEngine {
    pub fn new(
        config: ClassifierConfig,
        store: Arc<dyn Store>,
        learner: Arc<PreferenceLearner>,
        ai: Option<Box<dyn AiClassifier>>,
    ) -> Self {
        let heuristics = HeuristicScorer::new(
            learner,
            config.scoring.clone(),
            config.thresholds.clone(),
        );
        ClassificationEngine {
            config,
            rules: RulesMatcher::new(store),
            patterns: PatternMatcher::default(),
            ai,
            heuristics,
        }
    }

    /// Replace the default preset patterns (e.g. with a user-supplied set).
    pub fn with_patterns(mut self, patterns: PatternMatcher) -> Self {
        self.patterns = patterns;
        self
    }

    /// Rule management pass-throughs for the orchestration layer.
    pub fn rules(&self) -> &RulesMatcher {
        &self.rules
    }

    /// Classify one sender. Total: every sender gets a classification,
    /// falling back to review when no layer is confident.
    pub fn classify(&self, sender: &SenderStats) -> Classification {
        // Layer 1: user rules. A store failure here degrades to the next
        // layer rather than aborting the cascade.
        match self.rules.matches(sender) {
            Ok(Some(result)) => return result,
            Ok(None) => {}
            Err(e) => log::error!("Rule lookup failed for {}: {e}", sender.domain),
        }

        // Layer 2: preset patterns
        if let Some(result) = self.patterns.matches(sender) {
            return result;
        }

        // Layer 3: AI, gated on its own confidence
        if let Some(ai) = self.ai.as_deref() {
            if ai.is_available() {
                if let Some(result) = ai.classify_single(sender) {
                    if result.confidence >= self.config.thresholds.unsub_confidence {
                        return result;
                    }
                }
            }
        }

        // Layer 4: heuristics
        if let Some(result) = self.heuristics.classify(sender) {
            return result;
        }

        // Layer 5: review queue
        review_fallback()
    }

    /// Classify many senders, batching the AI call. Per-sender results are
    /// identical to calling `classify` on each sender individually.
    pub fn classify_batch(&self, senders: &[SenderStats]) -> HashMap<String, Classification> {
        let mut results: HashMap<String, Classification> = HashMap::new();
        let mut needs_ai: Vec<&SenderStats> = Vec::new();

        for sender in senders {
            match self.rules.matches(sender) {
                Ok(Some(result)) => {
                    results.insert(sender.domain.clone(), result);
                    continue;
                }
                Ok(None) => {}
                Err(e) => log::error!("Rule lookup failed for {}: {e}", sender.domain),
            }

            if let Some(result) = self.patterns.matches(sender) {
                results.insert(sender.domain.clone(), result);
                continue;
            }

            needs_ai.push(sender);
        }

        let ai_results = match self.ai.as_deref() {
            Some(ai) if ai.is_available() && !needs_ai.is_empty() => {
                let batch: Vec<SenderStats> = needs_ai.iter().map(|s| (*s).clone()).collect();
                ai.classify_batch(&batch)
            }
            _ => HashMap::new(),
        };

        for sender in needs_ai {
            if let Some(result) = ai_results.get(&sender.domain) {
                if result.confidence >= self.config.thresholds.unsub_confidence {
                    results.insert(sender.domain.clone(), result.clone());
                    continue;
                }
            }

            let result = self
                .heuristics
                .classify(sender)
                .unwrap_or_else(review_fallback);
            results.insert(sender.domain.clone(), result);
        }

        results
    }

    /// Whether the caller may act on a classification without asking.
    pub fn should_auto_act(&self, classification: &Classification) -> bool {
        if self.config.operation_mode == OperationMode::Confirm {
            return false;
        }

        match classification.action {
            Action::Review => false,
            Action::Unsub | Action::Block => {
                classification.confidence >= self.config.thresholds.unsub_confidence
            }
            Action::Keep => classification.confidence >= self.config.thresholds.keep_confidence,
        }
    }
}

fn review_fallback() -> Classification {
    Classification {
        email_type: EmailType::Unknown,
        action: Action::Review,
        confidence: 0.5,
        reasoning: "Could not confidently classify - needs manual review".to_string(),
        source: Source::Uncertain,
    }
}
