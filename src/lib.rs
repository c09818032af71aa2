//! Adaptive email sender classification.
//!
//! A priority cascade decides, per sender domain, whether to keep, unsub,
//! block, or defer to review: user rules, then preset patterns, then an
//! optional AI layer, then heuristic scoring, then a review fallback. An
//! online preference learner adjusts the heuristic weights and keyword
//! associations from every user decision.

pub mod config;
pub mod engine;
pub mod heuristics;
pub mod learner;
pub mod models;
pub mod patterns;
pub mod rules;
pub mod store;

pub use config::{ClassifierConfig, OperationMode, ScoringConfig, ThresholdConfig};
pub use engine::{AiClassifier, ClassificationEngine};
pub use heuristics::HeuristicScorer;
pub use learner::{LearningSummary, PreferenceAdjustments, PreferenceLearner};
pub use models::{Action, Classification, EmailType, SenderStats, Source, UserAction, UserPreference};
pub use patterns::{PatternMatcher, PatternSet};
pub use rules::RulesMatcher;
pub use store::{SqliteStore, Store};
