use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of mail a sender tends to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    Marketing,
    Transactional,
    Security,
    Newsletter,
    ColdOutreach,
    Unknown,
}

impl EmailType {
    /// Parse a stored type string. Unrecognized values map to None so
    /// callers can decide how to degrade.
    pub fn parse(s: &str) -> Option<EmailType> {
        match s {
            "marketing" => Some(EmailType::Marketing),
            "transactional" => Some(EmailType::Transactional),
            "security" => Some(EmailType::Security),
            "newsletter" => Some(EmailType::Newsletter),
            "cold_outreach" => Some(EmailType::ColdOutreach),
            "unknown" => Some(EmailType::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::Marketing => "marketing",
            EmailType::Transactional => "transactional",
            EmailType::Security => "security",
            EmailType::Newsletter => "newsletter",
            EmailType::ColdOutreach => "cold_outreach",
            EmailType::Unknown => "unknown",
        }
    }
}

/// The decision taken (or recommended) for a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Keep,
    Unsub,
    Block,
    Review,
}

impl Action {
    /// Total parse for stored action strings. Invalid values are a data
    /// problem, not a control-flow problem: callers log and skip.
    pub fn parse(s: &str) -> Option<Action> {
        match s {
            "keep" => Some(Action::Keep),
            "unsub" => Some(Action::Unsub),
            "block" => Some(Action::Block),
            "review" => Some(Action::Review),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Keep => "keep",
            Action::Unsub => "unsub",
            Action::Block => "block",
            Action::Review => "review",
        }
    }
}

/// Which cascade layer produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    UserRule,
    Preset,
    Ai,
    Heuristics,
    Uncertain,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::UserRule => "user_rule",
            Source::Preset => "preset",
            Source::Ai => "ai",
            Source::Heuristics => "heuristics",
            Source::Uncertain => "uncertain",
        }
    }
}

/// Aggregated mailbox statistics for one sender domain. Produced by the
/// scanner; the classifier only reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderStats {
    pub domain: String,
    pub total_emails: u32,
    pub seen_emails: u32,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Up to 5 most recent subject lines.
    pub sample_subjects: Vec<String>,
    pub has_unsubscribe: bool,
}

impl SenderStats {
    pub fn new(domain: impl Into<String>) -> Self {
        SenderStats {
            domain: domain.into(),
            total_emails: 0,
            seen_emails: 0,
            first_seen: None,
            last_seen: None,
            sample_subjects: Vec::new(),
            has_unsubscribe: false,
        }
    }

    /// Open rate as a percentage. 0.0 when no mail has been counted.
    pub fn open_rate(&self) -> f64 {
        if self.total_emails == 0 {
            return 0.0;
        }
        (self.seen_emails as f64 / self.total_emails as f64) * 100.0
    }
}

/// The outcome of classifying one sender. Created by exactly one cascade
/// layer and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub email_type: EmailType,
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
    pub source: Source,
}

/// One finalized user decision, logged for learning. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAction {
    pub domain: String,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub ai_recommendation: Option<Action>,
    pub heuristic_score: Option<i32>,
    pub open_rate: Option<f64>,
    pub email_count: Option<u32>,
}

impl UserAction {
    /// True iff an AI recommendation existed and the user overrode it.
    pub fn was_correction(&self) -> bool {
        match self.ai_recommendation {
            Some(rec) => rec != self.action,
            None => false,
        }
    }
}

/// A learned scalar, keyed by feature name. For `keyword:<token>` features
/// the value is a 0-1 keep rate; for weight features it is a multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    pub feature: String,
    pub value: f64,
    pub confidence: f64,
    pub sample_count: u32,
    pub last_updated: DateTime<Utc>,
    pub source: PreferenceSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceSource {
    Learned,
    Ai,
    Default,
}

impl PreferenceSource {
    pub fn parse(s: &str) -> Option<PreferenceSource> {
        match s {
            "learned" => Some(PreferenceSource::Learned),
            "ai" => Some(PreferenceSource::Ai),
            "default" => Some(PreferenceSource::Default),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceSource::Learned => "learned",
            PreferenceSource::Ai => "ai",
            PreferenceSource::Default => "default",
        }
    }
}

/// A user-authored pattern rule stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRule {
    pub pattern: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// A logged AI-vs-user disagreement, surfaced to the AI layer as context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub domain: String,
    pub ai_decision: String,
    pub user_decision: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse_round_trip() {
        for action in [Action::Keep, Action::Unsub, Action::Block, Action::Review] {
            assert_eq!(Action::parse(action.as_str()), Some(action));
        }
        assert_eq!(Action::parse("delete"), None);
        assert_eq!(Action::parse(""), None);
    }

    #[test]
    fn test_email_type_parse() {
        assert_eq!(EmailType::parse("cold_outreach"), Some(EmailType::ColdOutreach));
        assert_eq!(EmailType::parse("spam"), None);
    }

    #[test]
    fn test_open_rate() {
        let mut stats = SenderStats::new("example.com");
        assert_eq!(stats.open_rate(), 0.0);

        stats.total_emails = 20;
        stats.seen_emails = 5;
        assert!((stats.open_rate() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_was_correction() {
        let mut action = UserAction {
            domain: "example.com".to_string(),
            action: Action::Keep,
            timestamp: Utc::now(),
            ai_recommendation: None,
            heuristic_score: None,
            open_rate: None,
            email_count: None,
        };
        assert!(!action.was_correction());

        action.ai_recommendation = Some(Action::Keep);
        assert!(!action.was_correction());

        action.ai_recommendation = Some(Action::Unsub);
        assert!(action.was_correction());
    }
}
