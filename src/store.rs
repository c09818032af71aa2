//! Persistence contract for rules, overrides, preferences, and the user
//! action log, plus the SQLite implementation the tool ships with.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use crate::models::{Correction, PreferenceSource, UserAction, UserPreference, UserRule};

/// Counts describing what the learning system has accumulated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningStats {
    pub total_actions: u32,
    pub total_preferences: u32,
    pub total_corrections: u32,
    pub keep_actions: u32,
    pub unsub_actions: u32,
    pub block_actions: u32,
}

/// Key-value style storage contract the classifier core depends on. Each
/// row is written independently; no cross-feature transactions are needed.
pub trait Store: Send + Sync {
    fn add_rule(&self, pattern: &str, action: &str) -> Result<()>;
    fn get_rules(&self) -> Result<Vec<UserRule>>;
    fn delete_rule(&self, pattern: &str) -> Result<bool>;

    fn set_user_override(&self, domain: &str, action: &str) -> Result<()>;
    fn get_user_override(&self, domain: &str) -> Result<Option<String>>;

    fn get_user_preference(&self, feature: &str) -> Result<Option<UserPreference>>;
    fn set_user_preference(&self, pref: &UserPreference) -> Result<()>;
    fn get_all_preferences(&self) -> Result<Vec<UserPreference>>;
    fn get_preferences_by_prefix(&self, prefix: &str) -> Result<Vec<UserPreference>>;
    fn delete_user_preference(&self, feature: &str) -> Result<bool>;

    fn log_user_action(&self, action: &UserAction) -> Result<()>;
    fn get_user_actions(&self, limit: u32) -> Result<Vec<UserAction>>;

    fn log_correction(&self, domain: &str, ai_decision: &str, user_decision: &str) -> Result<()>;
    fn get_recent_corrections(&self, limit: u32) -> Result<Vec<Correction>>;

    fn learning_stats(&self) -> Result<LearningStats>;
}

/// SQLite-backed store. The connection is serialized behind a mutex since
/// write volume is one row per user decision.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory: {}", parent.display())
            })?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open store: {}", path.as_ref().display()))?;
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS senders (
                domain TEXT PRIMARY KEY,
                user_override TEXT
            );
            CREATE TABLE IF NOT EXISTS rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern TEXT UNIQUE,
                action TEXT,
                created_at TEXT
            );
            CREATE TABLE IF NOT EXISTS user_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT,
                action TEXT,
                ai_recommendation TEXT,
                heuristic_score INTEGER,
                open_rate REAL,
                email_count INTEGER,
                timestamp TEXT
            );
            CREATE TABLE IF NOT EXISTS user_preferences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                feature TEXT UNIQUE,
                value REAL,
                confidence REAL,
                sample_count INTEGER,
                source TEXT DEFAULT 'learned',
                last_updated TEXT
            );
            CREATE TABLE IF NOT EXISTS corrections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT,
                ai_decision TEXT,
                user_decision TEXT,
                timestamp TEXT
            );",
        )
        .context("Failed to initialize store schema")?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            log::warn!("Malformed timestamp in store ({raw}): {e}");
            Utc::now()
        }
    }
}

/// Raw preference row, before timestamp/source strings are interpreted.
struct PreferenceRow {
    feature: String,
    value: f64,
    confidence: f64,
    sample_count: u32,
    source: Option<String>,
    last_updated: String,
}

impl PreferenceRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(PreferenceRow {
            feature: row.get("feature")?,
            value: row.get("value")?,
            confidence: row.get("confidence")?,
            sample_count: row.get("sample_count")?,
            source: row.get("source")?,
            last_updated: row.get("last_updated")?,
        })
    }

    fn into_preference(self) -> UserPreference {
        UserPreference {
            feature: self.feature,
            value: self.value,
            confidence: self.confidence,
            sample_count: self.sample_count,
            last_updated: parse_timestamp(&self.last_updated),
            source: self
                .source
                .as_deref()
                .and_then(PreferenceSource::parse)
                .unwrap_or(PreferenceSource::Learned),
        }
    }
}

impl Store for SqliteStore {
    fn add_rule(&self, pattern: &str, action: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO rules (pattern, action, created_at) VALUES (?1, ?2, ?3)",
            params![pattern, action, Utc::now().to_rfc3339()],
        )
        .context("Failed to add rule")?;
        Ok(())
    }

    fn get_rules(&self) -> Result<Vec<UserRule>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT pattern, action, created_at FROM rules ORDER BY created_at")
            .context("Failed to query rules")?;
        let rows = stmt
            .query_map([], |row| {
                let created_raw: String = row.get(2)?;
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, created_raw))
            })
            .context("Failed to read rules")?;

        let mut rules = Vec::new();
        for row in rows {
            let (pattern, action, created_raw) = row.context("Failed to read rule row")?;
            rules.push(UserRule {
                pattern,
                action,
                created_at: parse_timestamp(&created_raw),
            });
        }
        Ok(rules)
    }

    fn delete_rule(&self, pattern: &str) -> Result<bool> {
        let conn = self.lock();
        let deleted = conn
            .execute("DELETE FROM rules WHERE pattern = ?1", params![pattern])
            .context("Failed to delete rule")?;
        Ok(deleted > 0)
    }

    fn set_user_override(&self, domain: &str, action: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO senders (domain, user_override) VALUES (?1, ?2)
             ON CONFLICT(domain) DO UPDATE SET user_override = excluded.user_override",
            params![domain, action],
        )
        .context("Failed to set user override")?;
        Ok(())
    }

    fn get_user_override(&self, domain: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let override_action: Option<Option<String>> = conn
            .query_row(
                "SELECT user_override FROM senders WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up user override")?;
        Ok(override_action.flatten())
    }

    fn get_user_preference(&self, feature: &str) -> Result<Option<UserPreference>> {
        let conn = self.lock();
        let result = conn
            .query_row(
                "SELECT feature, value, confidence, sample_count, source, last_updated
                 FROM user_preferences WHERE feature = ?1",
                params![feature],
                PreferenceRow::read,
            )
            .optional()
            .context("Failed to look up preference")?;
        Ok(result.map(PreferenceRow::into_preference))
    }

    fn set_user_preference(&self, pref: &UserPreference) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO user_preferences (feature, value, confidence, sample_count, source, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(feature) DO UPDATE SET
                value = excluded.value,
                confidence = excluded.confidence,
                sample_count = excluded.sample_count,
                source = excluded.source,
                last_updated = excluded.last_updated",
            params![
                pref.feature,
                pref.value,
                pref.confidence,
                pref.sample_count,
                pref.source.as_str(),
                pref.last_updated.to_rfc3339(),
            ],
        )
        .context("Failed to upsert preference")?;
        Ok(())
    }

    fn get_all_preferences(&self) -> Result<Vec<UserPreference>> {
        self.get_preferences_by_prefix("")
    }

    fn get_preferences_by_prefix(&self, prefix: &str) -> Result<Vec<UserPreference>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT feature, value, confidence, sample_count, source, last_updated
                 FROM user_preferences WHERE feature LIKE ?1 ORDER BY feature",
            )
            .context("Failed to query preferences")?;
        let rows = stmt
            .query_map(params![format!("{prefix}%")], PreferenceRow::read)
            .context("Failed to read preferences")?;

        let mut prefs = Vec::new();
        for row in rows {
            prefs.push(row.context("Failed to read preference row")?.into_preference());
        }
        Ok(prefs)
    }

    fn delete_user_preference(&self, feature: &str) -> Result<bool> {
        let conn = self.lock();
        let deleted = conn
            .execute(
                "DELETE FROM user_preferences WHERE feature = ?1",
                params![feature],
            )
            .context("Failed to delete preference")?;
        Ok(deleted > 0)
    }

    fn log_user_action(&self, action: &UserAction) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO user_actions
                (domain, action, ai_recommendation, heuristic_score, open_rate, email_count, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                action.domain,
                action.action.as_str(),
                action.ai_recommendation.map(|a| a.as_str()),
                action.heuristic_score,
                action.open_rate,
                action.email_count,
                action.timestamp.to_rfc3339(),
            ],
        )
        .context("Failed to log user action")?;
        Ok(())
    }

    fn get_user_actions(&self, limit: u32) -> Result<Vec<UserAction>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT domain, action, ai_recommendation, heuristic_score, open_rate, email_count, timestamp
                 FROM user_actions ORDER BY timestamp DESC LIMIT ?1",
            )
            .context("Failed to query user actions")?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>("domain")?,
                    row.get::<_, String>("action")?,
                    row.get::<_, Option<String>>("ai_recommendation")?,
                    row.get::<_, Option<i32>>("heuristic_score")?,
                    row.get::<_, Option<f64>>("open_rate")?,
                    row.get::<_, Option<u32>>("email_count")?,
                    row.get::<_, String>("timestamp")?,
                ))
            })
            .context("Failed to read user actions")?;

        let mut actions = Vec::new();
        for row in rows {
            let (domain, action_raw, ai_raw, heuristic_score, open_rate, email_count, ts_raw) =
                row.context("Failed to read user action row")?;
            // Skip rows whose stored action no longer parses.
            let action = match crate::models::Action::parse(&action_raw) {
                Some(a) => a,
                None => {
                    log::warn!("Skipping user action with invalid action '{action_raw}'");
                    continue;
                }
            };
            actions.push(UserAction {
                domain,
                action,
                timestamp: parse_timestamp(&ts_raw),
                ai_recommendation: ai_raw.as_deref().and_then(crate::models::Action::parse),
                heuristic_score,
                open_rate,
                email_count,
            });
        }
        Ok(actions)
    }

    fn log_correction(&self, domain: &str, ai_decision: &str, user_decision: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO corrections (domain, ai_decision, user_decision, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![domain, ai_decision, user_decision, Utc::now().to_rfc3339()],
        )
        .context("Failed to log correction")?;
        Ok(())
    }

    fn get_recent_corrections(&self, limit: u32) -> Result<Vec<Correction>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT domain, ai_decision, user_decision, timestamp
                 FROM corrections ORDER BY timestamp DESC LIMIT ?1",
            )
            .context("Failed to query corrections")?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Failed to read corrections")?;

        let mut corrections = Vec::new();
        for row in rows {
            let (domain, ai_decision, user_decision, ts_raw) =
                row.context("Failed to read correction row")?;
            corrections.push(Correction {
                domain,
                ai_decision,
                user_decision,
                timestamp: parse_timestamp(&ts_raw),
            });
        }
        Ok(corrections)
    }

    fn learning_stats(&self) -> Result<LearningStats> {
        let conn = self.lock();
        let count = |sql: &str| -> Result<u32> {
            conn.query_row(sql, [], |row| row.get(0))
                .context("Failed to compute learning stats")
        };
        Ok(LearningStats {
            total_actions: count("SELECT COUNT(*) FROM user_actions")?,
            total_preferences: count("SELECT COUNT(*) FROM user_preferences")?,
            total_corrections: count(
                "SELECT COUNT(*) FROM user_actions
                 WHERE ai_recommendation IS NOT NULL AND action != ai_recommendation",
            )?,
            keep_actions: count("SELECT COUNT(*) FROM user_actions WHERE action = 'keep'")?,
            unsub_actions: count("SELECT COUNT(*) FROM user_actions WHERE action = 'unsub'")?,
            block_actions: count("SELECT COUNT(*) FROM user_actions WHERE action = 'block'")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;

    fn sample_pref(feature: &str, value: f64, samples: u32) -> UserPreference {
        UserPreference {
            feature: feature.to_string(),
            value,
            confidence: 0.5,
            sample_count: samples,
            last_updated: Utc::now(),
            source: PreferenceSource::Learned,
        }
    }

    #[test]
    fn test_preference_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .set_user_preference(&sample_pref("keyword:bank", 0.8, 4))
            .unwrap();

        let loaded = store.get_user_preference("keyword:bank").unwrap().unwrap();
        assert_eq!(loaded.feature, "keyword:bank");
        assert!((loaded.value - 0.8).abs() < f64::EPSILON);
        assert_eq!(loaded.sample_count, 4);
        assert_eq!(loaded.source, PreferenceSource::Learned);
    }

    #[test]
    fn test_preference_upsert_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .set_user_preference(&sample_pref("volume_weight", 1.0, 1))
            .unwrap();
        store
            .set_user_preference(&sample_pref("volume_weight", 0.9, 2))
            .unwrap();

        let loaded = store.get_user_preference("volume_weight").unwrap().unwrap();
        assert!((loaded.value - 0.9).abs() < f64::EPSILON);
        assert_eq!(loaded.sample_count, 2);
        assert_eq!(store.get_all_preferences().unwrap().len(), 1);
    }

    #[test]
    fn test_preferences_by_prefix() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .set_user_preference(&sample_pref("keyword:bank", 0.9, 3))
            .unwrap();
        store
            .set_user_preference(&sample_pref("keyword:promo", 0.1, 3))
            .unwrap();
        store
            .set_user_preference(&sample_pref("open_rate_weight", 1.0, 3))
            .unwrap();

        let keywords = store.get_preferences_by_prefix("keyword:").unwrap();
        assert_eq!(keywords.len(), 2);
        assert!(keywords.iter().all(|p| p.feature.starts_with("keyword:")));
    }

    #[test]
    fn test_rules_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_rule("*.example.com", "keep").unwrap();
        store.add_rule("promo.*", "unsub").unwrap();

        let rules = store.get_rules().unwrap();
        assert_eq!(rules.len(), 2);

        assert!(store.delete_rule("promo.*").unwrap());
        assert!(!store.delete_rule("promo.*").unwrap());
        assert_eq!(store.get_rules().unwrap().len(), 1);
    }

    #[test]
    fn test_user_override() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_user_override("example.com").unwrap(), None);

        store.set_user_override("example.com", "block").unwrap();
        assert_eq!(
            store.get_user_override("example.com").unwrap(),
            Some("block".to_string())
        );

        store.set_user_override("example.com", "keep").unwrap();
        assert_eq!(
            store.get_user_override("example.com").unwrap(),
            Some("keep".to_string())
        );
    }

    #[test]
    fn test_learning_stats_counts_corrections() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut action = UserAction {
            domain: "example.com".to_string(),
            action: Action::Keep,
            timestamp: Utc::now(),
            ai_recommendation: Some(Action::Unsub),
            heuristic_score: Some(60),
            open_rate: Some(40.0),
            email_count: Some(12),
        };
        store.log_user_action(&action).unwrap();

        action.ai_recommendation = Some(Action::Keep);
        store.log_user_action(&action).unwrap();

        let stats = store.learning_stats().unwrap();
        assert_eq!(stats.total_actions, 2);
        assert_eq!(stats.total_corrections, 1);
        assert_eq!(stats.keep_actions, 2);
    }
}
