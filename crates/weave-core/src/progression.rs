use crate::config::{LevelThreshold, ProgressionConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Beginner,
    Practitioner,
    Master,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Practitioner => "practitioner",
            Level::Master => "master",
        }
    }

    pub fn next(self) -> Option<Level> {
        match self {
            Level::Beginner => Some(Level::Practitioner),
            Level::Practitioner => Some(Level::Master),
            Level::Master => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// Aggregates read from the store for one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    /// Categorized (non-general) messages sent.
    pub messages_sent: u64,
    /// Distinct direct recipients of those messages.
    pub unique_relationships: u64,
    /// Whole days since the first of them.
    pub days_active: u64,
}

impl AgentStats {
    fn meets(&self, t: &LevelThreshold) -> bool {
        self.messages_sent >= t.messages
            && self.unique_relationships >= t.relationships
            && self.days_active >= t.days_active
    }
}

fn threshold(cfg: &ProgressionConfig, level: Level) -> Option<&LevelThreshold> {
    match level {
        Level::Beginner => None,
        Level::Practitioner => Some(&cfg.practitioner),
        Level::Master => Some(&cfg.master),
    }
}

pub fn assess(stats: &AgentStats, cfg: &ProgressionConfig) -> Level {
    if stats.meets(&cfg.master) {
        Level::Master
    } else if stats.meets(&cfg.practitioner) {
        Level::Practitioner
    } else {
        Level::Beginner
    }
}

// ---------------------------------------------------------------------------
// Progress toward the next level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub current: u64,
    pub required: u64,
    pub percentage: f64,
}

impl Criterion {
    fn new(current: u64, required: u64) -> Self {
        let percentage = if required == 0 {
            100.0
        } else {
            (current as f64 / required as f64 * 100.0).min(100.0)
        };
        Self {
            current,
            required,
            percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub agent_id: String,
    pub level: Level,
    pub next_level: Option<Level>,
    pub messages: Criterion,
    pub relationships: Criterion,
    pub days_active: Criterion,
    /// The slowest criterion gates promotion, so overall is the minimum.
    pub overall: f64,
}

pub fn progress(agent_id: &str, stats: &AgentStats, cfg: &ProgressionConfig) -> LevelProgress {
    let level = assess(stats, cfg);
    let next_level = level.next();
    let (messages, relationships, days_active) = match next_level.and_then(|l| threshold(cfg, l)) {
        Some(t) => (
            Criterion::new(stats.messages_sent, t.messages),
            Criterion::new(stats.unique_relationships, t.relationships),
            Criterion::new(stats.days_active, t.days_active),
        ),
        None => (
            Criterion::new(stats.messages_sent, 0),
            Criterion::new(stats.unique_relationships, 0),
            Criterion::new(stats.days_active, 0),
        ),
    };
    let overall = messages
        .percentage
        .min(relationships.percentage)
        .min(days_active.percentage);

    tracing::debug!(agent = agent_id, %level, overall, "assessed progression");

    LevelProgress {
        agent_id: agent_id.to_string(),
        level,
        next_level,
        messages,
        relationships,
        days_active,
        overall,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
