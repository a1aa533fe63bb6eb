use crate::error::WeaveError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recipient id that addresses every agent.
pub const BROADCAST: &str = "all";

/// Sender used for synthesized messages when no actor is supplied.
pub const SYSTEM_AGENT: &str = "system";

// ---------------------------------------------------------------------------
// AgentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AgentStatus::Active),
            "inactive" => Ok(AgentStatus::Inactive),
            _ => Err(WeaveError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Message category. Everything except `General` belongs to the sacred
/// taxonomy and carries a base field impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    General,
    Gratitude,
    Healing,
    Integration,
    Invocation,
    Celebration,
    Transmission,
    Emergence,
    Inquiry,
    Boundary,
    Reflection,
}

impl MessageType {
    pub fn all() -> &'static [MessageType] {
        &[
            MessageType::General,
            MessageType::Gratitude,
            MessageType::Healing,
            MessageType::Integration,
            MessageType::Invocation,
            MessageType::Celebration,
            MessageType::Transmission,
            MessageType::Emergence,
            MessageType::Inquiry,
            MessageType::Boundary,
            MessageType::Reflection,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::General => "general",
            MessageType::Gratitude => "gratitude",
            MessageType::Healing => "healing",
            MessageType::Integration => "integration",
            MessageType::Invocation => "invocation",
            MessageType::Celebration => "celebration",
            MessageType::Transmission => "transmission",
            MessageType::Emergence => "emergence",
            MessageType::Inquiry => "inquiry",
            MessageType::Boundary => "boundary",
            MessageType::Reflection => "reflection",
        }
    }

    pub fn is_sacred(self) -> bool {
        !matches!(self, MessageType::General)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageType {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| WeaveError::InvalidMessageType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Harmony
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Harmony {
    Transparency,
    Coherence,
    Resonance,
    Agency,
    Vitality,
    Mutuality,
    Novelty,
}

impl Harmony {
    pub fn all() -> &'static [Harmony] {
        &[
            Harmony::Transparency,
            Harmony::Coherence,
            Harmony::Resonance,
            Harmony::Agency,
            Harmony::Vitality,
            Harmony::Mutuality,
            Harmony::Novelty,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Harmony::Transparency => "transparency",
            Harmony::Coherence => "coherence",
            Harmony::Resonance => "resonance",
            Harmony::Agency => "agency",
            Harmony::Vitality => "vitality",
            Harmony::Mutuality => "mutuality",
            Harmony::Novelty => "novelty",
        }
    }

    /// Harmony named by a capability tag, either bare (`resonance`) or
    /// prefixed (`harmony:resonance`).
    pub fn from_capability(tag: &str) -> Option<Harmony> {
        let name = tag.strip_prefix("harmony:").unwrap_or(tag);
        name.trim().to_ascii_lowercase().parse().ok()
    }
}

impl fmt::Display for Harmony {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Harmony {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Harmony::all()
            .iter()
            .copied()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| WeaveError::InvalidHarmony(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// WorkStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    InProgress,
    Blocked,
    Completed,
}

impl WorkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkStatus::Pending => "pending",
            WorkStatus::InProgress => "in_progress",
            WorkStatus::Blocked => "blocked",
            WorkStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkStatus::Completed)
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkStatus::Pending),
            "in_progress" => Ok(WorkStatus::InProgress),
            "blocked" => Ok(WorkStatus::Blocked),
            "completed" => Ok(WorkStatus::Completed),
            _ => Err(WeaveError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    Created,
    Started,
    Progressed,
    Blocked,
    Unblocked,
    Completed,
    Milestone,
}

impl TransitionType {
    pub fn all() -> &'static [TransitionType] {
        &[
            TransitionType::Created,
            TransitionType::Started,
            TransitionType::Progressed,
            TransitionType::Blocked,
            TransitionType::Unblocked,
            TransitionType::Completed,
            TransitionType::Milestone,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransitionType::Created => "created",
            TransitionType::Started => "started",
            TransitionType::Progressed => "progressed",
            TransitionType::Blocked => "blocked",
            TransitionType::Unblocked => "unblocked",
            TransitionType::Completed => "completed",
            TransitionType::Milestone => "milestone",
        }
    }

    /// Category of the message synthesized for this transition.
    pub fn message_type(self) -> MessageType {
        match self {
            TransitionType::Created => MessageType::Emergence,
            TransitionType::Started => MessageType::Invocation,
            TransitionType::Progressed => MessageType::Integration,
            TransitionType::Milestone => MessageType::Gratitude,
            TransitionType::Blocked => MessageType::Boundary,
            TransitionType::Unblocked => MessageType::Healing,
            TransitionType::Completed => MessageType::Celebration,
        }
    }
}

impl fmt::Display for TransitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransitionType {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransitionType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| WeaveError::InvalidTransitionType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
