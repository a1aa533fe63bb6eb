//! Impact calculator: turns one message into a bounded coherence delta.
//!
//! The calculator is pure. Everything history-dependent (pair counts, the
//! sender's recent sends, affinities, the current coherence) is read by the
//! caller and passed in, so the result is a function of its input alone.

use crate::config::ImpactConfig;
use crate::progression::Level;
use crate::types::{Harmony, MessageType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A message the sender sent earlier, as seen by the saturation check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecentSend {
    pub message_type: MessageType,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ImpactInput<'a> {
    pub level: Level,
    pub message_type: MessageType,
    pub harmony: Option<Harmony>,
    pub sender_harmonies: &'a [Harmony],
    pub recipient_harmonies: &'a [Harmony],
    /// Earlier messages from this sender to this recipient. `None` for
    /// broadcasts, which have no counterpart to meet for the first time.
    pub prior_pair_messages: Option<u64>,
    pub recent_sends: &'a [RecentSend],
    pub now: DateTime<Utc>,
    pub coherence: f64,
}

// ---------------------------------------------------------------------------
// Modifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Modifier {
    FirstExchange {
        factor: f64,
    },
    HarmonyAligned {
        harmony: Harmony,
        factor: f64,
    },
    HarmonyComplementary {
        harmony: Harmony,
        with: Harmony,
        factor: f64,
    },
    Saturation {
        repeats: u32,
        factor: f64,
    },
    CollectiveResonance {
        factor: f64,
    },
    Interference {
        with: MessageType,
        constructive: bool,
        factor: f64,
    },
}

impl Modifier {
    pub fn factor(&self) -> f64 {
        match self {
            Modifier::FirstExchange { factor }
            | Modifier::HarmonyAligned { factor, .. }
            | Modifier::HarmonyComplementary { factor, .. }
            | Modifier::Saturation { factor, .. }
            | Modifier::CollectiveResonance { factor }
            | Modifier::Interference { factor, .. } => *factor,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::FirstExchange { factor } => write!(f, "first exchange x{factor:.2}"),
            Modifier::HarmonyAligned { harmony, factor } => {
                write!(f, "{harmony} aligned x{factor:.2}")
            }
            Modifier::HarmonyComplementary {
                harmony,
                with,
                factor,
            } => write!(f, "{harmony} complements {with} x{factor:.2}"),
            Modifier::Saturation { repeats, factor } => {
                write!(f, "saturation after {repeats} repeat(s) x{factor:.3}")
            }
            Modifier::CollectiveResonance { factor } => {
                write!(f, "collective resonance x{factor:.2}")
            }
            Modifier::Interference {
                with,
                constructive,
                factor,
            } => {
                let kind = if *constructive { "constructive" } else { "destructive" };
                write!(f, "{kind} interference with {with} x{factor:.2}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ImpactOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactOutcome {
    pub message_type: MessageType,
    pub level: Level,
    pub base: f64,
    pub modifiers: Vec<Modifier>,
    /// Product of base and modifiers before the band clamp.
    pub raw: f64,
    pub impact: f64,
    pub clamped: bool,
}

impl ImpactOutcome {
    /// One-line account of how `impact` was reached.
    pub fn summary(&self) -> String {
        let mut out = format!("{} {} base {:.4}", self.level, self.message_type, self.base);
        for m in &self.modifiers {
            out.push_str(", ");
            out.push_str(&m.to_string());
        }
        if self.clamped {
            out.push_str(&format!(", clamped from {:.4}", self.raw));
        }
        out.push_str(&format!(" = {:.4}", self.impact));
        out
    }
}

// ---------------------------------------------------------------------------
// ImpactCalculator
// ---------------------------------------------------------------------------

pub struct ImpactCalculator<'a> {
    cfg: &'a ImpactConfig,
}

impl<'a> ImpactCalculator<'a> {
    pub fn new(cfg: &'a ImpactConfig) -> Self {
        Self { cfg }
    }

    pub fn calculate(&self, input: &ImpactInput<'_>) -> ImpactOutcome {
        let base = self.cfg.base_for(input.message_type).max(0.0);
        let mut outcome = ImpactOutcome {
            message_type: input.message_type,
            level: input.level,
            base,
            modifiers: Vec::new(),
            raw: base,
            impact: base,
            clamped: false,
        };

        // Beginners get the table value, and a zero base stays zero.
        if input.level == Level::Beginner || base == 0.0 {
            return outcome;
        }

        let mut modifiers = Vec::new();
        if let Some(m) = self.first_exchange(input) {
            modifiers.push(m);
        }
        if let Some(m) = self.harmony(input) {
            modifiers.push(m);
        }
        if let Some(m) = self.saturation(input) {
            modifiers.push(m);
        }
        if input.level == Level::Master {
            modifiers.push(self.collective_resonance(input));
            modifiers.extend(self.interference(input));
        }

        let raw = modifiers.iter().fold(base, |acc, m| acc * m.factor());
        let max = if input.level == Level::Master {
            self.cfg.field_aware.max_impact
        } else {
            self.cfg.max_impact
        };
        let impact = raw.clamp(self.cfg.min_impact.min(max), max);

        outcome.modifiers = modifiers;
        outcome.raw = raw;
        outcome.impact = impact;
        outcome.clamped = impact != raw;
        outcome
    }

    fn first_exchange(&self, input: &ImpactInput<'_>) -> Option<Modifier> {
        (input.prior_pair_messages == Some(0)).then(|| Modifier::FirstExchange {
            factor: self.cfg.first_exchange_factor,
        })
    }

    fn harmony(&self, input: &ImpactInput<'_>) -> Option<Modifier> {
        let harmony = input.harmony?;
        let affinities = || {
            input
                .sender_harmonies
                .iter()
                .chain(input.recipient_harmonies.iter())
                .copied()
        };
        if affinities().any(|a| a == harmony) {
            return Some(Modifier::HarmonyAligned {
                harmony,
                factor: self.cfg.aligned_factor,
            });
        }
        affinities()
            .find(|a| self.cfg.are_complementary(harmony, *a))
            .map(|with| Modifier::HarmonyComplementary {
                harmony,
                with,
                factor: self.cfg.complementary_factor,
            })
    }

    fn in_window<'s>(&self, input: &ImpactInput<'s>) -> impl Iterator<Item = &'s RecentSend> + 's {
        let start = input.now - self.cfg.saturation_window();
        let now = input.now;
        input
            .recent_sends
            .iter()
            .filter(move |s| s.sent_at > start && s.sent_at <= now)
    }

    fn saturation(&self, input: &ImpactInput<'_>) -> Option<Modifier> {
        if self.cfg.saturation_window_secs == 0 {
            return None;
        }
        let repeats = self
            .in_window(input)
            .filter(|s| s.message_type == input.message_type)
            .count() as u32;
        (repeats > 0).then(|| Modifier::Saturation {
            repeats,
            factor: self.cfg.saturation.factor(repeats),
        })
    }

    fn collective_resonance(&self, input: &ImpactInput<'_>) -> Modifier {
        let coherence = input.coherence.clamp(0.0, 100.0) / 100.0;
        Modifier::CollectiveResonance {
            factor: 0.5 + coherence,
        }
    }

    /// One modifier per configured pair whose partner type the sender used
    /// inside the window.
    fn interference(&self, input: &ImpactInput<'_>) -> Vec<Modifier> {
        let fa = &self.cfg.field_aware;
        let partner = |pair: &(MessageType, MessageType)| -> Option<MessageType> {
            match *pair {
                (a, b) if a == input.message_type => Some(b),
                (a, b) if b == input.message_type => Some(a),
                _ => None,
            }
        };
        let seen = |t: MessageType| self.in_window(input).any(|s| s.message_type == t);

        let mut out = Vec::new();
        for (pairs, constructive, factor) in [
            (&fa.constructive, true, fa.constructive_factor),
            (&fa.destructive, false, fa.destructive_factor),
        ] {
            for with in pairs.iter().filter_map(|pair| partner(pair)) {
                if seen(with) {
                    out.push(Modifier::Interference {
                        with,
                        constructive,
                        factor,
                    });
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
