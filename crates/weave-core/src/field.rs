use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

pub const MIN_COHERENCE: f64 = 0.0;
pub const MAX_COHERENCE: f64 = 100.0;

/// Shared-state key the coordinator persists the coherence under.
pub const FIELD_STATE_KEY: &str = "field_coherence";

// ---------------------------------------------------------------------------
// FieldQuality
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldQuality {
    Building,
    Flowing,
    HighlyCoherent,
    Resonance,
    SacredPortal,
}

impl FieldQuality {
    pub fn label(self) -> &'static str {
        match self {
            FieldQuality::Building => "Building",
            FieldQuality::Flowing => "Flowing",
            FieldQuality::HighlyCoherent => "Highly Coherent",
            FieldQuality::Resonance => "Resonance",
            FieldQuality::SacredPortal => "Sacred Portal",
        }
    }
}

impl fmt::Display for FieldQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Band a coherence value falls into.
pub fn classify(value: f64) -> FieldQuality {
    if value >= 88.0 {
        FieldQuality::SacredPortal
    } else if value >= 80.0 {
        FieldQuality::Resonance
    } else if value >= 70.0 {
        FieldQuality::HighlyCoherent
    } else if value >= 60.0 {
        FieldQuality::Flowing
    } else {
        FieldQuality::Building
    }
}

fn clamp_coherence(value: f64) -> f64 {
    if value.is_nan() {
        return MIN_COHERENCE;
    }
    value.clamp(MIN_COHERENCE, MAX_COHERENCE)
}

// ---------------------------------------------------------------------------
// FieldState / FieldUpdate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldState {
    pub coherence: f64,
    pub quality: FieldQuality,
    pub updated_at: DateTime<Utc>,
}

impl FieldState {
    fn at(coherence: f64) -> Self {
        let coherence = clamp_coherence(coherence);
        Self {
            coherence,
            quality: classify(coherence),
            updated_at: Utc::now(),
        }
    }
}

/// Result of one `apply_delta`. `delta` is the requested change; the applied
/// change is `new - old` and differs only when clamping kicked in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub old: f64,
    pub new: f64,
    pub delta: f64,
}

impl FieldUpdate {
    pub fn applied(&self) -> f64 {
        self.new - self.old
    }

    /// `(from, to)` when the update moved coherence across a band edge.
    pub fn quality_change(&self) -> Option<(FieldQuality, FieldQuality)> {
        let from = classify(self.old);
        let to = classify(self.new);
        (from != to).then_some((from, to))
    }
}

// ---------------------------------------------------------------------------
// FieldTracker
// ---------------------------------------------------------------------------

/// Owner of the single coherence scalar. Every mutation goes through
/// `apply_delta`, which holds the lock across read, clamp and store.
#[derive(Debug)]
pub struct FieldTracker {
    state: Mutex<FieldState>,
}

impl FieldTracker {
    pub fn new(initial: f64) -> Self {
        Self {
            state: Mutex::new(FieldState::at(initial)),
        }
    }

    // A panic elsewhere cannot leave a FieldState half-written, so a
    // poisoned lock still holds a usable value.
    fn lock(&self) -> MutexGuard<'_, FieldState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> FieldState {
        self.lock().clone()
    }

    pub fn coherence(&self) -> f64 {
        self.lock().coherence
    }

    pub fn apply_delta(&self, delta: f64) -> FieldUpdate {
        let delta = if delta.is_finite() { delta } else { 0.0 };
        let mut state = self.lock();
        let old = state.coherence;
        let new = clamp_coherence(old + delta);
        *state = FieldState {
            coherence: new,
            quality: classify(new),
            updated_at: Utc::now(),
        };
        FieldUpdate { old, new, delta }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn band_edges() {
        assert_eq!(classify(88.0), FieldQuality::SacredPortal);
        assert_eq!(classify(87.99), FieldQuality::Resonance);
        assert_eq!(classify(80.0), FieldQuality::Resonance);
        assert_eq!(classify(70.0), FieldQuality::HighlyCoherent);
        assert_eq!(classify(60.0), FieldQuality::Flowing);
        assert_eq!(classify(59.9), FieldQuality::Building);
        assert_eq!(classify(0.0), FieldQuality::Building);
    }

    #[test]
    fn labels() {
        assert_eq!(FieldQuality::HighlyCoherent.to_string(), "Highly Coherent");
        assert_eq!(FieldQuality::SacredPortal.label(), "Sacred Portal");
    }

    #[test]
    fn apply_delta_reports_old_new_delta() {
        let tracker = FieldTracker::new(75.0);
        let update = tracker.apply_delta(0.07);
        assert_eq!(update.old, 75.0);
        assert!((update.new - 75.07).abs() < 1e-9);
        assert_eq!(update.delta, 0.07);
        assert_eq!(tracker.coherence(), update.new);
    }

    #[test]
    fn coherence_stays_bounded() {
        let tracker = FieldTracker::new(50.0);
        let deltas = [40.0, 40.0, -7.5, 1e6, -1e6, -3.0, f64::NAN, 0.25, 120.0];
        for d in deltas {
            let u = tracker.apply_delta(d);
            assert!((0.0..=100.0).contains(&u.new), "out of bounds after {d}");
        }
        let top = tracker.apply_delta(500.0);
        assert_eq!(top.new, 100.0);
        assert_eq!(top.delta, 500.0);
        assert_eq!(top.applied(), 100.0 - top.old);
    }

    #[test]
    fn initial_value_is_clamped() {
        assert_eq!(FieldTracker::new(140.0).coherence(), 100.0);
        assert_eq!(FieldTracker::new(-3.0).coherence(), 0.0);
    }

    #[test]
    fn quality_change_detected_on_band_crossing() {
        let tracker = FieldTracker::new(79.95);
        let up = tracker.apply_delta(0.07);
        assert_eq!(
            up.quality_change(),
            Some((FieldQuality::HighlyCoherent, FieldQuality::Resonance))
        );
        let same = tracker.apply_delta(0.01);
        assert_eq!(same.quality_change(), None);
    }

    #[test]
    fn concurrent_deltas_are_not_lost() {
        let tracker = Arc::new(FieldTracker::new(0.0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        t.apply_delta(0.05);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!((tracker.coherence() - 40.0).abs() < 1e-6);
    }
}
