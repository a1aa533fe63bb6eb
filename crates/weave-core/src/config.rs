use crate::error::Result;
use crate::paths;
use crate::types::{Harmony, MessageType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// FieldConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Coherence used when no stored value exists yet.
    #[serde(default = "default_initial_coherence")]
    pub initial_coherence: f64,
}

fn default_initial_coherence() -> f64 {
    75.0
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            initial_coherence: default_initial_coherence(),
        }
    }
}

// ---------------------------------------------------------------------------
// RetentionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Hard cap: pruning always deletes down to this many messages.
    #[serde(default = "default_message_cap")]
    pub message_cap: usize,
    /// Soft trigger: a send that pushes the table past this prunes it.
    #[serde(default = "default_soft_limit")]
    pub soft_limit: usize,
    #[serde(default = "default_inactivity_secs")]
    pub inactivity_secs: u64,
    #[serde(default = "default_lookback_hours")]
    pub analytics_lookback_hours: u32,
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,
}

fn default_message_cap() -> usize {
    1000
}

fn default_soft_limit() -> usize {
    1500
}

fn default_inactivity_secs() -> u64 {
    5 * 60
}

fn default_lookback_hours() -> u32 {
    24
}

fn default_maintenance_interval() -> u64 {
    15 * 60
}

fn default_startup_delay() -> u64 {
    5
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_cap: default_message_cap(),
            soft_limit: default_soft_limit(),
            inactivity_secs: default_inactivity_secs(),
            analytics_lookback_hours: default_lookback_hours(),
            maintenance_interval_secs: default_maintenance_interval(),
            startup_delay_secs: default_startup_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressionConfig
// ---------------------------------------------------------------------------

/// Criteria an agent must meet, all of them, to hold a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelThreshold {
    #[serde(default)]
    pub messages: u64,
    #[serde(default)]
    pub relationships: u64,
    #[serde(default)]
    pub days_active: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionConfig {
    #[serde(default = "default_practitioner")]
    pub practitioner: LevelThreshold,
    #[serde(default = "default_master")]
    pub master: LevelThreshold,
}

fn default_practitioner() -> LevelThreshold {
    LevelThreshold {
        messages: 50,
        relationships: 0,
        days_active: 0,
    }
}

fn default_master() -> LevelThreshold {
    LevelThreshold {
        messages: 200,
        relationships: 20,
        days_active: 0,
    }
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            practitioner: default_practitioner(),
            master: default_master(),
        }
    }
}

// ---------------------------------------------------------------------------
// SaturationCurve
// ---------------------------------------------------------------------------

/// How impact decays with the number of same-type repeats inside the
/// saturation window. Every curve returns 1.0 at zero repeats and stays
/// strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "curve", rename_all = "snake_case")]
pub enum SaturationCurve {
    /// `rate ^ repeats`
    Exponential { rate: f64 },
    /// `1 / (1 + steepness * repeats)`
    Hyperbolic { steepness: f64 },
}

impl SaturationCurve {
    pub fn factor(&self, repeats: u32) -> f64 {
        match self {
            SaturationCurve::Exponential { rate } => {
                let rate = rate.clamp(f64::MIN_POSITIVE, 1.0);
                rate.powf(f64::from(repeats))
            }
            SaturationCurve::Hyperbolic { steepness } => {
                1.0 / (1.0 + steepness.max(0.0) * f64::from(repeats))
            }
        }
    }
}

impl Default for SaturationCurve {
    fn default() -> Self {
        SaturationCurve::Exponential { rate: 0.7 }
    }
}

// ---------------------------------------------------------------------------
// ImpactConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldAwareConfig {
    #[serde(default = "default_field_aware_max")]
    pub max_impact: f64,
    #[serde(default = "default_constructive_factor")]
    pub constructive_factor: f64,
    #[serde(default = "default_destructive_factor")]
    pub destructive_factor: f64,
    #[serde(default = "default_constructive_pairs")]
    pub constructive: Vec<(MessageType, MessageType)>,
    #[serde(default = "default_destructive_pairs")]
    pub destructive: Vec<(MessageType, MessageType)>,
}

fn default_field_aware_max() -> f64 {
    0.25
}

fn default_constructive_factor() -> f64 {
    1.3
}

fn default_destructive_factor() -> f64 {
    0.7
}

fn default_constructive_pairs() -> Vec<(MessageType, MessageType)> {
    vec![
        (MessageType::Gratitude, MessageType::Celebration),
        (MessageType::Healing, MessageType::Integration),
        (MessageType::Inquiry, MessageType::Emergence),
    ]
}

fn default_destructive_pairs() -> Vec<(MessageType, MessageType)> {
    vec![
        (MessageType::Boundary, MessageType::Emergence),
        (MessageType::Celebration, MessageType::Reflection),
    ]
}

impl Default for FieldAwareConfig {
    fn default() -> Self {
        Self {
            max_impact: default_field_aware_max(),
            constructive_factor: default_constructive_factor(),
            destructive_factor: default_destructive_factor(),
            constructive: default_constructive_pairs(),
            destructive: default_destructive_pairs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactConfig {
    #[serde(default = "default_base_impacts")]
    pub base_impacts: BTreeMap<MessageType, f64>,
    /// Base for any type missing from `base_impacts`.
    #[serde(default = "default_default_impact")]
    pub default_impact: f64,
    #[serde(default = "default_first_exchange")]
    pub first_exchange_factor: f64,
    #[serde(default = "default_aligned")]
    pub aligned_factor: f64,
    #[serde(default = "default_complementary_factor")]
    pub complementary_factor: f64,
    #[serde(default = "default_complementary")]
    pub complementary: BTreeMap<Harmony, Vec<Harmony>>,
    #[serde(default = "default_saturation_window")]
    pub saturation_window_secs: u64,
    #[serde(default)]
    pub saturation: SaturationCurve,
    #[serde(default = "default_min_impact")]
    pub min_impact: f64,
    #[serde(default = "default_max_impact")]
    pub max_impact: f64,
    #[serde(default)]
    pub field_aware: FieldAwareConfig,
}

fn default_base_impacts() -> BTreeMap<MessageType, f64> {
    BTreeMap::from([
        (MessageType::General, 0.0),
        (MessageType::Gratitude, 0.07),
        (MessageType::Healing, 0.06),
        (MessageType::Integration, 0.05),
        (MessageType::Invocation, 0.05),
        (MessageType::Celebration, 0.04),
        (MessageType::Transmission, 0.04),
        (MessageType::Emergence, 0.03),
        (MessageType::Inquiry, 0.02),
        (MessageType::Boundary, 0.02),
        (MessageType::Reflection, 0.01),
    ])
}

fn default_default_impact() -> f64 {
    0.03
}

fn default_first_exchange() -> f64 {
    1.5
}

fn default_aligned() -> f64 {
    1.3
}

fn default_complementary_factor() -> f64 {
    1.1
}

fn default_complementary() -> BTreeMap<Harmony, Vec<Harmony>> {
    use Harmony::*;
    BTreeMap::from([
        (Coherence, vec![Transparency, Resonance]),
        (Resonance, vec![Mutuality, Coherence]),
        (Vitality, vec![Novelty, Agency]),
        (Mutuality, vec![Resonance, Transparency]),
        (Novelty, vec![Vitality]),
        (Agency, vec![Transparency, Vitality]),
        (Transparency, vec![Coherence, Agency]),
    ])
}

fn default_saturation_window() -> u64 {
    15 * 60
}

fn default_min_impact() -> f64 {
    0.001
}

fn default_max_impact() -> f64 {
    0.15
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            base_impacts: default_base_impacts(),
            default_impact: default_default_impact(),
            first_exchange_factor: default_first_exchange(),
            aligned_factor: default_aligned(),
            complementary_factor: default_complementary_factor(),
            complementary: default_complementary(),
            saturation_window_secs: default_saturation_window(),
            saturation: SaturationCurve::default(),
            min_impact: default_min_impact(),
            max_impact: default_max_impact(),
            field_aware: FieldAwareConfig::default(),
        }
    }
}

impl ImpactConfig {
    pub fn base_for(&self, message_type: MessageType) -> f64 {
        self.base_impacts
            .get(&message_type)
            .copied()
            .unwrap_or(self.default_impact)
    }

    /// Complementarity is symmetric: either side listing the other counts.
    pub fn are_complementary(&self, a: Harmony, b: Harmony) -> bool {
        let listed = |x: Harmony, y: Harmony| {
            self.complementary
                .get(&x)
                .map(|v| v.contains(&y))
                .unwrap_or(false)
        };
        listed(a, b) || listed(b, a)
    }

    pub fn saturation_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.saturation_window_secs as i64)
    }
}

// ---------------------------------------------------------------------------
// WeaveConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeaveConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub field: FieldConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub progression: ProgressionConfig,
    #[serde(default)]
    pub impact: ImpactConfig,
}

fn default_version() -> u32 {
    1
}

impl WeaveConfig {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Self::default()
        }
    }

    /// Load `<root>/.weave/config.yaml`, falling back to defaults when the
    /// file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: WeaveConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        if !(0.0..=100.0).contains(&self.field.initial_coherence) {
            push(
                WarnLevel::Error,
                format!(
                    "field.initial_coherence={} is outside 0..=100",
                    self.field.initial_coherence
                ),
            );
        }

        let r = &self.retention;
        if r.message_cap == 0 {
            push(
                WarnLevel::Error,
                "retention.message_cap must be greater than zero".to_string(),
            );
        }
        if r.soft_limit <= r.message_cap {
            push(
                WarnLevel::Warning,
                format!(
                    "retention.soft_limit ({}) should exceed message_cap ({})",
                    r.soft_limit, r.message_cap
                ),
            );
        }
        if r.maintenance_interval_secs == 0 {
            push(
                WarnLevel::Error,
                "retention.maintenance_interval_secs must be greater than zero".to_string(),
            );
        }

        let p = &self.progression;
        if p.master.messages < p.practitioner.messages {
            push(
                WarnLevel::Warning,
                format!(
                    "progression.master.messages ({}) is below practitioner ({})",
                    p.master.messages, p.practitioner.messages
                ),
            );
        }

        let i = &self.impact;
        if i.min_impact > i.max_impact {
            push(
                WarnLevel::Error,
                format!(
                    "impact.min_impact ({}) exceeds max_impact ({})",
                    i.min_impact, i.max_impact
                ),
            );
        }
        if i.min_impact <= 0.0 {
            push(
                WarnLevel::Warning,
                "impact.min_impact <= 0 lets saturated messages reach zero".to_string(),
            );
        }
        for (t, v) in &i.base_impacts {
            if *v < 0.0 {
                push(
                    WarnLevel::Error,
                    format!("impact.base_impacts.{t} is negative ({v})"),
                );
            }
        }
        match &i.saturation {
            SaturationCurve::Exponential { rate } if *rate <= 0.0 || *rate > 1.0 => push(
                WarnLevel::Error,
                format!("impact.saturation rate={rate} must be in (0, 1]"),
            ),
            SaturationCurve::Hyperbolic { steepness } if *steepness < 0.0 => push(
                WarnLevel::Error,
                format!("impact.saturation steepness={steepness} must not be negative"),
            ),
            _ => {}
        }
        if i.saturation_window_secs == 0 {
            push(
                WarnLevel::Warning,
                "impact.saturation_window_secs=0 disables saturation".to_string(),
            );
        }
        for (h, partners) in &i.complementary {
            if partners.contains(h) {
                push(
                    WarnLevel::Warning,
                    format!("impact.complementary lists '{h}' as complementary to itself"),
                );
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
