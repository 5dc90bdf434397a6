use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MasteryError;
use crate::models::{MasteryLevel, Status};

/// Percentage cutoffs for one class. Valid configs satisfy
/// `above > on > approaching >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub above: f64,
    pub on: f64,
    pub approaching: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            above: 86.0,
            on: 71.0,
            approaching: 61.0,
        }
    }
}

impl ThresholdConfig {
    pub fn new(above: f64, on: f64, approaching: f64) -> Self {
        Self {
            above,
            on,
            approaching,
        }
    }

    /// Converts the older two-cutoff shape, where `mastered` meant "on".
    pub fn from_legacy(mastered: f64, approaching: f64) -> Self {
        Self {
            above: (mastered + 15.0).min(100.0),
            on: mastered,
            approaching,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if ![self.above, self.on, self.approaching]
            .iter()
            .all(|value| value.is_finite())
        {
            return Err("cutoffs must be finite numbers".to_string());
        }
        if self.above <= self.on {
            return Err(format!("above ({}) must exceed on ({})", self.above, self.on));
        }
        if self.on <= self.approaching {
            return Err(format!(
                "on ({}) must exceed approaching ({})",
                self.on, self.approaching
            ));
        }
        if self.approaching < 0.0 {
            return Err(format!(
                "approaching ({}) must not be negative",
                self.approaching
            ));
        }
        Ok(())
    }

    pub fn classify(&self, pct: f64) -> MasteryLevel {
        if pct >= self.above {
            MasteryLevel::Above
        } else if pct >= self.on {
            MasteryLevel::On
        } else if pct >= self.approaching {
            MasteryLevel::Approaching
        } else {
            MasteryLevel::Below
        }
    }
}

/// Maps a blended percentage to a status; no evidence means not started.
pub fn classify(pct: Option<f64>, cfg: &ThresholdConfig) -> Status {
    pct.map(|pct| cfg.classify(pct)).into()
}

/// On-disk shape of one class entry. Older records carry `mastered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredThresholds {
    Current(ThresholdConfig),
    Legacy { mastered: f64, approaching: f64 },
}

impl StoredThresholds {
    fn migrate(self) -> ThresholdConfig {
        match self {
            StoredThresholds::Current(cfg) => cfg,
            StoredThresholds::Legacy {
                mastered,
                approaching,
            } => ThresholdConfig::from_legacy(mastered, approaching),
        }
    }
}

/// Threshold settings for every class. Keyed by class name only; all grades
/// taught in a class share one config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdBook {
    classes: BTreeMap<String, ThresholdConfig>,
}

impl ThresholdBook {
    /// Loads the stored document, migrating legacy entries and replacing
    /// invalid ones with the default config.
    pub fn from_document(document: &serde_json::Value) -> Result<Self, MasteryError> {
        if document.is_null() {
            return Ok(Self::default());
        }

        let stored: BTreeMap<String, serde_json::Value> =
            serde_json::from_value(document.clone())?;
        let mut classes = BTreeMap::new();

        for (class, entry) in stored {
            let cfg = match serde_json::from_value::<StoredThresholds>(entry) {
                Ok(entry) => entry.migrate(),
                Err(err) => {
                    warn!(%class, error = %err, "unreadable thresholds, using defaults");
                    classes.insert(class, ThresholdConfig::default());
                    continue;
                }
            };
            match cfg.validate() {
                Ok(()) => {
                    classes.insert(class, cfg);
                }
                Err(reason) => {
                    warn!(%class, %reason, "invalid thresholds, using defaults");
                    classes.insert(class, ThresholdConfig::default());
                }
            }
        }

        Ok(Self { classes })
    }

    pub fn to_document(&self) -> serde_json::Value {
        serde_json::json!(self.classes)
    }

    pub fn for_class(&self, class: &str) -> ThresholdConfig {
        self.classes.get(class).copied().unwrap_or_default()
    }

    pub fn set(&mut self, class: &str, cfg: ThresholdConfig) -> Result<(), MasteryError> {
        cfg.validate()
            .map_err(|reason| MasteryError::InvalidThresholds {
                class: class.to_string(),
                reason,
            })?;
        self.classes.insert(class.to_string(), cfg);
        Ok(())
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &ThresholdConfig)> {
        self.classes.iter().map(|(class, cfg)| (class.as_str(), cfg))
    }
}
