//! Per-caller session state

pub mod store;

pub use store::SessionStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const MIN_MODIFIER_WEIGHT: f32 = 0.1;
pub const MAX_MODIFIER_WEIGHT: f32 = 2.0;

/// A named, weighted prompt augmentation active in a caller's session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleModifier {
    pub name: String,
    pub weight: f32,
}

/// Mutable per-caller record consulted at payload-build time.
///
/// The pipeline only ever reads a cloned snapshot; mutations during an
/// in-flight job do not change that job's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub caller_id: String,
    /// Active style modifiers, in activation order
    #[serde(default)]
    pub active_modifiers: Vec<StyleModifier>,
    /// Saved structure-conditioning blocks, opaque to the pipeline
    #[serde(default)]
    pub control_configs: Vec<Value>,
    /// Free-form overrides merged into every payload this caller builds
    #[serde(default)]
    pub custom_settings: Map<String, Value>,
    pub last_updated: DateTime<Utc>,
}

impl UserSession {
    pub fn new(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            active_modifiers: Vec::new(),
            control_configs: Vec::new(),
            custom_settings: Map::new(),
            last_updated: Utc::now(),
        }
    }

    /// Activate a modifier, or update its weight in place if already active.
    /// Weight is clamped to the documented bounds; activation order is kept.
    pub fn add_modifier(&mut self, name: impl Into<String>, weight: f32) {
        let name = name.into();
        let weight = weight.clamp(MIN_MODIFIER_WEIGHT, MAX_MODIFIER_WEIGHT);
        if let Some(existing) = self.active_modifiers.iter_mut().find(|m| m.name == name) {
            existing.weight = weight;
        } else {
            self.active_modifiers.push(StyleModifier { name, weight });
        }
    }

    pub fn remove_modifier(&mut self, name: &str) -> bool {
        let before = self.active_modifiers.len();
        self.active_modifiers.retain(|m| m.name != name);
        self.active_modifiers.len() != before
    }

    pub fn clear_modifiers(&mut self) {
        self.active_modifiers.clear();
    }
}

/// A saved generation preset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetInfo {
    pub preset_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub config: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}
