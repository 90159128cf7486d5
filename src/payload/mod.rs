//! Generation request types and payload construction

pub mod builder;
pub mod regional;

pub use builder::build;
pub use regional::{RegionalLayout, RegionalSpec};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::jobs::JobKind;

pub const MIN_DIMENSION: u32 = 64;
pub const MAX_DIMENSION: u32 = 2048;
pub const MAX_STEPS: u32 = 150;
pub const MAX_CFG_SCALE: f32 = 30.0;
pub const MIN_CFG_SCALE: f32 = 1.0;
pub const MAX_BATCH_COUNT: u32 = 10;
pub const MAX_BATCH_SIZE: u32 = 4;
pub const MAX_HR_SCALE: f32 = 4.0;

/// A caller's generation request, prior to session folding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub caller_id: String,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default = "default_sampler")]
    pub sampler_name: String,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f32,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_one")]
    pub batch_count: u32,
    #[serde(default = "default_one")]
    pub batch_size: u32,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default)]
    pub enable_hr: bool,
    #[serde(default = "default_hr_scale")]
    pub hr_scale: f32,
    #[serde(default)]
    pub hr_upscaler: Option<String>,
    #[serde(default)]
    pub hr_second_pass_steps: u32,
    #[serde(default = "default_denoising")]
    pub denoising_strength: f32,
    #[serde(default)]
    pub checkpoint: Option<String>,
    #[serde(default)]
    pub vae: Option<String>,
    #[serde(default)]
    pub regional: Option<RegionalSpec>,
    /// Base64-encoded source image for image-conditioned jobs.
    /// Expected to already be normalized by `images::normalize`.
    #[serde(default)]
    pub source_image: Option<String>,
    #[serde(default)]
    pub control_units: Vec<ControlUnit>,
}

fn default_sampler() -> String {
    "DPM++ 2M Karras".to_string()
}

fn default_steps() -> u32 {
    20
}

fn default_cfg_scale() -> f32 {
    7.0
}

fn default_dimension() -> u32 {
    512
}

fn default_one() -> u32 {
    1
}

fn default_seed() -> i64 {
    -1
}

fn default_hr_scale() -> f32 {
    2.0
}

fn default_denoising() -> f32 {
    0.7
}

/// One structure-conditioning unit (edge/depth/pose control)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlUnit {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub model: String,
    #[serde(default = "default_unit_weight")]
    pub weight: f32,
    #[serde(default)]
    pub guidance_start: f32,
    #[serde(default = "default_guidance_end")]
    pub guidance_end: f32,
    #[serde(default = "default_processor_res")]
    pub processor_res: u32,
    #[serde(default)]
    pub control_mode: u8,
    #[serde(default)]
    pub pixel_perfect: bool,
    #[serde(default)]
    pub preprocessor: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_unit_weight() -> f32 {
    1.0
}

fn default_guidance_end() -> f32 {
    1.0
}

fn default_processor_res() -> u32 {
    512
}

impl GenerationRequest {
    /// Surface out-of-range values before admission
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(AppError::ValidationFailed("prompt cannot be empty".into()));
        }
        check_range("steps", self.steps as f64, 1.0, MAX_STEPS as f64)?;
        check_range(
            "cfg_scale",
            self.cfg_scale as f64,
            MIN_CFG_SCALE as f64,
            MAX_CFG_SCALE as f64,
        )?;
        check_range(
            "width",
            self.width as f64,
            MIN_DIMENSION as f64,
            MAX_DIMENSION as f64,
        )?;
        check_range(
            "height",
            self.height as f64,
            MIN_DIMENSION as f64,
            MAX_DIMENSION as f64,
        )?;
        check_range(
            "batch_count",
            self.batch_count as f64,
            1.0,
            MAX_BATCH_COUNT as f64,
        )?;
        check_range(
            "batch_size",
            self.batch_size as f64,
            1.0,
            MAX_BATCH_SIZE as f64,
        )?;
        if self.seed < -1 {
            return Err(AppError::ValidationFailed(
                "seed must be -1 (random) or non-negative".into(),
            ));
        }
        check_range("hr_scale", self.hr_scale as f64, 1.0, MAX_HR_SCALE as f64)?;
        check_range(
            "hr_second_pass_steps",
            self.hr_second_pass_steps as f64,
            0.0,
            MAX_STEPS as f64,
        )?;
        check_range(
            "denoising_strength",
            self.denoising_strength as f64,
            0.0,
            1.0,
        )?;
        for unit in &self.control_units {
            check_range("control weight", unit.weight as f64, 0.0, 2.0)?;
            check_range("guidance_start", unit.guidance_start as f64, 0.0, 1.0)?;
            check_range("guidance_end", unit.guidance_end as f64, 0.0, 1.0)?;
        }
        Ok(())
    }

    pub fn kind(&self) -> JobKind {
        if self.regional.is_some() {
            JobKind::Regional
        } else if !self.control_units.is_empty() {
            JobKind::Structure
        } else if self.source_image.is_some() {
            JobKind::Image
        } else {
            JobKind::Text
        }
    }
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value < min || value > max {
        return Err(AppError::ValidationFailed(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }
    Ok(())
}

/// Fully resolved downstream request document, immutable after creation.
///
/// Serializes to the WebUI txt2img/img2img wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPayload {
    pub prompt: String,
    pub negative_prompt: String,
    pub sampler_name: String,
    pub steps: u32,
    pub cfg_scale: f32,
    pub width: u32,
    pub height: u32,
    pub n_iter: u32,
    pub batch_size: u32,
    pub seed: i64,
    pub enable_hr: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hr_scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hr_upscaler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hr_second_pass_steps: Option<u32>,
    pub denoising_strength: f32,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub override_settings: Map<String, Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub override_settings_restore_afterwards: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub init_images: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub alwayson_scripts: Map<String, Value>,
    /// Free-form session overrides merged into the document
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResolvedPayload {
    /// Image-conditioned payloads go to the img2img endpoint
    pub fn is_image_conditioned(&self) -> bool {
        !self.init_images.is_empty()
    }
}
