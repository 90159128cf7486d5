//! Deterministic payload construction
//!
//! `build` is a pure function of (request, session snapshot): no I/O, no
//! hidden state. The same inputs always produce the same document.

use serde_json::{json, Map, Value};

use crate::payload::{
    regional, ControlUnit, GenerationRequest, ResolvedPayload, MAX_BATCH_SIZE, MAX_CFG_SCALE,
    MAX_DIMENSION, MAX_HR_SCALE, MAX_STEPS, MIN_CFG_SCALE, MIN_DIMENSION,
};
use crate::session::{UserSession, MAX_MODIFIER_WEIGHT, MIN_MODIFIER_WEIGHT};

/// Recognized model-file suffixes stripped from modifier names before
/// token construction
const MODIFIER_EXTENSIONS: [&str; 3] = [".safetensors", ".ckpt", ".pt"];

/// Fold a request and a session snapshot into the downstream document.
///
/// Numeric fields are clamped to the documented ranges here as well as at
/// request validation. The builder does not assume validation already ran.
pub fn build(request: &GenerationRequest, session: &UserSession) -> ResolvedPayload {
    let base_prompt = match &request.regional {
        Some(spec) => spec.assemble_prompt(),
        None => request.prompt.clone(),
    };

    let tokens = style_tokens(&session.active_modifiers);
    let prompt = if tokens.is_empty() {
        base_prompt
    } else {
        format!("{} {}", base_prompt, tokens)
    };

    let mut override_settings = Map::new();
    if let Some(checkpoint) = &request.checkpoint {
        override_settings.insert("sd_model_checkpoint".to_string(), json!(checkpoint));
    }
    if let Some(vae) = &request.vae {
        override_settings.insert("sd_vae".to_string(), json!(vae));
    }

    let mut alwayson_scripts = Map::new();
    if let Some(spec) = &request.regional {
        alwayson_scripts.insert(regional::SCRIPT_KEY.to_string(), spec.layout.script_args());
    }
    if !request.control_units.is_empty() {
        alwayson_scripts.insert(
            "ControlNet".to_string(),
            control_script_args(&request.control_units, request.source_image.as_deref()),
        );
    }

    let init_images = match (&request.source_image, request.control_units.is_empty()) {
        // Structure-conditioned jobs carry the image inside the control unit
        (Some(image), true) => vec![image.clone()],
        _ => Vec::new(),
    };

    let (hr_scale, hr_upscaler, hr_second_pass_steps) = if request.enable_hr {
        (
            Some(request.hr_scale.clamp(1.0, MAX_HR_SCALE)),
            request.hr_upscaler.clone(),
            Some(request.hr_second_pass_steps.min(MAX_STEPS)),
        )
    } else {
        (None, None, None)
    };

    ResolvedPayload {
        prompt,
        negative_prompt: request.negative_prompt.clone(),
        sampler_name: request.sampler_name.clone(),
        steps: request.steps.clamp(1, MAX_STEPS),
        cfg_scale: request.cfg_scale.clamp(MIN_CFG_SCALE, MAX_CFG_SCALE),
        width: request.width.clamp(MIN_DIMENSION, MAX_DIMENSION),
        height: request.height.clamp(MIN_DIMENSION, MAX_DIMENSION),
        n_iter: request.batch_count.clamp(1, 10),
        batch_size: request.batch_size.clamp(1, MAX_BATCH_SIZE),
        seed: request.seed.max(-1),
        enable_hr: request.enable_hr,
        hr_scale,
        hr_upscaler,
        hr_second_pass_steps,
        denoising_strength: request.denoising_strength.clamp(0.0, 1.0),
        override_settings_restore_afterwards: !override_settings.is_empty(),
        override_settings,
        init_images,
        alwayson_scripts,
        extra: session.custom_settings.clone(),
    }
}

/// Build the space-joined style-modifier token suffix, in session order
pub fn style_tokens(modifiers: &[crate::session::StyleModifier]) -> String {
    modifiers
        .iter()
        .map(|m| {
            let name = strip_model_extension(&m.name);
            let weight = m.weight.clamp(MIN_MODIFIER_WEIGHT, MAX_MODIFIER_WEIGHT);
            format!("<lora:{}:{}>", name, weight)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_model_extension(name: &str) -> &str {
    for ext in MODIFIER_EXTENSIONS {
        if let Some(stripped) = name.strip_suffix(ext) {
            return stripped;
        }
    }
    name
}

fn control_script_args(units: &[ControlUnit], source_image: Option<&str>) -> Value {
    let args: Vec<Value> = units
        .iter()
        .enumerate()
        .map(|(i, unit)| {
            let mut obj = Map::new();
            obj.insert("enabled".to_string(), json!(unit.enabled));
            obj.insert("model".to_string(), json!(unit.model));
            obj.insert("weight".to_string(), json!(unit.weight.clamp(0.0, 2.0)));
            obj.insert(
                "guidance_start".to_string(),
                json!(unit.guidance_start.clamp(0.0, 1.0)),
            );
            obj.insert(
                "guidance_end".to_string(),
                json!(unit.guidance_end.clamp(0.0, 1.0)),
            );
            obj.insert(
                "processor_res".to_string(),
                json!(unit.processor_res.clamp(MIN_DIMENSION, MAX_DIMENSION)),
            );
            obj.insert("control_mode".to_string(), json!(unit.control_mode.min(2)));
            obj.insert("pixel_perfect".to_string(), json!(unit.pixel_perfect));
            if let Some(module) = &unit.preprocessor {
                obj.insert("module".to_string(), json!(module));
            }
            if i == 0 {
                if let Some(image) = source_image {
                    obj.insert("input_image".to_string(), json!(image));
                }
            }
            Value::Object(obj)
        })
        .collect();
    json!({ "args": args })
}
