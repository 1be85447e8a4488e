//! Structured response format for appearance generation

use serde::Deserialize;
use serde_json::{json, Value};

use super::GenerateError;
use crate::appearance::{AppearanceUpdate, Rgb, MAX_PARTICLE_COUNT, MIN_PARTICLE_COUNT};

/// Instruction sent with every prompt
pub const SYSTEM_INSTRUCTION: &str = "You design the look of an interactive 3D particle cloud. \
Read the user's theme and infer a color palette, motion speed and noise level from its mood. \
Fire suggests warm reds and oranges with fast motion; water suggests cool blues with smooth, \
slow noise; space suggests dark purples and deep blues with slow drift. \
Colors are hex strings like #ff6600. particleSize is between 0.05 and 0.5, speed between 0.1 \
and 5, noiseScale between 0.1 and 3. Optionally set interactionRadius (1 to 6) and \
particleCount (500 to 50000) when the theme calls for it.";

/// JSON schema the service must answer with
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "color1": { "type": "STRING", "description": "Primary hex color" },
            "color2": { "type": "STRING", "description": "Secondary hex color" },
            "particleSize": { "type": "NUMBER" },
            "speed": { "type": "NUMBER" },
            "noiseScale": { "type": "NUMBER" },
            "interactionRadius": { "type": "NUMBER" },
            "particleCount": { "type": "INTEGER" }
        },
        "required": ["color1", "color2", "particleSize", "speed", "noiseScale"]
    })
}

/// Raw structured payload as returned by the service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAppearance {
    pub color1: String,
    pub color2: String,
    pub particle_size: f32,
    pub speed: f32,
    pub noise_scale: f32,
    #[serde(default)]
    pub interaction_radius: Option<f32>,
    #[serde(default)]
    pub particle_count: Option<f64>,
}

impl GeneratedAppearance {
    /// Parse the JSON text produced by the model
    pub fn from_json(text: &str) -> Result<Self, GenerateError> {
        serde_json::from_str(strip_code_fence(text))
            .map_err(|e| GenerateError::Malformed(e.to_string()))
    }

    /// Check ranges and parse colors into an update ready to merge
    pub fn validate(self) -> Result<AppearanceUpdate, GenerateError> {
        let color1: Rgb = self.color1.parse()?;
        let color2: Rgb = self.color2.parse()?;

        let particle_size = positive("particleSize", self.particle_size)?;
        let speed = positive("speed", self.speed)?;
        let noise_scale = positive("noiseScale", self.noise_scale)?;
        let interaction_radius = self
            .interaction_radius
            .map(|r| positive("interactionRadius", r))
            .transpose()?;
        let particle_count = self
            .particle_count
            .map(|count| {
                if count.is_finite() {
                    Ok(count
                        .round()
                        .clamp(MIN_PARTICLE_COUNT as f64, MAX_PARTICLE_COUNT as f64)
                        as u32)
                } else {
                    Err(GenerateError::Malformed(format!(
                        "particleCount is not finite: {}",
                        count
                    )))
                }
            })
            .transpose()?;

        Ok(AppearanceUpdate {
            color1,
            color2,
            particle_size,
            speed,
            noise_scale,
            interaction_radius,
            particle_count,
        })
    }
}

fn positive(field: &str, value: f32) -> Result<f32, GenerateError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(GenerateError::Malformed(format!(
            "{} must be a positive number, got {}",
            field, value
        )))
    }
}

/// Some models wrap JSON mode output in a markdown fence anyway
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}
