//! Particle appearance configuration
//!
//! Holds the colors and motion parameters that drive the particle shader,
//! plus the partial updates produced by the config generator.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Lowest particle count a generated configuration may request
pub const MIN_PARTICLE_COUNT: u32 = 500;
/// Highest particle count a generated configuration may request
pub const MAX_PARTICLE_COUNT: u32 = 50_000;

/// Error parsing a hex color string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid hex color: {0:?}")]
pub struct ColorParseError(pub String);

/// sRGB-encoded color with components in [0, 1], as written in hex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Linear RGBA with full alpha for uniform buffers; the sRGB surface
    /// re-encodes on write, so shaders must see linear values
    pub fn to_linear_array(self) -> [f32; 4] {
        let linear = egui::Rgba::from(self.to_color32());
        [linear.r(), linear.g(), linear.b(), 1.0]
    }

    /// Convert to an egui color for the overlay widgets
    pub fn to_color32(self) -> egui::Color32 {
        egui::Color32::from_rgb(
            (self.r * 255.0).round() as u8,
            (self.g * 255.0).round() as u8,
            (self.b * 255.0).round() as u8,
        )
    }
}

impl FromStr for Rgb {
    type Err = ColorParseError;

    /// Parse `#rgb` or `#rrggbb` (the leading `#` is optional)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError(s.to_string());
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }

        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| err());

        let (r, g, b) = match hex.len() {
            3 => {
                // Shorthand: each digit is doubled (#0ff == #00ffff)
                let r = channel(&hex[0..1])? * 17;
                let g = channel(&hex[1..2])? * 17;
                let b = channel(&hex[2..3])? * 17;
                (r, g, b)
            }
            6 => (
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            ),
            _ => return Err(err()),
        };

        Ok(Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
        ))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.to_color32();
        write!(f, "#{:02x}{:02x}{:02x}", c.r(), c.g(), c.b())
    }
}

/// Appearance of the particle cloud
#[derive(Debug, Clone, PartialEq)]
pub struct AppearanceConfig {
    /// First gradient color (left side of the cloud)
    pub color1: Rgb,
    /// Second gradient color (right side of the cloud)
    pub color2: Rgb,
    /// Point footprint in scene units
    pub particle_size: f32,
    /// Flow-field time multiplier
    pub speed: f32,
    /// Flow-field amplitude multiplier
    pub noise_scale: f32,
    /// Base radius of the hand's push zone
    pub interaction_radius: f32,
    /// Number of points in the cloud
    pub particle_count: u32,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            color1: Rgb::new(1.0, 0.0, 0.4),
            color2: Rgb::new(0.0, 0.8, 1.0),
            particle_size: 0.15,
            speed: 1.0,
            noise_scale: 1.0,
            interaction_radius: 2.5,
            particle_count: 6000,
        }
    }
}

impl AppearanceConfig {
    /// Merge a partial update: required fields overwrite, absent optional
    /// fields keep their current values.
    pub fn apply(&mut self, update: &AppearanceUpdate) {
        self.color1 = update.color1;
        self.color2 = update.color2;
        self.particle_size = update.particle_size;
        self.speed = update.speed;
        self.noise_scale = update.noise_scale;

        if let Some(radius) = update.interaction_radius {
            self.interaction_radius = radius;
        }
        if let Some(count) = update.particle_count {
            self.particle_count = count;
        }
    }
}

/// Validated partial configuration produced by the generator
#[derive(Debug, Clone, PartialEq)]
pub struct AppearanceUpdate {
    pub color1: Rgb,
    pub color2: Rgb,
    pub particle_size: f32,
    pub speed: f32,
    pub noise_scale: f32,
    pub interaction_radius: Option<f32>,
    pub particle_count: Option<u32>,
}
