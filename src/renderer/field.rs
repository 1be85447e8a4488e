//! CPU reference for the per-vertex field in `particles.wgsl`
//!
//! The shader does this work on the GPU; this module carries the same math so
//! the displacement and coloring rules can be checked without a device. Keep
//! both in sync when changing either.

use glam::Vec3;

use super::cloud::CLOUD_RADIUS;

/// Flow-field amplitude at `noise_scale == 1`
pub const FLOW_AMPLITUDE: f32 = 0.15;
/// Spatial frequency of the flow field
pub const FLOW_FREQUENCY: f32 = 0.5;
/// Radial push at the hand center
pub const PUSH_STRENGTH: f32 = 1.5;
/// Tangential swirl at the hand center
pub const CURL_STRENGTH: f32 = 0.8;
/// Points closer than this to the hand are brightened
pub const HIGHLIGHT_DISTANCE: f32 = 1.0;
pub const HIGHLIGHT_GAIN: f32 = 0.6;
/// Width of the per-point jitter added to the color gradient
pub const COLOR_JITTER: f32 = 1.0;

/// Per-frame inputs to the field
#[derive(Debug, Clone, Copy)]
pub struct FieldParams {
    pub time: f32,
    pub speed: f32,
    pub noise_scale: f32,
    pub scale: f32,
    /// Hand position in the cloud's local frame, when active
    pub hand: Option<Vec3>,
    pub radius: f32,
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Low-amplitude periodic drift for one point
pub fn flow_offset(position: Vec3, seed: f32, time: f32, speed: f32, noise_scale: f32) -> Vec3 {
    let t = time * speed;
    let phase = seed * std::f32::consts::TAU;
    Vec3::new(
        (t + phase + position.y * FLOW_FREQUENCY).sin(),
        (t * 0.8 + phase + position.z * FLOW_FREQUENCY).cos(),
        (t * 1.2 + phase + position.x * FLOW_FREQUENCY).sin(),
    ) * FLOW_AMPLITUDE
        * noise_scale
}

/// Outward push plus swirl around the hand, zero outside `radius`
pub fn hand_push(position: Vec3, hand: Vec3, radius: f32) -> Vec3 {
    let offset = position - hand;
    let distance = offset.length();
    if distance >= radius || distance < 1e-5 {
        return Vec3::ZERO;
    }

    let falloff = 1.0 - distance / radius;
    let direction = offset / distance;
    let curl = Vec3::new(direction.y, -direction.x, 0.0);
    direction * falloff * PUSH_STRENGTH + curl * falloff * CURL_STRENGTH
}

/// Displaced local position of a point
pub fn displace(position: Vec3, seed: f32, params: &FieldParams) -> Vec3 {
    let scaled = position * params.scale;
    let mut p = scaled + flow_offset(scaled, seed, params.time, params.speed, params.noise_scale);
    // Push is measured from the scaled rest position, not the drifting one
    if let Some(hand) = params.hand {
        p += hand_push(scaled, hand, params.radius);
    }
    p
}

/// Color of a point at displaced position `position`
pub fn color_at(position: Vec3, seed: f32, color_a: Vec3, color_b: Vec3, hand: Option<Vec3>) -> Vec3 {
    let t = smoothstep(
        -CLOUD_RADIUS,
        CLOUD_RADIUS,
        position.x + (seed - 0.5) * COLOR_JITTER,
    );
    let base = color_a.lerp(color_b, t);

    match hand {
        Some(hand) => {
            let distance = position.distance(hand);
            if distance < HIGHLIGHT_DISTANCE {
                let glow = HIGHLIGHT_GAIN * (1.0 - distance / HIGHLIGHT_DISTANCE);
                base.lerp(Vec3::ONE, glow)
            } else {
                base
            }
        }
        None => base,
    }
}
