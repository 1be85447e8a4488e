//! Shader uniforms and the fixed scene camera

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use super::motion::MotionFrame;
use crate::appearance::AppearanceConfig;

pub const FIELD_OF_VIEW_DEGREES: f32 = 60.0;
pub const CAMERA_DISTANCE: f32 = 12.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 100.0;

/// Perspective camera looking at the cloud center from +z
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneCamera {
    aspect: f32,
}

impl SceneCamera {
    pub fn new(width: u32, height: u32) -> Self {
        let mut camera = Self { aspect: 1.0 };
        camera.resize(width, height);
        camera
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(Vec3::new(0.0, 0.0, CAMERA_DISTANCE), Vec3::ZERO, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            FIELD_OF_VIEW_DEGREES.to_radians(),
            self.aspect,
            Z_NEAR,
            Z_FAR,
        )
    }
}

/// Uniform buffer contents (must match `CloudUniforms` in particles.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CloudUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub color_a: [f32; 4],
    pub color_b: [f32; 4],
    /// xyz = hand in cloud-local space, w = 1 when the hand is active
    pub hand: [f32; 4],
    pub time: f32,
    pub scale: f32,
    pub particle_size: f32,
    pub speed: f32,
    pub noise_scale: f32,
    pub radius: f32,
    pub _pad: [f32; 2],
}

impl CloudUniforms {
    pub fn new(
        camera: &SceneCamera,
        motion: &MotionFrame,
        appearance: &AppearanceConfig,
        time: f32,
    ) -> Self {
        Self {
            view: camera.view().to_cols_array_2d(),
            projection: camera.projection().to_cols_array_2d(),
            model: motion.model.to_cols_array_2d(),
            color_a: appearance.color1.to_linear_array(),
            color_b: appearance.color2.to_linear_array(),
            hand: motion
                .hand_local
                .extend(if motion.hand_active { 1.0 } else { 0.0 })
                .to_array(),
            time,
            scale: motion.scale,
            particle_size: appearance.particle_size,
            speed: appearance.speed,
            noise_scale: appearance.noise_scale,
            radius: motion.radius,
            _pad: [0.0; 2],
        }
    }
}
