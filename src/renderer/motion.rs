//! Per-frame cloud motion
//!
//! Turns the latest hand sample into the smoothed scale, rotation and hand
//! interaction values the shader consumes. All constants are per frame, not
//! per second.

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

use crate::state::{Gesture, HandSample};

/// Expansion factor for a closed fist
pub const CLOSED_SCALE: f32 = 0.4;
/// Expansion factor for an open hand
pub const OPEN_SCALE: f32 = 1.3;
/// Expansion factor with no hand or a neutral pose
pub const REST_SCALE: f32 = 1.0;
pub const SCALE_BLEND: f32 = 0.12;

/// Hand velocity to rotational velocity
pub const VELOCITY_SENSITIVITY: f32 = 0.5;
pub const MOMENTUM_BLEND: f32 = 0.15;
/// Momentum kept per frame while no hand is visible
pub const FRICTION: f32 = 0.98;
/// Momentum length below which it snaps to zero
pub const MOMENTUM_SNAP: f32 = 1e-4;
/// Radians per frame
pub const MAX_MOMENTUM: f32 = 0.08;

pub const HAND_BLEND: f32 = 0.2;
pub const MIN_INTERACTION_RADIUS: f32 = 1.0;
pub const MAX_INTERACTION_RADIUS: f32 = 6.0;
/// Radius widening per unit of depth away from the camera (-z)
pub const DEPTH_RADIUS_GAIN: f32 = 0.5;

/// `current` moved toward `target` by `factor`
pub fn lerp(current: f32, target: f32, factor: f32) -> f32 {
    current + (target - current) * factor
}

/// Expansion factor the cloud is pulled toward for this sample
pub fn target_scale(hand: &HandSample) -> f32 {
    if !hand.detected {
        return REST_SCALE;
    }
    match hand.gesture {
        Some(Gesture::Closed) => CLOSED_SCALE,
        Some(Gesture::Open) => OPEN_SCALE,
        Some(Gesture::Neutral) | None => REST_SCALE,
    }
}

/// Push radius for a hand at depth `z`; widens as the hand moves away from
/// the camera and never shrinks below `base` when it comes closer
pub fn interaction_radius(base: f32, z: f32) -> f32 {
    (base + (-z).max(0.0) * DEPTH_RADIUS_GAIN).clamp(MIN_INTERACTION_RADIUS, MAX_INTERACTION_RADIUS)
}

/// Rotational velocity, x = pitch and y = yaw, in radians per frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Momentum(Vec2);

impl Momentum {
    pub const ZERO: Self = Self(Vec2::ZERO);

    pub fn new(pitch: f32, yaw: f32) -> Self {
        Self(Vec2::new(pitch, yaw))
    }

    pub fn as_vec2(self) -> Vec2 {
        self.0
    }

    pub fn length(self) -> f32 {
        self.0.length()
    }

    /// Target momentum for a hand that moved by `velocity` in scene units.
    /// Horizontal motion drives pitch (inverted), vertical motion drives yaw.
    pub fn from_hand_velocity(velocity: Vec2) -> Self {
        Self(Vec2::new(-velocity.x, velocity.y) * VELOCITY_SENSITIVITY)
    }

    pub fn blend_toward(&mut self, target: Momentum) {
        self.0 += (target.0 - self.0) * MOMENTUM_BLEND;
    }

    /// One frame of friction
    pub fn decay(&mut self) {
        self.0 *= FRICTION;
        if self.0.length() < MOMENTUM_SNAP {
            self.0 = Vec2::ZERO;
        }
    }

    pub fn clamp(&mut self) {
        self.0 = self.0.clamp_length_max(MAX_MOMENTUM);
    }
}

/// Values handed to the shader for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionFrame {
    pub scale: f32,
    pub model: Mat4,
    /// Smoothed hand position in the cloud's local frame
    pub hand_local: Vec3,
    pub radius: f32,
    pub hand_active: bool,
}

/// Smoothing state carried from frame to frame
#[derive(Debug, Clone)]
pub struct MotionState {
    scale: f32,
    momentum: Momentum,
    /// Accumulated pitch (x) and yaw (y)
    rotation: Vec2,
    previous_hand: Option<Vec2>,
    hand_local: Vec3,
    radius: f32,
}

impl MotionState {
    pub fn new(base_radius: f32) -> Self {
        Self {
            scale: REST_SCALE,
            momentum: Momentum::ZERO,
            rotation: Vec2::ZERO,
            previous_hand: None,
            hand_local: Vec3::ZERO,
            radius: base_radius,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn momentum(&self) -> Momentum {
        self.momentum
    }

    fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, 0.0)
    }

    /// Advance one frame with the current hand sample
    pub fn step(&mut self, hand: &HandSample, base_radius: f32) -> MotionFrame {
        self.scale = lerp(self.scale, target_scale(hand), SCALE_BLEND);

        if hand.detected {
            let current = hand.position.truncate();
            let velocity = self
                .previous_hand
                .map_or(Vec2::ZERO, |previous| current - previous);
            self.previous_hand = Some(current);
            self.momentum
                .blend_toward(Momentum::from_hand_velocity(velocity));
        } else {
            self.momentum.decay();
            self.previous_hand = None;
        }

        self.momentum.clamp();
        self.rotation += self.momentum.as_vec2();

        let orientation = self.orientation();
        if hand.detected {
            let local = orientation.inverse() * hand.position;
            self.hand_local = self.hand_local.lerp(local, HAND_BLEND);
            self.radius = lerp(
                self.radius,
                interaction_radius(base_radius, hand.position.z),
                HAND_BLEND,
            );
        }

        MotionFrame {
            scale: self.scale,
            model: Mat4::from_quat(orientation),
            hand_local: self.hand_local,
            radius: self.radius,
            hand_active: hand.detected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand_at(x: f32, y: f32, z: f32, gesture: Gesture) -> HandSample {
        HandSample::detected(Vec3::new(x, y, z), gesture)
    }

    #[test]
    fn test_target_scale_per_gesture() {
        assert_eq!(target_scale(&HandSample::NONE), REST_SCALE);
        assert_eq!(target_scale(&hand_at(0.0, 0.0, 0.0, Gesture::Open)), OPEN_SCALE);
        assert_eq!(target_scale(&hand_at(0.0, 0.0, 0.0, Gesture::Closed)), CLOSED_SCALE);
        assert_eq!(target_scale(&hand_at(0.0, 0.0, 0.0, Gesture::Neutral)), REST_SCALE);
    }

    #[test]
    fn test_scale_fixed_point_is_stable() {
        for target in [CLOSED_SCALE, REST_SCALE, OPEN_SCALE] {
            assert_eq!(lerp(target, target, SCALE_BLEND), target);
        }

        let mut state = MotionState::new(2.5);
        for _ in 0..10 {
            let frame = state.step(&HandSample::NONE, 2.5);
            assert_eq!(frame.scale, REST_SCALE);
        }
    }

    #[test]
    fn test_gesture_sequence_scale_trajectory() {
        let samples = [
            HandSample::NONE,
            hand_at(0.0, 0.0, 0.0, Gesture::Open),
            hand_at(0.0, 0.0, 0.0, Gesture::Open),
            hand_at(0.0, 0.0, 0.0, Gesture::Closed),
            HandSample::NONE,
        ];
        let targets = [1.0, 1.3, 1.3, 0.4, 1.0];

        let mut state = MotionState::new(2.5);
        let mut expected = REST_SCALE;
        for (sample, target) in samples.iter().zip(targets) {
            expected += (target - expected) * 0.12;
            let frame = state.step(sample, 2.5);
            assert!(
                (frame.scale - expected).abs() < 1e-6,
                "scale {} != {}",
                frame.scale,
                expected
            );
        }
        // Open pulls up, closed pulls down, release pulls back toward rest
        assert!(state.scale() < 1.0);
    }

    #[test]
    fn test_momentum_never_exceeds_max() {
        let mut state = MotionState::new(2.5);
        for i in 0..50 {
            let x = if i % 2 == 0 { -500.0 } else { 500.0 };
            state.step(&hand_at(x, x * 0.5, 0.0, Gesture::Neutral), 2.5);
            assert!(state.momentum().length() <= MAX_MOMENTUM + 1e-6);
        }

        let mut momentum = Momentum::new(3.0, -4.0);
        momentum.clamp();
        assert!((momentum.length() - MAX_MOMENTUM).abs() < 1e-6);
    }

    #[test]
    fn test_hand_motion_direction() {
        let mut state = MotionState::new(2.5);
        state.step(&hand_at(0.0, 0.0, 0.0, Gesture::Neutral), 2.5);
        state.step(&hand_at(0.1, 0.0, 0.0, Gesture::Neutral), 2.5);
        let momentum = state.momentum().as_vec2();
        assert!(momentum.x < 0.0, "moving right pitches negative");
        assert_eq!(momentum.y, 0.0);

        let expected = -0.1 * VELOCITY_SENSITIVITY * MOMENTUM_BLEND;
        assert!((momentum.x - expected).abs() < 1e-6);
    }

    #[test]
    fn test_first_detection_has_no_velocity() {
        let mut state = MotionState::new(2.5);
        state.step(&hand_at(3.0, 2.0, 0.0, Gesture::Open), 2.5);
        assert_eq!(state.momentum(), Momentum::ZERO);
    }

    #[test]
    fn test_momentum_decays_to_zero_without_hand() {
        let mut state = MotionState::new(2.5);
        state.step(&hand_at(0.0, 0.0, 0.0, Gesture::Neutral), 2.5);
        for i in 1..40 {
            state.step(&hand_at(i as f32 * 0.5, 0.0, 0.0, Gesture::Neutral), 2.5);
        }
        let mut last = state.momentum().length();
        assert!(last > 0.0);

        // Worst case: MAX_MOMENTUM * FRICTION^n < MOMENTUM_SNAP
        let bound = ((MOMENTUM_SNAP / MAX_MOMENTUM).ln() / FRICTION.ln()).ceil() as usize + 1;
        let mut frames = 0;
        while state.momentum().length() > 0.0 {
            state.step(&HandSample::NONE, 2.5);
            let length = state.momentum().length();
            assert!(length < last);
            last = length;
            frames += 1;
            assert!(frames <= bound, "momentum still {} after {} frames", length, frames);
        }
        assert_eq!(state.momentum(), Momentum::ZERO);
    }

    #[test]
    fn test_interaction_radius_widens_away_from_camera() {
        assert_eq!(interaction_radius(2.5, 0.0), 2.5);
        assert_eq!(interaction_radius(2.5, 1.0), 2.5);
        assert!((interaction_radius(2.5, -2.0) - 3.5).abs() < 1e-6);
        assert_eq!(interaction_radius(2.5, -100.0), MAX_INTERACTION_RADIUS);
        assert_eq!(interaction_radius(0.1, 0.0), MIN_INTERACTION_RADIUS);
        // +z is toward the camera, so a nearer hand keeps the base radius
        let near = interaction_radius(2.5, 3.0);
        let far = interaction_radius(2.5, -3.0);
        assert!(far > near);
        assert_eq!(near, 2.5);
    }

    #[test]
    fn test_hand_values_smoothed() {
        let mut state = MotionState::new(2.5);
        let frame = state.step(&hand_at(5.0, 0.0, -2.0, Gesture::Neutral), 2.5);

        // No rotation yet, so local equals world
        assert!((frame.hand_local.x - 5.0 * HAND_BLEND).abs() < 1e-5);
        assert!((frame.hand_local.z + 2.0 * HAND_BLEND).abs() < 1e-5);
        assert!((frame.radius - lerp(2.5, 3.5, HAND_BLEND)).abs() < 1e-6);
        assert!(frame.hand_active);

        let frame = state.step(&HandSample::NONE, 2.5);
        assert!(!frame.hand_active);
    }

    #[test]
    fn test_hand_local_undoes_rotation() {
        let mut state = MotionState::new(2.5);
        state.rotation = Vec2::new(0.0, std::f32::consts::FRAC_PI_2);
        let hand = Vec3::new(1.0, 0.0, 0.0);
        for _ in 0..200 {
            state.step(&HandSample::detected(hand, Gesture::Neutral), 2.5);
        }
        let frame = state.step(&HandSample::detected(hand, Gesture::Neutral), 2.5);
        let world = frame.model.transform_point3(frame.hand_local);
        assert!((world - hand).length() < 1e-3, "{:?}", world);
    }
}
