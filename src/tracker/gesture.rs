//! Gesture classification and landmark-to-scene mapping

use glam::Vec3;

use super::landmarks::{Hand, HandLandmark, FINGERS};
use crate::state::{Gesture, HandSample};

/// Horizontal extent of the scene mapping (x lands in roughly ±5)
pub const SCENE_SCALE_X: f32 = 10.0;
/// Vertical extent of the scene mapping (y lands in roughly ±4)
pub const SCENE_SCALE_Y: f32 = 8.0;
/// Depth scale; relative depth is inverted so reaching toward the camera is +z
pub const SCENE_SCALE_Z: f32 = 10.0;

/// A finger is folded when its tip is closer to the wrist than its PIP joint
pub fn is_folded(wrist: &HandLandmark, tip: &HandLandmark, pip: &HandLandmark) -> bool {
    tip.distance(wrist) < pip.distance(wrist)
}

/// Count folded fingers among index, middle, ring and pinky
pub fn count_folded(hand: &Hand) -> usize {
    let wrist = hand.wrist();
    FINGERS
        .iter()
        .filter(|&&(tip, pip)| is_folded(wrist, &hand.landmarks[tip], &hand.landmarks[pip]))
        .count()
}

/// Map a folded-finger count to a gesture
pub fn gesture_from_folded(folded: usize) -> Gesture {
    match folded {
        0..=1 => Gesture::Open,
        2..=3 => Gesture::Neutral,
        _ => Gesture::Closed,
    }
}

/// Classify a hand as open, neutral or closed
pub fn classify_gesture(hand: &Hand) -> Gesture {
    gesture_from_folded(count_folded(hand))
}

/// Map a normalized landmark into scene coordinates.
///
/// x is mirrored so the cloud follows the hand like a mirror image.
pub fn to_scene_position(landmark: &HandLandmark) -> Vec3 {
    Vec3::new(
        (0.5 - landmark.x) * SCENE_SCALE_X,
        (0.5 - landmark.y) * SCENE_SCALE_Y,
        -landmark.z * SCENE_SCALE_Z,
    )
}

/// Turn a detector result into the sample written to the store
pub fn sample_from_detection(hand: Option<&Hand>) -> HandSample {
    match hand {
        Some(hand) => HandSample::detected(to_scene_position(hand.index_tip()), classify_gesture(hand)),
        None => HandSample::NONE,
    }
}
