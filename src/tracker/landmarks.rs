//! Hand landmark layout
//!
//! 21 points per hand in the MediaPipe ordering. Coordinates are normalized to
//! the input image (x, y in [0, 1]) with z as depth relative to the wrist.

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

/// Number of landmarks per hand
pub const LANDMARK_COUNT: usize = 21;

/// (tip, pip) pairs for the four fingers that count toward the gesture.
/// The thumb folds sideways and is left out.
pub const FINGERS: [(usize, usize); 4] = [
    (INDEX_TIP, INDEX_PIP),
    (MIDDLE_TIP, MIDDLE_PIP),
    (RING_TIP, RING_PIP),
    (PINKY_TIP, PINKY_PIP),
];

/// Hand landmark (normalized coordinates)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HandLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl HandLandmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another landmark
    pub fn distance(&self, other: &HandLandmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Detected hand
#[derive(Clone, Debug)]
pub struct Hand {
    /// 21 landmarks
    pub landmarks: [HandLandmark; LANDMARK_COUNT],
    /// Presence score reported by the model
    pub confidence: f32,
}

impl Default for Hand {
    fn default() -> Self {
        Self {
            landmarks: [HandLandmark::default(); LANDMARK_COUNT],
            confidence: 0.0,
        }
    }
}

impl Hand {
    pub fn wrist(&self) -> &HandLandmark {
        &self.landmarks[WRIST]
    }

    pub fn index_tip(&self) -> &HandLandmark {
        &self.landmarks[INDEX_TIP]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = HandLandmark::new(0.0, 0.0, 0.0);
        let b = HandLandmark::new(3.0, 4.0, 0.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_fingers_exclude_thumb() {
        assert!(FINGERS.iter().all(|&(tip, pip)| tip != THUMB_TIP && pip < tip));
    }
}
