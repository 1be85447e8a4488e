//! Palm detection decoding
//!
//! The palm model is an SSD-style detector: every anchor on two feature grids
//! predicts a score plus a box and seven palm keypoints relative to the
//! anchor center. Only the single best palm is kept.

use glam::Vec2;
use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::TrackerError;

/// Palm model input edge length in pixels
pub const PALM_INPUT_SIZE: u32 = 192;
/// Keypoints predicted per palm
pub const PALM_KEYPOINTS: usize = 7;
/// Palm keypoint at the center of the wrist
pub const WRIST_KEYPOINT: usize = 0;
/// Palm keypoint at the base of the middle finger
pub const MIDDLE_BASE_KEYPOINT: usize = 2;

/// Box (4) plus keypoints (2 each) per anchor
const VALUES_PER_ANCHOR: usize = 4 + PALM_KEYPOINTS * 2;
/// Sigmoid score below which a palm is ignored
const PALM_SCORE_THRESHOLD: f32 = 0.5;
/// (grid size, anchors per cell) for the stride 8 and stride 16 layers
const ANCHOR_LAYERS: [(u32, usize); 2] = [(24, 2), (12, 6)];

/// Anchor centers in normalized input coordinates, in model output order
pub fn palm_anchors() -> Vec<Vec2> {
    let mut anchors = Vec::new();
    for (grid, per_cell) in ANCHOR_LAYERS {
        for y in 0..grid {
            for x in 0..grid {
                let center = Vec2::new(
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                );
                anchors.extend(std::iter::repeat(center).take(per_cell));
            }
        }
    }
    anchors
}

/// Aspect-preserving fit of a frame into the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Input pixels per frame pixel
    scale: f32,
    /// Offset of the frame content inside the input, in input pixels
    pad: Vec2,
    input_size: f32,
    content: (u32, u32),
}

impl Letterbox {
    pub fn new(width: u32, height: u32, input_size: u32) -> Self {
        let scale = input_size as f32 / width.max(height).max(1) as f32;
        let content_w = ((width as f32 * scale).round() as u32).clamp(1, input_size);
        let content_h = ((height as f32 * scale).round() as u32).clamp(1, input_size);
        Self {
            scale,
            pad: Vec2::new(
                ((input_size - content_w) / 2) as f32,
                ((input_size - content_h) / 2) as f32,
            ),
            input_size: input_size as f32,
            content: (content_w, content_h),
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Normalized input coordinates to frame pixels
    pub fn to_frame(&self, normalized: Vec2) -> Vec2 {
        (normalized * self.input_size - self.pad) / self.scale
    }

    /// Frame pixels to normalized input coordinates
    pub fn to_input(&self, frame: Vec2) -> Vec2 {
        (frame * self.scale + self.pad) / self.input_size
    }

    /// Resize `image` into a black square input image
    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        let size = self.input_size as u32;
        let mut canvas = RgbaImage::from_pixel(size, size, image::Rgba([0, 0, 0, 255]));
        let resized = imageops::resize(image, self.content.0, self.content.1, FilterType::Triangle);
        imageops::replace(&mut canvas, &resized, self.pad.x as i64, self.pad.y as i64);
        canvas
    }
}

/// Best palm found in a frame, in frame pixels
#[derive(Debug, Clone, PartialEq)]
pub struct PalmDetection {
    pub score: f32,
    pub center: Vec2,
    pub size: Vec2,
    pub keypoints: [Vec2; PALM_KEYPOINTS],
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-100.0, 100.0)).exp())
}

/// Pick the highest scoring anchor and decode its box and keypoints.
///
/// `regressors` holds `VALUES_PER_ANCHOR` values per anchor in input pixels,
/// `scores` one raw logit per anchor.
pub fn decode_best_palm(
    regressors: &[f32],
    scores: &[f32],
    anchors: &[Vec2],
    letterbox: &Letterbox,
) -> Result<Option<PalmDetection>, TrackerError> {
    if scores.len() != anchors.len() || regressors.len() != anchors.len() * VALUES_PER_ANCHOR {
        return Err(TrackerError::Inference(format!(
            "palm output sizes {}/{} do not match {} anchors",
            regressors.len(),
            scores.len(),
            anchors.len()
        )));
    }

    let best = scores
        .iter()
        .map(|&logit| sigmoid(logit))
        .enumerate()
        .filter(|&(_, score)| score >= PALM_SCORE_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1));
    let Some((index, score)) = best else {
        return Ok(None);
    };

    let raw = &regressors[index * VALUES_PER_ANCHOR..(index + 1) * VALUES_PER_ANCHOR];
    let anchor = anchors[index];
    let input_size = PALM_INPUT_SIZE as f32;
    let at = |dx: f32, dy: f32| letterbox.to_frame(anchor + Vec2::new(dx, dy) / input_size);

    let mut keypoints = [Vec2::ZERO; PALM_KEYPOINTS];
    for (k, keypoint) in keypoints.iter_mut().enumerate() {
        *keypoint = at(raw[4 + k * 2], raw[5 + k * 2]);
    }

    Ok(Some(PalmDetection {
        score,
        center: at(raw[0], raw[1]),
        size: Vec2::new(raw[2], raw[3]) / letterbox.scale(),
        keypoints,
    }))
}
