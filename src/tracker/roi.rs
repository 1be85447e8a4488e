//! Rotated hand crop
//!
//! The landmark model expects an upright, hand-centered square. The crop is
//! derived from the palm: rotated so the wrist-to-middle-finger axis points
//! up, shifted toward the fingers and enlarged to cover the whole hand.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::Vec2;
use image::RgbaImage;
use ndarray::Array4;

use super::palm::{PalmDetection, MIDDLE_BASE_KEYPOINT, WRIST_KEYPOINT};

/// Shift toward the fingers, as a fraction of the palm box height
const SHIFT_Y: f32 = -0.5;
/// Crop edge relative to the longer palm box side
const ENLARGE: f32 = 2.6;

/// Wrap an angle into [-PI, PI)
fn normalize_angle(angle: f32) -> f32 {
    angle - TAU * ((angle + PI) / TAU).floor()
}

/// Square crop region in frame pixels, rotated by `rotation` radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandRoi {
    pub center: Vec2,
    pub size: f32,
    pub rotation: f32,
}

impl HandRoi {
    pub fn from_palm(palm: &PalmDetection) -> Self {
        let wrist = palm.keypoints[WRIST_KEYPOINT];
        let middle = palm.keypoints[MIDDLE_BASE_KEYPOINT];
        // Image y points down; an upright hand has rotation 0
        let rotation = normalize_angle(FRAC_PI_2 - (wrist.y - middle.y).atan2(middle.x - wrist.x));
        let shift = Vec2::from_angle(rotation).rotate(Vec2::new(0.0, SHIFT_Y * palm.size.y));

        Self {
            center: palm.center + shift,
            size: palm.size.max_element() * ENLARGE,
            rotation,
        }
    }

    /// Normalized crop coordinates (y down) to frame pixels
    pub fn to_frame(&self, uv: Vec2) -> Vec2 {
        let local = (uv - Vec2::splat(0.5)) * self.size;
        self.center + Vec2::from_angle(self.rotation).rotate(local)
    }

    /// Sample the region into an NHWC float tensor in [0, 1]; area outside
    /// the frame is black
    pub fn crop(&self, image: &RgbaImage, output_size: u32) -> Array4<f32> {
        let n = output_size as usize;
        let mut input = Array4::<f32>::zeros((1, n, n, 3));
        for row in 0..n {
            for col in 0..n {
                let uv = Vec2::new((col as f32 + 0.5) / n as f32, (row as f32 + 0.5) / n as f32);
                if let Some(rgb) = sample_bilinear(image, self.to_frame(uv)) {
                    for (c, value) in rgb.into_iter().enumerate() {
                        input[[0, row, col, c]] = value;
                    }
                }
            }
        }
        input
    }
}

/// Bilinear RGB sample at pixel coordinates `p` (pixel centers at +0.5)
fn sample_bilinear(image: &RgbaImage, p: Vec2) -> Option<[f32; 3]> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    if p.x < 0.0 || p.y < 0.0 || p.x >= width as f32 || p.y >= height as f32 {
        return None;
    }

    let x = (p.x - 0.5).clamp(0.0, (width - 1) as f32);
    let y = (p.y - 0.5).clamp(0.0, (height - 1) as f32);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(width - 1), (y0 + 1).min(height - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let (a, b) = (image.get_pixel(x0, y0), image.get_pixel(x1, y0));
    let (c, d) = (image.get_pixel(x0, y1), image.get_pixel(x1, y1));
    let mut rgb = [0.0; 3];
    for (i, out) in rgb.iter_mut().enumerate() {
        let top = a[i] as f32 * (1.0 - fx) + b[i] as f32 * fx;
        let bottom = c[i] as f32 * (1.0 - fx) + d[i] as f32 * fx;
        *out = (top * (1.0 - fy) + bottom * fy) / 255.0;
    }
    Some(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::palm::PALM_KEYPOINTS;

    fn palm(wrist: Vec2, middle: Vec2) -> PalmDetection {
        let mut keypoints = [wrist; PALM_KEYPOINTS];
        keypoints[MIDDLE_BASE_KEYPOINT] = middle;
        PalmDetection {
            score: 0.9,
            center: Vec2::new(100.0, 100.0),
            size: Vec2::new(40.0, 40.0),
            keypoints,
        }
    }

    #[test]
    fn test_upright_hand_has_no_rotation() {
        let roi = HandRoi::from_palm(&palm(Vec2::new(100.0, 120.0), Vec2::new(100.0, 80.0)));
        assert!(roi.rotation.abs() < 1e-6);
        assert!((roi.size - 104.0).abs() < 1e-4);
        // Shifted up toward the fingers
        assert!((roi.center - Vec2::new(100.0, 80.0)).length() < 1e-4);
    }

    #[test]
    fn test_hand_pointing_right_rotates_quarter_turn() {
        let roi = HandRoi::from_palm(&palm(Vec2::new(80.0, 100.0), Vec2::new(120.0, 100.0)));
        assert!((roi.rotation - FRAC_PI_2).abs() < 1e-5);
        // Shift follows the fingers to the right
        assert!((roi.center - Vec2::new(120.0, 100.0)).length() < 1e-3);
        // Top of the crop points along the fingers
        let top = roi.to_frame(Vec2::new(0.5, 0.0));
        assert!(top.x > roi.center.x + 50.0);
        assert!((top.y - roi.center.y).abs() < 1e-3);
    }

    #[test]
    fn test_normalize_angle_range() {
        assert!((normalize_angle(3.0 * PI / 2.0) + FRAC_PI_2).abs() < 1e-5);
        assert!((normalize_angle(-3.0 * PI / 2.0) - FRAC_PI_2).abs() < 1e-5);
        assert!((normalize_angle(0.25) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_axis_aligned_crop_copies_pixels() {
        let mut image = RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 0, 255]));
        image.put_pixel(2, 5, image::Rgba([255, 128, 0, 255]));
        let roi = HandRoi {
            center: Vec2::new(4.0, 4.0),
            size: 8.0,
            rotation: 0.0,
        };
        let input = roi.crop(&image, 8);
        assert_eq!(input.shape(), &[1, 8, 8, 3]);
        assert!((input[[0, 5, 2, 0]] - 1.0).abs() < 1e-6);
        assert!((input[[0, 5, 2, 1]] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(input[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_crop_outside_frame_is_black() {
        let image = RgbaImage::from_pixel(8, 8, image::Rgba([255, 255, 255, 255]));
        let roi = HandRoi {
            center: Vec2::new(8.0, 4.0),
            size: 8.0,
            rotation: 0.0,
        };
        let input = roi.crop(&image, 8);
        assert!(input[[0, 4, 1, 0]] > 0.99);
        assert_eq!(input[[0, 4, 6, 0]], 0.0);
    }
}
