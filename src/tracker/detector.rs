//! Hand detection using ONNX Runtime
//!
//! Two MediaPipe-compatible models run per frame: the palm detector finds the
//! best palm on a letterboxed copy of the frame, then the landmark model runs
//! on an upright crop around that palm. Landmarks are mapped back to
//! frame-normalized coordinates. At most one hand is reported.

use std::path::Path;

use glam::Vec2;
use image::RgbaImage;
use ndarray::Array4;

use super::landmarks::{Hand, HandLandmark, LANDMARK_COUNT};
use super::palm::{decode_best_palm, palm_anchors, Letterbox, PalmDetection, PALM_INPUT_SIZE};
use super::roi::HandRoi;
use super::TrackerError;
use crate::camera::CameraFrame;

/// Landmark model input edge length in pixels
const LANDMARK_INPUT_SIZE: u32 = 224;
/// Presence score below which the crop counts as "no hand"
const PRESENCE_THRESHOLD: f32 = 0.5;

/// Anything that can find a hand in a camera frame
pub trait LandmarkDetector: Send {
    /// Detect at most one hand in the frame
    fn detect(&mut self, frame: &CameraFrame) -> Result<Option<Hand>, TrackerError>;
}

/// Palm detector plus landmark model, each in its own ONNX Runtime session
pub struct OnnxHandDetector {
    palm_detection: ort::session::Session,
    hand_landmark: ort::session::Session,
    anchors: Vec<Vec2>,
}

fn load_session(model_path: &Path) -> Result<ort::session::Session, TrackerError> {
    ort::session::Session::builder()
        .map_err(|e| TrackerError::Model(format!("failed to create session builder: {}", e)))?
        .with_intra_threads(2)
        .map_err(|e| TrackerError::Model(format!("failed to set threads: {}", e)))?
        .commit_from_file(model_path)
        .map_err(|e| TrackerError::Model(format!("failed to load {:?}: {}", model_path, e)))
}

/// Run a single-input model and copy out every f32 output in model order
fn run_model(session: &mut ort::session::Session, input: Array4<f32>) -> Result<Vec<Vec<f32>>, TrackerError> {
    let input_tensor = ort::value::Tensor::from_array(input)
        .map_err(|e| TrackerError::Inference(format!("failed to create tensor: {}", e)))?;

    let outputs = session
        .run(ort::inputs![input_tensor])
        .map_err(|e| TrackerError::Inference(format!("inference failed: {}", e)))?;

    let mut tensors = Vec::new();
    for (_name, value) in outputs.iter() {
        let (_shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| TrackerError::Inference(format!("failed to extract output: {}", e)))?;
        tensors.push(data.to_vec());
    }
    Ok(tensors)
}

/// NHWC float [0, 1] tensor from an RGBA image
fn to_nhwc(image: &RgbaImage) -> Result<Array4<f32>, TrackerError> {
    let (width, height) = image.dimensions();
    let input: Vec<f32> = image
        .pixels()
        .flat_map(|p| [p[0], p[1], p[2]])
        .map(|v| v as f32 / 255.0)
        .collect();

    Array4::from_shape_vec((1, height as usize, width as usize, 3), input)
        .map_err(|e| TrackerError::Inference(format!("failed to create input array: {}", e)))
}

fn frame_image(frame: &CameraFrame) -> Result<RgbaImage, TrackerError> {
    RgbaImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(|| {
        TrackerError::Inference(format!(
            "frame buffer does not match {}x{}",
            frame.width, frame.height
        ))
    })
}

impl OnnxHandDetector {
    /// Initialize ONNX Runtime and load both models
    pub fn load(palm_model: &Path, landmark_model: &Path) -> Result<Self, TrackerError> {
        ort::init()
            .with_name("GestureCloud")
            .commit()
            .map_err(|e| TrackerError::Model(format!("failed to initialize ORT: {}", e)))?;

        let palm_detection = load_session(palm_model)?;
        log::info!("Loaded palm detection model from {:?}", palm_model);
        let hand_landmark = load_session(landmark_model)?;
        log::info!("Loaded hand landmark model from {:?}", landmark_model);

        Ok(Self {
            palm_detection,
            hand_landmark,
            anchors: palm_anchors(),
        })
    }

    /// Letterboxed palm model input and the mapping back to the frame
    fn preprocess_palm(image: &RgbaImage) -> Result<(Array4<f32>, Letterbox), TrackerError> {
        let letterbox = Letterbox::new(image.width(), image.height(), PALM_INPUT_SIZE);
        let input = to_nhwc(&letterbox.apply(image))?;
        Ok((input, letterbox))
    }

    fn detect_palm(&mut self, image: &RgbaImage) -> Result<Option<PalmDetection>, TrackerError> {
        let (input, letterbox) = Self::preprocess_palm(image)?;
        let tensors = run_model(&mut self.palm_detection, input)?;

        let scores = tensors
            .iter()
            .find(|t| t.len() == self.anchors.len())
            .ok_or_else(|| TrackerError::Inference("palm model produced no scores".to_string()))?;
        let regressors = tensors
            .iter()
            .find(|t| t.len() > self.anchors.len() && t.len() % self.anchors.len() == 0)
            .ok_or_else(|| TrackerError::Inference("palm model produced no boxes".to_string()))?;

        decode_best_palm(regressors, scores, &self.anchors, &letterbox)
    }
}

impl LandmarkDetector for OnnxHandDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Result<Option<Hand>, TrackerError> {
        let image = frame_image(frame)?;
        let Some(palm) = self.detect_palm(&image)? else {
            return Ok(None);
        };
        log::trace!("Palm score {:.2} at {:?}", palm.score, palm.center);

        let roi = HandRoi::from_palm(&palm);
        let input = roi.crop(&image, LANDMARK_INPUT_SIZE);
        let tensors = run_model(&mut self.hand_landmark, input)?;
        decode_outputs(&tensors, &roi, frame.width, frame.height)
    }
}

/// Interpret raw landmark model outputs.
///
/// The first 63-value output holds landmarks in crop-pixel space, the first
/// single-value output holds the presence score. Landmarks are mapped
/// through `roi` back to coordinates normalized by the frame size; depth is
/// normalized by the frame width.
pub fn decode_outputs(
    tensors: &[Vec<f32>],
    roi: &HandRoi,
    frame_width: u32,
    frame_height: u32,
) -> Result<Option<Hand>, TrackerError> {
    let coords = tensors
        .iter()
        .find(|t| t.len() == LANDMARK_COUNT * 3)
        .ok_or_else(|| TrackerError::Inference("model produced no landmark output".to_string()))?;
    let score = tensors
        .iter()
        .find(|t| t.len() == 1)
        .map(|t| t[0])
        .ok_or_else(|| TrackerError::Inference("model produced no presence score".to_string()))?;

    if score < PRESENCE_THRESHOLD {
        return Ok(None);
    }

    let crop = LANDMARK_INPUT_SIZE as f32;
    let frame = Vec2::new(frame_width.max(1) as f32, frame_height.max(1) as f32);
    let mut hand = Hand {
        confidence: score,
        ..Hand::default()
    };
    for (landmark, xyz) in hand.landmarks.iter_mut().zip(coords.chunks_exact(3)) {
        let p = roi.to_frame(Vec2::new(xyz[0], xyz[1]) / crop) / frame;
        let z = xyz[2] / crop * roi.size / frame.x;
        *landmark = HandLandmark::new(p.x, p.y, z);
    }

    Ok(Some(hand))
}
