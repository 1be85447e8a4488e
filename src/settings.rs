//! Runtime settings
//!
//! There are no configuration files. Everything that can be tuned comes from
//! environment variables, with built-in defaults for all of them.

use std::path::PathBuf;

/// Fixed remote location of the hand landmark model
pub const DEFAULT_MODEL_URL: &str = "https://github.com/opencv/opencv_zoo/raw/main/models/handpose_estimation_mediapipe/handpose_estimation_mediapipe_2023feb.onnx";
/// Fixed remote location of the palm detection model
pub const DEFAULT_PALM_MODEL_URL: &str = "https://github.com/opencv/opencv_zoo/raw/main/models/palm_detection_mediapipe/palm_detection_mediapipe_2023feb.onnx";

/// Default generative model name
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Requested camera resolution
pub const CAMERA_WIDTH: u32 = 320;
pub const CAMERA_HEIGHT: u32 = 240;

const ENV_API_KEY: &str = "GEMINI_API_KEY";
const ENV_GEMINI_MODEL: &str = "GESTURE_CLOUD_GEMINI_MODEL";
const ENV_CAMERA: &str = "GESTURE_CLOUD_CAMERA";
const ENV_MODEL_PATH: &str = "GESTURE_CLOUD_MODEL_PATH";
const ENV_MODEL_URL: &str = "GESTURE_CLOUD_MODEL_URL";
const ENV_PALM_MODEL_PATH: &str = "GESTURE_CLOUD_PALM_MODEL_PATH";
const ENV_PALM_MODEL_URL: &str = "GESTURE_CLOUD_PALM_MODEL_URL";

/// Application settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// API key for the generative text service
    pub api_key: Option<String>,
    /// Generative model name
    pub gemini_model: String,
    /// Camera index to open
    pub camera_index: u32,
    /// Local landmark model, skipping the download when set
    pub model_path: Option<PathBuf>,
    /// Where to fetch the landmark model from
    pub model_url: String,
    /// Local palm detection model, skipping the download when set
    pub palm_model_path: Option<PathBuf>,
    /// Where to fetch the palm detection model from
    pub palm_model_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            camera_index: 0,
            model_path: None,
            model_url: DEFAULT_MODEL_URL.to_string(),
            palm_model_path: None,
            palm_model_url: DEFAULT_PALM_MODEL_URL.to_string(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let camera_index = match non_empty(ENV_CAMERA) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                log::warn!("Ignoring invalid {}={:?}, using camera 0", ENV_CAMERA, raw);
                defaults.camera_index
            }),
            None => defaults.camera_index,
        };

        Self {
            api_key: non_empty(ENV_API_KEY),
            gemini_model: non_empty(ENV_GEMINI_MODEL).unwrap_or(defaults.gemini_model),
            camera_index,
            model_path: non_empty(ENV_MODEL_PATH).map(PathBuf::from),
            model_url: non_empty(ENV_MODEL_URL).unwrap_or(defaults.model_url),
            palm_model_path: non_empty(ENV_PALM_MODEL_PATH).map(PathBuf::from),
            palm_model_url: non_empty(ENV_PALM_MODEL_URL).unwrap_or(defaults.palm_model_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let settings = Settings::from_lookup(lookup(&[]));
        assert_eq!(settings, Settings::default());
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_reads_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "secret"),
            ("GESTURE_CLOUD_GEMINI_MODEL", "gemini-test"),
            ("GESTURE_CLOUD_CAMERA", "2"),
            ("GESTURE_CLOUD_MODEL_PATH", "/tmp/hand.onnx"),
            ("GESTURE_CLOUD_PALM_MODEL_URL", "https://example.com/palm.onnx"),
        ]));
        assert_eq!(settings.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.gemini_model, "gemini-test");
        assert_eq!(settings.camera_index, 2);
        assert_eq!(settings.model_path, Some(PathBuf::from("/tmp/hand.onnx")));
        assert_eq!(settings.model_url, DEFAULT_MODEL_URL);
        assert_eq!(settings.palm_model_path, None);
        assert_eq!(settings.palm_model_url, "https://example.com/palm.onnx");
    }

    #[test]
    fn test_invalid_camera_index_falls_back() {
        let settings = Settings::from_lookup(lookup(&[("GESTURE_CLOUD_CAMERA", "front")]));
        assert_eq!(settings.camera_index, 0);
    }

    #[test]
    fn test_blank_api_key_treated_as_missing() {
        let settings = Settings::from_lookup(lookup(&[("GEMINI_API_KEY", "  ")]));
        assert!(settings.api_key.is_none());
    }
}
