//! Gesture Cloud - a hand- and prompt-driven GPU particle cloud
//!
//! A webcam hand tracker steers a point cloud rendered with wgpu: moving the
//! hand spins the cloud, opening and closing it expands and contracts it, and
//! nearby points are pushed away from the fingertip. Free-text prompts are
//! turned into colors and motion parameters by a generative text service.

pub mod app;
pub mod appearance;
pub mod camera;
pub mod generator;
pub mod renderer;
pub mod settings;
pub mod state;
pub mod tracker;
pub mod ui;

pub use app::{App, AppError};
pub use appearance::{AppearanceConfig, AppearanceUpdate, Rgb};
pub use settings::Settings;
pub use state::{Gesture, HandSample, StateStore, TrackerStatus};
