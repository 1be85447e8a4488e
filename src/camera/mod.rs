//! Camera capture module
//!
//! Provides cross-platform camera capture using the nokhwa crate.
//! Captures frames on a background thread, keeps the latest frame for the
//! preview panel and pushes every frame to an optional consumer channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use parking_lot::Mutex;
use thiserror::Error;

/// How long to wait for the capture thread to report that the device opened
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
/// First retry delay after a failed frame grab; doubles per failure
const RETRY_BASE_DELAY: Duration = Duration::from_millis(10);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(1);
/// Consecutive failed grabs after which the device is considered gone
const MAX_CONSECUTIVE_FAILURES: u32 = 20;

/// Camera failures
#[derive(Debug, Error)]
pub enum CameraError {
    /// The device could not be opened (missing, busy or permission denied)
    #[error("could not open camera {index}: {reason}")]
    Open { index: u32, reason: String },
    /// The device opened but refused to stream
    #[error("could not start camera stream: {0}")]
    Stream(String),
    /// The capture thread never reported back
    #[error("camera did not respond within {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The device stopped delivering frames mid-session
    #[error("camera disconnected")]
    Disconnected,
}

/// Retry schedule for failed frame grabs
#[derive(Debug, Default)]
struct CaptureBackoff {
    failures: u32,
}

impl CaptureBackoff {
    /// Record a failure; returns the delay before the next attempt, or `None`
    /// once the device should be given up on
    fn fail(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= MAX_CONSECUTIVE_FAILURES {
            return None;
        }
        let delay = RETRY_BASE_DELAY.saturating_mul(1 << (self.failures - 1).min(16));
        Some(delay.min(RETRY_MAX_DELAY))
    }

    fn succeed(&mut self) {
        self.failures = 0;
    }

    fn failures(&self) -> u32 {
        self.failures
    }
}


/// Camera frame data
#[derive(Clone)]
pub struct CameraFrame {
    /// RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame number, starting at 1
    pub frame_number: u64,
}

/// Shared slot holding the most recent frame
///
/// Cloning the slot shares it; the capture thread overwrites it for every
/// frame and readers take a copy.
#[derive(Clone, Default)]
pub struct FrameSlot(Arc<Mutex<Option<CameraFrame>>>);

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the latest frame, if any has arrived
    pub fn latest(&self) -> Option<CameraFrame> {
        self.0.lock().clone()
    }

    /// Frame number of the latest frame without copying pixels
    pub fn latest_frame_number(&self) -> Option<u64> {
        self.0.lock().as_ref().map(|f| f.frame_number)
    }

    fn store(&self, frame: CameraFrame) {
        *self.0.lock() = Some(frame);
    }
}

/// Camera capture interface
pub struct CameraCapture {
    /// Whether capture is running
    running: Arc<AtomicBool>,
    /// Capture thread handle
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl CameraCapture {
    /// Open a camera and start capturing
    ///
    /// # Arguments
    /// * `camera_index` - The camera index to use (0 for default)
    /// * `width` - Requested frame width
    /// * `height` - Requested frame height
    /// * `latest` - Slot that receives every captured frame
    /// * `frame_sink` - Optional channel receiving every frame; frames are
    ///   dropped when the consumer falls behind
    ///
    /// Blocks until the device has opened or failed to open.
    pub fn open(
        camera_index: u32,
        width: u32,
        height: u32,
        latest: FrameSlot,
        frame_sink: Option<Sender<CameraFrame>>,
    ) -> Result<Self, CameraError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let running_clone = running.clone();

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                Self::capture_thread(
                    camera_index,
                    width,
                    height,
                    ready_tx,
                    frame_sink,
                    latest,
                    running_clone,
                );
            })?;

        let mut capture = Self {
            running,
            thread_handle: Some(thread_handle),
        };

        match Self::await_ready(&ready_rx) {
            Ok((actual_width, actual_height)) => {
                if (actual_width, actual_height) != (width, height) {
                    log::info!(
                        "Camera delivers {}x{} instead of the requested {}x{}",
                        actual_width,
                        actual_height,
                        width,
                        height
                    );
                }
                Ok(capture)
            }
            Err(e) => {
                capture.stop();
                Err(e)
            }
        }
    }

    fn await_ready(
        ready_rx: &Receiver<Result<(u32, u32), CameraError>>,
    ) -> Result<(u32, u32), CameraError> {
        ready_rx
            .recv_timeout(OPEN_TIMEOUT)
            .map_err(|_| CameraError::Timeout(OPEN_TIMEOUT))?
    }

    /// Open the device, preferring the requested resolution
    fn open_device(camera_index: u32, width: u32, height: u32) -> Result<Camera, CameraError> {
        let index = CameraIndex::Index(camera_index);

        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(width, height),
        ));

        match Camera::new(index.clone(), requested) {
            Ok(camera) => Ok(camera),
            Err(e) => {
                log::warn!(
                    "Failed to open camera at {}x{}: {:?}, trying any format",
                    width,
                    height,
                    e
                );

                let fallback = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::None);
                Camera::new(index, fallback).map_err(|e| CameraError::Open {
                    index: camera_index,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Camera capture thread
    fn capture_thread(
        camera_index: u32,
        width: u32,
        height: u32,
        ready: Sender<Result<(u32, u32), CameraError>>,
        frame_sink: Option<Sender<CameraFrame>>,
        latest: FrameSlot,
        running: Arc<AtomicBool>,
    ) {
        log::info!("Starting camera capture thread (camera {})", camera_index);

        let mut camera = match Self::open_device(camera_index, width, height) {
            Ok(c) => c,
            Err(e) => {
                log::error!("{}", e);
                let _ = ready.send(Err(e));
                return;
            }
        };

        if let Err(e) = camera.open_stream() {
            log::error!("Failed to open camera stream: {:?}", e);
            let _ = ready.send(Err(CameraError::Stream(e.to_string())));
            return;
        }

        let resolution = (camera.resolution().width(), camera.resolution().height());
        log::info!(
            "Camera opened: {} ({}x{})",
            camera.info().human_name(),
            resolution.0,
            resolution.1
        );
        let _ = ready.send(Ok(resolution));

        let mut frame_count: u64 = 0;
        let mut backoff = CaptureBackoff::default();
        while running.load(Ordering::Acquire) {
            let frame = match camera.frame() {
                Ok(frame) => {
                    if backoff.failures() > 0 {
                        log::info!("Camera recovered after {} failed frames", backoff.failures());
                    }
                    backoff.succeed();
                    frame
                }
                Err(e) => match backoff.fail() {
                    Some(delay) => {
                        if backoff.failures() == 1 {
                            log::warn!("Failed to capture frame: {:?}", e);
                        } else {
                            log::debug!("Failed to capture frame: {:?}", e);
                        }
                        std::thread::sleep(delay);
                        continue;
                    }
                    None => {
                        log::error!(
                            "Camera stopped delivering frames after {} attempts: {:?}",
                            backoff.failures(),
                            e
                        );
                        break;
                    }
                },
            };

            let image = match frame.decode_image::<RgbAFormat>() {
                Ok(image) => image,
                Err(e) => {
                    log::warn!("Failed to decode frame: {:?}", e);
                    continue;
                }
            };

            frame_count += 1;
            let camera_frame = CameraFrame {
                width: image.width(),
                height: image.height(),
                data: image.into_raw(),
                frame_number: frame_count,
            };

            if let Some(sink) = &frame_sink {
                match sink.try_send(camera_frame.clone()) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => {
                        log::debug!("Frame consumer went away");
                    }
                }
            }

            latest.store(camera_frame);
        }

        if let Err(e) = camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {:?}", e);
        }
        log::info!("Camera capture thread stopped");
    }

    /// Stop capturing and release the device
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
