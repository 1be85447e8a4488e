//! Hand tracking
//!
//! Camera frames flow from the capture thread into a bounded channel; the
//! tracker thread runs palm and landmark detection on each frame it gets to
//! and writes the derived hand sample into the shared store. Frames that arrive while a
//! detection is in progress are dropped, so slow inference never stalls
//! capture or rendering.

pub mod detector;
pub mod gesture;
pub mod landmarks;
pub mod model;
pub mod palm;
pub mod roi;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use thiserror::Error;

use crate::camera::{CameraCapture, CameraError, CameraFrame, FrameSlot};
use crate::settings::{Settings, CAMERA_HEIGHT, CAMERA_WIDTH};
use crate::state::{HandWriter, TrackerStatus};

pub use detector::{LandmarkDetector, OnnxHandDetector};
pub use gesture::{classify_gesture, count_folded, sample_from_detection, to_scene_position};
pub use landmarks::{Hand, HandLandmark};
pub use model::ModelSource;

/// Frames buffered between capture and detection
const FRAME_QUEUE_DEPTH: usize = 2;
/// How often the tracker loop re-checks its stop flag while idle
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Hand tracking failures
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("camera unavailable: {0}")]
    Camera(#[from] CameraError),
    #[error("hand model unavailable: {0}")]
    Model(String),
    #[error("hand detection failed: {0}")]
    Inference(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("hand tracking stopped during setup")]
    Cancelled,
}

/// Fail with `Cancelled` once the tracker has been asked to stop
fn ensure_running(running: &AtomicBool) -> Result<(), TrackerError> {
    if running.load(Ordering::Acquire) {
        Ok(())
    } else {
        Err(TrackerError::Cancelled)
    }
}

/// Running hand tracker
///
/// Dropping the tracker stops the camera, closes the frame channel and joins
/// the detection thread, which releases the model session. A thread still
/// inside camera or model setup is not waited for; it sees the stop flag as
/// soon as setup returns and cleans up on its own.
pub struct HandTracker {
    running: Arc<AtomicBool>,
    /// Set once setup finished and the detection loop is about to run
    ready: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
    preview: FrameSlot,
}

impl HandTracker {
    /// Start tracking with the camera and ONNX models named in `settings`.
    ///
    /// Returns immediately; camera and model setup happen on the tracker
    /// thread and failures are reported through the store's tracker status.
    pub fn start(settings: &Settings, writer: HandWriter) -> Result<Self, TrackerError> {
        let camera_index = settings.camera_index;
        let palm_source = ModelSource::palm(settings);
        let landmark_source = ModelSource::landmark(settings);

        Self::spawn(writer, move |preview, frames_tx, running| {
            let palm_path = palm_source?.resolve(running)?;
            ensure_running(running)?;
            let landmark_path = landmark_source?.resolve(running)?;
            ensure_running(running)?;
            let detector = OnnxHandDetector::load(&palm_path, &landmark_path)?;
            ensure_running(running)?;
            let camera = CameraCapture::open(
                camera_index,
                CAMERA_WIDTH,
                CAMERA_HEIGHT,
                preview,
                Some(frames_tx),
            )?;
            Ok((camera, detector))
        })
    }

    /// Spawn the tracker thread around a setup closure that produces the
    /// frame source and the detector.
    fn spawn<D, S>(writer: HandWriter, setup: S) -> Result<Self, TrackerError>
    where
        D: LandmarkDetector + 'static,
        S: FnOnce(
                FrameSlot,
                crossbeam_channel::Sender<CameraFrame>,
                &AtomicBool,
            ) -> Result<(CameraCapture, D), TrackerError>
            + Send
            + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let ready = Arc::new(AtomicBool::new(false));
        let preview = FrameSlot::new();

        let running_clone = running.clone();
        let ready_clone = ready.clone();
        let preview_clone = preview.clone();

        let thread_handle = std::thread::Builder::new()
            .name("hand-tracker".to_string())
            .spawn(move || {
                let (frames_tx, frames_rx) = crossbeam_channel::bounded(FRAME_QUEUE_DEPTH);
                let (camera, mut detector) = match setup(preview_clone, frames_tx, &running_clone) {
                    Ok(parts) => parts,
                    Err(_) if !running_clone.load(Ordering::Acquire) => {
                        log::info!("Hand tracking setup cancelled");
                        return;
                    }
                    Err(e) => {
                        log::error!("Hand tracking unavailable: {}", e);
                        writer.set_status(TrackerStatus::Failed(e.to_string()));
                        return;
                    }
                };
                if !running_clone.load(Ordering::Acquire) {
                    log::info!("Hand tracking stopped before it started");
                    return;
                }

                ready_clone.store(true, Ordering::Release);
                writer.set_status(TrackerStatus::Running);
                log::info!("Hand tracking started");

                let source_lost = Self::run(&frames_rx, &mut detector, &writer, &running_clone);

                drop(camera);
                writer.clear();
                if source_lost {
                    let e = TrackerError::Camera(CameraError::Disconnected);
                    log::error!("Hand tracking stopped: {}", e);
                    writer.set_status(TrackerStatus::Failed(e.to_string()));
                } else {
                    log::info!("Hand tracking stopped");
                }
            })?;

        Ok(Self {
            running,
            ready,
            thread_handle: Some(thread_handle),
            preview,
        })
    }

    /// Detection loop; returns when stopped or when the camera goes away.
    /// Returns `true` if the frame source disconnected while still running.
    fn run<D: LandmarkDetector>(
        frames: &Receiver<CameraFrame>,
        detector: &mut D,
        writer: &HandWriter,
        running: &AtomicBool,
    ) -> bool {
        while running.load(Ordering::Acquire) {
            let frame = match frames.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return true,
            };
            Self::process_frame(&frame, detector, writer);
        }
        false
    }

    /// Detect on one frame and publish the result
    fn process_frame<D: LandmarkDetector>(frame: &CameraFrame, detector: &mut D, writer: &HandWriter) {
        match detector.detect(frame) {
            Ok(hand) => writer.publish(sample_from_detection(hand.as_ref())),
            Err(e) => {
                log::warn!("Detection failed on frame {}: {}", frame.frame_number, e);
            }
        }
    }

    /// Latest camera frame for the preview panel
    pub fn preview(&self) -> &FrameSlot {
        &self.preview
    }

    /// Stop the tracker. Joins the thread once it is past setup; a thread
    /// still blocked in setup is detached instead of waited for.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        if self.ready.load(Ordering::Acquire) || handle.is_finished() {
            let _ = handle.join();
        } else {
            log::info!("Hand tracker still starting; it will exit when setup returns");
        }
    }
}

impl Drop for HandTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Gesture, StateStore};
    use std::collections::VecDeque;

    /// Detector that replays a fixed script of results
    struct ScriptedDetector {
        script: VecDeque<Result<Option<Hand>, TrackerError>>,
    }

    impl LandmarkDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &CameraFrame) -> Result<Option<Hand>, TrackerError> {
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    fn frame(n: u64) -> CameraFrame {
        CameraFrame {
            data: Vec::new(),
            width: 0,
            height: 0,
            frame_number: n,
        }
    }

    fn open_hand() -> Hand {
        let mut hand = Hand::default();
        hand.landmarks[landmarks::WRIST] = HandLandmark::new(0.5, 1.0, 0.0);
        for (i, &(tip, pip)) in landmarks::FINGERS.iter().enumerate() {
            let x = 0.4 + i as f32 * 0.05;
            hand.landmarks[pip] = HandLandmark::new(x, 0.7, 0.0);
            hand.landmarks[tip] = HandLandmark::new(x, 0.5, 0.0);
        }
        hand
    }

    #[test]
    fn test_process_frame_publishes_and_clears() {
        let (reader, writer, _config) = StateStore::default().split();
        let mut detector = ScriptedDetector {
            script: VecDeque::from(vec![Ok(Some(open_hand())), Ok(None)]),
        };

        HandTracker::process_frame(&frame(1), &mut detector, &writer);
        let sample = reader.hand();
        assert!(sample.detected);
        assert_eq!(sample.gesture, Some(Gesture::Open));

        HandTracker::process_frame(&frame(2), &mut detector, &writer);
        assert!(!reader.hand().detected);
        assert_eq!(reader.hand().gesture, None);
    }

    #[test]
    fn test_detection_error_keeps_previous_sample() {
        let (reader, writer, _config) = StateStore::default().split();
        let mut detector = ScriptedDetector {
            script: VecDeque::from(vec![
                Ok(Some(open_hand())),
                Err(TrackerError::Inference("boom".to_string())),
            ]),
        };

        HandTracker::process_frame(&frame(1), &mut detector, &writer);
        HandTracker::process_frame(&frame(2), &mut detector, &writer);
        assert!(reader.hand().detected);
    }

    #[test]
    fn test_run_exits_when_camera_disconnects() {
        let (reader, writer, _config) = StateStore::default().split();
        let (tx, rx) = crossbeam_channel::bounded(FRAME_QUEUE_DEPTH);
        let mut detector = ScriptedDetector {
            script: VecDeque::from(vec![Ok(Some(open_hand()))]),
        };
        tx.send(frame(1)).unwrap();
        drop(tx);

        let running = AtomicBool::new(true);
        assert!(HandTracker::run(&rx, &mut detector, &writer, &running));
        assert!(reader.hand().detected);
    }

    #[test]
    fn test_run_stopped_is_not_a_disconnect() {
        let (_reader, writer, _config) = StateStore::default().split();
        let (_tx, rx) = crossbeam_channel::bounded::<CameraFrame>(FRAME_QUEUE_DEPTH);
        let mut detector = ScriptedDetector {
            script: VecDeque::new(),
        };
        let running = AtomicBool::new(false);
        assert!(!HandTracker::run(&rx, &mut detector, &writer, &running));
    }

    #[test]
    fn test_setup_failure_reported_once() {
        let (reader, writer, _config) = StateStore::default().split();
        let status_rx = reader.subscribe(&[crate::state::StateChange::TrackerStatus]);

        let mut tracker = HandTracker::spawn::<ScriptedDetector, _>(writer, |_preview, _tx, _running| {
            Err(TrackerError::Camera(CameraError::Open {
                index: 0,
                reason: "permission denied".to_string(),
            }))
        })
        .unwrap();
        let first = status_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        tracker.stop();

        match reader.tracker_status() {
            TrackerStatus::Failed(message) => assert!(message.contains("permission denied")),
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(first, crate::state::StateChange::TrackerStatus);
        assert!(status_rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_does_not_wait_for_slow_setup() {
        let (reader, writer, _config) = StateStore::default().split();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        let mut tracker = HandTracker::spawn::<ScriptedDetector, _>(writer, move |_preview, _tx, _running| {
            // Blocks like a model download that ignores the stop flag
            std::thread::sleep(Duration::from_secs(3));
            let _ = done_tx.send(());
            Err(TrackerError::Model("download timed out".to_string()))
        })
        .unwrap();

        let started = std::time::Instant::now();
        tracker.stop();
        assert!(started.elapsed() < Duration::from_secs(1));

        // Once setup returns the thread notices the stop and reports nothing
        done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(reader.tracker_status(), TrackerStatus::Starting);
    }

    #[test]
    fn test_cooperative_setup_cancelled_by_stop() {
        let (reader, writer, _config) = StateStore::default().split();

        let mut tracker = HandTracker::spawn::<ScriptedDetector, _>(writer, |_preview, _tx, running| {
            while running.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(5));
            }
            ensure_running(running)?;
            unreachable!("setup continued after stop")
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let started = std::time::Instant::now();
        tracker.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(reader.tracker_status(), TrackerStatus::Starting);
    }
}
