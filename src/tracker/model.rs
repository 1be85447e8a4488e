//! Model asset resolution
//!
//! The palm detection and hand landmark models live at fixed remote
//! locations. Each is downloaded once into the user cache directory and
//! reused on later runs.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::TrackerError;
use crate::settings::Settings;

const CACHE_SUBDIR: &str = "gesture-cloud/models";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CHUNK_SIZE: usize = 64 * 1024;

/// Where a model file comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A file the user pointed at explicitly
    Local(PathBuf),
    /// Remote asset cached under `cache_path`
    Remote { url: String, cache_path: PathBuf },
}

impl ModelSource {
    /// Landmark model source from settings
    pub fn landmark(settings: &Settings) -> Result<Self, TrackerError> {
        Self::new(settings.model_path.as_deref(), &settings.model_url)
    }

    /// Palm detection model source from settings
    pub fn palm(settings: &Settings) -> Result<Self, TrackerError> {
        Self::new(settings.palm_model_path.as_deref(), &settings.palm_model_url)
    }

    /// A local override wins; otherwise the URL is cached under the user
    /// cache directory
    pub fn new(local: Option<&Path>, url: &str) -> Result<Self, TrackerError> {
        if let Some(path) = local {
            return Ok(Self::Local(path.to_path_buf()));
        }

        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| TrackerError::Model("no cache directory available".to_string()))?;
        Ok(Self::Remote {
            url: url.to_string(),
            cache_path: cache_dir.join(CACHE_SUBDIR).join(file_name_for(url)),
        })
    }

    /// Return a local path to the model, downloading it if needed.
    ///
    /// A download is abandoned with [`TrackerError::Cancelled`] as soon as
    /// `running` goes false.
    pub fn resolve(&self, running: &AtomicBool) -> Result<PathBuf, TrackerError> {
        match self {
            Self::Local(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(TrackerError::Model(format!(
                        "model file not found: {}",
                        path.display()
                    )))
                }
            }
            Self::Remote { url, cache_path } => {
                if cache_path.is_file() {
                    log::info!("Using cached landmark model {:?}", cache_path);
                    return Ok(cache_path.clone());
                }
                download(url, cache_path, running)?;
                Ok(cache_path.clone())
            }
        }
    }
}

/// Last path segment of the URL, without query string
fn file_name_for(url: &str) -> String {
    url.split('?')
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("hand_landmark.onnx")
        .to_string()
}

fn download_error(e: reqwest::Error) -> TrackerError {
    TrackerError::Model(format!("download failed: {}", e))
}

/// Download `url` to `dest`, writing to a temporary file first so a partial
/// download never looks like a valid cache entry.
fn download(url: &str, dest: &Path, running: &AtomicBool) -> Result<(), TrackerError> {
    log::info!("Downloading landmark model from {}", url);

    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(download_error)?;
    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(download_error)?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = dest.with_extension("part");
    let copied = {
        let mut file = fs::File::create(&tmp)?;
        copy_until_stopped(&mut response, &mut file, running).and_then(|n| {
            file.sync_all()?;
            Ok(n)
        })
    };
    let written = match copied {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    };
    fs::rename(&tmp, dest)?;

    log::info!("Saved landmark model ({} bytes) to {:?}", written, dest);
    Ok(())
}

/// Copy `reader` into `writer` in chunks, checking `running` between chunks
fn copy_until_stopped<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    running: &AtomicBool,
) -> Result<u64, TrackerError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        if !running.load(Ordering::Acquire) {
            return Err(TrackerError::Cancelled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TrackerError::Model(format!("download failed: {}", e))),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_for_url() {
        assert_eq!(
            file_name_for("https://example.com/models/hand.onnx?download=1"),
            "hand.onnx"
        );
        assert_eq!(file_name_for("https://example.com/"), "hand_landmark.onnx");
    }

    #[test]
    fn test_local_source_preferred() {
        let settings = Settings {
            model_path: Some(PathBuf::from("/opt/models/hand.onnx")),
            palm_model_path: Some(PathBuf::from("/opt/models/palm.onnx")),
            ..Settings::default()
        };
        assert_eq!(
            ModelSource::landmark(&settings).unwrap(),
            ModelSource::Local(PathBuf::from("/opt/models/hand.onnx"))
        );
        assert_eq!(
            ModelSource::palm(&settings).unwrap(),
            ModelSource::Local(PathBuf::from("/opt/models/palm.onnx"))
        );
    }

    #[test]
    fn test_remote_sources_cache_separately() {
        let settings = Settings::default();
        // No cache directory on some CI sandboxes
        let (Ok(landmark), Ok(palm)) = (ModelSource::landmark(&settings), ModelSource::palm(&settings)) else {
            return;
        };
        match (landmark, palm) {
            (
                ModelSource::Remote { cache_path: a, .. },
                ModelSource::Remote { cache_path: b, .. },
            ) => {
                assert_ne!(a, b);
                assert!(b.ends_with("palm_detection_mediapipe_2023feb.onnx"));
            }
            other => panic!("expected remote sources, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_local_model_is_an_error() {
        let source = ModelSource::Local(PathBuf::from("/definitely/not/here.onnx"));
        let running = AtomicBool::new(true);
        assert!(matches!(source.resolve(&running), Err(TrackerError::Model(_))));
    }

    /// Reader that clears the flag after handing out its first chunk
    struct StopAfterFirstChunk<'a> {
        running: &'a AtomicBool,
        reads: usize,
    }

    impl Read for StopAfterFirstChunk<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            self.running.store(false, Ordering::Release);
            buf[0] = 7;
            Ok(1)
        }
    }

    #[test]
    fn test_copy_finishes_when_running() {
        let mut reader = std::io::Cursor::new(vec![1u8; CHUNK_SIZE * 2 + 5]);
        let mut out = Vec::new();
        let copied = copy_until_stopped(&mut reader, &mut out, &AtomicBool::new(true)).unwrap();
        assert_eq!(copied, (CHUNK_SIZE * 2 + 5) as u64);
        assert_eq!(out.len(), CHUNK_SIZE * 2 + 5);
    }

    #[test]
    fn test_copy_stops_between_chunks() {
        let running = AtomicBool::new(true);
        let mut reader = StopAfterFirstChunk {
            running: &running,
            reads: 0,
        };
        let mut out = Vec::new();
        let result = copy_until_stopped(&mut reader, &mut out, &running);
        assert!(matches!(result, Err(TrackerError::Cancelled)));
        assert_eq!(reader.reads, 1);
        assert_eq!(out, vec![7]);
    }

    #[test]
    fn test_cached_remote_model_skips_download() {
        let dir = std::env::temp_dir().join(format!("gesture-cloud-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let cache_path = dir.join("hand.onnx");
        fs::write(&cache_path, b"model").unwrap();

        let source = ModelSource::Remote {
            url: "http://127.0.0.1:9/unreachable.onnx".to_string(),
            cache_path: cache_path.clone(),
        };
        assert_eq!(source.resolve(&AtomicBool::new(true)).unwrap(), cache_path);

        fs::remove_dir_all(&dir).unwrap();
    }
}
