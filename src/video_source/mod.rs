//! VideoSource - Capture Handle Abstraction
//!
//! ## Responsibilities
//!
//! - Open a remote video feed and pull decoded frames from it
//! - Report open failure and end-of-stream distinctly
//! - Release the underlying capture process when dropped
//!
//! The production implementation spawns ffmpeg reading RTSP and emitting an
//! MJPEG pipe on stdout. Workers only see the [`VideoSource`] trait, so
//! tests substitute scripted sources.

use crate::error::{Error, Result};
use async_trait::async_trait;
use image::RgbImage;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::timeout;

/// Default wait for the first frame before declaring open failure
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Stdout read chunk size
const READ_CHUNK: usize = 16 * 1024;
/// Upper bound on buffered bytes while scanning for one frame
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// An open capture handle
#[async_trait]
pub trait VideoSource: Send {
    /// Read the next decoded frame
    ///
    /// `Ok(None)` means the stream ended; `Err` means it failed. Both are
    /// terminal for the caller.
    async fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Factory for capture handles
#[async_trait]
pub trait SourceOpener: Send + Sync {
    /// Open the source address, waiting for it to produce its first frame
    async fn open(&self, camera_id: &str, url: &str) -> Result<Box<dyn VideoSource>>;
}

/// ffmpeg-based opener
pub struct FfmpegOpener {
    connect_timeout: Duration,
}

impl FfmpegOpener {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceOpener for FfmpegOpener {
    async fn open(&self, camera_id: &str, url: &str) -> Result<Box<dyn VideoSource>> {
        // -rtsp_transport tcp: more reliable than UDP for IP cameras
        // -f image2pipe -vcodec mjpeg: continuous JPEG frames on stdout
        // kill_on_drop ensures the process dies with the handle
        let mut child = Command::new("ffmpeg")
            .args([
                "-rtsp_transport",
                "tcp",
                "-i",
                url,
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-q:v",
                "4",
                "-loglevel",
                "error",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::SourceOpen {
                camera_id: camera_id.to_string(),
                reason: format!("ffmpeg spawn failed: {}", e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::SourceOpen {
            camera_id: camera_id.to_string(),
            reason: "ffmpeg stdout unavailable".to_string(),
        })?;
        let stderr = child.stderr.take();

        let mut source = FfmpegSource {
            camera_id: camera_id.to_string(),
            _child: child,
            stdout,
            stderr,
            buf: Vec::with_capacity(READ_CHUNK),
            pending: None,
        };

        // The open attempt succeeds once the pipe yields a decodable frame.
        // EOF before that (bad address, refused connection, auth failure)
        // or silence past the connect timeout is an open failure.
        match timeout(self.connect_timeout, source.read_frame()).await {
            Ok(Ok(Some(frame))) => {
                tracing::debug!(
                    camera_id = %camera_id,
                    width = frame.width(),
                    height = frame.height(),
                    "Video source opened"
                );
                source.pending = Some(frame);
                Ok(Box::new(source))
            }
            Ok(Ok(None)) => {
                let detail = source.stderr_tail().await;
                Err(Error::SourceOpen {
                    camera_id: camera_id.to_string(),
                    reason: if detail.is_empty() {
                        "ffmpeg exited before producing a frame".to_string()
                    } else {
                        detail
                    },
                })
            }
            Ok(Err(e)) => Err(Error::SourceOpen {
                camera_id: camera_id.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::SourceOpen {
                camera_id: camera_id.to_string(),
                reason: format!("no frame within {}s", self.connect_timeout.as_secs()),
            }),
        }
    }
}

/// Capture handle over a running ffmpeg process
///
/// Dropping the handle kills the child via `kill_on_drop`.
struct FfmpegSource {
    camera_id: String,
    _child: Child,
    stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    buf: Vec<u8>,
    /// First frame, buffered during open
    pending: Option<RgbImage>,
}

impl FfmpegSource {
    /// Read the last error lines ffmpeg wrote before exiting
    async fn stderr_tail(&mut self) -> String {
        let Some(mut stderr) = self.stderr.take() else {
            return String::new();
        };

        let mut out = Vec::with_capacity(4096);
        let _ = timeout(
            Duration::from_millis(250),
            (&mut stderr).take(4096).read_to_end(&mut out),
        )
        .await;

        let text = String::from_utf8_lossy(&out);
        text.lines().last().unwrap_or("").trim().to_string()
    }
}

#[async_trait]
impl VideoSource for FfmpegSource {
    async fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            while let Some(jpeg) = take_jpeg(&mut self.buf) {
                match image::load_from_memory(&jpeg) {
                    Ok(decoded) => return Ok(Some(decoded.to_rgb8())),
                    Err(e) => {
                        // Torn frame in the pipe: skip it, keep reading
                        tracing::debug!(
                            camera_id = %self.camera_id,
                            error = %e,
                            "Skipping undecodable frame"
                        );
                    }
                }
            }

            if self.buf.len() > MAX_FRAME_BYTES {
                return Err(Error::SourceRead(
                    "frame exceeds buffer limit".to_string(),
                ));
            }

            let n = self
                .stdout
                .read(&mut chunk)
                .await
                .map_err(|e| Error::SourceRead(e.to_string()))?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Extract the first complete JPEG from the scan buffer
///
/// Looks for an SOI marker (FFD8 FF) followed by EOI (FFD9), drains the
/// consumed bytes, and returns the frame. Garbage before the SOI is
/// discarded.
fn take_jpeg(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let soi = buf
        .windows(3)
        .position(|w| w[0] == 0xFF && w[1] == 0xD8 && w[2] == 0xFF)?;
    if soi > 0 {
        buf.drain(..soi);
    }

    let eoi = buf[2..].windows(2).position(|w| w[0] == 0xFF && w[1] == 0xD9)? + 2;

    let frame = buf[..eoi + 2].to_vec();
    buf.drain(..eoi + 2);
    Some(frame)
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Opener whose behavior is scripted by the url:
    ///
    /// - `test-fail` — open fails with "connection refused"
    /// - `test-frames:N` — yields N frames, then end-of-stream
    /// - anything else — yields frames forever
    pub struct ScriptedOpener {
        frame_size: (u32, u32),
    }

    impl ScriptedOpener {
        pub fn new() -> Self {
            Self {
                frame_size: (32, 24),
            }
        }
    }

    #[async_trait]
    impl SourceOpener for ScriptedOpener {
        async fn open(&self, camera_id: &str, url: &str) -> Result<Box<dyn VideoSource>> {
            if url.starts_with("test-fail") {
                return Err(Error::SourceOpen {
                    camera_id: camera_id.to_string(),
                    reason: "connection refused".to_string(),
                });
            }

            let remaining = url
                .strip_prefix("test-frames:")
                .and_then(|n| n.parse::<usize>().ok());

            Ok(Box::new(ScriptedSource {
                remaining,
                frame_size: self.frame_size,
            }))
        }
    }

    /// Source yielding synthetic frames
    pub struct ScriptedSource {
        /// `None` = endless
        remaining: Option<usize>,
        frame_size: (u32, u32),
    }

    #[async_trait]
    impl VideoSource for ScriptedSource {
        async fn read_frame(&mut self) -> Result<Option<RgbImage>> {
            if let Some(remaining) = &mut self.remaining {
                if *remaining == 0 {
                    return Ok(None);
                }
                *remaining -= 1;
            }

            tokio::time::sleep(Duration::from_millis(1)).await;
            let (w, h) = self.frame_size;
            Ok(Some(RgbImage::from_pixel(w, h, image::Rgb([64, 64, 64]))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_bytes(payload: &[u8]) -> Vec<u8> {
        let mut v = vec![0xFF, 0xD8, 0xFF];
        v.extend_from_slice(payload);
        v.extend_from_slice(&[0xFF, 0xD9]);
        v
    }

    #[test]
    fn test_take_jpeg_single_frame() {
        let mut buf = jpeg_bytes(b"abc");
        let frame = take_jpeg(&mut buf).unwrap();
        assert_eq!(frame, jpeg_bytes(b"abc"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_take_jpeg_incomplete_frame_waits() {
        let mut buf = vec![0xFF, 0xD8, 0xFF, 0x01, 0x02];
        assert!(take_jpeg(&mut buf).is_none());
        // Buffer is left intact for the next read
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(&[0xFF, 0xD9]);
        assert!(take_jpeg(&mut buf).is_some());
    }

    #[test]
    fn test_take_jpeg_discards_leading_garbage() {
        let mut buf = vec![0x00, 0x11, 0x22];
        buf.extend_from_slice(&jpeg_bytes(b"x"));
        let frame = take_jpeg(&mut buf).unwrap();
        assert_eq!(frame, jpeg_bytes(b"x"));
    }

    #[test]
    fn test_take_jpeg_two_frames_in_order() {
        let mut buf = jpeg_bytes(b"first");
        buf.extend_from_slice(&jpeg_bytes(b"second"));

        assert_eq!(take_jpeg(&mut buf).unwrap(), jpeg_bytes(b"first"));
        assert_eq!(take_jpeg(&mut buf).unwrap(), jpeg_bytes(b"second"));
        assert!(take_jpeg(&mut buf).is_none());
    }
}
