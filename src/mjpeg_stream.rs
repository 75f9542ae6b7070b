//! MjpegStream - Paced Multipart Frame Encoding
//!
//! ## Responsibilities
//!
//! - Lazily pull the latest published frame for one camera
//! - JPEG-encode and wrap each frame as a multipart part
//! - Pace emission at a target presentation rate
//! - Terminate when the frame slot goes absent
//!
//! The pace is a presentation-rate throttle, not a freshness guarantee:
//! when the worker has not produced a new frame, the previous payload is
//! re-sent without re-encoding.

use crate::error::{Error, Result};
use crate::stream_registry::StreamRegistry;
use axum::body::Bytes;
use futures::Stream;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Multipart boundary marker
pub const MULTIPART_BOUNDARY: &str = "frame";
/// JPEG encode quality
const JPEG_QUALITY: u8 = 80;

/// Content type for the multipart stream response
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", MULTIPART_BOUNDARY)
}

struct StreamState {
    registry: Arc<StreamRegistry>,
    camera_id: String,
    interval: Interval,
    /// Last emitted frame and its encoded part, for cheap re-send
    last: Option<(Arc<RgbImage>, Bytes)>,
}

/// Lazy multipart JPEG sequence for one camera
///
/// Each tick reads the registry's latest frame; an absent frame ends the
/// sequence (stream stopped or never produced anything). Restartable: each
/// invocation is an independent reader.
pub fn frame_stream(
    registry: Arc<StreamRegistry>,
    camera_id: String,
    fps: u32,
) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> {
    let period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = StreamState {
        registry,
        camera_id,
        interval,
        last: None,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            state.interval.tick().await;

            let frame = state.registry.latest_frame(&state.camera_id).await?;

            if let Some((prev, part)) = &state.last {
                if Arc::ptr_eq(prev, &frame) {
                    return Some((Ok(part.clone()), state));
                }
            }

            match encode_part(&frame) {
                Ok(part) => {
                    state.last = Some((frame, part.clone()));
                    return Some((Ok(part), state));
                }
                Err(e) => {
                    // Skip the frame, keep the sequence alive
                    tracing::warn!(
                        camera_id = %state.camera_id,
                        error = %e,
                        "Failed to encode frame"
                    );
                }
            }
        }
    })
}

/// Encode one frame as a complete multipart part
fn encode_part(frame: &RgbImage) -> Result<Bytes> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(frame)
        .map_err(|e| Error::FrameProcessing(e.to_string()))?;

    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        MULTIPART_BOUNDARY,
        jpeg.len()
    );

    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(&jpeg);
    part.extend_from_slice(b"\r\n");
    Ok(Bytes::from(part))
}
