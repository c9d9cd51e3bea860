//! Frame transformer wrapping an inbound media track
//!
//! The transformer exposes the same pull interface as the track it wraps:
//! one call, one outbound frame. Pulls are strictly sequential because the
//! caller holds `&mut self` across the await.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::detect::Detector;
use crate::error::Result;
use crate::video::VideoFrame;

/// Anything that yields decoded frames one pull at a time
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for and return the next decoded frame
    async fn recv(&mut self) -> Result<VideoFrame>;
}

/// Wraps an inbound frame source and annotates each frame on the way out.
///
/// Holds the only reference to the wrapped source; no other state is
/// mutated across pulls. With no detector loaded the input frame is
/// returned unchanged. A failing detector call is logged and the input
/// frame is forwarded as-is, so one bad frame never tears down the
/// connection's delivery path.
pub struct FrameTransformer {
    source: Box<dyn FrameSource>,
    detector: Option<Arc<dyn Detector>>,
}

impl FrameTransformer {
    pub fn new(source: Box<dyn FrameSource>, detector: Option<Arc<dyn Detector>>) -> Self {
        Self { source, detector }
    }
}

#[async_trait]
impl FrameSource for FrameTransformer {
    async fn recv(&mut self) -> Result<VideoFrame> {
        let frame = self.source.recv().await?;

        let detector = match &self.detector {
            Some(d) => d,
            None => return Ok(frame),
        };

        match detector.annotate(&frame) {
            // Timing metadata is carried over by with_data; only pixel
            // content may differ from the input.
            Ok(annotated) => Ok(frame.with_data(annotated)),
            Err(e) => {
                warn!(backend = detector.name(), "Detection failed, passing frame through: {}", e);
                debug!(pts = frame.pts, "Unannotated frame forwarded");
                Ok(frame)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::video::{PixelFormat, Resolution, TimeBase};
    use bytes::Bytes;

    struct VecSource {
        frames: std::vec::IntoIter<VideoFrame>,
    }

    impl VecSource {
        fn new(frames: Vec<VideoFrame>) -> Self {
            Self {
                frames: frames.into_iter(),
            }
        }
    }

    #[async_trait]
    impl FrameSource for VecSource {
        async fn recv(&mut self) -> Result<VideoFrame> {
            self.frames
                .next()
                .ok_or_else(|| AppError::Video("source exhausted".to_string()))
        }
    }

    struct InvertDetector;

    impl Detector for InvertDetector {
        fn name(&self) -> &'static str {
            "invert"
        }

        fn annotate(&self, frame: &VideoFrame) -> Result<Bytes> {
            Ok(Bytes::from(
                frame.data().iter().map(|b| !b).collect::<Vec<u8>>(),
            ))
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn annotate(&self, _frame: &VideoFrame) -> Result<Bytes> {
            Err(AppError::Detect("synthetic failure".to_string()))
        }
    }

    fn frame(pts: i64) -> VideoFrame {
        VideoFrame::from_vec(
            vec![7u8; 2 * 2 * 3],
            Resolution::new(2, 2),
            PixelFormat::Bgr24,
            pts,
            TimeBase::VIDEO_90KHZ,
        )
    }

    #[tokio::test]
    async fn no_detector_passes_frames_through() {
        let input = frame(1234);
        let mut transformer =
            FrameTransformer::new(Box::new(VecSource::new(vec![input.clone()])), None);

        let out = transformer.recv().await.unwrap();
        assert_eq!(out.data(), input.data());
        assert_eq!(out.pts, input.pts);
        assert_eq!(out.time_base, input.time_base);
    }

    #[tokio::test]
    async fn detector_output_keeps_input_timing() {
        let input = frame(9000);
        let mut transformer = FrameTransformer::new(
            Box::new(VecSource::new(vec![input.clone()])),
            Some(Arc::new(InvertDetector)),
        );

        let out = transformer.recv().await.unwrap();
        assert_ne!(out.data(), input.data());
        assert_eq!(out.pts, input.pts);
        assert_eq!(out.time_base, input.time_base);
        assert_eq!(out.resolution, input.resolution);
    }

    #[tokio::test]
    async fn detection_failure_forwards_input_frame() {
        let input = frame(42);
        let mut transformer = FrameTransformer::new(
            Box::new(VecSource::new(vec![input.clone()])),
            Some(Arc::new(FailingDetector)),
        );

        let out = transformer.recv().await.unwrap();
        assert_eq!(out.data(), input.data());
        assert_eq!(out.pts, input.pts);
    }

    #[tokio::test]
    async fn pulls_are_sequential() {
        let frames = vec![frame(0), frame(3000), frame(6000)];
        let mut transformer = FrameTransformer::new(
            Box::new(VecSource::new(frames)),
            Some(Arc::new(InvertDetector)),
        );

        for expected_pts in [0, 3000, 6000] {
            let out = transformer.recv().await.unwrap();
            assert_eq!(out.pts, expected_pts);
        }
        assert!(transformer.recv().await.is_err());
    }

    #[tokio::test]
    async fn source_error_propagates() {
        let mut transformer = FrameTransformer::new(Box::new(VecSource::new(vec![])), None);
        assert!(transformer.recv().await.is_err());
    }
}
