//! Detection boundary.
//!
//! The model itself is external. [`ObjectDetector`] is the seam a model
//! plugs into (frame in, boxes out); [`Detector`] is what the capture loop
//! calls once per frame, and answers "was the target there, and when".
//! [`TargetDetector`] joins the two: it filters a model's output down to
//! the target class and draws the surviving boxes onto the frame.

pub mod annotate;

use std::time::SystemTime;

use thiserror::Error;

use crate::capture::Frame;
use crate::DetectConfig;

pub use annotate::draw_boxes;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("model inference failed: {0}")]
    Inference(String),
    #[error("frame rejected by model: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Capture(#[from] crate::error::CaptureError),
}

pub type Result<T> = std::result::Result<T, DetectError>;

/// One model detection. `bbox` is `[x1, y1, x2, y2]` normalised to 0..1.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4],
    pub score: f32,
    pub label: String,
}

/// Outcome of running the detector over one frame.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub detected: bool,
    pub timestamp: SystemTime,
    /// The input frame, with target boxes drawn when anything was found
    pub annotated_frame: Frame,
}

/// Model seam. Implementations may be slow; they run inline in the loop.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Per-frame detection as seen by the capture loop.
pub trait Detector: Send {
    fn infer(&mut self, frame: &Frame) -> Result<DetectionEvent>;
}

/// Keeps detections of one class above a confidence floor.
pub struct TargetDetector<M> {
    model: M,
    target_label: String,
    min_score: f32,
}

impl<M: ObjectDetector> TargetDetector<M> {
    pub fn new(model: M, config: &DetectConfig) -> Self {
        Self {
            model,
            target_label: config.target_label.clone(),
            min_score: config.min_score,
        }
    }

    fn is_target(&self, detection: &Detection) -> bool {
        detection.label == self.target_label && detection.score >= self.min_score
    }
}

impl<M: ObjectDetector> Detector for TargetDetector<M> {
    fn infer(&mut self, frame: &Frame) -> Result<DetectionEvent> {
        let detections = self.model.detect(frame)?;
        let timestamp = SystemTime::now();

        let targets: Vec<Detection> = detections
            .into_iter()
            .filter(|d| self.is_target(d))
            .collect();

        let annotated_frame = if targets.is_empty() {
            frame.clone()
        } else {
            draw_boxes(frame, &targets)?
        };

        Ok(DetectionEvent {
            detected: !targets.is_empty(),
            timestamp,
            annotated_frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    struct Fixed(Vec<Detection>);

    impl ObjectDetector for Fixed {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    fn detection(label: &str, score: f32) -> Detection {
        Detection {
            bbox: [0.25, 0.25, 0.75, 0.75],
            score,
            label: label.into(),
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb(vec![0u8; 8 * 8 * 3], 8, 8, 1, PixelFormat::Rgb24).unwrap()
    }

    #[test]
    fn target_above_threshold_is_detected_and_drawn() {
        let mut detector = TargetDetector::new(
            Fixed(vec![detection("cat", 0.9), detection("bird", 0.6)]),
            &DetectConfig::default(),
        );
        let event = detector.infer(&frame()).unwrap();

        assert!(event.detected);
        assert!(event.annotated_frame.data.iter().any(|&b| b != 0));
    }

    #[test]
    fn other_classes_and_weak_scores_are_ignored() {
        let mut detector = TargetDetector::new(
            Fixed(vec![detection("cat", 0.9), detection("bird", 0.1)]),
            &DetectConfig::default(),
        );
        let input = frame();
        let event = detector.infer(&input).unwrap();

        assert!(!event.detected);
        assert_eq!(event.annotated_frame.data, input.data);
    }
}
