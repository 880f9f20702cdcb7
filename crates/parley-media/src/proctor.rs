use crate::detector::CandleDetector;
use crate::MediaError;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// COCO-style class id the detector reports for people.
pub const PERSON_CLASS_ID: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub score: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Seam to the in-process detection model. One implementation ships
/// ([`CandleDetector`]); tests substitute stubs.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, rgb: &image::RgbImage) -> Result<Vec<Detection>, MediaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProctorVerdict {
    /// Zero or one person in frame; nothing to report.
    Clear,
    /// More than one person in frame.
    MultiplePersons(usize),
    /// The frame bytes did not decode as an image.
    DecodeError,
    /// No detector available for this process.
    Disabled,
}

/// Per-frame proctoring: decode the JPEG, run the detector, count people.
///
/// The detector loads lazily and once per process; a failed load disables
/// proctoring rather than failing sessions.
pub struct Proctor {
    model_path: Option<PathBuf>,
    confidence_threshold: f32,
    detector: OnceLock<Option<Arc<dyn ObjectDetector>>>,
}

impl Proctor {
    pub fn new(model_path: Option<PathBuf>, confidence_threshold: f32) -> Self {
        Self {
            model_path,
            confidence_threshold,
            detector: OnceLock::new(),
        }
    }

    pub fn with_detector(detector: Arc<dyn ObjectDetector>, confidence_threshold: f32) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Some(detector));
        Self {
            model_path: None,
            confidence_threshold,
            detector: cell,
        }
    }

    fn detector(&self) -> Option<&Arc<dyn ObjectDetector>> {
        self.detector
            .get_or_init(|| {
                let path = self.model_path.as_ref()?;
                match CandleDetector::load(path) {
                    Ok(detector) => {
                        tracing::info!(model = %path.display(), "person detector loaded");
                        Some(Arc::new(detector) as Arc<dyn ObjectDetector>)
                    }
                    Err(e) => {
                        tracing::warn!(model = %path.display(), error = %e, "detector load failed, proctoring disabled");
                        None
                    }
                }
            })
            .as_ref()
    }

    pub fn enabled(&self) -> bool {
        self.detector().is_some()
    }

    pub fn inspect(&self, jpeg: &[u8]) -> ProctorVerdict {
        let Some(detector) = self.detector() else {
            return ProctorVerdict::Disabled;
        };
        let image = match image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg) {
            Ok(image) => image.to_rgb8(),
            Err(_) => return ProctorVerdict::DecodeError,
        };
        let detections = match detector.detect(&image) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(error = %e, "detector inference failed");
                return ProctorVerdict::Clear;
            }
        };
        let persons = detections
            .iter()
            .filter(|d| d.class_id == PERSON_CLASS_ID && d.score >= self.confidence_threshold)
            .count();
        if persons > 1 {
            ProctorVerdict::MultiplePersons(persons)
        } else {
            ProctorVerdict::Clear
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector(Vec<Detection>);

    impl ObjectDetector for FixedDetector {
        fn detect(&self, _rgb: &image::RgbImage) -> Result<Vec<Detection>, MediaError> {
            Ok(self.0.clone())
        }
    }

    fn person(score: f32) -> Detection {
        Detection {
            class_id: PERSON_CLASS_ID,
            score,
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
        }
    }

    fn tiny_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([120, 120, 120]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .expect("encode jpeg");
        out.into_inner()
    }

    #[test]
    fn one_person_is_clear() {
        let proctor = Proctor::with_detector(Arc::new(FixedDetector(vec![person(0.9)])), 0.5);
        assert_eq!(proctor.inspect(&tiny_jpeg()), ProctorVerdict::Clear);
    }

    #[test]
    fn two_persons_raise_a_cheat_verdict() {
        let proctor = Proctor::with_detector(
            Arc::new(FixedDetector(vec![person(0.9), person(0.8)])),
            0.5,
        );
        assert_eq!(
            proctor.inspect(&tiny_jpeg()),
            ProctorVerdict::MultiplePersons(2)
        );
    }

    #[test]
    fn empty_frame_is_tolerated() {
        let proctor = Proctor::with_detector(Arc::new(FixedDetector(vec![])), 0.5);
        assert_eq!(proctor.inspect(&tiny_jpeg()), ProctorVerdict::Clear);
    }

    #[test]
    fn low_confidence_boxes_are_ignored() {
        let proctor = Proctor::with_detector(
            Arc::new(FixedDetector(vec![person(0.9), person(0.2)])),
            0.5,
        );
        assert_eq!(proctor.inspect(&tiny_jpeg()), ProctorVerdict::Clear);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let proctor = Proctor::with_detector(Arc::new(FixedDetector(vec![])), 0.5);
        assert_eq!(proctor.inspect(b"not a jpeg"), ProctorVerdict::DecodeError);
    }

    #[test]
    fn missing_model_disables_proctoring() {
        let proctor = Proctor::new(Some(PathBuf::from("/nonexistent/model.safetensors")), 0.5);
        assert!(!proctor.enabled());
        assert_eq!(proctor.inspect(&tiny_jpeg()), ProctorVerdict::Disabled);
    }

    #[test]
    fn unconfigured_proctor_is_disabled() {
        let proctor = Proctor::new(None, 0.5);
        assert!(!proctor.enabled());
    }
}
