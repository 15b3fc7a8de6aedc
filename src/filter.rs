//! Per-frame detection filtering.
//!
//! Turns the raw detections a model reports for one frame into labelled
//! detections the alert logic can reason about: confidences are rounded up to
//! two decimals, anything under the threshold is dropped, and class indices
//! are resolved against the configured label list.

use thiserror::Error;

use crate::detect::Detection;

/// Raised when the model reports a class the label list does not know about.
///
/// This means the deployed model and the configured class names have drifted
/// apart. It is never recovered from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error(
        "detector reported class index {index} but only {class_count} class names are configured"
    )]
    ClassIndexOutOfRange { index: usize, class_count: usize },
}

/// A detection that passed the threshold, with its label resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct FilteredDetection {
    pub detection: Detection,
    /// Confidence rounded up to two decimals; this is the value compared
    /// against the threshold and shown on screen.
    pub confidence: f32,
    pub label: String,
}

impl FilteredDetection {
    /// Overlay caption, e.g. `Mite 0.73`.
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.label, self.confidence)
    }
}

/// Confidence threshold plus the ordered class-name list.
#[derive(Clone, Debug)]
pub struct DetectionFilter {
    class_names: Vec<String>,
    threshold: f32,
}

impl DetectionFilter {
    pub fn new(class_names: Vec<String>, threshold: f32) -> Self {
        Self {
            class_names,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Resolve a class index to its configured name.
    pub fn label_for(&self, index: usize) -> Result<&str, FilterError> {
        self.class_names
            .get(index)
            .map(String::as_str)
            .ok_or(FilterError::ClassIndexOutOfRange {
                index,
                class_count: self.class_names.len(),
            })
    }

    /// Keep detections whose rounded confidence reaches the threshold, in
    /// detector order.
    ///
    /// Detections under the threshold are dropped before their label is
    /// looked up, so only accepted detections can fail the frame.
    pub fn apply(&self, detections: &[Detection]) -> Result<Vec<FilteredDetection>, FilterError> {
        let mut accepted = Vec::with_capacity(detections.len());
        for detection in detections {
            let confidence = round_confidence(detection.confidence);
            if confidence < self.threshold {
                continue;
            }
            let label = self.label_for(detection.class_index)?.to_string();
            accepted.push(FilteredDetection {
                detection: *detection,
                confidence,
                label,
            });
        }
        Ok(accepted)
    }
}

/// Round a confidence up to two decimal places (`0.731 -> 0.74`).
///
/// A value that is already the f32 spelling of a hundredth (`0.6`, `0.73`)
/// is that hundredth; everything else goes to the next one up.
pub fn round_confidence(confidence: f32) -> f32 {
    let scaled = f64::from(confidence) * 100.0;
    let nearest = scaled.round();
    let hundredths = if (nearest / 100.0) as f32 == confidence {
        nearest
    } else {
        scaled.ceil()
    };
    if hundredths <= 0.0 {
        return 0.0;
    }
    (hundredths / 100.0) as f32
}
