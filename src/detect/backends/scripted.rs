use std::collections::VecDeque;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::detect::backend::Detector;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Detector that replays a fixed script of per-frame detections.
///
/// Frame N of the run receives entry N of the script. Once the script is
/// exhausted every further frame gets no detections, unless the script was
/// built with `looping()`.
pub struct ScriptedDetector {
    script: VecDeque<Vec<Detection>>,
    replay: Option<Vec<Vec<Detection>>>,
}

#[derive(Debug, Deserialize)]
struct ScriptedDetectionFile {
    class: usize,
    confidence: f32,
    #[serde(rename = "box", default)]
    bbox: Option<[i32; 4]>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
            replay: None,
        }
    }

    /// Detector that never reports anything.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Restart from the first entry whenever the script runs out.
    pub fn looping(mut self) -> Self {
        self.replay = Some(self.script.iter().cloned().collect());
        self
    }

    /// Load a script from JSON: an array (one entry per frame) of arrays of
    /// `{"class": 1, "confidence": 0.73, "box": [x1, y1, x2, y2]}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read detection script {}: {}", path.display(), e))?;
        Self::from_json_str(&raw)
            .map_err(|e| anyhow!("invalid detection script {}: {}", path.display(), e))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let frames: Vec<Vec<ScriptedDetectionFile>> = serde_json::from_str(raw)?;
        let script = frames
            .into_iter()
            .map(|frame| {
                frame
                    .into_iter()
                    .map(|entry| {
                        let [x1, y1, x2, y2] = entry.bbox.unwrap_or([0, 0, 0, 0]);
                        Detection::new(
                            entry.class,
                            entry.confidence,
                            BoundingBox::from_corners(x1, y1, x2, y2),
                        )
                    })
                    .collect()
            })
            .collect();
        Ok(Self::new(script))
    }
}

impl Detector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.script.is_empty() {
            if let Some(replay) = &self.replay {
                self.script.extend(replay.iter().cloned());
            }
        }
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
