//! Object Detection Engine
//!
//! Runs a YOLOv8 ONNX export over captured stills. The model is loaded once
//! and shared read-only for the process lifetime; every call returns all
//! detections the model finds, leaving relevance filtering to the caller.

use crate::engine::labels::{label_for, COCO_LABELS};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use std::cmp::Ordering;
use std::path::Path;
use thiserror::Error;
use tract_onnx::prelude::*;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model load error: {0}")]
    ModelLoad(String),
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("Classification failed: {0}")]
    ClassificationFailed(String),
    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),
}

impl ClassifierError {
    /// Whether the error concerns a single image rather than the model itself
    pub fn is_per_image(&self) -> bool {
        matches!(
            self,
            ClassifierError::ImageDecode(_) | ClassifierError::ClassificationFailed(_)
        )
    }
}

/// Axis-aligned box in source image pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One labeled object found in an image
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub class_id: usize,
    /// Model score in 0..1
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Post-processing knobs for YOLO output
#[derive(Debug, Clone)]
pub struct YoloParams {
    /// Square network input edge (640 for stock exports)
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Gray used for letterbox padding
const PAD_GRAY: u8 = 114;

/// Mapping between a source image and the square network input
///
/// The source is scaled uniformly to fit, then centred with padding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    pub fn fit(source_width: u32, source_height: u32, target: u32) -> Self {
        let scale = f32::min(
            target as f32 / source_width as f32,
            target as f32 / source_height as f32,
        );
        let new_w = (source_width as f32 * scale).round() as u32;
        let new_h = (source_height as f32 * scale).round() as u32;

        Self {
            scale,
            pad_x: (target.saturating_sub(new_w) / 2) as f32,
            pad_y: (target.saturating_sub(new_h) / 2) as f32,
            source_width,
            source_height,
        }
    }

    /// Map a network-space box back onto the source image
    pub fn to_source(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        let max_x = self.source_width as f32;
        let max_y = self.source_height as f32;
        BoundingBox {
            x1: ((x1 - self.pad_x) / self.scale).clamp(0.0, max_x),
            y1: ((y1 - self.pad_y) / self.scale).clamp(0.0, max_y),
            x2: ((x2 - self.pad_x) / self.scale).clamp(0.0, max_x),
            y2: ((y2 - self.pad_y) / self.scale).clamp(0.0, max_y),
        }
    }
}

/// Resize `image` into a `target`×`target` canvas keeping its aspect ratio
pub fn letterbox_resize(image: &RgbImage, target: u32) -> (RgbImage, Letterbox) {
    let (width, height) = image.dimensions();
    let letterbox = Letterbox::fit(width, height, target);
    let new_w = ((width as f32 * letterbox.scale).round() as u32).clamp(1, target);
    let new_h = ((height as f32 * letterbox.scale).round() as u32).clamp(1, target);
    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(target, target, Rgb([PAD_GRAY; 3]));
    image::imageops::replace(
        &mut canvas,
        &resized,
        letterbox.pad_x as i64,
        letterbox.pad_y as i64,
    );

    (canvas, letterbox)
}

/// Classifies an image file into labeled detections
pub trait ObjectClassifier {
    /// Return every detection in the image, highest confidence first
    fn classify(&self, path: &Path) -> Result<Vec<Detection>, ClassifierError>;
}

type YoloPlan = TypedRunnableModel<TypedModel>;

/// YOLOv8 detector backed by tract
pub struct OnnxDetector {
    model: YoloPlan,
    params: YoloParams,
}

impl OnnxDetector {
    /// Load and optimize the model with default parameters
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        Self::load_with(model_path, YoloParams::default())
    }

    pub fn load_with(model_path: &Path, params: YoloParams) -> Result<Self, ClassifierError> {
        if !model_path.is_file() {
            return Err(ClassifierError::ModelLoad(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        let size = params.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| ClassifierError::ModelLoad(e.to_string()))?;

        info!("Loaded detection model {}", model_path.display());

        Ok(Self { model, params })
    }

    fn input_tensor(&self, path: &Path) -> Result<(Tensor, Letterbox), ClassifierError> {
        let image = image::open(path)
            .map_err(|e| ClassifierError::ImageDecode(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        let (canvas, letterbox) = letterbox_resize(&image, self.params.input_size);

        let edge = self.params.input_size as usize;
        let tensor: Tensor = tract_ndarray::Array4::from_shape_fn((1, 3, edge, edge), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
        .into();

        Ok((tensor, letterbox))
    }
}

impl ObjectClassifier for OnnxDetector {
    fn classify(&self, path: &Path) -> Result<Vec<Detection>, ClassifierError> {
        let (input, letterbox) = self.input_tensor(path)?;

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| ClassifierError::ClassificationFailed(e.to_string()))?;

        let output = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| ClassifierError::UnexpectedOutput(e.to_string()))?;

        let shape = output.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(ClassifierError::UnexpectedOutput(format!("shape {:?}", shape)));
        }

        let values: Vec<f32> = output.iter().copied().collect();
        let detections = decode_predictions(&values, shape[1], shape[2], &letterbox, &self.params)?;
        debug!("{} detections in {}", detections.len(), path.display());

        Ok(detections)
    }
}

struct Candidate {
    class_id: usize,
    score: f32,
    bbox: BoundingBox,
}

/// Decode a row-major `[4 + classes, anchors]` YOLOv8 output block
///
/// Rows 0..4 hold the box centre and size in network pixels, the remaining
/// rows one score per class. `letterbox` maps network pixels back to the
/// source image.
pub fn decode_predictions(
    values: &[f32],
    rows: usize,
    anchors: usize,
    letterbox: &Letterbox,
    params: &YoloParams,
) -> Result<Vec<Detection>, ClassifierError> {
    if rows != 4 + COCO_LABELS.len() || values.len() != rows * anchors {
        return Err(ClassifierError::UnexpectedOutput(format!(
            "expected {} rows of {} values, got {} values in {} rows",
            4 + COCO_LABELS.len(),
            anchors,
            values.len(),
            rows
        )));
    }

    let at = |row: usize, anchor: usize| values[row * anchors + anchor];

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (0..rows - 4)
            .map(|class| (class, at(4 + class, anchor)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < params.conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        candidates.push(Candidate {
            class_id,
            score,
            bbox: letterbox.to_source(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
        });
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    // Greedy class-wise non-max suppression
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > params.iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
        if kept.len() == params.max_detections {
            break;
        }
    }

    kept.into_iter()
        .map(|c| {
            let label = label_for(c.class_id).ok_or_else(|| {
                ClassifierError::UnexpectedOutput(format!("no label for class {}", c.class_id))
            })?;
            Ok(Detection {
                label: label.to_string(),
                class_id: c.class_id,
                confidence: c.score,
                bbox: c.bbox,
            })
        })
        .collect()
}
