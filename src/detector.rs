use crate::config::DetectorConfig;
use image::{imageops::FilterType, GenericImageView};
use ndarray::{s, Array, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
    sync::Mutex,
};
use thiserror::Error;

const MODEL_INPUT_SIZE: u32 = 640;
const NMS_IOU_THRESHOLD: f32 = 0.7;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Failed to initialize ONNX session: {0}")]
    SessionInit(#[from] ort::Error),
    #[error("Failed to load labels: {0}")]
    LabelsLoad(#[from] io::Error),
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// One detected region in absolute pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Seam between the inspection loop and the model. Input is an encoded
/// image; output is every region at or above the configured confidence.
pub trait Detector: Send + Sync {
    fn detect(&self, image_data: &[u8]) -> Result<Vec<Detection>, DetectorError>;
}

pub struct OrtDetector {
    session: Mutex<Session>,
    class_labels: Vec<String>,
    confidence_threshold: f32,
}

impl OrtDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectorError> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(config.get_model_path())?;

        let class_labels = load_class_labels(&config.get_labels_path())?;
        tracing::info!("Loaded {} model classes", class_labels.len());

        Ok(Self {
            session: Mutex::new(session),
            class_labels,
            confidence_threshold: config.confidence_threshold,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ndarray::ArrayD<f32>, DetectorError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| DetectorError::Inference(format!("session mutex poisoned: {}", e)))?;

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| DetectorError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| DetectorError::Inference(format!("inference failed: {}", e)))?;

        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Inference(format!("failed to extract tensor: {}", e)))?;

        let ix = shape.to_ixdyn();
        let array = ndarray::ArrayD::from_shape_vec(ix, data.to_vec())
            .map_err(|e| DetectorError::Inference(format!("invalid tensor shape: {}", e)))?;

        Ok(array)
    }

    fn label_for(&self, class_id: usize) -> String {
        self.class_labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

impl Detector for OrtDetector {
    fn detect(&self, image_data: &[u8]) -> Result<Vec<Detection>, DetectorError> {
        let (input, img_width, img_height) = transform_image(image_data)?;
        let outputs = self.run_inference(&input)?;

        let mut boxes = Vec::new();
        let output = outputs.slice(s![.., .., 0]);

        for row in output.axis_iter(Axis(0)) {
            let row: Vec<_> = row.iter().copied().collect();
            let Some((class_id, prob)) = row
                .iter()
                .skip(4)
                .enumerate()
                .map(|(index, value)| (index, *value))
                .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
            else {
                continue;
            };

            if prob < self.confidence_threshold {
                continue;
            }

            let xc = row[0] / MODEL_INPUT_SIZE as f32 * (img_width as f32);
            let yc = row[1] / MODEL_INPUT_SIZE as f32 * (img_height as f32);
            let w = row[2] / MODEL_INPUT_SIZE as f32 * (img_width as f32);
            let h = row[3] / MODEL_INPUT_SIZE as f32 * (img_height as f32);

            boxes.push(Detection {
                label: self.label_for(class_id),
                confidence: prob,
                x1: xc - w / 2.,
                y1: yc - h / 2.,
                x2: xc + w / 2.,
                y2: yc + h / 2.,
            });
        }

        Ok(non_max_suppression(boxes))
    }
}

fn transform_image(image_data: &[u8]) -> Result<(Array<f32, Ix4>, u32, u32), DetectorError> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| DetectorError::ImageDecode(e.to_string()))?;

    let original_img = image_reader
        .decode()
        .map_err(|e| DetectorError::ImageDecode(e.to_string()))?;

    let (img_width, img_height) = original_img.dimensions();
    let size = MODEL_INPUT_SIZE;
    let img = original_img.resize_exact(size, size, FilterType::CatmullRom);

    let mut input = Array::zeros((1, 3, size as usize, size as usize));
    for pixel in img.pixels() {
        let x = pixel.0 as usize;
        let y = pixel.1 as usize;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    Ok((input, img_width, img_height))
}

fn intersection(box1: &Detection, box2: &Detection) -> f32 {
    (box1.x2.min(box2.x2) - box1.x1.max(box2.x1)) * (box1.y2.min(box2.y2) - box1.y1.max(box2.y1))
}

fn union(box1: &Detection, box2: &Detection) -> f32 {
    ((box1.x2 - box1.x1) * (box1.y2 - box1.y1)) + ((box2.x2 - box2.x1) * (box2.y2 - box2.y1))
        - intersection(box1, box2)
}

fn non_max_suppression(mut boxes: Vec<Detection>) -> Vec<Detection> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));
    let mut result = Vec::new();

    while !boxes.is_empty() {
        let keep = boxes[0].clone();
        boxes = boxes
            .iter()
            .filter(|candidate| intersection(&keep, candidate) / union(&keep, candidate) < NMS_IOU_THRESHOLD)
            .cloned()
            .collect();
        result.push(keep);
    }

    result
}

fn load_class_labels(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.trim();
        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            label: "phone".to_string(),
            confidence,
            x1,
            y1,
            x2,
            y2,
        }
    }

    #[test]
    fn nms_drops_overlapping_lower_confidence_boxes() {
        let boxes = vec![
            detection(0.9, 10.0, 10.0, 110.0, 110.0),
            detection(0.6, 12.0, 12.0, 112.0, 112.0),
            detection(0.8, 300.0, 300.0, 400.0, 400.0),
        ];

        let kept = non_max_suppression(boxes);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.8);
    }

    #[test]
    fn nms_keeps_disjoint_boxes() {
        let boxes = vec![
            detection(0.7, 0.0, 0.0, 50.0, 50.0),
            detection(0.7, 100.0, 100.0, 150.0, 150.0),
        ];

        assert_eq!(non_max_suppression(boxes).len(), 2);
    }

    #[test]
    fn transform_image_preserves_original_dimensions() {
        let img = image::ImageBuffer::<image::Rgb<u8>, Vec<u8>>::from_pixel(
            100,
            80,
            image::Rgb([255, 0, 0]),
        );
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut image_data),
            image::ImageFormat::Png,
        )
        .unwrap();

        let (input, width, height) = transform_image(&image_data).unwrap();

        assert_eq!((width, height), (100, 80));
        assert_eq!(input.shape(), &[1, 3, 640, 640]);
    }
}
