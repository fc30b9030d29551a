use std::path::Path;

use image::RgbImage;
use opencv::core::Rect;
use opencv::core::Scalar;
use opencv::core::Size;
use opencv::core::Vector;
use opencv::core::CV_32F;
use opencv::dnn;
use opencv::dnn::blob_from_image;
use opencv::dnn::nms_boxes;
use opencv::dnn::Net;
use opencv::dnn::DNN_BACKEND_CUDA;
use opencv::dnn::DNN_BACKEND_OPENCV;
use opencv::dnn::DNN_TARGET_CPU;
use opencv::dnn::DNN_TARGET_CUDA;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;
use opencv::prelude::NetTrait;
use opencv::prelude::NetTraitConst;
use plate_gate::plate_detection::{BoundingBox, Localizer};
use plate_gate::CapabilityError;
use tracing::{debug, info};

use super::{inference_error, rgb_to_mat};

const NMS_THRESHOLD: f32 = 0.4;
// cx, cy, w, h, objectness, plate score
const YOLO_COLUMNS: usize = 6;

pub struct ObjectDetector {
    classifier: Net,
    input_size: i32,
}

struct Detection {
    rect: Rect,
    confidence: f32,
}

/// Decodes a flat YOLOv5 single-class output. Coordinates are in network
/// input space and get scaled back by `x_factor`/`y_factor`.
fn post_process(
    data: &[f32],
    confidence_threshold: f32,
    x_factor: f32,
    y_factor: f32,
) -> Vec<Detection> {
    data.chunks_exact(YOLO_COLUMNS)
        .filter_map(|row| {
            let confidence = row[4] * row[5];
            if confidence <= confidence_threshold {
                return None;
            }
            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            let left = (cx - 0.5 * w) * x_factor;
            let top = (cy - 0.5 * h) * y_factor;
            Some(Detection {
                rect: Rect::new(
                    left as i32,
                    top as i32,
                    (w * x_factor) as i32,
                    (h * y_factor) as i32,
                ),
                confidence,
            })
        })
        .collect()
}

impl ObjectDetector {
    pub fn plate_detector(model: &Path, use_gpu: bool) -> Result<Self, CapabilityError> {
        let model_path = model.to_string_lossy();
        let load = |e: opencv::Error| {
            CapabilityError::ModelLoad(format!("{}: {}", model_path, e))
        };
        let mut classifier = dnn::read_net_from_onnx(&model_path).map_err(load)?;

        if use_gpu {
            classifier.set_preferable_backend(DNN_BACKEND_CUDA).map_err(load)?;
            classifier.set_preferable_target(DNN_TARGET_CUDA).map_err(load)?;
        } else {
            classifier.set_preferable_backend(DNN_BACKEND_OPENCV).map_err(load)?;
            classifier.set_preferable_target(DNN_TARGET_CPU).map_err(load)?;
        }
        info!("Loaded plate localizer {} (gpu: {})", model_path, use_gpu);

        Ok(ObjectDetector {
            classifier,
            input_size: 640,
        })
    }

    fn forward(&mut self, image: &Mat) -> opencv::Result<Vector<Mat>> {
        let mut blob = blob_from_image(
            image,
            1.0 / 255.0,
            Size::new(self.input_size, self.input_size),
            Scalar::default(),
            true,
            false,
            CV_32F,
        )?;

        self.classifier
            .set_input(&mut blob, "", 1.0, Scalar::default())?;

        let output_names = self.classifier.get_unconnected_out_layers_names()?;
        let mut output_values = Vector::<Mat>::default();
        self.classifier.forward(&mut output_values, &output_names)?;
        Ok(output_values)
    }
}

unsafe impl Send for ObjectDetector {}

impl Localizer for ObjectDetector {
    fn detect(
        &mut self,
        frame: &RgbImage,
        confidence_threshold: f32,
    ) -> Result<Vec<BoundingBox>, CapabilityError> {
        let image = rgb_to_mat(frame).map_err(inference_error)?;
        let outputs = self.forward(&image).map_err(inference_error)?;

        let x_factor = frame.width() as f32 / self.input_size as f32;
        let y_factor = frame.height() as f32 / self.input_size as f32;

        let mut detections = Vec::new();
        for output in outputs {
            let data = output.data_typed::<f32>().map_err(inference_error)?;
            detections.extend(post_process(
                data,
                confidence_threshold,
                x_factor,
                y_factor,
            ));
        }

        let boxes: Vector<Rect> = detections.iter().map(|d| d.rect).collect();
        let confidences: Vector<f32> = detections.iter().map(|d| d.confidence).collect();
        let mut indices = Vector::<i32>::default();
        nms_boxes(
            &boxes,
            &confidences,
            confidence_threshold,
            NMS_THRESHOLD,
            &mut indices,
            1.0,
            0,
        )
        .map_err(inference_error)?;

        let kept: Vec<BoundingBox> = indices
            .iter()
            .filter_map(|i| detections.get(i as usize))
            .map(|d| {
                BoundingBox::new(
                    d.rect.x as f32,
                    d.rect.y as f32,
                    (d.rect.x + d.rect.width) as f32,
                    (d.rect.y + d.rect.height) as f32,
                )
            })
            .collect();
        debug!("Localizer kept {} of {} boxes", kept.len(), detections.len());
        Ok(kept)
    }
}
