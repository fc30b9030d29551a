pub mod object_detector;
pub mod ocr_reader;
pub mod rtp_sink;
pub mod video_reader;
pub mod window_display;

use image::RgbImage;
use opencv::core::{Scalar, CV_8UC3};
use opencv::imgproc::{cvt_color, COLOR_BGR2RGB, COLOR_RGB2BGR};
use opencv::prelude::*;
use plate_gate::plate_detection::{Localizer, RecognizerLoader, TextReader};
use plate_gate::{CapabilityError, GateConfig};

use object_detector::ObjectDetector;
use ocr_reader::TesseractReader;

/// Loads the YOLOv5 plate localizer and the Tesseract reader.
pub struct OpenCvRecognizers {
    pub use_gpu: bool,
}

impl RecognizerLoader for OpenCvRecognizers {
    fn load_localizer(&self, config: &GateConfig) -> Result<Box<dyn Localizer>, CapabilityError> {
        Ok(Box::new(ObjectDetector::plate_detector(
            &config.models.localizer,
            self.use_gpu,
        )?))
    }

    fn load_reader(&self, config: &GateConfig) -> Result<Box<dyn TextReader>, CapabilityError> {
        Ok(Box::new(TesseractReader::new(
            &config.models.tessdata,
            &config.models.language,
        )?))
    }
}

pub(crate) fn inference_error(e: opencv::Error) -> CapabilityError {
    CapabilityError::Inference(e.to_string())
}

/// Copies a BGR `Mat` into an RGB image.
pub fn mat_to_rgb(bgr: &Mat) -> opencv::Result<Option<RgbImage>> {
    let mut rgb = Mat::default();
    cvt_color(bgr, &mut rgb, COLOR_BGR2RGB, 0)?;
    let bytes = rgb.data_bytes()?.to_vec();
    Ok(RgbImage::from_raw(rgb.cols() as u32, rgb.rows() as u32, bytes))
}

/// Copies an RGB image into a BGR `Mat`.
pub fn rgb_to_mat(image: &RgbImage) -> opencv::Result<Mat> {
    let mut rgb = Mat::new_rows_cols_with_default(
        image.height() as i32,
        image.width() as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    rgb.data_bytes_mut()?.copy_from_slice(image.as_raw());
    let mut bgr = Mat::default();
    cvt_color(&rgb, &mut bgr, COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}
