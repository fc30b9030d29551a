use std::ffi::CString;
use std::path::Path;

use image::GrayImage;
use leptess::tesseract::TessApi;
use plate_gate::plate_detection::{RecognitionCandidate, TextReader};
use plate_gate::CapabilityError;
use tracing::{debug, info};

const PLATE_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
// Treat the image as a single text line.
const PAGE_SEG_SINGLE_LINE: &str = "7";

/// Tesseract line reader restricted to plate characters.
pub struct TesseractReader {
    ocr: TessApi,
}

fn set_variable(api: &mut TessApi, name: &str, value: &str) -> Result<(), CapabilityError> {
    let load = |reason: String| CapabilityError::ModelLoad(format!("{}: {}", name, reason));
    let name_c = CString::new(name).map_err(|e| load(e.to_string()))?;
    let value_c = CString::new(value).map_err(|e| load(e.to_string()))?;
    api.raw
        .set_variable(&name_c, &value_c)
        .map_err(|e| load(format!("{:?}", e)))
}

impl TesseractReader {
    pub fn new(tessdata: &Path, language: &str) -> Result<Self, CapabilityError> {
        let data_path = tessdata.to_string_lossy();
        let mut api = TessApi::new(Some(&data_path), language).map_err(|e| {
            CapabilityError::ModelLoad(format!(
                "tesseract {} in {}: {:?}",
                language, data_path, e
            ))
        })?;
        set_variable(&mut api, "tessedit_char_whitelist", PLATE_ALPHABET)?;
        set_variable(&mut api, "tessedit_pageseg_mode", PAGE_SEG_SINGLE_LINE)?;
        info!("Loaded text reader {} from {}", language, data_path);

        Ok(Self { ocr: api })
    }
}

unsafe impl Send for TesseractReader {}

impl TextReader for TesseractReader {
    fn read(&mut self, region: &GrayImage) -> Result<Vec<RecognitionCandidate>, CapabilityError> {
        let cols = region.width() as i32;
        let rows = region.height() as i32;
        self.ocr
            .raw
            .set_image(region.as_raw(), cols, rows, 1, cols)
            .map_err(|e| CapabilityError::Inference(format!("{:?}", e)))?;
        let text = self
            .ocr
            .get_utf8_text()
            .map_err(|e| CapabilityError::Inference(e.to_string()))?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let confidence = self.ocr.mean_text_conf() as f32 / 100.0;
        debug!("OCR {:?} ({:.2})", text, confidence);
        Ok(vec![RecognitionCandidate::new(text, confidence)])
    }
}
