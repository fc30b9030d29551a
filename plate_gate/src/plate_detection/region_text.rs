use image::imageops;
use image::{GrayImage, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use tracing::{debug, warn};

use super::{BoundingBox, PixelRect, RecognitionCandidate, TextReader};

/// Crops a localized plate, binarizes it and keeps the most confident reading.
pub struct RegionTextExtractor {
    confidence_threshold: f32,
}

impl RegionTextExtractor {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Text of the best candidate, or an empty string when the region is
    /// degenerate, unreadable, or no candidate beats the threshold.
    pub fn extract(
        &self,
        frame: &RgbImage,
        bbox: &BoundingBox,
        reader: &mut dyn TextReader,
    ) -> String {
        let rect = match bbox.clamp(frame.width(), frame.height()) {
            Some(rect) => rect,
            None => {
                debug!("Skipping empty region {:?}", bbox);
                return String::new();
            }
        };

        let enhanced = enhance_region(frame, rect);
        match reader.read(&enhanced) {
            Ok(candidates) => best_candidate(&candidates, self.confidence_threshold)
                .map(|text| text.trim().to_string())
                .unwrap_or_default(),
            Err(e) => {
                warn!("Text reading failed for region {:?}: {}", rect, e);
                String::new()
            }
        }
    }
}

/// Grey, 3x3 median, then Otsu binarization.
pub fn enhance_region(frame: &RgbImage, rect: PixelRect) -> GrayImage {
    let cropped = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
    let grey = imageops::grayscale(&cropped);
    let mut smoothed = median_filter(&grey, 1, 1);
    let level = otsu_level(&smoothed);
    for pixel in smoothed.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > level { 255 } else { 0 };
    }
    smoothed
}

/// First candidate with the highest confidence strictly above `threshold`.
pub fn best_candidate(candidates: &[RecognitionCandidate], threshold: f32) -> Option<&str> {
    let mut best: Option<&RecognitionCandidate> = None;
    let mut best_confidence = threshold;
    for candidate in candidates {
        if candidate.confidence > best_confidence {
            best_confidence = candidate.confidence;
            best = Some(candidate);
        }
    }
    best.map(|candidate| candidate.text.as_str())
}
