pub mod bounding_box_render;
pub mod detection_loop;
pub mod region_text;

use image::{GrayImage, RgbImage};

use crate::config::GateConfig;
use crate::error::{CapabilityError, SessionError};

/// Box corners in working-frame pixels, as produced by the localizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Integer region inside the frame, always non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Truncates the corners to pixels and clamps them to a `width` x `height` frame.
    /// `None` when nothing of the box is left.
    pub fn clamp(&self, width: u32, height: u32) -> Option<PixelRect> {
        let x1 = (self.x1 as i64).max(0);
        let y1 = (self.y1 as i64).max(0);
        let x2 = (self.x2 as i64).min(width as i64);
        let y2 = (self.y2 as i64).min(height as i64);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// One reading of a region by the text reader.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionCandidate {
    pub text: String,
    pub confidence: f32,
    /// Where the text was found inside the region. Not used for selection.
    pub region: Option<PixelRect>,
}

impl RecognitionCandidate {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            region: None,
        }
    }
}

/// Pull-based frame source bracketed by `open`/`close`.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), CapabilityError>;

    /// `Ok(None)` signals end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CapabilityError>;

    fn close(&mut self);
}

/// Finds plate boxes in a frame, already filtered by `confidence_threshold`.
pub trait Localizer: Send {
    fn detect(
        &mut self,
        frame: &RgbImage,
        confidence_threshold: f32,
    ) -> Result<Vec<BoundingBox>, CapabilityError>;
}

/// Reads text from a preprocessed single-channel region.
pub trait TextReader: Send {
    fn read(&mut self, region: &GrayImage) -> Result<Vec<RecognitionCandidate>, CapabilityError>;
}

/// Builds the recognition capabilities once, before a session may start.
pub trait RecognizerLoader {
    fn load_localizer(&self, config: &GateConfig) -> Result<Box<dyn Localizer>, CapabilityError>;
    fn load_reader(&self, config: &GateConfig) -> Result<Box<dyn TextReader>, CapabilityError>;
}

/// Ready-to-use capability handles.
pub struct Recognizers {
    pub localizer: Box<dyn Localizer>,
    pub reader: Box<dyn TextReader>,
}

impl Recognizers {
    pub fn new(localizer: Box<dyn Localizer>, reader: Box<dyn TextReader>) -> Self {
        Self { localizer, reader }
    }

    pub fn load(loader: &dyn RecognizerLoader, config: &GateConfig) -> Result<Self, SessionError> {
        let localizer = loader
            .load_localizer(config)
            .map_err(|e| SessionError::ModelLoad(e.to_string()))?;
        let reader = loader
            .load_reader(config)
            .map_err(|e| SessionError::ModelLoad(e.to_string()))?;
        Ok(Self { localizer, reader })
    }
}
