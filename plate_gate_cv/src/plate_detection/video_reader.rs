use image::RgbImage;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::VideoCaptureTrait;
use opencv::prelude::VideoCaptureTraitConst;
use opencv::videoio::VideoCapture;
use opencv::videoio::CAP_ANY;
use plate_gate::plate_detection::FrameSource;
use plate_gate::CapabilityError;
use tracing::{info, warn};

use super::mat_to_rgb;

/// Where frames come from.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoInput {
    Device(i32),
    File(String),
}

impl VideoInput {
    /// A bare number is a camera index, anything else a file or stream URL.
    pub fn parse(source: &str) -> Self {
        match source.trim().parse::<i32>() {
            Ok(index) => VideoInput::Device(index),
            Err(_) => VideoInput::File(source.to_string()),
        }
    }
}

pub struct VideoReader {
    input: VideoInput,
    capture: Option<VideoCapture>,
    do_loop: bool,
}

fn make_video(input: &VideoInput) -> opencv::Result<VideoCapture> {
    match input {
        VideoInput::Device(index) => VideoCapture::new(*index, CAP_ANY),
        VideoInput::File(path) => VideoCapture::from_file(path, CAP_ANY),
    }
}

impl VideoReader {
    /// `do_loop` restarts video files when they end.
    pub fn new(input: VideoInput, do_loop: bool) -> Self {
        Self {
            input,
            capture: None,
            do_loop,
        }
    }

    fn grab(&mut self) -> Result<Option<Mat>, CapabilityError> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| CapabilityError::Camera("video source is not open".to_string()))?;
        let mut image = Mat::default();
        let grabbed = capture
            .read(&mut image)
            .map_err(|e| CapabilityError::Camera(e.to_string()))?;
        if !grabbed || image.empty() {
            return Ok(None);
        }
        Ok(Some(image))
    }
}

impl FrameSource for VideoReader {
    fn open(&mut self) -> Result<(), CapabilityError> {
        let capture = make_video(&self.input).map_err(|e| CapabilityError::Camera(e.to_string()))?;
        let opened = capture
            .is_opened()
            .map_err(|e| CapabilityError::Camera(e.to_string()))?;
        if !opened {
            return Err(CapabilityError::Camera(format!(
                "cannot open {:?}",
                self.input
            )));
        }
        info!("Opened video source {:?}", self.input);
        self.capture = Some(capture);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, CapabilityError> {
        let mut image = self.grab()?;

        if image.is_none() {
            match &self.input {
                VideoInput::File(_) if self.do_loop => {
                    self.close();
                    self.open()?;
                    image = self.grab()?;
                }
                VideoInput::File(_) => return Ok(None),
                VideoInput::Device(index) => {
                    return Err(CapabilityError::Camera(format!(
                        "camera {} stopped delivering frames",
                        index
                    )))
                }
            }
        }

        match image {
            Some(image) => mat_to_rgb(&image).map_err(|e| CapabilityError::Camera(e.to_string())),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                warn!("Cannot release video source: {}", e);
            }
        }
    }
}

unsafe impl Send for VideoReader {}
