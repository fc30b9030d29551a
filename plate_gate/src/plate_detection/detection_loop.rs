use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::authorization::{Debounce, SideEffectRequest, Status};
use crate::config::GateConfig;
use crate::display::{Dispatch, DisplayPublisher, DisplayReceiver, DisplaySink};
use crate::error::SessionError;
use crate::metrics;
use crate::plate::normalize;
use crate::registry::VehicleRegistry;
use crate::route::RouteAction;
use crate::utils::{FpsLimiter, FrameRateCounter};

use super::bounding_box_render::BoundingBoxRender;
use super::region_text::RegionTextExtractor;
use super::{BoundingBox, FrameSource, PixelRect, Recognizers};

const PRESENTER_TICK: Duration = Duration::from_millis(50);

/// Why a running session went back to the stopped state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Stopped,
    EndOfStream,
    SourceFailed(String),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Stopped => f.write_str("stopped by operator"),
            SessionEnd::EndOfStream => f.write_str("end of video stream"),
            SessionEnd::SourceFailed(reason) => write!(f, "camera failure: {}", reason),
        }
    }
}

/// One decided plate in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDecision {
    pub region: PixelRect,
    pub status: Status,
    pub side_effect: Option<SideEffectRequest>,
}

/// The detection loop in its stopped state. Owns everything the worker needs;
/// [`DetectionLoop::start`] moves it onto the worker thread.
pub struct DetectionLoop {
    config: GateConfig,
    recognizers: Recognizers,
    extractor: RegionTextExtractor,
    registry: Arc<VehicleRegistry>,
    debounce: Debounce,
    route: Box<dyn RouteAction>,
    render: BoundingBoxRender,
    publisher: DisplayPublisher,
}

/// Start failure. The loop is handed back so it can be retried.
pub struct StartFailure {
    pub detector: DetectionLoop,
    pub error: SessionError,
}

impl fmt::Debug for StartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartFailure")
            .field("error", &self.error)
            .finish()
    }
}

impl DetectionLoop {
    pub fn new(
        config: GateConfig,
        recognizers: Recognizers,
        registry: Arc<VehicleRegistry>,
        route: Box<dyn RouteAction>,
        publisher: DisplayPublisher,
    ) -> Self {
        let render = BoundingBoxRender::with_font(config.overlay_font.as_deref());
        Self {
            extractor: RegionTextExtractor::new(config.ocr_confidence),
            config,
            recognizers,
            registry,
            debounce: Debounce::default(),
            route,
            render,
            publisher,
        }
    }

    pub fn registry(&self) -> &Arc<VehicleRegistry> {
        &self.registry
    }

    pub fn debounce(&self) -> &Debounce {
        &self.debounce
    }

    /// Opens `source` and starts the worker thread.
    pub fn start(self, mut source: Box<dyn FrameSource>) -> Result<RunningSession, StartFailure> {
        if let Err(e) = source.open() {
            error!("Cannot open frame source: {}", e);
            return Err(StartFailure {
                detector: self,
                error: SessionError::CameraUnavailable(e.to_string()),
            });
        }

        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();
        let handle = thread::spawn(move || {
            let mut detector = self;
            let end = detector.run(source.as_mut(), &worker_stop);
            source.close();
            detector.debounce.clear();
            (detector, end)
        });
        info!("Detection session started");

        Ok(RunningSession {
            stop,
            handle: Some(handle),
        })
    }

    fn run(&mut self, source: &mut dyn FrameSource, stop: &AtomicBool) -> SessionEnd {
        let mut limiter = FpsLimiter::new(self.config.frame_interval());
        let mut fps = FrameRateCounter::default();
        self.publisher
            .set_status("System Active • Detecting license plates...");

        let end = loop {
            if stop.load(Ordering::SeqCst) {
                break SessionEnd::Stopped;
            }
            limiter.begin();

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break SessionEnd::EndOfStream,
                Err(e) => break SessionEnd::SourceFailed(e.to_string()),
            };
            self.step(frame);

            if let Some(count) = fps.tick() {
                metrics::FPS.set(count as i64);
                self.publisher.set_fps(count);
            }
            limiter.wait();
        };

        match &end {
            SessionEnd::SourceFailed(reason) => error!("Frame acquisition failed: {}", reason),
            other => info!("Detection session ended: {}", other),
        }
        self.publisher.set_status(match &end {
            SessionEnd::SourceFailed(reason) => format!("Camera error • {}", reason),
            _ => "System Ready • Detection stopped".to_string(),
        });
        self.publisher.session_ended(end.clone());
        end
    }

    /// Resizes, recognizes, overlays and publishes one frame.
    pub fn step(&mut self, frame: RgbImage) {
        metrics::FRAMES.inc();
        let mut frame = self.to_working_resolution(frame);
        let decisions = self.process_frame(&frame);

        for decision in &decisions {
            self.render
                .render(&mut frame, decision.region, &decision.status);
        }
        if let Some(latest) = decisions.last() {
            self.publisher.set_status(latest.status.status_line());
        }
        self.publisher.display_frame(frame);
    }

    fn to_working_resolution(&self, frame: RgbImage) -> RgbImage {
        let (width, height) = (self.config.working_width, self.config.working_height);
        if frame.dimensions() == (width, height) {
            return frame;
        }
        imageops::resize(&frame, width, height, FilterType::Triangle)
    }

    /// Localizes plates in a working-resolution frame, reads and decides each one,
    /// and fires the route action for newly sighted authorized plates.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Vec<FrameDecision> {
        let boxes = match self
            .recognizers
            .localizer
            .detect(frame, self.config.model_confidence)
        {
            Ok(boxes) => boxes,
            Err(e) => {
                metrics::FRAME_ERRORS.inc();
                warn!("Detection error: {}", e);
                return Vec::new();
            }
        };

        let mut decisions = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            if let Some(decision) = self.decide_region(frame, &bbox) {
                decisions.push(decision);
            }
        }
        decisions
    }

    fn decide_region(&mut self, frame: &RgbImage, bbox: &BoundingBox) -> Option<FrameDecision> {
        let region = bbox.clamp(frame.width(), frame.height())?;
        let raw_text = self
            .extractor
            .extract(frame, bbox, self.recognizers.reader.as_mut());
        let plate = normalize(&raw_text);
        if plate.is_empty() {
            return None;
        }
        debug!("Read '{}' as {}", raw_text, plate);

        let decision = self.debounce.decide(&plate, &self.registry);
        if let Some(request) = &decision.side_effect {
            self.route.show_route(request);
        }
        Some(FrameDecision {
            region,
            status: decision.status,
            side_effect: decision.side_effect,
        })
    }
}

/// A detection loop running on its worker thread.
pub struct RunningSession {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<(DetectionLoop, SessionEnd)>>,
}

impl RunningSession {
    /// Whether the worker has ended on its own (end of stream or camera failure).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Requests a stop. The current iteration is allowed to complete.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Feeds `sink` on the calling thread until the worker ends. Requests a stop
    /// once `deadline` passes or the sink asks for one.
    pub fn present(
        &self,
        receiver: &DisplayReceiver,
        sink: &mut dyn DisplaySink,
        deadline: Option<Instant>,
    ) -> Option<SessionEnd> {
        loop {
            match receiver.dispatch(sink, PRESENTER_TICK) {
                Dispatch::Ended(end) => return Some(end),
                Dispatch::Disconnected => return None,
                Dispatch::Delivered | Dispatch::Idle => {}
            }
            if self.is_finished() {
                return receiver.drain(sink);
            }
            let expired = deadline.map_or(false, |d| Instant::now() >= d);
            if expired || sink.stop_requested() {
                self.request_stop();
            }
        }
    }

    /// Stops the worker and returns the loop in its stopped state.
    pub fn stop(mut self) -> Result<(DetectionLoop, SessionEnd), SessionError> {
        self.request_stop();
        self.join_worker()
    }

    /// Waits for the worker to end on its own.
    pub fn wait(mut self) -> Result<(DetectionLoop, SessionEnd), SessionError> {
        self.join_worker()
    }

    fn join_worker(&mut self) -> Result<(DetectionLoop, SessionEnd), SessionError> {
        let handle = self.handle.take().ok_or(SessionError::WorkerPanicked)?;
        handle.join().map_err(|_| SessionError::WorkerPanicked)
    }
}

impl Drop for RunningSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
            let _ = self.join_worker();
        }
    }
}
