use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::{GrayImage, Rgb, RgbImage};
use plate_gate::display::{self, DisplayReceiver, DisplaySink};
use plate_gate::plate_detection::detection_loop::{DetectionLoop, SessionEnd};
use plate_gate::plate_detection::{
    BoundingBox, FrameSource, Localizer, RecognitionCandidate, Recognizers, TextReader,
};
use plate_gate::registry::{RegistryDocument, RegistryStore};
use plate_gate::route::RouteAction;
use plate_gate::{
    normalize, CapabilityError, GateConfig, RegistryError, SessionError, SideEffectRequest,
    Status, VehicleRegistry,
};

#[derive(Default)]
struct SharedStore {
    document: Mutex<Option<RegistryDocument>>,
    saves: AtomicUsize,
}

/// Local handle so the test crate can implement the foreign `RegistryStore` trait.
struct StoreHandle(Arc<SharedStore>);

impl std::ops::Deref for StoreHandle {
    type Target = SharedStore;

    fn deref(&self) -> &SharedStore {
        &self.0
    }
}

impl RegistryStore for StoreHandle {
    fn load(&self) -> io::Result<RegistryDocument> {
        self.document
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "empty"))
    }

    fn save(&self, document: &RegistryDocument) -> io::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.document.lock().unwrap() = Some(document.clone());
        Ok(())
    }

    fn location(&self) -> PathBuf {
        PathBuf::from("shared")
    }
}

/// Yields the given frames, then either ends or fails.
struct ScriptedSource {
    frames: VecDeque<RgbImage>,
    fail_open: bool,
    fail_at_end: bool,
    endless: bool,
    closed: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn frames(count: usize) -> Self {
        Self {
            frames: (0..count).map(|_| blank_frame()).collect(),
            fail_open: false,
            fail_at_end: false,
            endless: false,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> Result<(), CapabilityError> {
        if self.fail_open {
            return Err(CapabilityError::Camera("device 0 not found".to_string()));
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, CapabilityError> {
        if self.endless {
            return Ok(Some(blank_frame()));
        }
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.fail_at_end => Err(CapabilityError::Camera("unplugged".to_string())),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Returns the same boxes for every frame, optionally failing on chosen calls.
struct FixedLocalizer {
    boxes: Vec<BoundingBox>,
    fail_on: Vec<usize>,
    calls: Arc<AtomicUsize>,
    seen_sizes: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl FixedLocalizer {
    fn new(boxes: Vec<BoundingBox>) -> Self {
        Self {
            boxes,
            fail_on: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            seen_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Localizer for FixedLocalizer {
    fn detect(
        &mut self,
        frame: &RgbImage,
        _confidence_threshold: f32,
    ) -> Result<Vec<BoundingBox>, CapabilityError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_sizes.lock().unwrap().push(frame.dimensions());
        if self.fail_on.contains(&call) {
            return Err(CapabilityError::Inference("forward pass failed".to_string()));
        }
        Ok(self.boxes.clone())
    }
}

struct FixedReader {
    text: String,
    confidence: f32,
    calls: Arc<AtomicUsize>,
}

impl FixedReader {
    fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl TextReader for FixedReader {
    fn read(&mut self, _region: &GrayImage) -> Result<Vec<RecognitionCandidate>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RecognitionCandidate::new(self.text.clone(), self.confidence)])
    }
}

#[derive(Clone, Default)]
struct RecordingRoute {
    requests: Arc<Mutex<Vec<SideEffectRequest>>>,
}

impl RouteAction for RecordingRoute {
    fn show_route(&mut self, request: &SideEffectRequest) {
        self.requests.lock().unwrap().push(request.clone());
    }
}

#[derive(Default)]
struct CollectingSink {
    frames: Vec<RgbImage>,
    statuses: Vec<String>,
}

impl DisplaySink for CollectingSink {
    fn display_frame(&mut self, frame: RgbImage) {
        self.frames.push(frame);
    }

    fn set_status(&mut self, status: &str) {
        self.statuses.push(status.to_string());
    }

    fn set_fps(&mut self, _fps: u32) {}
}

/// Collects like [`CollectingSink`] and asks for a stop once a plate is authorized.
#[derive(Default)]
struct StopWhenAuthorized {
    statuses: Vec<String>,
}

impl DisplaySink for StopWhenAuthorized {
    fn display_frame(&mut self, _frame: RgbImage) {}

    fn set_status(&mut self, status: &str) {
        self.statuses.push(status.to_string());
    }

    fn set_fps(&mut self, _fps: u32) {}

    fn stop_requested(&self) -> bool {
        self.statuses.iter().any(|s| s.starts_with("Authorized:"))
    }
}

fn blank_frame() -> RgbImage {
    RgbImage::from_pixel(800, 600, Rgb([90, 90, 90]))
}

fn config() -> GateConfig {
    GateConfig {
        frame_interval_ms: 1,
        display_queue: 256,
        ..GateConfig::default()
    }
}

fn registry_with_abc() -> Arc<VehicleRegistry> {
    let registry = VehicleRegistry::load(Box::new(StoreHandle(Arc::new(SharedStore::default()))));
    registry.add(normalize("ABC123"), "X", "Y").unwrap();
    Arc::new(registry)
}

fn plate_box() -> BoundingBox {
    BoundingBox::new(100.0, 100.0, 300.0, 160.0)
}

struct Harness {
    detector: DetectionLoop,
    receiver: DisplayReceiver,
    route: RecordingRoute,
}

fn harness(localizer: FixedLocalizer, reader: FixedReader) -> Harness {
    let (publisher, receiver) = display::channel(config().display_queue);
    let route = RecordingRoute::default();
    let detector = DetectionLoop::new(
        config(),
        Recognizers::new(Box::new(localizer), Box::new(reader)),
        registry_with_abc(),
        Box::new(route.clone()),
        publisher,
    );
    Harness {
        detector,
        receiver,
        route,
    }
}

#[test]
fn test_authorized_plate_triggers_route_once() {
    let mut h = harness(
        FixedLocalizer::new(vec![plate_box()]),
        FixedReader::new("a-bc 123", 0.9),
    );

    let decisions = h.detector.process_frame(&blank_frame());
    assert_eq!(decisions.len(), 1);
    match &decisions[0].status {
        Status::Authorized(record) => {
            assert_eq!(record.plate.as_str(), "ABC123");
            assert_eq!(record.origin, "X");
            assert_eq!(record.destination, "Y");
        }
        other => panic!("expected authorized, got {:?}", other),
    }

    let requests = h.route.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![SideEffectRequest {
            plate: normalize("ABC123"),
            origin: "X".to_string(),
            destination: "Y".to_string(),
        }]
    );
}

#[test]
fn test_unknown_plate_has_no_route() {
    let mut h = harness(
        FixedLocalizer::new(vec![plate_box()]),
        FixedReader::new("zzz999", 0.9),
    );

    let decisions = h.detector.process_frame(&blank_frame());
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].status, Status::Unknown(normalize("ZZZ999")));
    assert_eq!(decisions[0].side_effect, None);
    assert!(h.route.requests.lock().unwrap().is_empty());
}

#[test]
fn test_low_confidence_reading_is_skipped() {
    let mut h = harness(
        FixedLocalizer::new(vec![plate_box()]),
        FixedReader::new("ABC123", 0.25),
    );
    assert!(h.detector.process_frame(&blank_frame()).is_empty());
    assert!(h.route.requests.lock().unwrap().is_empty());
}

#[test]
fn test_zero_area_region_yields_no_decision_and_loop_continues() {
    let reader = FixedReader::new("ABC123", 0.9);
    let reads = reader.calls.clone();
    let localizer = FixedLocalizer::new(vec![BoundingBox::new(900.0, 700.0, 1000.0, 800.0)]);
    let detections = localizer.calls.clone();
    let h = harness(localizer, reader);

    let source = ScriptedSource::frames(3);
    let closed = source.closed.clone();
    let session = h.detector.start(Box::new(source)).unwrap();
    let (detector, end) = session.wait().unwrap();

    assert_eq!(end, SessionEnd::EndOfStream);
    assert_eq!(detections.load(Ordering::SeqCst), 3);
    assert_eq!(reads.load(Ordering::SeqCst), 0);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(detector.debounce().last_actioned().is_none());

    let mut sink = CollectingSink::default();
    assert_eq!(h.receiver.drain(&mut sink), Some(SessionEnd::EndOfStream));
    assert_eq!(sink.frames.len(), 3);
}

#[test]
fn test_session_debounces_across_frames_and_resets_on_stop() {
    let h = harness(
        FixedLocalizer::new(vec![plate_box()]),
        FixedReader::new("ABC 123", 0.8),
    );

    let session = h.detector.start(Box::new(ScriptedSource::frames(5))).unwrap();
    let (detector, end) = session.wait().unwrap();
    assert_eq!(end, SessionEnd::EndOfStream);
    assert_eq!(h.route.requests.lock().unwrap().len(), 1);
    assert!(detector.debounce().last_actioned().is_none());

    let mut sink = CollectingSink::default();
    assert_eq!(h.receiver.drain(&mut sink), Some(SessionEnd::EndOfStream));
    assert_eq!(sink.frames.len(), 5);
    assert!(sink
        .statuses
        .iter()
        .any(|s| s == "Authorized: ABC123 | X → Y"));
    assert_eq!(sink.statuses.last().unwrap(), "System Ready • Detection stopped");

    // A new session sees the plate as new again.
    let session = detector.start(Box::new(ScriptedSource::frames(2))).unwrap();
    let (_, end) = session.wait().unwrap();
    assert_eq!(end, SessionEnd::EndOfStream);
    assert_eq!(h.route.requests.lock().unwrap().len(), 2);
}

#[test]
fn test_overlay_is_drawn_on_published_frame() {
    let h = harness(
        FixedLocalizer::new(vec![plate_box()]),
        FixedReader::new("zzz999", 0.9),
    );
    let session = h.detector.start(Box::new(ScriptedSource::frames(1))).unwrap();
    session.wait().unwrap();

    let mut sink = CollectingSink::default();
    h.receiver.drain(&mut sink);
    let frame = &sink.frames[0];
    assert_eq!(*frame.get_pixel(100, 130), Rgb([244, 67, 54]));
    assert_eq!(*frame.get_pixel(200, 130), Rgb([90, 90, 90]));
}

#[test]
fn test_frames_are_resized_to_working_resolution() {
    let localizer = FixedLocalizer::new(Vec::new());
    let sizes = localizer.seen_sizes.clone();
    let h = harness(localizer, FixedReader::new("", 0.0));

    let mut source = ScriptedSource::frames(0);
    source.frames.push_back(RgbImage::new(1920, 1080));
    source.frames.push_back(RgbImage::new(640, 480));
    let (_, end) = h.detector.start(Box::new(source)).unwrap().wait().unwrap();

    assert_eq!(end, SessionEnd::EndOfStream);
    assert_eq!(*sizes.lock().unwrap(), vec![(800, 600), (800, 600)]);
}

#[test]
fn test_localizer_failure_skips_only_that_frame() {
    let mut localizer = FixedLocalizer::new(vec![plate_box()]);
    localizer.fail_on = vec![0];
    let detections = localizer.calls.clone();
    let h = harness(localizer, FixedReader::new("ABC123", 0.9));

    let (_, end) = h
        .detector
        .start(Box::new(ScriptedSource::frames(2)))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(end, SessionEnd::EndOfStream);
    assert_eq!(detections.load(Ordering::SeqCst), 2);
    assert_eq!(h.route.requests.lock().unwrap().len(), 1);
}

#[test]
fn test_camera_failure_mid_session_is_reported_once() {
    let h = harness(FixedLocalizer::new(Vec::new()), FixedReader::new("", 0.0));
    let mut source = ScriptedSource::frames(2);
    source.fail_at_end = true;

    let (_, end) = h.detector.start(Box::new(source)).unwrap().wait().unwrap();
    assert!(matches!(&end, SessionEnd::SourceFailed(reason) if reason.contains("unplugged")));

    let mut sink = CollectingSink::default();
    assert_eq!(h.receiver.drain(&mut sink), Some(end));
    let camera_errors = sink
        .statuses
        .iter()
        .filter(|s| s.starts_with("Camera error"))
        .count();
    assert_eq!(camera_errors, 1);
}

#[test]
fn test_open_failure_never_runs() {
    let localizer = FixedLocalizer::new(Vec::new());
    let detections = localizer.calls.clone();
    let h = harness(localizer, FixedReader::new("", 0.0));
    let mut source = ScriptedSource::frames(1);
    source.fail_open = true;

    let failure = h.detector.start(Box::new(source)).err().unwrap();
    match &failure.error {
        SessionError::CameraUnavailable(msg) => assert!(msg.contains("device 0")),
        other => panic!("expected camera error, got {:?}", other),
    }
    assert_eq!(detections.load(Ordering::SeqCst), 0);

    // The loop comes back usable.
    let session = failure.detector.start(Box::new(ScriptedSource::frames(1))).unwrap();
    assert_eq!(session.wait().unwrap().1, SessionEnd::EndOfStream);
}

#[test]
fn test_stop_signal_ends_endless_session() {
    let h = harness(FixedLocalizer::new(Vec::new()), FixedReader::new("", 0.0));
    let mut source = ScriptedSource::frames(0);
    source.endless = true;

    let session = h.detector.start(Box::new(source)).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(!session.is_finished());
    let (_, end) = session.stop().unwrap();
    assert_eq!(end, SessionEnd::Stopped);
}

#[test]
fn test_short_registration_never_touches_store() {
    let store = Arc::new(SharedStore::default());
    let registry = VehicleRegistry::load(Box::new(StoreHandle(store.clone())));
    let err = registry.register("AB1", "X", "Y").unwrap_err();
    assert!(matches!(err, RegistryError::InvalidPlate(_)));
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
}

#[test]
fn test_session_end_reaches_stalled_presenter() {
    let (publisher, receiver) = display::channel(2);
    let detector = DetectionLoop::new(
        config(),
        Recognizers::new(
            Box::new(FixedLocalizer::new(Vec::new())),
            Box::new(FixedReader::new("", 0.0)),
        ),
        registry_with_abc(),
        Box::new(RecordingRoute::default()),
        publisher,
    );
    let session = detector.start(Box::new(ScriptedSource::frames(5))).unwrap();

    // Long enough for the worker to give up on the full queue and finish.
    thread::sleep(Duration::from_secs(1));
    assert!(session.is_finished());

    let mut sink = CollectingSink::default();
    let end = session.present(&receiver, &mut sink, None);
    assert_eq!(end, Some(SessionEnd::EndOfStream));
    assert_eq!(sink.frames.len(), 1);
    assert_eq!(session.wait().unwrap().1, SessionEnd::EndOfStream);
}

#[test]
fn test_registration_during_session_is_seen_by_next_frame() {
    let h = harness(
        FixedLocalizer::new(vec![plate_box()]),
        FixedReader::new("new 777", 0.9),
    );
    let registry = h.detector.registry().clone();
    let mut source = ScriptedSource::frames(0);
    source.endless = true;
    let session = h.detector.start(Box::new(source)).unwrap();

    let admin = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        registry.add(normalize("NEW777"), "P", "Q").unwrap();
    });

    let mut sink = StopWhenAuthorized::default();
    let deadline = Instant::now() + Duration::from_secs(5);
    let end = session.present(&h.receiver, &mut sink, Some(deadline));
    admin.join().unwrap();

    assert_eq!(end, Some(SessionEnd::Stopped));
    let unknown = sink
        .statuses
        .iter()
        .position(|s| s == "Unknown Vehicle Detected: NEW777")
        .expect("plate reported unknown before registration");
    let authorized = sink
        .statuses
        .iter()
        .position(|s| s == "Authorized: NEW777 | P → Q")
        .expect("plate authorized after registration");
    assert!(unknown < authorized);

    let requests = h.route.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![SideEffectRequest {
            plate: normalize("NEW777"),
            origin: "P".to_string(),
            destination: "Q".to_string(),
        }]
    );
}
