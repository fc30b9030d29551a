use std::time::Duration;

use crossbeam::channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::plate_detection::detection_loop::SessionEnd;

const CONTROL_SEND_TIMEOUT: Duration = Duration::from_millis(250);

/// What the worker posts to the presentation thread.
#[derive(Debug, Clone)]
pub enum DisplayEvent {
    Frame(RgbImage),
    Status(String),
    Fps(u32),
}

/// Presentation primitives. Only ever called on the thread that owns the
/// [`DisplayReceiver`].
pub trait DisplaySink {
    fn display_frame(&mut self, frame: RgbImage);
    fn set_status(&mut self, status: &str);
    fn set_fps(&mut self, fps: u32);
    fn session_ended(&mut self, _end: &SessionEnd) {}

    /// Whether the operator asked the presentation to stop detection.
    fn stop_requested(&self) -> bool {
        false
    }
}

/// Frames, status and FPS share a bounded queue. Session ends travel on their
/// own unbounded queue so they are never dropped.
pub fn channel(capacity: usize) -> (DisplayPublisher, DisplayReceiver) {
    let (sender, receiver) = bounded(capacity.max(1));
    let (ended_s, ended_r) = unbounded();
    (
        DisplayPublisher {
            sender,
            ended: ended_s,
        },
        DisplayReceiver {
            receiver,
            ended: ended_r,
        },
    )
}

/// Worker side of the hand-off. Never blocks for long.
#[derive(Clone)]
pub struct DisplayPublisher {
    sender: Sender<DisplayEvent>,
    ended: Sender<SessionEnd>,
}

impl DisplayPublisher {
    pub fn display_frame(&self, frame: RgbImage) {
        match self.sender.try_send(DisplayEvent::Frame(frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::DISPLAY_DROPPED.inc();
                debug!("Presenter lagging, frame dropped");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn set_status(&self, status: impl Into<String>) {
        self.post(DisplayEvent::Status(status.into()));
    }

    pub fn set_fps(&self, fps: u32) {
        self.post(DisplayEvent::Fps(fps));
    }

    pub fn session_ended(&self, end: SessionEnd) {
        if self.ended.send(end).is_err() {
            debug!("Presenter closed before the session ended");
        }
    }

    fn post(&self, event: DisplayEvent) {
        if self
            .sender
            .send_timeout(event, CONTROL_SEND_TIMEOUT)
            .is_err()
        {
            debug!("Presenter unavailable, event dropped");
        }
    }
}

/// Outcome of one [`DisplayReceiver::dispatch`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Delivered,
    Idle,
    Ended(SessionEnd),
    Disconnected,
}

/// Presenter side of the hand-off.
pub struct DisplayReceiver {
    receiver: Receiver<DisplayEvent>,
    ended: Receiver<SessionEnd>,
}

impl DisplayReceiver {
    /// Waits up to `timeout` for one event and hands it to `sink`. A session end
    /// is reported after every event queued before it.
    pub fn dispatch(&self, sink: &mut dyn DisplaySink, timeout: Duration) -> Dispatch {
        if let Ok(end) = self.ended.try_recv() {
            return Dispatch::Ended(self.finish(sink, end));
        }
        select! {
            recv(self.receiver) -> event => match event {
                Ok(event) => {
                    deliver(sink, event);
                    Dispatch::Delivered
                }
                Err(_) => match self.ended.try_recv() {
                    Ok(end) => Dispatch::Ended(self.finish(sink, end)),
                    Err(_) => Dispatch::Disconnected,
                },
            },
            recv(self.ended) -> end => match end {
                Ok(end) => Dispatch::Ended(self.finish(sink, end)),
                Err(_) => {
                    self.drain_events(sink);
                    Dispatch::Disconnected
                }
            },
            default(timeout) => Dispatch::Idle,
        }
    }

    /// Delivers everything already queued without waiting.
    pub fn drain(&self, sink: &mut dyn DisplaySink) -> Option<SessionEnd> {
        self.drain_events(sink);
        self.ended.try_recv().ok().map(|end| self.finish(sink, end))
    }

    fn drain_events(&self, sink: &mut dyn DisplaySink) {
        while let Ok(event) = self.receiver.try_recv() {
            deliver(sink, event);
        }
    }

    fn finish(&self, sink: &mut dyn DisplaySink, end: SessionEnd) -> SessionEnd {
        self.drain_events(sink);
        sink.session_ended(&end);
        end
    }
}

fn deliver(sink: &mut dyn DisplaySink, event: DisplayEvent) {
    match event {
        DisplayEvent::Frame(frame) => sink.display_frame(frame),
        DisplayEvent::Status(status) => sink.set_status(&status),
        DisplayEvent::Fps(fps) => sink.set_fps(fps),
    }
}

/// Headless sink that only logs.
#[derive(Default)]
pub struct LogDisplay {
    frames: u64,
    last_status: String,
}

impl DisplaySink for LogDisplay {
    fn display_frame(&mut self, _frame: RgbImage) {
        self.frames += 1;
    }

    fn set_status(&mut self, status: &str) {
        if status != self.last_status {
            info!("{}", status);
            self.last_status = status.to_string();
        }
    }

    fn set_fps(&mut self, fps: u32) {
        debug!("FPS: {}", fps);
    }

    fn session_ended(&mut self, end: &SessionEnd) {
        match end {
            SessionEnd::SourceFailed(reason) => {
                warn!("Detection stopped after {} frames: {}", self.frames, reason)
            }
            other => info!("Detection stopped after {} frames: {}", self.frames, other),
        }
    }
}
