use std::sync::mpsc::channel;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::Sender;

use anyhow::{anyhow, Context};
use gstreamer::parse_launch;
use gstreamer::prelude::Cast;
use gstreamer::prelude::CastNone;
use gstreamer::prelude::ElementExt;
use gstreamer::prelude::GstBinExt;
use gstreamer::prelude::MulDiv;
use gstreamer::Buffer;
use gstreamer::Caps;
use gstreamer_video::VideoCapsBuilder;
use gstreamer_video::VideoFormat;
use image::RgbImage;
use plate_gate::display::DisplaySink;
use plate_gate::plate_detection::detection_loop::SessionEnd;
use tracing::{debug, info, warn};

/// Streams annotated frames as H264 over RTP.
pub struct RtpSink {
    pipeline: gstreamer::Pipeline,
    fps: u32,
    width: u32,
    height: u32,
    frames: u64,
    buffer_s: Option<Sender<Buffer>>,
}

pub fn create_caps(width: u32, height: u32, fps: u32) -> Caps {
    VideoCapsBuilder::new()
        .width(width as i32)
        .height(height as i32)
        .framerate(gstreamer::Fraction::new(fps as i32, 1))
        .format(VideoFormat::Rgb)
        .build()
}

impl RtpSink {
    pub fn new(width: u32, height: u32, fps: u32, host: &str, port: u16) -> anyhow::Result<Self> {
        gstreamer::init().context("Cannot initialise gstreamer")?;
        let pipeline_str = format!(
            "appsrc name=src ! videoconvert ! x264enc tune=zerolatency bitrate=500 speed-preset=superfast ! rtph264pay ! udpsink host={host} port={port}"
        );

        let pipeline = parse_launch(&pipeline_str)
            .with_context(|| format!("Cannot create pipeline {pipeline_str}"))?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("{pipeline_str} is not a pipeline"))?;

        let app_src = pipeline
            .by_name("src")
            .and_dynamic_cast::<gstreamer_app::AppSrc>()
            .map_err(|_| anyhow!("Cannot create AppSrc"))?;

        let fps = fps.max(1);
        app_src.set_caps(Some(&create_caps(width, height, fps)));
        app_src.set_format(gstreamer::Format::Time);

        pipeline
            .set_state(gstreamer::State::Playing)
            .context("Unable to set the pipeline to the `Playing` state")?;
        info!("Streaming to rtp://{}:{}", host, port);

        let (buffer_s, buffer_r) = channel();
        Self::init(&app_src, buffer_r);
        Ok(Self {
            pipeline,
            fps,
            width,
            height,
            frames: 0,
            buffer_s: Some(buffer_s),
        })
    }

    fn init(app_src: &gstreamer_app::AppSrc, receiver: Receiver<Buffer>) {
        // appsrc pulls: every need-data waits for the next published frame.
        app_src.set_callbacks(
            gstreamer_app::AppSrcCallbacks::builder()
                .need_data(move |appsrc, _| {
                    if let Ok(buffer) = receiver.recv() {
                        if let Err(e) = appsrc.push_buffer(buffer) {
                            warn!("Cannot push buffer to AppSrc: {}", e);
                        }
                    }
                })
                .build(),
        );
    }

    fn make_buffer(&self, frame: &RgbImage) -> Option<Buffer> {
        let duration = gstreamer::ClockTime::SECOND.mul_div_floor(1, self.fps as u64)?;
        let pts = duration * self.frames;

        let mut buffer = Buffer::from_slice(frame.as_raw().clone());
        let buffer_mut = buffer.get_mut()?;
        buffer_mut.set_duration(duration);
        buffer_mut.set_pts(pts);
        buffer_mut.set_dts(pts);
        Some(buffer)
    }
}

impl DisplaySink for RtpSink {
    fn display_frame(&mut self, frame: RgbImage) {
        if frame.dimensions() != (self.width, self.height) {
            warn!(
                "Dropping {:?} frame, stream is {}x{}",
                frame.dimensions(),
                self.width,
                self.height
            );
            return;
        }
        let Some(buffer) = self.make_buffer(&frame) else {
            return;
        };
        if let Some(sender) = &self.buffer_s {
            if sender.send(buffer).is_ok() {
                self.frames += 1;
            }
        }
    }

    fn set_status(&mut self, status: &str) {
        info!("{}", status);
    }

    fn set_fps(&mut self, fps: u32) {
        debug!("FPS: {} (streamed {} frames)", fps, self.frames);
    }

    fn session_ended(&mut self, end: &SessionEnd) {
        info!("Stream finished: {}", end);
    }
}

impl Drop for RtpSink {
    fn drop(&mut self) {
        // Unblock the need-data callback before tearing down.
        self.buffer_s.take();
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Cannot stop pipeline: {}", e);
        }
    }
}
