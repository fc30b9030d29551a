use image::RgbImage;
use opencv::highgui;
use plate_gate::display::DisplaySink;
use plate_gate::plate_detection::detection_loop::SessionEnd;
use tracing::{info, warn};

use super::rgb_to_mat;

const ESC: i32 = 27;

/// Desktop window showing the annotated stream. Must live on the main thread.
pub struct WindowDisplay {
    name: String,
    status: String,
    fps: u32,
    stop: bool,
}

impl WindowDisplay {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            name: name.to_string(),
            status: String::new(),
            fps: 0,
            stop: false,
        })
    }

    fn refresh_title(&self) {
        let title = format!("{} | FPS: {}", self.status, self.fps);
        if let Err(e) = highgui::set_window_title(&self.name, &title) {
            warn!("Cannot update window title: {}", e);
        }
    }

    fn show(&mut self, frame: &RgbImage) -> opencv::Result<()> {
        let image = rgb_to_mat(frame)?;
        highgui::imshow(&self.name, &image)?;
        if highgui::wait_key(1)? == ESC {
            info!("Stop requested from the window");
            self.stop = true;
        }
        Ok(())
    }
}

impl DisplaySink for WindowDisplay {
    fn display_frame(&mut self, frame: RgbImage) {
        if let Err(e) = self.show(&frame) {
            warn!("Cannot display frame: {}", e);
        }
    }

    fn set_status(&mut self, status: &str) {
        if status != self.status {
            info!("{}", status);
            self.status = status.to_string();
            self.refresh_title();
        }
    }

    fn set_fps(&mut self, fps: u32) {
        self.fps = fps;
        self.refresh_title();
    }

    fn session_ended(&mut self, end: &SessionEnd) {
        info!("Detection stopped: {}", end);
    }

    fn stop_requested(&self) -> bool {
        self.stop
    }
}

impl Drop for WindowDisplay {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.name);
    }
}
