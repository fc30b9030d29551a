use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::warn;

use crate::authorization::Status;

use super::PixelRect;

const AUTHORIZED: Rgb<u8> = Rgb([76, 175, 80]);
const UNKNOWN: Rgb<u8> = Rgb([244, 67, 54]);
const TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const HEADER_HEIGHT: u32 = 35;
const CHAR_WIDTH: u32 = 12;
const THICKNESS_PX: u32 = 2;

pub fn status_color(status: &Status) -> Rgb<u8> {
    if status.is_authorized() {
        AUTHORIZED
    } else {
        UNKNOWN
    }
}

/// Draws plate boxes and their labels onto the working frame.
#[derive(Default)]
pub struct BoundingBoxRender {
    font: Option<FontVec>,
}

impl BoundingBoxRender {
    /// Without a usable font only boxes and label bars are drawn.
    pub fn with_font(path: Option<&Path>) -> Self {
        let font = path.and_then(|path| {
            let loaded = fs::read(path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| FontVec::try_from_vec(bytes).map_err(|e| e.to_string()));
            match loaded {
                Ok(font) => Some(font),
                Err(e) => {
                    warn!("Cannot load overlay font {}: {}", path.display(), e);
                    None
                }
            }
        });
        Self { font }
    }

    pub fn render(&self, image: &mut RgbImage, plate: PixelRect, status: &Status) {
        let color = status_color(status);
        let label = status.label();

        for inset in 0..THICKNESS_PX {
            if plate.width <= 2 * inset || plate.height <= 2 * inset {
                break;
            }
            draw_hollow_rect_mut(
                image,
                Rect::at((plate.x + inset) as i32, (plate.y + inset) as i32)
                    .of_size(plate.width - 2 * inset, plate.height - 2 * inset),
                color,
            );
        }

        let header = header_rect(plate, label.chars().count() as u32, image.width());
        draw_filled_rect_mut(
            image,
            Rect::at(header.x as i32, header.y as i32).of_size(header.width, header.height),
            color,
        );

        if let Some(font) = &self.font {
            let text_y = header.y + header.height.saturating_sub(25);
            draw_text_mut(
                image,
                TEXT,
                header.x as i32 + 5,
                text_y as i32,
                PxScale::from(20.0),
                font,
                &label,
            );
        }
    }
}

/// Label bar above the plate box, moved inside the frame when the box touches the top.
pub fn header_rect(plate: PixelRect, label_chars: u32, frame_width: u32) -> PixelRect {
    let y = plate.y.saturating_sub(HEADER_HEIGHT);
    let height = if plate.y >= HEADER_HEIGHT {
        HEADER_HEIGHT
    } else {
        plate.y.max(HEADER_HEIGHT.min(plate.height))
    };
    let width = (label_chars.max(1) * CHAR_WIDTH).min(frame_width.saturating_sub(plate.x).max(1));
    PixelRect {
        x: plate.x,
        y,
        width,
        height: height.max(1),
    }
}
