//! Detection visualization.
//!
//! `Renderer::draw` outlines every detection on a copy of the frame and
//! writes `"Label: <label>, Score: <score>"` at the box's top-left corner.
//! Captions use the bundled Hack font unless another TrueType/OpenType font
//! is configured.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::frame::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i32 = 2;
const FONT_SIZE: f32 = 14.0;
const LABEL_PADDING: i32 = 2;

pub struct Renderer {
    color: Rgb<u8>,
    thickness: i32,
    font: FontArc,
    font_size: f32,
}

impl Renderer {
    /// Green 2 px boxes with captions in the bundled font.
    pub fn new() -> Result<Self> {
        let font = FontArc::try_from_slice(epaint_default_fonts::HACK_REGULAR)
            .map_err(|e| anyhow!("failed to load bundled label font: {}", e))?;
        Ok(Self {
            color: BOX_COLOR,
            thickness: BOX_THICKNESS,
            font,
            font_size: FONT_SIZE,
        })
    }

    /// Render captions with the TrueType/OpenType font at `path`.
    pub fn with_font_file(mut self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read label font {}", path.display()))?;
        self.font = FontArc::try_from_vec(bytes)
            .map_err(|e| anyhow!("invalid label font {}: {}", path.display(), e))?;
        Ok(self)
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = Rgb(color);
        self
    }

    /// Return a copy of `frame` with every detection drawn on it.
    pub fn draw(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        let mut image = frame.image().clone();
        for det in detections {
            self.draw_detection(&mut image, det);
        }
        frame.with_image(image)
    }

    fn draw_detection(&self, image: &mut RgbImage, det: &Detection) {
        let Some((x1, y1, x2, y2)) = clamp_box(det, image.width(), image.height()) else {
            log::debug!("skipping degenerate box {:?}", det.bbox);
            return;
        };

        for t in 0..self.thickness {
            let (w, h) = (x2 - x1 + 1 - 2 * t, y2 - y1 + 1 - 2 * t);
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                image,
                Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32),
                self.color,
            );
        }

        let caption = det.caption();
        let (label_w, label_h) = self.label_size(&caption);
        let label_x = x1;
        let label_y = if y1 >= label_h {
            y1 - label_h
        } else {
            // No room above the box; tuck the label inside it.
            y1 + self.thickness
        };

        let visible_w = label_w.min(image.width() as i32 - label_x);
        let visible_h = label_h.min(image.height() as i32 - label_y);
        if visible_w <= 0 || visible_h <= 0 {
            return;
        }
        draw_filled_rect_mut(
            image,
            Rect::at(label_x, label_y).of_size(visible_w as u32, visible_h as u32),
            self.color,
        );
        draw_text_mut(
            image,
            TEXT_COLOR,
            label_x + LABEL_PADDING,
            label_y + LABEL_PADDING,
            PxScale::from(self.font_size),
            &self.font,
            &caption,
        );
    }

    /// Caption background size, padding included.
    fn label_size(&self, caption: &str) -> (i32, i32) {
        let (w, h) = text_size(PxScale::from(self.font_size), &self.font, caption);
        (w as i32 + 2 * LABEL_PADDING, h as i32 + 2 * LABEL_PADDING)
    }
}

/// Integer pixel corners clamped into the image, or `None` when the box
/// has no area inside it.
fn clamp_box(det: &Detection, width: u32, height: u32) -> Option<(i32, i32, i32, i32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let b = det.bbox;
    let coords = [b.x1, b.y1, b.x2, b.y2];
    if coords.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let (max_x, max_y) = (width as i32 - 1, height as i32 - 1);
    let x1 = (b.x1.min(b.x2).floor() as i32).clamp(0, max_x);
    let y1 = (b.y1.min(b.y2).floor() as i32).clamp(0, max_y);
    let x2 = (b.x1.max(b.x2).ceil() as i32).clamp(0, max_x);
    let y2 = (b.y1.max(b.y2).ceil() as i32).clamp(0, max_y);
    if x1 >= x2 || y1 >= y2 {
        return None;
    }
    Some((x1, y1, x2, y2))
}
