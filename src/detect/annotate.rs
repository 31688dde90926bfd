use super::Detection;
use crate::capture::Frame;
use crate::error::Result;

const BOX_COLOR: [u8; 3] = [0, 255, 0];
const THICKNESS: u32 = 2;

/// Copy of `frame` with an outline drawn around every detection.
pub fn draw_boxes(frame: &Frame, detections: &[Detection]) -> Result<Frame> {
    let (w, h) = (frame.width(), frame.height());
    let mut pixels = frame.data.to_vec();
    if w == 0 || h == 0 {
        return frame.with_pixels(pixels);
    }

    let to_px = |v: f32, max: u32| ((v.clamp(0.0, 1.0) * (max - 1) as f32).round()) as u32;

    for det in detections {
        let x1 = to_px(det.bbox[0].min(det.bbox[2]), w);
        let x2 = to_px(det.bbox[0].max(det.bbox[2]), w);
        let y1 = to_px(det.bbox[1].min(det.bbox[3]), h);
        let y2 = to_px(det.bbox[1].max(det.bbox[3]), h);

        for t in 0..THICKNESS {
            for x in x1..=x2 {
                paint(&mut pixels, w, x, (y1 + t).min(y2));
                paint(&mut pixels, w, x, y2.saturating_sub(t).max(y1));
            }
            for y in y1..=y2 {
                paint(&mut pixels, w, (x1 + t).min(x2), y);
                paint(&mut pixels, w, x2.saturating_sub(t).max(x1), y);
            }
        }
    }

    frame.with_pixels(pixels)
}

fn paint(pixels: &mut [u8], width: u32, x: u32, y: u32) {
    let i = ((y * width + x) * 3) as usize;
    pixels[i..i + 3].copy_from_slice(&BOX_COLOR);
}
