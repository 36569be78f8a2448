// src/preprocessing.rs

use crate::types::{BoundingBox, Crop, Frame};

/// Letterboxed detector input plus the transform needed to map boxes back.
#[derive(Debug, Clone)]
pub struct Letterbox {
    pub input: Vec<f32>,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a box from model input space back into source pixels.
    pub fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            (bbox[0] - self.pad_x) / self.scale,
            (bbox[1] - self.pad_y) / self.scale,
            (bbox[2] - self.pad_x) / self.scale,
            (bbox[3] - self.pad_y) / self.scale,
        ]
    }
}

/// Normalize a frame to the working resolution. Frames already at that size
/// are passed through untouched.
pub fn resize_frame(frame: Frame, width: usize, height: usize) -> Frame {
    if frame.width == width && frame.height == height {
        return frame;
    }
    let data = resize_bilinear(&frame.data, frame.width, frame.height, width, height);
    Frame {
        data,
        width,
        height,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Cut `bbox` out of the frame (clamped to its bounds) and rescale it to a
/// fixed size. Returns `None` when nothing of the box lies inside the frame.
pub fn crop_and_resize(
    frame: &Frame,
    bbox: &BoundingBox,
    out_w: usize,
    out_h: usize,
) -> Option<Crop> {
    let x1 = bbox.x1.clamp(0, frame.width as i32) as usize;
    let y1 = bbox.y1.clamp(0, frame.height as i32) as usize;
    let x2 = bbox.x2.clamp(0, frame.width as i32) as usize;
    let y2 = bbox.y2.clamp(0, frame.height as i32) as usize;

    if x2 <= x1 || y2 <= y1 || out_w == 0 || out_h == 0 {
        return None;
    }

    let crop_w = x2 - x1;
    let crop_h = y2 - y1;
    let mut region = Vec::with_capacity(crop_w * crop_h * 3);
    for y in y1..y2 {
        let start = (y * frame.width + x1) * 3;
        region.extend_from_slice(&frame.data[start..start + crop_w * 3]);
    }

    Some(Crop {
        data: resize_bilinear(&region, crop_w, crop_h, out_w, out_h),
        width: out_w,
        height: out_h,
    })
}

/// Fit the frame inside a `target_size` square (gray padding), normalize to
/// [0, 1] and lay it out as CHW.
pub fn letterbox(src: &[u8], src_w: usize, src_h: usize, target_size: usize) -> Letterbox {
    let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
    let scaled_w = ((src_w as f32 * scale) as usize).clamp(1, target_size);
    let scaled_h = ((src_h as f32 * scale) as usize).clamp(1, target_size);

    let pad_x = (target_size - scaled_w) as f32 / 2.0;
    let pad_y = (target_size - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

    let mut canvas = vec![114u8; target_size * target_size * 3];
    for y in 0..scaled_h {
        let src_row = y * scaled_w * 3;
        let dst_row = ((y + pad_y as usize) * target_size + pad_x as usize) * 3;
        canvas[dst_row..dst_row + scaled_w * 3]
            .copy_from_slice(&resized[src_row..src_row + scaled_w * 3]);
    }

    let plane = target_size * target_size;
    let mut input = vec![0.0f32; 3 * plane];
    for (i, px) in canvas.chunks_exact(3).enumerate() {
        for c in 0..3 {
            input[c * plane + i] = px[c] as f32 / 255.0;
        }
    }

    Letterbox {
        input,
        scale,
        pad_x,
        pad_y,
    }
}

/// Text recognizer input: keep aspect ratio at a fixed height, pad on the
/// right with zeros up to `max_width`, BGR channel order, scaled to [-1, 1].
pub fn recognizer_input(crop: &Crop, input_height: usize, max_width: usize) -> Vec<f32> {
    let ratio = crop.width as f32 / crop.height.max(1) as f32;
    let resized_w = ((input_height as f32 * ratio).ceil() as usize).clamp(1, max_width);
    let resized = resize_bilinear(&crop.data, crop.width, crop.height, resized_w, input_height);

    let plane = input_height * max_width;
    let mut input = vec![0.0f32; 3 * plane];
    for y in 0..input_height {
        for x in 0..resized_w {
            let src = (y * resized_w + x) * 3;
            for c in 0..3 {
                // RGB -> BGR
                let value = resized[src + 2 - c] as f32 / 255.0;
                input[c * plane + y * max_width + x] = (value - 0.5) / 0.5;
            }
        }
    }
    input
}

/// Bilinear image resize
pub fn resize_bilinear(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    if src_w == 0 || src_h == 0 {
        return dst;
    }

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;

            let sx0 = (sx.floor() as usize).min(src_w - 1);
            let sy0 = (sy.floor() as usize).min(src_h - 1);
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);

            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    dst
}
