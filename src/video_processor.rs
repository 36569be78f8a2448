// src/video_processor.rs

use crate::interface::{FrameSink, FrameSource, ImageWriter, LoopControl};
use crate::pipeline::FrameContext;
use crate::types::{Annotation, Crop, DisplayConfig, Frame};
use crate::zone::Region;
use anyhow::{bail, Context, Result};
use opencv::{
    core::{self, Mat, Vector},
    highgui, imgcodecs, imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// FRAME SOURCE
// ============================================================================

/// Video file, stream URL or camera. A purely numeric URI is treated as a
/// camera index.
pub struct VideoSource {
    cap: VideoCapture,
    uri: String,
    fps: f64,
    frames_read: u64,
}

impl VideoSource {
    pub fn open(uri: &str) -> Result<Self> {
        info!("Opening video source: {}", uri);

        let cap = match uri.parse::<i32>() {
            Ok(index) => VideoCapture::new(index, videoio::CAP_ANY)?,
            Err(_) => VideoCapture::from_file(uri, videoio::CAP_ANY)?,
        };

        if !cap.is_opened()? {
            bail!("Failed to open video source");
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i64;

        info!(
            "✓ Video source ready: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(Self {
            cap,
            uri: uri.to_string(),
            fps,
            frames_read: 0,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.frames_read += 1;
        let timestamp_ms = if self.fps > 0.0 {
            (self.frames_read as f64 / self.fps) * 1000.0
        } else {
            0.0
        };

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color_def(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB)?;

        Ok(Some(Frame {
            data: rgb_mat.data_bytes()?.to_vec(),
            width: rgb_mat.cols() as usize,
            height: rgb_mat.rows() as usize,
            timestamp_ms,
        }))
    }

    fn release(&mut self) -> Result<()> {
        use opencv::videoio::VideoCaptureTrait;

        VideoCaptureTrait::release(&mut self.cap)
            .with_context(|| format!("Failed to release {}", self.uri))?;
        debug!("Released video source after {} frames", self.frames_read);
        Ok(())
    }
}

/// Interleaved RGB bytes to an owned BGR `Mat`.
pub fn rgb_to_bgr_mat(data: &[u8], height: usize) -> Result<Mat> {
    let mat = Mat::from_slice(data)?;
    let mat = mat.reshape(3, height as i32)?;

    let mut bgr_mat = Mat::default();
    imgproc::cvt_color_def(&mat, &mut bgr_mat, imgproc::COLOR_RGB2BGR)?;
    Ok(bgr_mat)
}

// ============================================================================
// IMAGE WRITER
// ============================================================================

pub struct OpencvImageWriter;

impl ImageWriter for OpencvImageWriter {
    fn write(&mut self, path: &Path, crop: &Crop) -> Result<()> {
        let path_str = path
            .to_str()
            .with_context(|| format!("Non UTF-8 image path {}", path.display()))?;
        let bgr = rgb_to_bgr_mat(&crop.data, crop.height)?;

        if !imgcodecs::imwrite(path_str, &bgr, &Vector::new())? {
            bail!("OpenCV could not encode {}", path.display());
        }
        debug!("Saved plate crop {}", path.display());
        Ok(())
    }
}

// ============================================================================
// DISPLAY / ANNOTATED OUTPUT
// ============================================================================

/// Draws the zone and extraction labels, then shows the frame in a window
/// and/or appends it to an annotated video.
pub struct OverlaySink {
    window: Option<String>,
    stop_key: i32,
    writer: Option<VideoWriter>,
}

impl OverlaySink {
    pub fn new(
        config: &DisplayConfig,
        source_uri: &str,
        output_dir: &Path,
        frame_size: (usize, usize),
    ) -> Result<Self> {
        let mut window = None;
        if config.enabled {
            match open_window(&config.window_name) {
                Ok(()) => window = Some(config.window_name.clone()),
                Err(e) => warn!("Failed to open display window: {}. Running headless.", e),
            }
        }

        let writer = if config.save_annotated {
            let path = annotated_path(source_uri, output_dir);
            let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
            let writer = VideoWriter::new(
                path.to_str().context("Non UTF-8 output path")?,
                fourcc,
                config.annotated_fps,
                core::Size::new(frame_size.0 as i32, frame_size.1 as i32),
                true,
            )?;
            if !writer.is_opened()? {
                bail!("Failed to open annotated video {}", path.display());
            }
            info!("🎞️  Annotated video: {}", path.display());
            Some(writer)
        } else {
            None
        };

        Ok(Self {
            window,
            stop_key: config.stop_key as i32,
            writer,
        })
    }
}

impl FrameSink for OverlaySink {
    fn present(&mut self, ctx: &FrameContext, region: &Region) -> Result<LoopControl> {
        if self.window.is_none() && self.writer.is_none() {
            return Ok(LoopControl::Continue);
        }

        let mut output = rgb_to_bgr_mat(&ctx.frame.data, ctx.frame.height)?;
        draw_zone(&mut output, region)?;
        for annotation in &ctx.annotations {
            draw_label(&mut output, annotation)?;
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write(&output)?;
        }

        if let Some(name) = &self.window {
            highgui::imshow(name, &output)?;
            let key = highgui::wait_key(1)?;
            if key >= 0 && key & 0xFF == self.stop_key {
                return Ok(LoopControl::Stop);
            }
        }

        Ok(LoopControl::Continue)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.release()?;
        }
        if self.window.take().is_some() {
            highgui::destroy_all_windows()?;
        }
        Ok(())
    }
}

fn open_window(name: &str) -> Result<()> {
    highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
    // Hovering prints pixel coordinates, handy when drawing a new zone.
    highgui::set_mouse_callback(
        name,
        Some(Box::new(|event, x, y, _flags| {
            if event == highgui::EVENT_MOUSEMOVE {
                debug!("Cursor at [{}, {}]", x, y);
            }
        })),
    )?;
    Ok(())
}

fn annotated_path(source_uri: &str, output_dir: &Path) -> PathBuf {
    let stem = Path::new(source_uri)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("camera");
    output_dir.join(format!("{}_annotated.mp4", stem))
}

fn draw_zone(img: &mut Mat, region: &Region) -> Result<()> {
    let points: Vector<core::Point> = region
        .vertices()
        .iter()
        .map(|p| core::Point::new(p.x, p.y))
        .collect();
    let mut contours: Vector<Vector<core::Point>> = Vector::new();
    contours.push(points);

    imgproc::polylines(
        img,
        &contours,
        true,
        core::Scalar::new(255.0, 0.0, 255.0, 0.0),
        2,
        imgproc::LINE_8,
        0,
    )?;
    Ok(())
}

/// Filled badge with the label text, anchored at the box's top-left corner.
fn draw_label(img: &mut Mat, annotation: &Annotation) -> Result<()> {
    let scale = 1.0;
    let thickness = 2;
    let pad = 4;

    let mut baseline = 0;
    let text_size = imgproc::get_text_size(
        &annotation.text,
        imgproc::FONT_HERSHEY_PLAIN,
        scale,
        thickness,
        &mut baseline,
    )?;

    let x = annotation.origin.x;
    let y = annotation.origin.y;
    imgproc::rectangle(
        img,
        core::Rect::new(
            x - pad,
            y - text_size.height - pad,
            text_size.width + pad * 2,
            text_size.height + pad * 2 + baseline,
        ),
        core::Scalar::new(255.0, 0.0, 255.0, 0.0),
        -1,
        imgproc::LINE_8,
        0,
    )?;

    imgproc::put_text(
        img,
        &annotation.text,
        core::Point::new(x, y),
        imgproc::FONT_HERSHEY_PLAIN,
        scale,
        core::Scalar::new(255.0, 255.0, 255.0, 0.0),
        thickness,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
