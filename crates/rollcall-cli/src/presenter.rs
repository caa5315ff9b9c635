//! Terminal presentation of the recognition loop.

use image::{Rgb, RgbImage};
use rollcall_core::session::{Annotation, Presenter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const BOX_THICKNESS: u32 = 2;

/// Prints who is in view whenever it changes, optionally keeps an annotated
/// preview image on disk, and reports Ctrl-C as the stop signal.
pub struct TerminalPresenter {
    stop: Arc<AtomicBool>,
    preview: Option<PathBuf>,
    in_view: Vec<String>,
}

impl TerminalPresenter {
    pub fn new(stop: Arc<AtomicBool>, preview: Option<PathBuf>) -> Self {
        Self {
            stop,
            preview,
            in_view: Vec::new(),
        }
    }

    fn write_preview(&self, frame: &RgbImage, annotations: &[Annotation]) {
        let Some(path) = &self.preview else {
            return;
        };
        let mut canvas = frame.clone();
        for annotation in annotations {
            draw_box(&mut canvas, annotation);
        }

        // Write beside the target and rename, so viewers never see a partial file.
        let tmp = path.with_extension("partial.jpg");
        let result = image::save_buffer_with_format(
            &tmp,
            canvas.as_raw(),
            canvas.width(),
            canvas.height(),
            image::ExtendedColorType::Rgb8,
            image::ImageFormat::Jpeg,
        )
        .map_err(|e| e.to_string())
        .and_then(|()| std::fs::rename(&tmp, path).map_err(|e| e.to_string()));

        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to write preview");
        }
    }
}

impl Presenter for TerminalPresenter {
    fn present(&mut self, frame: &RgbImage, annotations: &[Annotation]) {
        let mut labels: Vec<String> = annotations.iter().map(|a| a.label.clone()).collect();
        labels.sort();
        if labels != self.in_view {
            let now = chrono::Local::now().format("%H:%M:%S");
            if labels.is_empty() {
                println!("[{now}] nobody in view");
            } else {
                println!("[{now}] {}", labels.join(", "));
            }
            self.in_view = labels;
        }

        self.write_preview(frame, annotations);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Draw the annotation's box outline in its marker colour, clipped to the frame.
fn draw_box(canvas: &mut RgbImage, annotation: &Annotation) {
    let (w, h) = canvas.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let colour = Rgb(annotation.marker.rgb());
    let r = annotation.region;
    let left = r.left.min(w - 1);
    let right = r.right.min(w - 1);
    let top = r.top.min(h - 1);
    let bottom = r.bottom.min(h - 1);

    for t in 0..BOX_THICKNESS {
        for x in left..=right {
            canvas.put_pixel(x, (top + t).min(h - 1), colour);
            canvas.put_pixel(x, bottom.saturating_sub(t), colour);
        }
        for y in top..=bottom {
            canvas.put_pixel((left + t).min(w - 1), y, colour);
            canvas.put_pixel(right.saturating_sub(t), y, colour);
        }
    }
}
