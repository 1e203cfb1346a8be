use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::cache::CachedResult;
use crate::config::OverlayConfig;
use crate::frame::Frame;

pub const REAL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const FAKE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Gap between the caption baseline and the status strip.
const STRIP_OFFSET: i32 = 4;
const STRIP_HEIGHT: u32 = 4;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
];

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to read font {path}: {source}")]
    FontIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font file: {0}")]
    InvalidFont(PathBuf),
}

/// Caption text for a cached result, e.g. `happy (82.3%) | ✅ Real`.
pub fn caption(label: &str, score: f32, verdict: bool) -> String {
    let status = if verdict { "✅ Real" } else { "❌ Fake" };
    format!("{label} ({score:.1}%) | {status}")
}

pub fn verdict_color(verdict: bool) -> Rgb<u8> {
    if verdict {
        REAL_COLOR
    } else {
        FAKE_COLOR
    }
}

/// Output frame with its overlay already drawn.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub caption: String,
    pub color: Rgb<u8>,
}

/// Draws the cached result onto a copy of each full-resolution frame.
pub struct AnnotationRenderer {
    font: Option<FontArc>,
    scale: PxScale,
    origin: (i32, i32),
}

impl AnnotationRenderer {
    /// Build a renderer, loading the configured font or the first system font found.
    pub fn new(config: &OverlayConfig) -> Result<Self, OverlayError> {
        let font = match &config.font_path {
            Some(path) => Some(load_font(path)?),
            None => SYSTEM_FONTS
                .iter()
                .map(Path::new)
                .filter(|path| path.exists())
                .find_map(|path| load_font(path).ok()),
        };
        if font.is_none() {
            tracing::debug!("no caption font available, drawing status strip only");
        }
        Ok(Self {
            font,
            ..Self::plain(config)
        })
    }

    /// Renderer that only draws the status strip.
    pub fn plain(config: &OverlayConfig) -> Self {
        Self {
            font: None,
            scale: PxScale::from(config.font_scale),
            origin: (config.origin_x, config.origin_y),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Annotate `frame` with `cached`. The source frame is not modified.
    pub fn render(&self, frame: &Frame, cached: CachedResult<'_>) -> AnnotatedFrame {
        let caption = caption(cached.label, cached.score, cached.verdict);
        let color = verdict_color(cached.verdict);
        let mut image = frame.image().clone();
        let (x, baseline) = self.origin;

        let text_width = match &self.font {
            Some(font) => {
                let (width, _) = text_size(self.scale, font, &caption);
                let top = baseline - self.scale.y.round() as i32;
                draw_text_mut(&mut image, color, x, top, self.scale, font, &caption);
                width
            }
            None => (caption.chars().count() as f32 * self.scale.x * 0.5) as u32,
        };

        if let Some(strip) = strip_rect(&image, x, baseline + STRIP_OFFSET, text_width) {
            draw_filled_rect_mut(&mut image, strip, color);
        }

        AnnotatedFrame {
            image,
            caption,
            color,
        }
    }
}

fn load_font(path: &Path) -> Result<FontArc, OverlayError> {
    let bytes = std::fs::read(path).map_err(|source| OverlayError::FontIo {
        path: path.to_path_buf(),
        source,
    })?;
    FontArc::try_from_vec(bytes).map_err(|_| OverlayError::InvalidFont(path.to_path_buf()))
}

/// Status strip clipped to the image, or `None` if nothing would be visible.
fn strip_rect(image: &RgbImage, x: i32, y: i32, width: u32) -> Option<Rect> {
    let (img_w, img_h) = (image.width() as i64, image.height() as i64);
    let left = i64::from(x).max(0);
    let top = i64::from(y).max(0);
    let right = (i64::from(x) + i64::from(width)).min(img_w);
    let bottom = (i64::from(y) + i64::from(STRIP_HEIGHT)).min(img_h);
    if right <= left || bottom <= top {
        return None;
    }
    Some(Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32))
}
