//! Layer geometry for the transform stages
//!
//! Each stage renders its source track into a fixed render box through one
//! affine layer transform. The transform uses the row-vector convention:
//!
//! ```text
//! x' = a·x + c·y + tx
//! y' = b·x + d·y + ty
//! ```
//!
//! with y growing downwards. `rotated`, `scaled` and `translated` apply the
//! new operation *before* the existing transform, so
//! `translation(tx, ty).rotated(θ)` rotates a point first and then moves it.

use super::types::{EncoderPreset, ExportError, Size};
use crate::config::CaptureConfig;
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-9;

/// 2D affine transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    pub fn rotation(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// `self` followed by `other`
    pub fn then(&self, other: &AffineTransform) -> Self {
        Self {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            tx: self.tx * other.a + self.ty * other.c + other.tx,
            ty: self.tx * other.b + self.ty * other.d + other.ty,
        }
    }

    /// Rotate by `angle` radians, then apply `self`
    pub fn rotated(&self, angle: f64) -> Self {
        Self::rotation(angle).then(self)
    }

    /// Scale, then apply `self`
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self::scale(sx, sy).then(self)
    }

    /// Translate, then apply `self`
    pub fn translated(&self, tx: f64, ty: f64) -> Self {
        Self::translation(tx, ty).then(self)
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn inverted(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < EPSILON {
            return None;
        }
        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            tx: (self.c * self.ty - self.d * self.tx) / det,
            ty: (self.b * self.tx - self.a * self.ty) / det,
        })
    }

    /// Clockwise quarter turns (0..=3) of the linear part, or `None` when it
    /// is not an axis-aligned rotation with positive scale.
    pub fn quarter_turns(&self) -> Option<u8> {
        let zero = |v: f64| v.abs() < EPSILON;
        if zero(self.b) && zero(self.c) {
            if self.a > 0.0 && self.d > 0.0 {
                return Some(0);
            }
            if self.a < 0.0 && self.d < 0.0 {
                return Some(2);
            }
        } else if zero(self.a) && zero(self.d) {
            if self.b > 0.0 && self.c < 0.0 {
                return Some(1);
            }
            if self.b < 0.0 && self.c > 0.0 {
                return Some(3);
            }
        }
        None
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl Rect {
    fn bounding(points: &[(f64, f64)]) -> Self {
        let min_x = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_x = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_y = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.x, self.y),
            (self.x + self.width, self.y),
            (self.x, self.y + self.height),
            (self.x + self.width, self.y + self.height),
        ]
    }

    fn clamp_to(&self, width: f64, height: f64) -> Self {
        let x0 = self.x.max(0.0);
        let y0 = self.y.max(0.0);
        let x1 = (self.x + self.width).min(width);
        let y1 = (self.y + self.height).min(height);
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
        }
    }

    fn rounded(&self) -> (u32, u32, u32, u32) {
        (
            self.x.round() as u32,
            self.y.round() as u32,
            self.width.round() as u32,
            self.height.round() as u32,
        )
    }
}

/// Render box plus the layer transform that places the source in it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerPlan {
    pub render_size: Size,
    pub transform: AffineTransform,
}

impl LayerPlan {
    /// Stage 1: square render box of side `h`, source rotated a quarter turn
    /// clockwise and shifted to centre-crop the excess width.
    ///
    /// Assumes a landscape track (`h <= w`) that is displayed in portrait.
    /// Portrait tracks end up letterboxed inside the square.
    pub fn crop_to_square(natural: Size) -> Self {
        let w = f64::from(natural.width);
        let h = f64::from(natural.height);

        let transform =
            AffineTransform::translation(h, -(w - h) / 2.0).rotated(std::f64::consts::FRAC_PI_2);

        Self {
            render_size: Size::new(natural.height, natural.height),
            transform,
        }
    }

    /// Stage 2: scale the source into the target render box.
    ///
    /// The horizontal factor is `target.height / source.height` and the
    /// vertical one `target.width / source.width`. The axes are swapped on
    /// purpose to match the legacy output; they only differ for non-square
    /// sources or targets.
    pub fn resize(source: Size, target: Size) -> Self {
        let sx = f64::from(target.height) / f64::from(source.height.max(1));
        let sy = f64::from(target.width) / f64::from(source.width.max(1));

        Self {
            render_size: target,
            transform: AffineTransform::scale(sx, sy),
        }
    }

    /// Express the plan as an ffmpeg filter chain for a source of `source`
    /// natural size: crop to the visible region, rotate, scale, then pad to
    /// the render box.
    pub fn filter_graph(&self, source: Size) -> Result<String, ExportError> {
        let turns = self.transform.quarter_turns().ok_or_else(|| {
            ExportError::InvalidGeometry(format!(
                "transform is not a quarter-turn rotation: {:?}",
                self.transform
            ))
        })?;
        let inverse = self
            .transform
            .inverted()
            .ok_or_else(|| ExportError::InvalidGeometry("transform is singular".to_string()))?;

        let render_w = f64::from(self.render_size.width);
        let render_h = f64::from(self.render_size.height);
        let source_w = f64::from(source.width);
        let source_h = f64::from(source.height);

        // Source region that lands inside the render box
        let render_box = Rect {
            x: 0.0,
            y: 0.0,
            width: render_w,
            height: render_h,
        };
        let back_projected: Vec<(f64, f64)> = render_box
            .corners()
            .iter()
            .map(|&(x, y)| inverse.apply(x, y))
            .collect();
        let visible = Rect::bounding(&back_projected).clamp_to(source_w, source_h);
        let (crop_x, crop_y, crop_w, crop_h) = visible.rounded();

        if crop_w == 0 || crop_h == 0 {
            return Err(ExportError::InvalidGeometry(format!(
                "render box {} does not overlap source {}",
                self.render_size, source
            )));
        }

        // Where that region ends up in the render box
        let placed_points: Vec<(f64, f64)> = visible
            .corners()
            .iter()
            .map(|&(x, y)| self.transform.apply(x, y))
            .collect();
        let placed = Rect::bounding(&placed_points).clamp_to(render_w, render_h);
        let (offset_x, offset_y, placed_w, placed_h) = placed.rounded();

        let mut filters = Vec::new();

        if (crop_x, crop_y, crop_w, crop_h) != (0, 0, source.width, source.height) {
            filters.push(format!("crop={}:{}:{}:{}", crop_w, crop_h, crop_x, crop_y));
        }

        match turns {
            1 => filters.push("transpose=clock".to_string()),
            2 => filters.push("hflip,vflip".to_string()),
            3 => filters.push("transpose=cclock".to_string()),
            _ => {}
        }

        let rotated = if turns % 2 == 1 {
            (crop_h, crop_w)
        } else {
            (crop_w, crop_h)
        };
        if (placed_w, placed_h) != rotated {
            filters.push(format!("scale={}:{}", placed_w, placed_h));
        }

        if (placed_w, placed_h) != (self.render_size.width, self.render_size.height)
            || offset_x != 0
            || offset_y != 0
        {
            filters.push(format!(
                "pad={}:{}:{}:{}:black",
                self.render_size.width, self.render_size.height, offset_x, offset_y
            ));
        }

        filters.push("setsar=1".to_string());
        Ok(filters.join(","))
    }
}

/// Fixed transform parameters for a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSpec {
    pub max_duration_secs: u32,
    pub frame_rate: u32,
    pub resize_target: Size,
    pub preset: EncoderPreset,
}

impl TransformSpec {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            max_duration_secs: config.max_duration_secs,
            frame_rate: config.frame_rate,
            resize_target: Size::new(config.output_width, config.output_height),
            preset: EncoderPreset::HIGHEST_QUALITY,
        }
    }
}
