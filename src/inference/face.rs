//! Face alignment and paste-back.
//!
//! Detected faces are aligned to the FFHQ five-point template with a
//! similarity transform, cropped to 512x512 for the restoration network, and
//! the restored crop is blended back through the inverse transform with a
//! feathered mask.

use super::network::DetectedFace;
use crate::constants::face::{
    BORDER_VALUE, CROP_SIZE, DETECTION_THRESHOLD, MIN_EYE_DISTANCE, PASTE_ERODE, PASTE_FEATHER,
    TEMPLATE_512,
};
use crate::error::{Error, Result};
use image::{Rgb, Rgb32FImage};

/// 2x3 affine transform `[a, b, c, d, e, f]`:
/// `x' = a*x + b*y + c`, `y' = d*x + e*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub [f32; 6]);

impl Affine {
    /// Identity transform.
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

    /// Map a point.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a.mul_add(x, b.mul_add(y, c)), d.mul_add(x, e.mul_add(y, f)))
    }

    /// Inverse transform.
    pub fn invert(&self) -> Result<Self> {
        let [a, b, c, d, e, f] = self.0;
        let det = a * e - b * d;
        if det.abs() < 1e-12 {
            return Err(Error::inference("degenerate face alignment transform"));
        }
        let inv = 1.0 / det;
        let (ia, ib, id, ie) = (e * inv, -b * inv, -d * inv, a * inv);
        Ok(Self([ia, ib, -(ia * c + ib * f), id, ie, -(id * c + ie * f)]))
    }

    /// Scale the output side by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        Self(self.0.map(|v| v * factor))
    }

    /// Add a translation to the output side.
    #[must_use]
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        let mut m = self.0;
        m[2] += dx;
        m[5] += dy;
        Self(m)
    }
}

/// Least-squares 4-DOF similarity (rotation, uniform scale, translation)
/// mapping `src` points onto `dst` points.
pub fn estimate_similarity(src: &[[f32; 2]; 5], dst: &[[f32; 2]; 5]) -> Result<Affine> {
    let n = src.len() as f32;
    let mean = |pts: &[[f32; 2]; 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), p| (ax + p[0], ay + p[1]));
        (sx / n, sy / n)
    };
    let (msx, msy) = mean(src);
    let (mdx, mdy) = mean(dst);

    let (mut num_a, mut num_b, mut denom) = (0.0f32, 0.0f32, 0.0f32);
    for (s, d) in src.iter().zip(dst) {
        let (sx, sy) = (s[0] - msx, s[1] - msy);
        let (dx, dy) = (d[0] - mdx, d[1] - mdy);
        num_a += sx * dx + sy * dy;
        num_b += sx * dy - sy * dx;
        denom += sx * sx + sy * sy;
    }
    if denom < 1e-6 {
        return Err(Error::inference("face landmarks are degenerate"));
    }

    let a = num_a / denom;
    let b = num_b / denom;
    let tx = mdx - (a * msx - b * msy);
    let ty = mdy - (b * msx + a * msy);
    Ok(Affine([a, -b, tx, b, a, ty]))
}

/// Faces worth restoring: confident detections with a plausible eye span.
pub fn select_faces(faces: &[DetectedFace]) -> Vec<DetectedFace> {
    faces
        .iter()
        .filter(|f| f.score >= DETECTION_THRESHOLD && f.eye_distance() >= MIN_EYE_DISTANCE)
        .copied()
        .collect()
}

/// Bilinear sample with a constant border outside the image.
fn sample(image: &Rgb32FImage, x: f32, y: f32, border: [f32; 3]) -> [f32; 3] {
    let (w, h) = image.dimensions();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |ix: f32, iy: f32| -> [f32; 3] {
        if ix < 0.0 || iy < 0.0 || ix >= w as f32 || iy >= h as f32 {
            border
        } else {
            image.get_pixel(ix as u32, iy as u32).0
        }
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1.0, y0);
    let p01 = fetch(x0, y0 + 1.0);
    let p11 = fetch(x0 + 1.0, y0 + 1.0);

    std::array::from_fn(|c| {
        let top = p00[c] + (p10[c] - p00[c]) * fx;
        let bottom = p01[c] + (p11[c] - p01[c]) * fx;
        top + (bottom - top) * fy
    })
}

/// Alignment of one detected face.
#[derive(Debug, Clone, Copy)]
pub struct AlignedFace {
    /// Source-image to crop transform.
    pub affine: Affine,
}

impl AlignedFace {
    /// Align a detection to the 512 template.
    pub fn new(face: &DetectedFace) -> Result<Self> {
        Ok(Self {
            affine: estimate_similarity(&face.landmarks, &TEMPLATE_512)?,
        })
    }

    /// Warp the face out of `image` into a `CROP_SIZE` square.
    pub fn crop(&self, image: &Rgb32FImage) -> Result<Rgb32FImage> {
        let inverse = self.affine.invert()?;
        Ok(Rgb32FImage::from_fn(CROP_SIZE, CROP_SIZE, |x, y| {
            let (sx, sy) = inverse.apply(x as f32, y as f32);
            Rgb(sample(image, sx, sy, BORDER_VALUE))
        }))
    }

    /// Blend a restored crop into `frame`, which is the source image
    /// upscaled by `upscale`.
    pub fn paste(&self, frame: &mut Rgb32FImage, restored: &Rgb32FImage, upscale: u32) -> Result<()> {
        let size = restored.width().min(restored.height()) as f32;
        if size < 2.0 {
            return Err(Error::inference("restored face is empty"));
        }

        let up = upscale as f32;
        let mut crop_to_frame = self.affine.invert()?.scaled(up);
        if upscale > 1 {
            crop_to_frame = crop_to_frame.translated(0.5 * up, 0.5 * up);
        }
        let frame_to_crop = crop_to_frame.invert()?;

        let (fw, fh) = frame.dimensions();
        let corners = [(0.0, 0.0), (size, 0.0), (0.0, size), (size, size)]
            .map(|(x, y)| crop_to_frame.apply(x, y));
        let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
        let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
        let max_x = (corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max).ceil() as i64)
            .clamp(0, i64::from(fw)) as u32;
        let max_y = (corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max).ceil() as i64)
            .clamp(0, i64::from(fh)) as u32;

        let edge = size - 1.0;
        for y in min_y..max_y {
            for x in min_x..max_x {
                let (cx, cy) = frame_to_crop.apply(x as f32, y as f32);
                let distance = cx.min(cy).min(edge - cx).min(edge - cy);
                let alpha = ((distance - PASTE_ERODE) / PASTE_FEATHER).clamp(0.0, 1.0);
                if alpha <= 0.0 {
                    continue;
                }
                let face = sample(restored, cx, cy, BORDER_VALUE);
                let px = frame.get_pixel_mut(x, y);
                for c in 0..3 {
                    px.0[c] = alpha.mul_add(face[c] - px.0[c], px.0[c]);
                }
            }
        }
        Ok(())
    }
}
