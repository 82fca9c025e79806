//! Tiled super-resolution.
//!
//! Large inputs are split into `tile_size` patches, each extended by
//! `tile_padding` pixels of real neighbouring context, upscaled on its own and
//! cropped back to its unpadded footprint before stitching. Peak memory is
//! bounded by one padded tile regardless of the input size.

use super::network::Network;
use crate::constants::tiling;
use crate::error::{Error, Result};
use image::Rgb32FImage;
use tracing::debug;

/// Tiling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileConfig {
    /// Tile edge in input pixels; 0 disables tiling.
    pub tile_size: u32,
    /// Context added on each side of a tile.
    pub tile_padding: u32,
    /// Reflect padding on the right/bottom edge of the whole image.
    pub pre_pad: u32,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tile_size: tiling::TILE_SIZE,
            tile_padding: tiling::TILE_PADDING,
            pre_pad: tiling::PRE_PAD,
        }
    }
}

impl TileConfig {
    /// Single-pass configuration (whole image at once).
    pub const UNTILED: Self = Self {
        tile_size: 0,
        tile_padding: 0,
        pre_pad: 0,
    };
}

/// Upscale `image` by the network's native `scale`, tile by tile.
pub fn upsample_tiled(
    network: &mut dyn Network,
    image: &Rgb32FImage,
    scale: u32,
    config: &TileConfig,
) -> Result<Rgb32FImage> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(Error::inference("cannot upsample an empty image"));
    }

    // x2 networks pixel-unshuffle their input, so dimensions must be even.
    let mod_pad = |n: u32| if scale == 2 { (n + config.pre_pad) % 2 } else { 0 };
    let pad_right = config.pre_pad + mod_pad(w);
    let pad_bottom = config.pre_pad + mod_pad(h);
    let padded = pad_reflect(image, pad_right, pad_bottom);

    let upscaled = if config.tile_size == 0 {
        forward_checked(network, &padded, scale)?
    } else {
        stitch_tiles(network, &padded, scale, config)?
    };

    Ok(crop(&upscaled, 0, 0, w * scale, h * scale))
}

fn forward_checked(network: &mut dyn Network, input: &Rgb32FImage, scale: u32) -> Result<Rgb32FImage> {
    let (w, h) = input.dimensions();
    let output = network.forward(input)?;
    let expected = (w * scale, h * scale);
    if output.dimensions() != expected {
        return Err(Error::inference(format!(
            "upsampler returned {:?} for {}x{} input, expected {:?}",
            output.dimensions(),
            w,
            h,
            expected
        )));
    }
    Ok(output)
}

fn stitch_tiles(
    network: &mut dyn Network,
    image: &Rgb32FImage,
    scale: u32,
    config: &TileConfig,
) -> Result<Rgb32FImage> {
    let (w, h) = image.dimensions();
    let tile = config.tile_size;
    let pad = config.tile_padding;
    let tiles_x = w.div_ceil(tile);
    let tiles_y = h.div_ceil(tile);
    debug!(
        "Tiling {}x{} into {}x{} tiles of {} (+{} padding)",
        w, h, tiles_x, tiles_y, tile, pad
    );

    let mut output = Rgb32FImage::new(w * scale, h * scale);

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile;
            let y0 = ty * tile;
            let x1 = (x0 + tile).min(w);
            let y1 = (y0 + tile).min(h);

            let px0 = x0.saturating_sub(pad);
            let py0 = y0.saturating_sub(pad);
            let px1 = (x1 + pad).min(w);
            let py1 = (y1 + pad).min(h);

            let input = crop(image, px0, py0, px1 - px0, py1 - py0);
            let upscaled = forward_checked(network, &input, scale)?;

            let src_x = (x0 - px0) * scale;
            let src_y = (y0 - py0) * scale;
            for y in 0..(y1 - y0) * scale {
                for x in 0..(x1 - x0) * scale {
                    let px = *upscaled.get_pixel(src_x + x, src_y + y);
                    output.put_pixel(x0 * scale + x, y0 * scale + y, px);
                }
            }
        }
    }

    Ok(output)
}

/// Reflect index `i` into `0..n` without repeating the edge pixel.
fn reflect(i: u32, n: u32) -> u32 {
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let m = i % period;
    if m < n { m } else { period - m }
}

/// Extend the right and bottom edges by mirror reflection.
pub fn pad_reflect(image: &Rgb32FImage, right: u32, bottom: u32) -> Rgb32FImage {
    if right == 0 && bottom == 0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    Rgb32FImage::from_fn(w + right, h + bottom, |x, y| {
        *image.get_pixel(reflect(x, w), reflect(y, h))
    })
}

fn crop(image: &Rgb32FImage, x: u32, y: u32, w: u32, h: u32) -> Rgb32FImage {
    image::imageops::crop_imm(image, x, y, w, h).to_image()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Nearest-neighbour upscaler: every output pixel depends only on the
    /// input pixel under it, so tiling must be invisible.
    struct Nearest {
        scale: u32,
        calls: usize,
        max_input: (u32, u32),
    }

    impl Network for Nearest {
        fn forward(&mut self, input: &Rgb32FImage) -> Result<Rgb32FImage> {
            self.calls += 1;
            let (w, h) = input.dimensions();
            self.max_input = (self.max_input.0.max(w), self.max_input.1.max(h));
            let s = self.scale;
            Ok(Rgb32FImage::from_fn(w * s, h * s, |x, y| *input.get_pixel(x / s, y / s)))
        }
    }

    /// 3x3 box blur followed by nearest upscale; uses neighbouring context.
    struct BlurUp {
        scale: u32,
    }

    impl Network for BlurUp {
        fn forward(&mut self, input: &Rgb32FImage) -> Result<Rgb32FImage> {
            let (w, h) = input.dimensions();
            let blurred = Rgb32FImage::from_fn(w, h, |x, y| {
                let mut acc = [0.0f32; 3];
                let mut n = 0.0;
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let sx = i64::from(x) + dx;
                        let sy = i64::from(y) + dy;
                        if sx >= 0 && sy >= 0 && sx < i64::from(w) && sy < i64::from(h) {
                            let p = input.get_pixel(sx as u32, sy as u32);
                            for c in 0..3 {
                                acc[c] += p.0[c];
                            }
                            n += 1.0;
                        }
                    }
                }
                Rgb([acc[0] / n, acc[1] / n, acc[2] / n])
            });
            let s = self.scale;
            Ok(Rgb32FImage::from_fn(w * s, h * s, |x, y| *blurred.get_pixel(x / s, y / s)))
        }
    }

    struct WrongSize;

    impl Network for WrongSize {
        fn forward(&mut self, input: &Rgb32FImage) -> Result<Rgb32FImage> {
            Ok(input.clone())
        }
    }

    fn gradient(w: u32, h: u32) -> Rgb32FImage {
        Rgb32FImage::from_fn(w, h, |x, y| {
            Rgb([
                x as f32 / w as f32,
                y as f32 / h as f32,
                ((x * 7 + y * 13) % 17) as f32 / 17.0,
            ])
        })
    }

    #[test]
    fn test_tiled_matches_single_pass_for_pixel_local_network() {
        let image = gradient(130, 95);
        let config = TileConfig {
            tile_size: 40,
            tile_padding: 10,
            pre_pad: 0,
        };

        let mut tiled_net = Nearest { scale: 4, calls: 0, max_input: (0, 0) };
        let tiled = upsample_tiled(&mut tiled_net, &image, 4, &config).unwrap();

        let mut whole_net = Nearest { scale: 4, calls: 0, max_input: (0, 0) };
        let whole = upsample_tiled(&mut whole_net, &image, 4, &TileConfig::UNTILED).unwrap();

        assert_eq!(tiled.dimensions(), (520, 380));
        assert_eq!(tiled, whole);
        assert_eq!(tiled_net.calls, 4 * 3);
        assert_eq!(whole_net.calls, 1);
        // Each forward pass saw at most one padded tile.
        assert!(tiled_net.max_input.0 <= 40 + 2 * 10);
        assert!(tiled_net.max_input.1 <= 40 + 2 * 10);
    }

    #[test]
    fn test_tile_padding_hides_seams_for_context_network() {
        let image = gradient(90, 70);
        let config = TileConfig {
            tile_size: 32,
            tile_padding: 4,
            pre_pad: 0,
        };

        let tiled = upsample_tiled(&mut BlurUp { scale: 2 }, &image, 2, &config).unwrap();
        let whole = upsample_tiled(&mut BlurUp { scale: 2 }, &image, 2, &TileConfig::UNTILED).unwrap();

        assert_eq!(tiled.dimensions(), whole.dimensions());
        let max_diff = tiled
            .pixels()
            .zip(whole.pixels())
            .flat_map(|(a, b)| (0..3).map(move |c| (a.0[c] - b.0[c]).abs()))
            .fold(0.0f32, f32::max);
        assert!(max_diff < 1e-5, "max diff {max_diff}");
    }

    #[test]
    fn test_default_tiling_parameters() {
        let config = TileConfig::default();
        assert_eq!(config.tile_size, 400);
        assert_eq!(config.tile_padding, 10);
        assert_eq!(config.pre_pad, 0);
    }

    #[test]
    fn test_odd_size_with_x2_network_is_cropped_back() {
        let image = gradient(33, 21);
        let mut net = Nearest { scale: 2, calls: 0, max_input: (0, 0) };
        let out = upsample_tiled(&mut net, &image, 2, &TileConfig::default()).unwrap();
        assert_eq!(out.dimensions(), (66, 42));
        assert_eq!(out.get_pixel(65, 41), image.get_pixel(32, 20));
        // Network saw the even-padded image.
        assert_eq!(net.max_input, (34, 22));
    }

    #[test]
    fn test_pre_pad_is_removed() {
        let image = gradient(20, 10);
        let config = TileConfig {
            tile_size: 0,
            tile_padding: 0,
            pre_pad: 3,
        };
        let mut net = Nearest { scale: 4, calls: 0, max_input: (0, 0) };
        let out = upsample_tiled(&mut net, &image, 4, &config).unwrap();
        assert_eq!(out.dimensions(), (80, 40));
        assert_eq!(net.max_input, (23, 13));
    }

    #[test]
    fn test_wrong_output_size_is_inference_error() {
        let image = gradient(8, 8);
        let err = upsample_tiled(&mut WrongSize, &image, 4, &TileConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Inference { .. }));
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect(0, 4), 0);
        assert_eq!(reflect(3, 4), 3);
        assert_eq!(reflect(4, 4), 2);
        assert_eq!(reflect(5, 4), 1);
        assert_eq!(reflect(6, 4), 0);
        assert_eq!(reflect(7, 1), 0);
    }
}
