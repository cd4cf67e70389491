//! CPU conversion of camera frames to upright RGBA.

use anyhow::{anyhow, Result};
use image::{
    imageops::{flip_horizontal, rotate180, rotate270, rotate90},
    RgbaImage,
};

/// One YUV_420_888 frame as handed out by the image reader.
///
/// Chroma planes may be planar (`pixel_stride == 1`) or interleaved
/// (`pixel_stride == 2`, NV21/NV12 style).
pub struct Yuv420Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub y_row_stride: usize,
    pub uv_row_stride: usize,
    pub uv_pixel_stride: usize,
}

impl Yuv420Frame<'_> {
    fn check(&self) -> Result<()> {
        let (w, h) = (self.width as usize, self.height as usize);
        if w == 0 || h == 0 {
            return Err(anyhow!("empty frame {w}x{h}"));
        }
        let y_needed = (h - 1) * self.y_row_stride + w;
        let (cw, ch) = ((w + 1) / 2, (h + 1) / 2);
        let uv_needed = (ch - 1) * self.uv_row_stride + (cw - 1) * self.uv_pixel_stride + 1;
        if self.y.len() < y_needed || self.u.len() < uv_needed || self.v.len() < uv_needed {
            return Err(anyhow!(
                "plane too short for {w}x{h}: y={} u={} v={}",
                self.y.len(),
                self.u.len(),
                self.v.len()
            ));
        }
        Ok(())
    }

    /// BT.601 video range to RGBA, fixed point.
    pub fn to_rgba(&self, out: &mut RgbaImage) -> Result<()> {
        self.check()?;
        if out.dimensions() != (self.width, self.height) {
            *out = RgbaImage::new(self.width, self.height);
        }
        let width = self.width as usize;
        for (row, pixels) in out.chunks_exact_mut(width * 4).enumerate() {
            let y_row = &self.y[row * self.y_row_stride..];
            let uv_row = (row / 2) * self.uv_row_stride;
            for (col, px) in pixels.chunks_exact_mut(4).enumerate() {
                let uv = uv_row + (col / 2) * self.uv_pixel_stride;
                let y = (y_row[col] as i32 - 16).max(0);
                let u = self.u[uv] as i32 - 128;
                let v = self.v[uv] as i32 - 128;

                let y1192 = 1192 * y;
                let r = (y1192 + 1634 * v).clamp(0, 262143);
                let g = (y1192 - 833 * v - 400 * u).clamp(0, 262143);
                let b = (y1192 + 2066 * u).clamp(0, 262143);

                px[0] = (r >> 10) as u8;
                px[1] = (g >> 10) as u8;
                px[2] = (b >> 10) as u8;
                px[3] = 255;
            }
        }
        Ok(())
    }
}

/// Turns `image` clockwise by `degrees` (multiples of 90), then mirrors it.
pub fn orient(image: RgbaImage, degrees: i32, mirror: bool) -> RgbaImage {
    let rotated = match degrees.rem_euclid(360) {
        90 => rotate90(&image),
        180 => rotate180(&image),
        270 => rotate270(&image),
        _ => image,
    };
    if mirror {
        flip_horizontal(&rotated)
    } else {
        rotated
    }
}

/// Desktop webcams hand out BGRA.
pub fn bgra_to_rgba(bgra: &[u8], rgba: &mut Vec<u8>) {
    rgba.resize(bgra.len(), 0);
    for (dst, src) in rgba.chunks_exact_mut(4).zip(bgra.chunks_exact(4)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
        dst[3] = src[3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn planar(width: u32, height: u32, y: u8, u: u8, v: u8) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let luma = vec![y; (width * height) as usize];
        let chroma = ((width + 1) / 2 * ((height + 1) / 2)) as usize;
        (luma, vec![u; chroma], vec![v; chroma])
    }

    #[test]
    fn black_and_white_levels() {
        let (y, u, v) = planar(4, 4, 16, 128, 128);
        let frame = Yuv420Frame {
            width: 4,
            height: 4,
            y: &y,
            u: &u,
            v: &v,
            y_row_stride: 4,
            uv_row_stride: 2,
            uv_pixel_stride: 1,
        };
        let mut out = RgbaImage::new(1, 1);
        frame.to_rgba(&mut out).unwrap();
        assert_eq!(out.dimensions(), (4, 4));
        assert!(out.pixels().all(|p| *p == Rgba([0, 0, 0, 255])));

        let (y, u, v) = planar(4, 4, 235, 128, 128);
        let frame = Yuv420Frame { y: &y, u: &u, v: &v, ..frame };
        frame.to_rgba(&mut out).unwrap();
        assert!(out.pixels().all(|p| p[0] >= 250 && p[0] == p[1] && p[1] == p[2]));
    }

    #[test]
    fn interleaved_chroma_with_padding() {
        // 2x2 frame, rows padded to 8 bytes, VU interleaved
        let y = vec![
            81, 81, 0, 0, 0, 0, 0, 0, //
            81, 81,
        ];
        let vu = [240u8, 90];
        let frame = Yuv420Frame {
            width: 2,
            height: 2,
            y: &y,
            u: &vu[1..],
            v: &vu[..1],
            y_row_stride: 8,
            uv_row_stride: 8,
            uv_pixel_stride: 2,
        };
        let mut out = RgbaImage::new(2, 2);
        frame.to_rgba(&mut out).unwrap();
        // strongly red
        let px = out.get_pixel(1, 1);
        assert!(px[0] > 200 && px[1] < 60 && px[2] < 60, "{px:?}");
    }

    #[test]
    fn short_planes_are_rejected() {
        let frame = Yuv420Frame {
            width: 4,
            height: 4,
            y: &[0; 8],
            u: &[0; 4],
            v: &[0; 4],
            y_row_stride: 4,
            uv_row_stride: 2,
            uv_pixel_stride: 1,
        };
        assert!(frame.to_rgba(&mut RgbaImage::new(4, 4)).is_err());
    }

    #[test]
    fn orientation_swaps_dimensions() {
        let mut image = RgbaImage::new(3, 2);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));

        let turned = orient(image.clone(), 90, false);
        assert_eq!(turned.dimensions(), (2, 3));
        // top-left moves to top-right when turning clockwise
        assert_eq!(turned.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));

        assert_eq!(orient(image.clone(), 180, false).dimensions(), (3, 2));
        assert_eq!(orient(image.clone(), -90, false).dimensions(), (2, 3));

        let mirrored = orient(image, 0, true);
        assert_eq!(mirrored.get_pixel(2, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn bgra_swaps_red_and_blue() {
        let mut rgba = Vec::new();
        bgra_to_rgba(&[1, 2, 3, 4, 5, 6, 7, 8], &mut rgba);
        assert_eq!(rgba, vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }
}
