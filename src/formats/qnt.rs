//! QNT — a lossless, channel-planar, 2×2-block-interleaved RGB(A) codec.
//!
//! Each color channel is stored as its own zlib-compressed plane, itself
//! laid out in 2×2 pixel blocks rather than row-major order, and the whole
//! thing is run through a left/up/average predictor before compression.
//! Decoding undoes all three steps: inflate, de-block, unfilter.

use log::debug;

use crate::byte_cursor::ByteCursor;
use crate::error::{ErrorKind, Result};
use crate::image::Image;
use crate::inflate::inflate;

const QNT_MAGIC: &[u8; 4] = b"QNT\0";
const FIXED_HEADER_SIZE: usize = 48;

struct Header {
    header_size: usize,
    width: u32,
    height: u32,
    bpp: u32,
    pixel_compressed_size: u32,
    alpha_compressed_size: u32,
}

fn read_header(cur: &mut ByteCursor) -> Result<Header> {
    let magic = cur.fourcc()?;
    crate::check!(&magic == QNT_MAGIC, ErrorKind::BadMagic("qnt".into(), "QNT\\0".into(), 0));
    let version = cur.u32_le()?;
    crate::check!(version <= 1, ErrorKind::UnsupportedVersion("qnt".into(), version as i64));

    let header_size = if version >= 1 {
        cur.u32_le()? as usize
    } else {
        FIXED_HEADER_SIZE
    };

    let _x = cur.i32_le()?;
    let _y = cur.i32_le()?;
    let width = cur.u32_le()?;
    let height = cur.u32_le()?;
    let bpp = cur.u32_le()?;
    let _reserved = cur.u32_le()?; // always observed as 1; meaning unknown
    let pixel_compressed_size = cur.u32_le()?;
    let alpha_compressed_size = cur.u32_le()?;

    crate::check!(bpp == 24, ErrorKind::UnsupportedVersion(format!("qnt bpp={}", bpp), bpp as i64));

    debug!(
        "qnt: {}x{} pixel_size={} alpha_size={}",
        width, height, pixel_compressed_size, alpha_compressed_size
    );

    Ok(Header { header_size, width, height, bpp, pixel_compressed_size, alpha_compressed_size })
}

pub fn decode(buf: &[u8]) -> Result<Image> {
    let mut cur = ByteCursor::new(buf);
    let header = read_header(&mut cur)?;
    let _ = header.bpp;

    cur.seek(header.header_size);

    let w = (header.width as usize + 1) & !1;
    let h = (header.height as usize + 1) & !1;

    let pixel_blob = cur.bytes(header.pixel_compressed_size as usize)?;
    let pixel_plane = inflate(pixel_blob, w * h * 3)?;

    let mut rgba = vec![0u8; w * h * 4];
    deinterleave_planar_2x2(&pixel_plane, w, h, &mut rgba);

    let has_alpha = header.alpha_compressed_size > 0;
    if has_alpha {
        let alpha_blob = cur.bytes(header.alpha_compressed_size as usize)?;
        let alpha_plane = inflate(alpha_blob, w * h)?;
        for i in 0..w * h {
            rgba[i * 4 + 3] = alpha_plane[i];
        }
    } else {
        rgba[3] = 0xFF;
    }

    for c in 0..4 {
        unfilter_channel(&mut rgba, w, h, c);
    }

    let pixels = crop(&rgba, w, header.width as usize, header.height as usize);

    Ok(Image { width: header.width, height: header.height, pixels, has_alpha })
}

/// Reads a zlib-decompressed pixel plane laid out as three channel planes
/// (read order 2, 1, 0), each itself tiled in 2×2 pixel blocks, and scatters
/// it into an interleaved RGBA buffer, one byte per channel per block pixel.
fn deinterleave_planar_2x2(data: &[u8], w: usize, h: usize, rgba: &mut [u8]) {
    let mut pos = 0usize;
    for &c in &[2usize, 1, 0] {
        let mut y = 0;
        while y < h {
            let mut x = 0;
            while x < w {
                let quad = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
                pos += 4;
                set_channel(rgba, w, x, y, c, quad[0]);
                set_channel(rgba, w, x, y + 1, c, quad[1]);
                set_channel(rgba, w, x + 1, y, c, quad[2]);
                set_channel(rgba, w, x + 1, y + 1, c, quad[3]);
                x += 2;
            }
            y += 2;
        }
    }
}

fn set_channel(rgba: &mut [u8], w: usize, x: usize, y: usize, c: usize, v: u8) {
    rgba[(y * w + x) * 4 + c] = v;
}

/// Undoes the left/up/average-of-up-and-left predictor in place, scanning
/// one channel of the interleaved buffer in row-major order.
fn unfilter_channel(rgba: &mut [u8], w: usize, h: usize, c: usize) {
    for y in 0..h {
        for x in 0..w {
            if x == 0 && y == 0 {
                continue;
            }
            let idx = (y * w + x) * 4 + c;
            let out = if y == 0 {
                let left = rgba[idx - 4];
                left.wrapping_sub(rgba[idx])
            } else if x == 0 {
                let above = rgba[idx - 4 * w];
                above.wrapping_sub(rgba[idx])
            } else {
                let above = rgba[idx - 4 * w] as u16;
                let left = rgba[idx - 4] as u16;
                let avg = ((above + left) >> 1) as u8;
                avg.wrapping_sub(rgba[idx])
            };
            rgba[idx] = out;
        }
    }
}

/// Crops a `w`-wide working buffer (rounded up to even) down to the
/// declared `width`×`height`.
fn crop(rgba: &[u8], w: usize, width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let row_start = (y * w) * 4;
        out.extend_from_slice(&rgba[row_start..row_start + width * 4]);
    }
    out
}
