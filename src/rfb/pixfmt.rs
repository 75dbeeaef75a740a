//! Client pixel formats and the per-client pixel encoders.
//!
//! Each client negotiates a `PIXEL_FORMAT` block. When it matches the
//! internal framebuffer layout bit for bit the encoder degenerates to a
//! straight copy; otherwise every pixel is unpacked through the internal
//! channel layout, rescaled per channel, and repacked in the client's
//! byte order.

use bytes::{BufMut, BytesMut};
use rfbterm_core::Depth;

/// A client's negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Bytes per pixel (1, 2, or 4).
    pub bytes_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_color: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// The server's native format for an internal depth.
    pub fn native(depth: Depth) -> Self {
        let [(rs, rm), (gs, gm), (bs, bm)] = depth.channels();
        Self {
            bytes_per_pixel: depth.bytes_per_pixel() as u8,
            depth: depth.wire_bpp(),
            big_endian: cfg!(target_endian = "big"),
            true_color: true,
            red_max: rm,
            green_max: gm,
            blue_max: bm,
            red_shift: rs,
            green_shift: gs,
            blue_shift: bs,
        }
    }

    /// Parse the 16-byte wire PIXEL_FORMAT block.
    ///
    /// Returns `None` for formats the server cannot serve (non-true-colour
    /// or unsupported bpp).
    pub fn parse(block: &[u8]) -> Option<Self> {
        let bits = block[0];
        if !matches!(bits, 8 | 16 | 32) || block[3] == 0 {
            return None;
        }
        Some(Self {
            bytes_per_pixel: bits / 8,
            depth: block[1],
            big_endian: block[2] != 0,
            true_color: true,
            red_max: u16::from_be_bytes([block[4], block[5]]),
            green_max: u16::from_be_bytes([block[6], block[7]]),
            blue_max: u16::from_be_bytes([block[8], block[9]]),
            red_shift: block[10],
            green_shift: block[11],
            blue_shift: block[12],
        })
    }

    /// Write the 16-byte wire PIXEL_FORMAT block.
    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u8(self.bytes_per_pixel * 8);
        out.put_u8(self.depth);
        out.put_u8(u8::from(self.big_endian));
        out.put_u8(u8::from(self.true_color));
        out.put_u16(self.red_max);
        out.put_u16(self.green_max);
        out.put_u16(self.blue_max);
        out.put_u8(self.red_shift);
        out.put_u8(self.green_shift);
        out.put_u8(self.blue_shift);
        out.put_bytes(0, 3);
    }

    /// Whether this format equals the internal layout, making the
    /// zero-copy encoder valid. The client's `depth` field is advisory
    /// and ignored here; only the bit layout matters.
    pub fn matches_internal(&self, depth: Depth) -> bool {
        let native = Self::native(depth);
        self.bytes_per_pixel == native.bytes_per_pixel
            && (self.big_endian == native.big_endian || self.bytes_per_pixel == 1)
            && self.red_max == native.red_max
            && self.green_max == native.green_max
            && self.blue_max == native.blue_max
            && self.red_shift == native.red_shift
            && self.green_shift == native.green_shift
            && self.blue_shift == native.blue_shift
    }
}

/// Translates internal framebuffer pixels into client pixels.
#[derive(Debug, Clone, Copy)]
pub enum PixelEncoder {
    /// Client layout equals the framebuffer layout.
    Copy,
    /// Per-pixel unpack, channel rescale, repack.
    Generic(PixelFormat),
}

impl PixelEncoder {
    /// Pick the encoder for a negotiated format.
    pub fn select(format: PixelFormat, depth: Depth) -> Self {
        if format.matches_internal(depth) {
            Self::Copy
        } else {
            Self::Generic(format)
        }
    }

    /// Client-side bytes per pixel.
    pub fn bytes_per_pixel(&self, depth: Depth) -> usize {
        match self {
            Self::Copy => depth.bytes_per_pixel(),
            Self::Generic(format) => usize::from(format.bytes_per_pixel),
        }
    }

    /// Encode a run of internal pixels.
    pub fn write_pixels(&self, out: &mut BytesMut, src: &[u8], depth: Depth) {
        match self {
            Self::Copy => out.put_slice(src),
            Self::Generic(format) => {
                let bpp = depth.bytes_per_pixel();
                for chunk in src.chunks_exact(bpp) {
                    let pixel = read_native_pixel(chunk);
                    self.write_one(out, pixel, depth, format);
                }
            }
        }
    }

    /// Encode a single internal pixel value.
    pub fn write_pixel(&self, out: &mut BytesMut, pixel: u32, depth: Depth) {
        match self {
            Self::Copy => {
                let bytes = native_pixel_bytes(depth, pixel);
                out.put_slice(&bytes[..depth.bytes_per_pixel()]);
            }
            Self::Generic(format) => self.write_one(out, pixel, depth, format),
        }
    }

    fn write_one(&self, out: &mut BytesMut, pixel: u32, depth: Depth, format: &PixelFormat) {
        let [(rs, rm), (gs, gm), (bs, bm)] = depth.channels();
        let rescale = |v: u32, smax: u16, dmax: u16| {
            v * (u32::from(dmax) + 1) / (u32::from(smax) + 1)
        };
        let r = rescale(pixel >> rs & u32::from(rm), rm, format.red_max);
        let g = rescale(pixel >> gs & u32::from(gm), gm, format.green_max);
        let b = rescale(pixel >> bs & u32::from(bm), bm, format.blue_max);
        let value = (r << format.red_shift) | (g << format.green_shift) | (b << format.blue_shift);
        match format.bytes_per_pixel {
            1 => out.put_u8(value as u8),
            2 => {
                if format.big_endian {
                    out.put_u16(value as u16);
                } else {
                    out.put_u16_le(value as u16);
                }
            }
            _ => {
                if format.big_endian {
                    out.put_u32(value);
                } else {
                    out.put_u32_le(value);
                }
            }
        }
    }
}

/// Read one native-endian internal pixel from its byte representation.
pub fn read_native_pixel(bytes: &[u8]) -> u32 {
    match bytes.len() {
        1 => u32::from(bytes[0]),
        2 => u32::from(u16::from_ne_bytes([bytes[0], bytes[1]])),
        _ => u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

/// Native-endian byte representation of an internal pixel.
pub fn native_pixel_bytes(depth: Depth, pixel: u32) -> [u8; 4] {
    match depth {
        Depth::D8 => [pixel as u8, 0, 0, 0],
        Depth::D15 | Depth::D16 => {
            let b = (pixel as u16).to_ne_bytes();
            [b[0], b[1], 0, 0]
        }
        Depth::D32 => pixel.to_ne_bytes(),
    }
}
