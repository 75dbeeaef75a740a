//! Hextile rectangle encoding.
//!
//! Rectangles split into 16×16 tiles. A tile with one colour becomes at
//! most a background update, a two-colour tile becomes foreground runs
//! over the background, and anything busier falls back to a raw tile.
//! Background and foreground carry over between tiles so a run of
//! identical tiles costs one byte each.

use bytes::{BufMut, BytesMut};
use rfbterm_core::{Depth, Framebuffer};

use super::pixfmt::{read_native_pixel, PixelEncoder};
use crate::dirty::Rect;

pub const HEXTILE_RAW: u8 = 1;
pub const HEXTILE_BACKGROUND_SPECIFIED: u8 = 2;
pub const HEXTILE_FOREGROUND_SPECIFIED: u8 = 4;
pub const HEXTILE_ANY_SUBRECTS: u8 = 8;
pub const HEXTILE_SUBRECTS_COLOURED: u8 = 16;

/// Carried background/foreground between tiles of one rectangle.
#[derive(Debug, Default, Clone, Copy)]
pub struct TileState {
    bg: Option<u32>,
    fg: Option<u32>,
}

/// Encode one rectangle's payload as hextile tiles.
pub fn encode_rect(out: &mut BytesMut, fb: &Framebuffer, rect: Rect, encoder: &PixelEncoder) {
    let mut state = TileState::default();
    let mut y = 0;
    while y < rect.h {
        let th = 16.min(rect.h - y);
        let mut x = 0;
        while x < rect.w {
            let tw = 16.min(rect.w - x);
            encode_tile(
                out,
                fb,
                Rect::new(rect.x + x, rect.y + y, tw, th),
                encoder,
                &mut state,
            );
            x += 16;
        }
        y += 16;
    }
}

/// Classify a tile: background colour, optional foreground colour, and
/// whether more than two colours appear.
fn classify(fb: &Framebuffer, tile: Rect) -> (u32, Option<u32>, bool) {
    let bpp = fb.depth().bytes_per_pixel();
    let mut bg = None;
    let mut fg = None;
    for row in 0..tile.h {
        let start = (tile.y + row) * fb.linesize() + tile.x * bpp;
        let line = &fb.data()[start..start + tile.w * bpp];
        for chunk in line.chunks_exact(bpp) {
            let pixel = read_native_pixel(chunk);
            match (bg, fg) {
                (None, _) => bg = Some(pixel),
                (Some(b), None) if pixel != b => fg = Some(pixel),
                (Some(b), Some(f)) if pixel != b && pixel != f => {
                    return (b, Some(f), true);
                }
                _ => {}
            }
        }
    }
    (bg.unwrap_or(0), fg, false)
}

fn encode_tile(
    out: &mut BytesMut,
    fb: &Framebuffer,
    tile: Rect,
    encoder: &PixelEncoder,
    state: &mut TileState,
) {
    let depth = fb.depth();
    let (bg, fg, busy) = classify(fb, tile);

    if busy {
        // Raw tile; carried colours are no longer trustworthy.
        out.put_u8(HEXTILE_RAW);
        emit_raw(out, fb, tile, encoder, depth);
        *state = TileState::default();
        return;
    }

    let mut flags = 0u8;
    if state.bg != Some(bg) {
        flags |= HEXTILE_BACKGROUND_SPECIFIED;
        state.bg = Some(bg);
    }
    if let Some(fg) = fg {
        if state.fg != Some(fg) {
            flags |= HEXTILE_FOREGROUND_SPECIFIED;
            state.fg = Some(fg);
        }
        flags |= HEXTILE_ANY_SUBRECTS;
    }

    out.put_u8(flags);
    if flags & HEXTILE_BACKGROUND_SPECIFIED != 0 {
        encoder.write_pixel(out, bg, depth);
    }
    if flags & HEXTILE_FOREGROUND_SPECIFIED != 0 {
        encoder.write_pixel(out, state.fg.unwrap_or(0), depth);
    }
    if flags & HEXTILE_ANY_SUBRECTS != 0 {
        emit_subrects(out, fb, tile, bg);
    }
}

/// Emit the foreground runs of a two-colour tile.
fn emit_subrects(out: &mut BytesMut, fb: &Framebuffer, tile: Rect, bg: u32) {
    let bpp = fb.depth().bytes_per_pixel();
    // Reserve the count byte, fill it in after scanning.
    let count_at = out.len();
    out.put_u8(0);
    let mut count = 0u8;

    for row in 0..tile.h {
        let start = (tile.y + row) * fb.linesize() + tile.x * bpp;
        let line = &fb.data()[start..start + tile.w * bpp];
        let mut x = 0;
        while x < tile.w {
            let pixel = read_native_pixel(&line[x * bpp..(x + 1) * bpp]);
            if pixel == bg {
                x += 1;
                continue;
            }
            let run_start = x;
            while x < tile.w {
                let p = read_native_pixel(&line[x * bpp..(x + 1) * bpp]);
                if p == bg {
                    break;
                }
                x += 1;
            }
            out.put_u8(((run_start as u8) << 4) | row as u8);
            out.put_u8(((x - run_start - 1) as u8) << 4);
            count += 1;
        }
    }
    out[count_at] = count;
}

/// Emit all pixels of a tile through the client encoder.
fn emit_raw(out: &mut BytesMut, fb: &Framebuffer, tile: Rect, encoder: &PixelEncoder, depth: Depth) {
    let bpp = depth.bytes_per_pixel();
    for row in 0..tile.h {
        let start = (tile.y + row) * fb.linesize() + tile.x * bpp;
        encoder.write_pixels(out, &fb.data()[start..start + tile.w * bpp], depth);
    }
}
