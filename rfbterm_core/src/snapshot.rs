//! Durable terminal state snapshots.
//!
//! The snapshot is a flat little-endian record: geometry, ring state,
//! cursor and attributes, the full cell array, parser state, and the
//! selection. A magic + version header precedes the payload so future
//! layout changes stay detectable. On load every numeric field is
//! clipped to its valid domain; only a bad header or a short read fail.

use std::io::{self, Read, Write};

use crate::buffer::CellBuffer;
use crate::cell::{Cell, CellAttr, TextAttr};
use crate::event::DisplayListener;
use crate::font::{FONT_HEIGHT, FONT_WIDTH};
use crate::term::{ParserState, Selection, TermMode, Terminal, MAX_ESC_PARAMS};

/// Snapshot file magic.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"RTSN";

/// Current snapshot layout version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Bytes per serialized cell: glyph + packed text attr + packed cell attr.
const CELL_RECORD: usize = 5;

/// The UTF-8 enable bit piggybacks on the packed attribute words, in the
/// slot the cell layout leaves free.
const ATTR_UTF_BIT: u16 = 1 << 15;

fn write_i32(w: &mut impl Write, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u16(w: &mut impl Write, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_i32(r: &mut impl Read) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u16(r: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u8(r: &mut impl Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

impl<L: DisplayListener> Terminal<L> {
    /// Serialize the full terminal state.
    pub fn save_snapshot(&self, w: &mut impl Write) -> io::Result<()> {
        let buf = &self.buffer;
        w.write_all(&SNAPSHOT_MAGIC)?;
        w.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;

        write_i32(w, (buf.width() * FONT_WIDTH) as i32)?;
        write_i32(w, (buf.height() * FONT_HEIGHT) as i32)?;
        write_i32(w, buf.total_height() as i32)?;

        write_i32(w, self.sr_bottom as i32)?;
        write_i32(w, self.sr_top as i32)?;
        write_i32(w, buf.y_base() as i32)?;
        write_i32(w, buf.y_scroll() as i32)?;

        w.write_all(&[u8::from(self.wrapped)])?;

        write_i32(w, self.x as i32)?;
        write_i32(w, self.y as i32)?;
        write_i32(w, self.saved_x as i32)?;
        write_i32(w, self.saved_y as i32)?;
        write_i32(w, buf.backscroll() as i32)?;
        write_i32(w, buf.total_height() as i32)?;

        for flag in [
            self.mode.contains(TermMode::CURSOR_VISIBLE),
            self.mode.contains(TermMode::AUTOWRAP),
            self.wrapped,
            self.mode.contains(TermMode::INSERT),
            self.mode.contains(TermMode::CURSORKEY),
            self.mode.contains(TermMode::DISPLAY_CTRL),
            self.mode.contains(TermMode::TOGGLE_META),
        ] {
            w.write_all(&[u8::from(flag)])?;
        }

        let utf_bit = if self.mode.contains(TermMode::UTF8) {
            ATTR_UTF_BIT
        } else {
            0
        };
        write_u16(w, self.attr_default.pack() | utf_bit)?;
        write_u16(w, self.attr.pack() | utf_bit)?;
        write_u16(w, self.saved_attr.pack() | utf_bit)?;

        for row in 0..buf.total_height() {
            for cell in buf.row(row) {
                w.write_all(&[cell.glyph])?;
                write_u16(w, cell.attr.pack())?;
                write_u16(w, cell.cell_attr.bits())?;
            }
        }

        write_i32(w, i32::from(self.state.to_u8()))?;
        for param in &self.esc_params {
            write_i32(w, *param)?;
        }
        write_i32(w, self.nb_esc_params as i32)?;
        write_i32(w, i32::from(self.has_esc_param))?;
        write_i32(w, i32::from(self.has_qmark))?;

        for sel in &self.selections {
            write_i32(w, sel.start_x)?;
            write_i32(w, sel.start_y)?;
            write_i32(w, sel.end_x)?;
            write_i32(w, sel.end_y)?;
        }
        write_i32(w, i32::from(self.selecting))?;
        write_i32(w, self.mouse_x)?;
        write_i32(w, self.mouse_y)?;

        write_i32(w, self.unicode_index as i32)?;
        w.write_all(&self.unicode_data)?;
        write_i32(w, self.unicode_len as i32)?;
        Ok(())
    }

    /// Restore terminal state from a snapshot stream.
    ///
    /// Geometry in the snapshot wins: the terminal is resized before the
    /// cell data is applied. All fields are clipped into range.
    pub fn load_snapshot(&mut self, r: &mut impl Read) -> io::Result<()> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad snapshot magic"));
        }
        let mut ver = [0u8; 4];
        r.read_exact(&mut ver)?;
        if u32::from_le_bytes(ver) != SNAPSHOT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unsupported snapshot version",
            ));
        }

        let g_width = read_i32(r)?.max(FONT_WIDTH as i32) as usize;
        let g_height = read_i32(r)?.max(FONT_HEIGHT as i32) as usize;
        let total_height_a = read_i32(r)?.max(1) as usize;

        let width = (g_width / FONT_WIDTH).max(1);
        let height = (g_height / FONT_HEIGHT).max(1);
        let total_height = total_height_a.max(height);

        let sr_bottom = read_i32(r)?.max(0) as usize;
        let sr_top = read_i32(r)?.max(0) as usize;
        let y_base = read_i32(r)?.max(0) as usize;
        let y_scroll = read_i32(r)?.max(0) as usize;

        let _wrapped_byte = read_u8(r)?;

        let x = read_i32(r)?.max(0) as usize;
        let y = read_i32(r)?.max(0) as usize;
        let saved_x = read_i32(r)?.max(0) as usize;
        let saved_y = read_i32(r)?.max(0) as usize;
        let backscroll = read_i32(r)?.max(0) as usize;
        // The layout carries total_height twice; the first occurrence wins.
        let _total_height_b = read_i32(r)?;

        let mut flags = [0u8; 7];
        r.read_exact(&mut flags)?;

        let attr_default_raw = read_u16(r)?;
        let attr_raw = read_u16(r)?;
        let saved_attr_raw = read_u16(r)?;

        let mut cells = Vec::with_capacity(width * total_height);
        let mut record = [0u8; CELL_RECORD];
        for _ in 0..width * total_height {
            r.read_exact(&mut record)?;
            cells.push(Cell {
                glyph: record[0],
                attr: TextAttr::unpack(u16::from_le_bytes([record[1], record[2]])),
                cell_attr: CellAttr::from_bits_truncate(u16::from_le_bytes([
                    record[3], record[4],
                ])),
            });
        }

        let state = read_i32(r)?.clamp(0, 255) as u8;
        let mut esc_params = [0i32; MAX_ESC_PARAMS];
        for param in &mut esc_params {
            *param = read_i32(r)?;
        }
        let nb_esc_params = read_i32(r)?.clamp(0, MAX_ESC_PARAMS as i32) as usize;
        let has_esc_param = read_i32(r)? != 0;
        let has_qmark = read_i32(r)? != 0;

        let mut selections = [Selection::default(); 2];
        for sel in &mut selections {
            sel.start_x = read_i32(r)?;
            sel.start_y = read_i32(r)?;
            sel.end_x = read_i32(r)?;
            sel.end_y = read_i32(r)?;
        }
        let selecting = read_i32(r)? != 0;
        let mouse_x = read_i32(r)?;
        let mouse_y = read_i32(r)?;

        let unicode_index = read_i32(r)?.clamp(0, 6) as usize;
        let mut unicode_data = [0u8; 7];
        r.read_exact(&mut unicode_data)?;
        let unicode_len = read_i32(r)?.clamp(0, 6) as usize;

        // Apply, clipping against the restored geometry.
        self.buffer = CellBuffer::restore(
            width,
            height,
            total_height,
            y_base,
            y_scroll,
            backscroll,
            cells,
        );
        self.fb.resize(width * FONT_WIDTH, height * FONT_HEIGHT);

        // Lower bound first, then the upper.
        self.sr_top = sr_top.min(height - 1);
        self.sr_bottom = sr_bottom.max(self.sr_top).min(height - 1);
        self.x = x.min(width - 1);
        self.y = y.min(height - 1);
        self.saved_x = saved_x.min(width - 1);
        self.saved_y = saved_y.min(height - 1);
        self.wrapped = flags[2] != 0;

        let mut mode = TermMode::empty();
        mode.set(TermMode::CURSOR_VISIBLE, flags[0] != 0);
        mode.set(TermMode::AUTOWRAP, flags[1] != 0);
        mode.set(TermMode::INSERT, flags[3] != 0);
        mode.set(TermMode::CURSORKEY, flags[4] != 0);
        mode.set(TermMode::DISPLAY_CTRL, flags[5] != 0);
        mode.set(TermMode::TOGGLE_META, flags[6] != 0);
        mode.set(TermMode::UTF8, attr_raw & ATTR_UTF_BIT != 0);
        self.mode = mode;

        self.attr_default = TextAttr::unpack(attr_default_raw & !ATTR_UTF_BIT);
        self.attr = TextAttr::unpack(attr_raw & !ATTR_UTF_BIT);
        self.saved_attr = TextAttr::unpack(saved_attr_raw & !ATTR_UTF_BIT);

        self.state = ParserState::from_u8(state);
        self.esc_params = esc_params;
        self.nb_esc_params = nb_esc_params;
        self.has_esc_param = has_esc_param;
        self.has_qmark = has_qmark;

        let clip_sel = |sel: Selection| Selection {
            start_x: sel.start_x.clamp(0, width as i32 - 1),
            start_y: sel.start_y.clamp(0, total_height as i32 - 1),
            end_x: sel.end_x.clamp(0, width as i32 - 1),
            end_y: sel.end_y.clamp(0, total_height as i32 - 1),
        };
        self.selections = [clip_sel(selections[0]), clip_sel(selections[1])];
        self.selecting = selecting;
        self.mouse_x = mouse_x.clamp(-1, width as i32 - 1);
        self.mouse_y = mouse_y.clamp(-1, height as i32 - 1);

        self.unicode_index = unicode_index;
        self.unicode_data = unicode_data;
        self.unicode_len = unicode_len;

        self.listener
            .dpy_resize(width * FONT_WIDTH, height * FONT_HEIGHT);
        self.refresh();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::color::Depth;
    use crate::event::VoidListener;
    use crate::term::{TermMode, Terminal};

    fn terminal(cols: usize, rows: usize) -> Terminal<VoidListener> {
        Terminal::new(cols * 8, rows * 16, Depth::D32, 64, VoidListener)
    }

    #[test]
    fn roundtrip_preserves_screen_and_cursor() {
        let mut term = terminal(20, 6);
        term.process(b"hello\r\nworld\x1b[1;35mX\x1b[2;4r");
        let mut blob = Vec::new();
        term.save_snapshot(&mut blob).unwrap();

        let mut restored = terminal(20, 6);
        restored.load_snapshot(&mut &blob[..]).unwrap();

        assert_eq!(restored.cursor(), term.cursor());
        for y in 0..6 {
            for x in 0..20 {
                let a = term.buffer().cell_at(x, term.buffer().screen_to_virtual(y));
                let b = restored
                    .buffer()
                    .cell_at(x, restored.buffer().screen_to_virtual(y));
                assert_eq!(a, b, "cell {x},{y}");
            }
        }
        let mut blob2 = Vec::new();
        restored.save_snapshot(&mut blob2).unwrap();
        assert_eq!(blob, blob2);
    }

    #[test]
    fn geometry_mismatch_resizes_before_load() {
        let mut term = terminal(30, 10);
        term.process(b"wide");
        let mut blob = Vec::new();
        term.save_snapshot(&mut blob).unwrap();

        let mut restored = terminal(10, 4);
        restored.load_snapshot(&mut &blob[..]).unwrap();
        assert_eq!(restored.width(), 30);
        assert_eq!(restored.height(), 10);
    }

    #[test]
    fn corrupt_fields_are_clipped() {
        let mut term = terminal(10, 4);
        term.process(b"x");
        let mut blob = Vec::new();
        term.save_snapshot(&mut blob).unwrap();

        // Stomp the cursor x field (offset: header 8 + 3*4 geometry +
        // 4*4 region/ring + 1 wrapped byte).
        let cursor_x_off = 8 + 12 + 16 + 1;
        blob[cursor_x_off..cursor_x_off + 4].copy_from_slice(&500i32.to_le_bytes());

        let mut restored = terminal(10, 4);
        restored.load_snapshot(&mut &blob[..]).unwrap();
        assert!(restored.cursor().0 < 10);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut term = terminal(10, 4);
        let mut blob = Vec::new();
        term.save_snapshot(&mut blob).unwrap();
        blob[0] = b'X';
        let mut restored = terminal(10, 4);
        assert!(restored.load_snapshot(&mut &blob[..]).is_err());
    }

    #[test]
    fn utf_flag_survives_roundtrip() {
        let mut term = terminal(10, 4);
        term.process(b"\x1b%@"); // disable UTF-8
        assert!(!term.mode().contains(TermMode::UTF8));
        let mut blob = Vec::new();
        term.save_snapshot(&mut blob).unwrap();

        let mut restored = terminal(10, 4);
        assert!(restored.mode().contains(TermMode::UTF8));
        restored.load_snapshot(&mut &blob[..]).unwrap();
        assert!(!restored.mode().contains(TermMode::UTF8));
    }
}
