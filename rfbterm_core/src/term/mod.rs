//! Terminal emulator state machine.
//!
//! [`Terminal<L>`] consumes the host byte stream — control characters,
//! escape sequences, and UTF-8 runs — and maintains the cell grid,
//! cursor, scroll region, and selection, rendering every change into the
//! framebuffer and reporting damage through the [`DisplayListener`].

mod csi;
mod esc;
mod keys;
mod mouse;

pub use mouse::Selection;

use bitflags::bitflags;
use log::trace;
use unicode_width::UnicodeWidthChar;

use crate::buffer::CellBuffer;
use crate::cell::{AttrFlags, Cell, CellAttr, TextAttr};
pub use crate::cell::FontSlot;
use crate::codec::{Codec, REPLACEMENT_GLYPH};
use crate::color::{Depth, Palette};
use crate::event::DisplayListener;
use crate::font::{FONT_HEIGHT, FONT_WIDTH};
use crate::framebuffer::Framebuffer;

/// Escape parameter slots.
pub const MAX_ESC_PARAMS: usize = 16;

bitflags! {
    /// Terminal mode flags toggled by SM/RM, DECSET/DECRST, and SGR.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TermMode: u16 {
        /// DECAWM — wrap at the right margin.
        const AUTOWRAP       = 1 << 0;
        /// DECOM — cursor addressing relative to the scroll region.
        const ORIGIN         = 1 << 1;
        /// IRM — insert rather than overwrite.
        const INSERT         = 1 << 2;
        /// DECCKM — application cursor key sequences.
        const CURSORKEY      = 1 << 3;
        /// Display control characters instead of interpreting them.
        const DISPLAY_CTRL   = 1 << 4;
        /// OR 0x80 into glyph bytes before display.
        const TOGGLE_META    = 1 << 5;
        /// DECTCEM — cursor is drawn.
        const CURSOR_VISIBLE = 1 << 6;
        /// UTF-8 input decoding enabled.
        const UTF8           = 1 << 7;
    }
}

impl Default for TermMode {
    fn default() -> Self {
        Self::AUTOWRAP | Self::CURSOR_VISIBLE | Self::UTF8
    }
}

/// Byte-stream parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    Norm,
    Esc,
    Percent,
    SelectG0,
    SelectG1,
    Csi,
    NonStd,
    Palette,
}

impl ParserState {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Norm => 0,
            Self::Esc => 1,
            Self::Percent => 2,
            Self::SelectG0 => 3,
            Self::SelectG1 => 4,
            Self::Csi => 5,
            Self::NonStd => 6,
            Self::Palette => 7,
        }
    }

    /// Decode a snapshot discriminant; out-of-range values clip to Norm.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Esc,
            2 => Self::Percent,
            3 => Self::SelectG0,
            4 => Self::SelectG1,
            5 => Self::Csi,
            6 => Self::NonStd,
            7 => Self::Palette,
            _ => Self::Norm,
        }
    }
}

/// The terminal emulator.
pub struct Terminal<L: DisplayListener> {
    pub(crate) buffer: CellBuffer,
    pub(crate) fb: Framebuffer,
    pub(crate) palette: Palette,
    pub(crate) listener: L,

    /// Cursor position, screen coordinates. Invariant: `x < width`,
    /// `y < height`.
    pub(crate) x: usize,
    pub(crate) y: usize,
    pub(crate) saved_x: usize,
    pub(crate) saved_y: usize,
    /// Pending deferred wrap.
    pub(crate) wrapped: bool,

    pub(crate) attr: TextAttr,
    pub(crate) attr_default: TextAttr,
    pub(crate) saved_attr: TextAttr,
    /// Per-font-slot codec selection.
    pub(crate) codecs: [Codec; 2],

    /// Scroll region, inclusive rows.
    pub(crate) sr_top: usize,
    pub(crate) sr_bottom: usize,

    pub(crate) mode: TermMode,

    pub(crate) state: ParserState,
    pub(crate) esc_params: [i32; MAX_ESC_PARAMS],
    pub(crate) nb_esc_params: usize,
    pub(crate) has_esc_param: bool,
    pub(crate) has_qmark: bool,
    /// OSC palette collector: accumulated nibbles and their count.
    pub(crate) osc_value: u32,
    pub(crate) osc_nibbles: u8,

    /// Partial UTF-8 sequence buffer.
    pub(crate) unicode_data: [u8; 7],
    pub(crate) unicode_index: usize,
    pub(crate) unicode_len: usize,

    /// `[0]` in-progress, `[1]` committed. Virtual coordinates.
    pub(crate) selections: [Selection; 2],
    pub(crate) selecting: bool,
    pub(crate) mouse_x: i32,
    pub(crate) mouse_y: i32,

    /// Insert-key toggle state for the `ESC [4h`/`ESC [4l` pair.
    pub(crate) kbd_insert_toggle: bool,
}

impl<L: DisplayListener> Terminal<L> {
    /// Create a terminal for a `width × height` pixel display.
    pub fn new(
        width_px: usize,
        height_px: usize,
        depth: Depth,
        total_height: usize,
        listener: L,
    ) -> Self {
        let width = (width_px / FONT_WIDTH).max(1);
        let height = (height_px / FONT_HEIGHT).max(1);
        let palette = Palette::default();
        let fb = Framebuffer::new(width * FONT_WIDTH, height * FONT_HEIGHT, depth, &palette);
        let mut term = Self {
            buffer: CellBuffer::new(width, height, total_height.max(height)),
            fb,
            palette,
            listener,
            x: 0,
            y: 0,
            saved_x: 0,
            saved_y: 0,
            wrapped: false,
            attr: TextAttr::default(),
            attr_default: TextAttr::default(),
            saved_attr: TextAttr::default(),
            codecs: [Codec::Lat1, Codec::Graf],
            sr_top: 0,
            sr_bottom: height - 1,
            mode: TermMode::default(),
            state: ParserState::Norm,
            esc_params: [0; MAX_ESC_PARAMS],
            nb_esc_params: 0,
            has_esc_param: false,
            has_qmark: false,
            osc_value: 0,
            osc_nibbles: 0,
            unicode_data: [0; 7],
            unicode_index: 0,
            unicode_len: 0,
            selections: [Selection::default(); 2],
            selecting: false,
            mouse_x: -1,
            mouse_y: -1,
            kbd_insert_toggle: false,
        };
        term.refresh();
        term
    }

    pub fn width(&self) -> usize {
        self.buffer.width()
    }

    pub fn height(&self) -> usize {
        self.buffer.height()
    }

    /// Cursor position in screen coordinates.
    pub fn cursor(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    pub fn mode(&self) -> TermMode {
        self.mode
    }

    pub fn buffer(&self) -> &CellBuffer {
        &self.buffer
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.fb
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Feed host output bytes through the state machine.
    pub fn process(&mut self, bytes: &[u8]) {
        self.draw_cursor(false);
        for &byte in bytes {
            self.put_byte(byte);
        }
        self.draw_cursor(true);
    }

    /// One byte through the parser.
    pub(crate) fn put_byte(&mut self, byte: u8) {
        // CAN and SUB abort any sequence in progress; ESC restarts one.
        if byte == 0x18 || byte == 0x1A {
            self.state = ParserState::Norm;
            return;
        }
        if byte == 0x1B && self.state != ParserState::Norm {
            self.reset_params();
            self.state = ParserState::Esc;
            return;
        }

        match self.state {
            ParserState::Norm => self.put_norm(byte),
            ParserState::Esc => self.esc_dispatch(byte),
            ParserState::Percent => self.percent_dispatch(byte),
            ParserState::SelectG0 => self.designate(FontSlot::G0, byte),
            ParserState::SelectG1 => self.designate(FontSlot::G1, byte),
            ParserState::Csi => self.csi_byte(byte),
            ParserState::NonStd => self.nonstd_dispatch(byte),
            ParserState::Palette => self.palette_dispatch(byte),
        }
    }

    fn put_norm(&mut self, byte: u8) {
        match byte {
            0x07 => self.listener.bell(),
            0x08 => {
                if self.x > 0 {
                    self.set_cursor(self.x - 1, self.y);
                }
            }
            0x09 => {
                let step = 8 - self.x % 8;
                if self.x + step > self.width() {
                    self.set_cursor(0, self.y);
                    self.put_lf();
                } else {
                    self.set_cursor((self.x + step).min(self.width() - 1), self.y);
                }
            }
            0x0A | 0x0B | 0x0C => self.put_lf(),
            0x0D => self.set_cursor(0, self.y),
            0x0E => {
                // SO: shift to G1 and pass control bytes through.
                self.attr.font = FontSlot::G1;
                self.mode.insert(TermMode::DISPLAY_CTRL);
            }
            0x0F => {
                self.attr.font = FontSlot::G0;
                self.mode.remove(TermMode::DISPLAY_CTRL);
            }
            0x1B => {
                self.reset_params();
                self.state = ParserState::Esc;
            }
            0x7F => {}
            0x9B => {
                self.reset_params();
                self.state = ParserState::Csi;
            }
            _ => self.input_byte(byte),
        }
    }

    /// The character input path: UTF-8 decoding, codec translation, and
    /// glyph emission.
    fn input_byte(&mut self, byte: u8) {
        if self.mode.contains(TermMode::UTF8) && !self.mode.contains(TermMode::DISPLAY_CTRL) {
            if self.unicode_index > 0 {
                if byte & 0xC0 != 0x80 {
                    // Invalid continuation: drop the partial sequence.
                    trace!("invalid utf-8 continuation 0x{byte:02x}");
                    self.unicode_index = 0;
                    self.emit_glyph(REPLACEMENT_GLYPH, 1);
                    return;
                }
                self.unicode_data[self.unicode_index] = byte;
                self.unicode_index += 1;
                if self.unicode_index < self.unicode_len {
                    return;
                }
                let cp = self.decode_sequence();
                self.unicode_index = 0;
                self.emit_codepoint(cp);
                return;
            }
            let len = match byte {
                0xC0..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF7 => 4,
                0xF8..=0xFB => 5,
                0xFC..=0xFD => 6,
                0xFE..=0xFF => {
                    self.emit_glyph(REPLACEMENT_GLYPH, 1);
                    return;
                }
                _ => 0,
            };
            if len > 0 {
                self.unicode_data[0] = byte;
                self.unicode_index = 1;
                self.unicode_len = len;
                return;
            }
            if byte >= 0x80 {
                // Lone continuation byte.
                self.emit_glyph(REPLACEMENT_GLYPH, 1);
                return;
            }
            self.emit_codepoint(u32::from(byte));
        } else {
            let glyph = if self.mode.contains(TermMode::TOGGLE_META) {
                byte | 0x80
            } else {
                byte
            };
            self.emit_glyph(glyph, 1);
        }
    }

    /// Assemble the buffered multi-byte sequence into a codepoint.
    fn decode_sequence(&self) -> u32 {
        let lead_bits = 7 - self.unicode_len as u32;
        let mut cp = u32::from(self.unicode_data[0]) & ((1 << lead_bits) - 1);
        for &cont in &self.unicode_data[1..self.unicode_len] {
            cp = (cp << 6) | (u32::from(cont) & 0x3F);
        }
        cp
    }

    /// Translate a codepoint through the active codec and emit it.
    fn emit_codepoint(&mut self, cp: u32) {
        let codec = self.codecs[self.attr.font.to_bit() as usize];
        let glyph = if codec == Codec::Lat1 && cp <= 0x7F {
            cp as u8
        } else {
            match codec.glyph_for(cp) {
                Some(glyph) => glyph,
                None => {
                    trace!("unmapped codepoint U+{cp:04X}");
                    REPLACEMENT_GLYPH
                }
            }
        };
        let span = char::from_u32(cp)
            .and_then(UnicodeWidthChar::width)
            .unwrap_or(1)
            .clamp(1, 2);
        self.emit_glyph(glyph, span);
    }

    /// Write a glyph at the cursor, honoring deferred wrap, insert mode,
    /// and multi-column spans.
    pub(crate) fn emit_glyph(&mut self, glyph: u8, span: usize) {
        let width = self.width();
        if span > width {
            return;
        }

        if self.wrapped {
            // The previous glyph filled the last column; mark the run as
            // continued and move to the next line now.
            let row = self.buffer.screen_to_virtual(self.y);
            self.buffer.cell_at_mut(width - 1, row).cell_attr |= CellAttr::WRAPPED;
            self.set_cursor(0, self.y);
            self.put_lf();
        }

        // A wide glyph that would straddle the margin wraps early.
        if span == 2 && self.x + 2 > width {
            if self.mode.contains(TermMode::AUTOWRAP) {
                let row = self.buffer.screen_to_virtual(self.y);
                self.buffer.cell_at_mut(width - 1, row).cell_attr |= CellAttr::WRAPPED;
                self.set_cursor(0, self.y);
                self.put_lf();
            } else {
                return;
            }
        }

        if self.mode.contains(TermMode::INSERT) {
            self.shift_right(span);
        }

        let (x, y) = (self.x, self.y);
        for offset in 0..span {
            self.heal_wide_pair(x + offset, y);
        }

        let row = self.buffer.screen_to_virtual(y);
        let mut attr = self.attr;
        attr.flags |= AttrFlags::USED;
        {
            let cell = self.buffer.cell_at_mut(x, row);
            cell.glyph = glyph;
            cell.attr = attr;
            cell.cell_attr = if span == 2 { CellAttr::WIDE } else { CellAttr::empty() };
        }
        if span == 2 {
            let cell = self.buffer.cell_at_mut(x + 1, row);
            cell.glyph = b' ';
            cell.attr = attr;
            cell.cell_attr = CellAttr::SPANNED;
        }
        for offset in 0..span {
            self.update_xy(x + offset, y);
        }

        if x + span < width {
            self.set_cursor(x + span, y);
        } else if self.mode.contains(TermMode::AUTOWRAP) {
            self.wrapped = true;
        }
    }

    /// Shift the rest of the line right by `n`, clearing the gap.
    fn shift_right(&mut self, n: usize) {
        let width = self.width();
        let row = self.buffer.screen_to_virtual(self.y);
        for x in (self.x + n..width).rev() {
            *self.buffer.cell_at_mut(x, row) = *self.buffer.cell_at(x - n, row);
        }
        let blank = Cell::blank(self.attr);
        for x in self.x..(self.x + n).min(width) {
            *self.buffer.cell_at_mut(x, row) = blank;
        }
        self.render_row_span(self.y, self.x, width);
    }

    /// Repair a wide-glyph pair that is about to be half-overwritten.
    pub(crate) fn heal_wide_pair(&mut self, x: usize, y: usize) {
        let width = self.width();
        if x >= width {
            return;
        }
        let row = self.buffer.screen_to_virtual(y);
        let flags = self.buffer.cell_at(x, row).cell_attr;
        if flags.contains(CellAttr::SPANNED) && x > 0 {
            let owner = self.buffer.cell_at_mut(x - 1, row);
            owner.glyph = b' ';
            owner.cell_attr.remove(CellAttr::WIDE);
            self.update_xy(x - 1, y);
        }
        if flags.contains(CellAttr::WIDE) && x + 1 < width {
            let spacer = self.buffer.cell_at_mut(x + 1, row);
            if spacer.cell_attr.contains(CellAttr::SPANNED) {
                spacer.glyph = b' ';
                spacer.cell_attr.remove(CellAttr::SPANNED);
                self.update_xy(x + 1, y);
            }
        }
    }

    /// Move the cursor, clearing the deferred-wrap state.
    pub(crate) fn set_cursor(&mut self, x: usize, y: usize) {
        self.x = x.min(self.width() - 1);
        self.y = y.min(self.height() - 1);
        self.wrapped = false;
    }

    /// Line feed: down one row, scrolling when leaving the region.
    pub(crate) fn put_lf(&mut self) {
        if self.y + 1 > self.sr_bottom {
            self.y = self.sr_bottom.min(self.height() - 1);
            self.scroll_text_up(self.sr_top, self.sr_bottom, 1);
        } else {
            self.y += 1;
        }
        self.wrapped = false;
    }

    /// Reverse line feed at the top of the region.
    pub(crate) fn put_ri(&mut self) {
        // The column resets along with the row here.
        self.x = 0;
        self.wrapped = false;
        if self.y <= self.sr_top {
            self.scroll_text_down(self.sr_top, self.sr_bottom, 1);
        } else {
            self.y -= 1;
        }
    }

    /// Scroll rows `[top, bot]` up by `n`. Uses the ring when the region
    /// is the full screen, in-place moves otherwise.
    pub(crate) fn scroll_text_up(&mut self, top: usize, bot: usize, n: usize) {
        let (width, height) = (self.width(), self.height());
        let n = n.min(bot + 1 - top);
        if n == 0 {
            return;
        }
        let template = Cell::blank(self.attr_default);
        let full_screen = top == 0 && bot + 1 == height;
        if full_screen {
            self.buffer.ring_scroll_up(n, template);
        } else {
            self.buffer.scroll_cells(top, bot, -(n as isize), template);
        }
        if self.buffer.y_scroll() == 0 {
            let band_h = (bot + 1 - top - n) * FONT_HEIGHT;
            self.fb.bitblt(
                0,
                (top + n) * FONT_HEIGHT,
                0,
                top * FONT_HEIGHT,
                width * FONT_WIDTH,
                band_h,
            );
            self.listener.dpy_copy_rect(
                0,
                (top + n) * FONT_HEIGHT,
                0,
                top * FONT_HEIGHT,
                width * FONT_WIDTH,
                band_h,
            );
            for y in (bot + 1 - n)..=bot {
                self.render_row_span(y, 0, width);
            }
        }
    }

    /// Scroll rows `[top, bot]` down by `n`.
    pub(crate) fn scroll_text_down(&mut self, top: usize, bot: usize, n: usize) {
        let (width, height) = (self.width(), self.height());
        let n = n.min(bot + 1 - top);
        if n == 0 {
            return;
        }
        let template = Cell::blank(self.attr_default);
        let full_screen = top == 0 && bot + 1 == height;
        let mut rewound = 0;
        if full_screen {
            rewound = self.buffer.ring_scroll_down(n, template);
        }
        if rewound < n {
            // No more history to rewind into (or a sub-region scroll):
            // move rows in place.
            self.buffer
                .scroll_cells(top + rewound, bot, (n - rewound) as isize, template);
        }
        if self.buffer.y_scroll() == 0 {
            let band_h = (bot + 1 - top - n) * FONT_HEIGHT;
            self.fb.bitblt(
                0,
                top * FONT_HEIGHT,
                0,
                (top + n) * FONT_HEIGHT,
                width * FONT_WIDTH,
                band_h,
            );
            self.listener.dpy_copy_rect(
                0,
                top * FONT_HEIGHT,
                0,
                (top + n) * FONT_HEIGHT,
                width * FONT_WIDTH,
                band_h,
            );
            for y in top..top + n {
                self.render_row_span(y, 0, width);
            }
        }
    }

    /// Scroll the view into history (`delta > 0`) or back toward live
    /// output. Repaints on movement.
    pub fn scroll_view(&mut self, delta: isize) {
        if self.buffer.scroll_view(delta) {
            self.refresh();
        }
    }

    pub(crate) fn reset_params(&mut self) {
        self.esc_params = [0; MAX_ESC_PARAMS];
        self.nb_esc_params = 0;
        self.has_esc_param = false;
        self.has_qmark = false;
    }

    /// First escape parameter, defaulted to 1 for count-like commands.
    pub(crate) fn param_or_1(&self) -> usize {
        let p = self.esc_params.first().copied().unwrap_or(0);
        if p <= 0 { 1 } else { p as usize }
    }

    // Rendering --------------------------------------------------------

    /// True when the cursor should invert the cell at `(x, y)`.
    fn cursor_at(&self, x: usize, y: usize) -> bool {
        self.mode.contains(TermMode::CURSOR_VISIBLE)
            && self.buffer.y_scroll() == 0
            && x == self.x
            && y == self.y
    }

    /// Repaint one cell and report the damage.
    pub(crate) fn update_xy(&mut self, x: usize, y: usize) {
        if x >= self.width() || y >= self.height() {
            return;
        }
        let row = self.buffer.screen_to_virtual(y);
        let cell = *self.buffer.cell_at(x, row);
        let cursor = self.cursor_at(x, y);
        self.fb
            .put_glyph(x, y, cell.glyph, cell.attr, cell.cell_attr, cursor);
        self.listener
            .dpy_update(x * FONT_WIDTH, y * FONT_HEIGHT, FONT_WIDTH, FONT_HEIGHT);
    }

    /// Repaint a row span `[from_x, to_x)` with one damage report.
    pub(crate) fn render_row_span(&mut self, y: usize, from_x: usize, to_x: usize) {
        let to_x = to_x.min(self.width());
        if y >= self.height() || from_x >= to_x {
            return;
        }
        let row = self.buffer.screen_to_virtual(y);
        for x in from_x..to_x {
            let cell = *self.buffer.cell_at(x, row);
            let cursor = self.cursor_at(x, y);
            self.fb
                .put_glyph(x, y, cell.glyph, cell.attr, cell.cell_attr, cursor);
        }
        self.listener.dpy_update(
            from_x * FONT_WIDTH,
            y * FONT_HEIGHT,
            (to_x - from_x) * FONT_WIDTH,
            FONT_HEIGHT,
        );
    }

    /// Repaint the entire view.
    pub fn refresh(&mut self) {
        let (width, height) = (self.width(), self.height());
        self.fb.fill_rect(
            0,
            0,
            width * FONT_WIDTH,
            height * FONT_HEIGHT,
            self.fb.color(false, crate::color::BLACK),
        );
        for y in 0..height {
            let row = self.buffer.screen_to_virtual(y);
            for x in 0..width {
                let cell = *self.buffer.cell_at(x, row);
                let cursor = self.cursor_at(x, y);
                self.fb
                    .put_glyph(x, y, cell.glyph, cell.attr, cell.cell_attr, cursor);
            }
        }
        self.listener
            .dpy_update(0, 0, width * FONT_WIDTH, height * FONT_HEIGHT);
    }

    /// Draw or undraw the cursor cell.
    pub(crate) fn draw_cursor(&mut self, show: bool) {
        if self.x >= self.width() || self.y >= self.height() {
            return;
        }
        let (x, y) = (self.x, self.y);
        let row = self.buffer.screen_to_virtual(y);
        let cell = *self.buffer.cell_at(x, row);
        let cursor = show && self.cursor_at(x, y);
        self.fb
            .put_glyph(x, y, cell.glyph, cell.attr, cell.cell_attr, cursor);
        self.listener
            .dpy_update(x * FONT_WIDTH, y * FONT_HEIGHT, FONT_WIDTH, FONT_HEIGHT);
    }

    /// Clear a linear span in screen coordinates and repaint it.
    pub(crate) fn clear_region(&mut self, from_x: usize, from_y: usize, to_x: usize, to_y: usize) {
        let mut template = Cell::blank(self.attr_default);
        template.attr.fg = self.attr.fg;
        template.attr.bg = self.attr.bg;
        self.buffer.clear_span(from_x, from_y, to_x, to_y, template);
        let last = to_y.min(self.height().saturating_sub(1));
        for y in from_y..=last {
            let start = if y == from_y { from_x } else { 0 };
            let end = if y == to_y { to_x } else { self.width() };
            self.render_row_span(y, start, end);
        }
    }

    /// Full reset (`ESC c`): home the cursor, restore default attributes,
    /// and clear to the end of the display.
    pub(crate) fn full_reset(&mut self) {
        self.set_cursor(0, 0);
        self.nb_esc_params = 0;
        self.attr = self.attr_default;
        self.clear_region(0, 0, self.width(), self.height() - 1);
    }

    /// Resize to a new pixel geometry. Cell content is preserved by line;
    /// the scroll region resets to the full screen.
    pub fn resize(&mut self, width_px: usize, height_px: usize) {
        let width = (width_px / FONT_WIDTH).max(1);
        let height = (height_px / FONT_HEIGHT).max(1);
        self.buffer.resize(width, height);
        self.fb.resize(width * FONT_WIDTH, height * FONT_HEIGHT);
        self.sr_bottom = height - 1;
        if self.sr_top >= self.sr_bottom {
            self.sr_top = 0;
        }
        self.x = self.x.min(width - 1);
        self.y = self.y.min(height - 1);
        self.listener
            .dpy_resize(width * FONT_WIDTH, height * FONT_HEIGHT);
        self.refresh();
    }

    /// Reprogram a palette slot and repaint with the new colours.
    pub(crate) fn apply_palette_entry(&mut self, index: u8, rgb: crate::color::Rgb) {
        self.palette.set_entry(index, rgb);
        self.fb.set_color_table(&self.palette);
        self.refresh();
    }

    pub(crate) fn reset_palette(&mut self) {
        self.palette.reset();
        self.fb.set_color_table(&self.palette);
        self.refresh();
    }
}

#[cfg(test)]
mod tests;
