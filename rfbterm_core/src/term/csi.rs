//! CSI sequence parameter collection and dispatch.

use log::trace;

use crate::cell::AttrFlags;
use crate::codec::Codec;
use crate::event::DisplayListener;

use super::{ParserState, TermMode, Terminal, MAX_ESC_PARAMS};

impl<L: DisplayListener> Terminal<L> {
    /// Accumulate one CSI byte; dispatch when the final byte arrives.
    pub(crate) fn csi_byte(&mut self, byte: u8) {
        match byte {
            b'0'..=b'9' => {
                if self.nb_esc_params < MAX_ESC_PARAMS {
                    let slot = &mut self.esc_params[self.nb_esc_params];
                    *slot = slot
                        .saturating_mul(10)
                        .saturating_add(i32::from(byte - b'0'));
                }
                self.has_esc_param = true;
            }
            b';' | b'?' => {
                self.end_param();
                if byte == b'?' {
                    self.has_qmark = true;
                }
            }
            _ => {
                self.end_param();
                self.state = ParserState::Norm;
                self.csi_dispatch(byte);
            }
        }
    }

    fn end_param(&mut self) {
        if self.has_esc_param && self.nb_esc_params < MAX_ESC_PARAMS {
            self.nb_esc_params += 1;
        }
        self.has_esc_param = false;
    }

    fn csi_dispatch(&mut self, final_byte: u8) {
        let width = self.width();
        let height = self.height();
        match final_byte {
            b'@' => {
                // ICH: insert blanks at the cursor.
                let n = self.param_or_1().min(width - self.x);
                self.insert_blanks(n);
            }
            b'A' => {
                let n = self.param_or_1();
                let y = self.y.saturating_sub(n).max(self.sr_top);
                self.set_cursor(self.x, y);
            }
            b'B' => {
                let n = self.param_or_1();
                let y = (self.y + n).min(self.sr_bottom);
                self.set_cursor(self.x, y);
            }
            b'C' => {
                let n = self.param_or_1();
                self.set_cursor(self.x + n, self.y);
            }
            b'D' => {
                let n = self.param_or_1();
                self.set_cursor(self.x.saturating_sub(n), self.y);
            }
            b'E' => {
                let n = self.param_or_1();
                let y = (self.y + n).min(self.sr_bottom);
                self.set_cursor(0, y);
            }
            b'F' => {
                let n = self.param_or_1();
                let y = self.y.saturating_sub(n).max(self.sr_top);
                self.set_cursor(0, y);
            }
            b'G' | b'`' => {
                let col = self.param_or_1() - 1;
                self.set_cursor(col, self.y);
            }
            b'H' | b'f' => {
                let row = (self.param_at(0) - 1).max(0) as usize;
                let col = (self.param_at(1) - 1).max(0) as usize;
                let row = if self.mode.contains(TermMode::ORIGIN) {
                    row + self.sr_top
                } else {
                    row
                };
                self.set_cursor(col, row);
            }
            b'J' => match self.param_at(0) {
                0 => self.clear_region(self.x, self.y, width, height - 1),
                1 => self.clear_region(0, 0, self.x, self.y),
                2 => {
                    self.set_cursor(0, 0);
                    self.clear_region(0, 0, width, height - 1);
                }
                other => trace!("ignored ED mode {other}"),
            },
            b'K' => match self.param_at(0) {
                0 => self.clear_region(self.x, self.y, width, self.y),
                1 => self.clear_region(0, self.y, (self.x + 1).min(width), self.y),
                2 => self.clear_region(0, self.y, width, self.y),
                other => trace!("ignored EL mode {other}"),
            },
            b'L' => {
                let n = self.param_or_1();
                if self.y <= self.sr_bottom {
                    self.scroll_text_down(self.y, self.sr_bottom, n);
                }
            }
            b'M' => {
                let n = self.param_or_1();
                if self.y <= self.sr_bottom {
                    self.scroll_text_up(self.y, self.sr_bottom, n);
                }
            }
            b'P' => {
                let n = self.param_or_1();
                self.delete_chars(n);
            }
            b'X' => {
                let n = self.param_or_1();
                self.clear_region(self.x, self.y, (self.x + n).min(width), self.y);
            }
            b'c' => {
                if !self.has_qmark && self.param_at(0) == 0 {
                    self.listener.host_write(b"\x1b[?6c");
                }
            }
            b'd' => {
                let row = self.param_or_1() - 1;
                self.set_cursor(self.x, row);
            }
            b'h' => self.set_modes(true),
            b'l' => self.set_modes(false),
            b'm' => self.handle_sgr(),
            b'n' => match self.param_at(0) {
                5 => self.listener.host_write(b"\x1b[0n"),
                6 => {
                    let reply = format!("\x1b[{};{}R", self.y + 1, self.x + 1);
                    self.listener.host_write(reply.as_bytes());
                }
                other => trace!("ignored DSR {other}"),
            },
            b'r' => {
                if self.nb_esc_params == 0 {
                    self.sr_top = 0;
                    self.sr_bottom = height - 1;
                } else if self.nb_esc_params == 2 {
                    // Lower bound first, then the upper.
                    let top = ((self.param_at(0) - 1).max(0) as usize).min(height - 1);
                    let bot = ((self.param_at(1) - 1).max(0) as usize).min(height - 1);
                    if top <= bot {
                        self.sr_top = top;
                        self.sr_bottom = bot;
                    } else {
                        trace!("ignored inverted scroll region {top}..{bot}");
                    }
                }
                self.set_cursor(0, self.sr_top);
            }
            b's' => {
                self.saved_x = self.x;
                self.saved_y = self.y;
            }
            b'u' => self.set_cursor(self.saved_x, self.saved_y),
            b'x' => self.listener.host_write(b"\x1b[2;1;1;120;120;1;0x"),
            other => {
                trace!(
                    "unhandled CSI final 0x{other:02x} params {:?}",
                    &self.esc_params[..self.nb_esc_params]
                );
            }
        }
    }

    /// Parameter `idx`, defaulted to 0; negative values clip to 0.
    fn param_at(&self, idx: usize) -> i32 {
        if idx < self.nb_esc_params {
            self.esc_params[idx].max(0)
        } else {
            0
        }
    }

    /// ICH: open a gap of `n` blanks at the cursor.
    fn insert_blanks(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let width = self.width();
        let row = self.buffer.screen_to_virtual(self.y);
        for x in (self.x + n..width).rev() {
            *self.buffer.cell_at_mut(x, row) = *self.buffer.cell_at(x - n, row);
        }
        let template = crate::cell::Cell::blank(self.attr);
        for x in self.x..(self.x + n).min(width) {
            *self.buffer.cell_at_mut(x, row) = template;
        }
        self.heal_wide_pair(self.x, self.y);
        self.render_row_span(self.y, self.x, width);
    }

    /// DCH: shift the rest of the line left by `n`, blanking the
    /// rightmost `n` cells.
    fn delete_chars(&mut self, n: usize) {
        let width = self.width();
        let n = n.min(width - self.x);
        if n == 0 {
            return;
        }
        // Keep wide pairs whole on both sides of the gap.
        self.heal_wide_pair(self.x, self.y);
        self.heal_wide_pair((self.x + n).min(width - 1), self.y);
        let row = self.buffer.screen_to_virtual(self.y);
        for x in self.x..width - n {
            *self.buffer.cell_at_mut(x, row) = *self.buffer.cell_at(x + n, row);
        }
        let template = crate::cell::Cell::blank(self.attr);
        for x in width - n..width {
            *self.buffer.cell_at_mut(x, row) = template;
        }
        self.render_row_span(self.y, self.x, width);
    }

    /// SM/RM and DECSET/DECRST.
    fn set_modes(&mut self, set: bool) {
        if self.has_qmark {
            for i in 0..self.nb_esc_params {
                match self.esc_params[i] {
                    1 => self.mode.set(TermMode::CURSORKEY, set),
                    // DEC mode 2 selects the 8-bit codepage; setting it
                    // turns UTF-8 decoding *off*.
                    2 => self.mode.set(TermMode::UTF8, !set),
                    6 => self.mode.set(TermMode::ORIGIN, set),
                    7 => self.mode.set(TermMode::AUTOWRAP, set),
                    25 => {
                        self.mode.set(TermMode::CURSOR_VISIBLE, set);
                        self.draw_cursor(set);
                    }
                    other => trace!("ignored private mode {other}"),
                }
            }
        } else if self.nb_esc_params >= 1 {
            match self.esc_params[0] {
                3 => self.mode.set(TermMode::DISPLAY_CTRL, set),
                4 => self.mode.set(TermMode::INSERT, set),
                other => trace!("ignored mode {other}"),
            }
        }
    }

    /// SGR attribute updates.
    fn handle_sgr(&mut self) {
        if self.nb_esc_params == 0 {
            self.attr = self.attr_default;
            return;
        }
        for i in 0..self.nb_esc_params {
            let font = self.attr.font.to_bit() as usize;
            match self.esc_params[i] {
                0 => self.attr = self.attr_default,
                1 => self.attr.flags.insert(AttrFlags::BOLD),
                4 => self.attr.flags.insert(AttrFlags::UNDERLINE),
                5 => self.attr.flags.insert(AttrFlags::BLINK),
                7 => self.attr.flags.insert(AttrFlags::INVERSE),
                8 => self.attr.flags.insert(AttrFlags::HIDDEN),
                10 => {
                    self.codecs[font] = Codec::Lat1;
                    self.mode.remove(TermMode::DISPLAY_CTRL);
                    self.mode.remove(TermMode::TOGGLE_META);
                }
                11 => {
                    self.codecs[font] = Codec::IbmPc;
                    self.mode.insert(TermMode::DISPLAY_CTRL);
                    self.mode.remove(TermMode::TOGGLE_META);
                }
                12 => {
                    self.codecs[font] = Codec::IbmPc;
                    self.mode.insert(TermMode::DISPLAY_CTRL);
                    self.mode.insert(TermMode::TOGGLE_META);
                }
                22 => self.attr.flags.remove(AttrFlags::BOLD),
                24 => self.attr.flags.remove(AttrFlags::UNDERLINE),
                25 => self.attr.flags.remove(AttrFlags::BLINK),
                27 => self.attr.flags.remove(AttrFlags::INVERSE),
                28 => self.attr.flags.remove(AttrFlags::HIDDEN),
                p @ 30..=37 => self.attr.fg = (p - 30) as u8,
                38 => {
                    self.attr.fg = self.attr_default.fg;
                    self.attr.flags.insert(AttrFlags::UNDERLINE);
                }
                39 => {
                    self.attr.fg = self.attr_default.fg;
                    self.attr.flags.remove(AttrFlags::UNDERLINE);
                }
                p @ 40..=47 => self.attr.bg = (p - 40) as u8,
                49 => self.attr.bg = self.attr_default.bg,
                other => trace!("ignored SGR {other}"),
            }
        }
    }
}
