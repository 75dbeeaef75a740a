//! ESC-prefixed dispatch: plain ESC finals, charset designation,
//! UTF-8 selection, and the OSC palette sequences.

use log::trace;

use crate::cell::FontSlot;
use crate::codec::Codec;
use crate::color::Rgb;
use crate::event::DisplayListener;

use super::{ParserState, TermMode, Terminal};

impl<L: DisplayListener> Terminal<L> {
    pub(crate) fn esc_dispatch(&mut self, byte: u8) {
        self.state = ParserState::Norm;
        match byte {
            b'[' => {
                self.reset_params();
                self.state = ParserState::Csi;
            }
            b']' => self.state = ParserState::NonStd,
            b'%' => self.state = ParserState::Percent,
            b'(' => self.state = ParserState::SelectG0,
            b')' => self.state = ParserState::SelectG1,
            b'c' => self.full_reset(),
            b'D' => self.put_lf(),
            b'E' => {
                self.put_lf();
                self.set_cursor(0, self.y);
            }
            b'H' => {
                // HTS: tab stops are fixed at every 8 columns.
            }
            b'M' => self.put_ri(),
            b'Z' => self.listener.host_write(b"\x1b[?6c"),
            b'7' => {
                self.saved_x = self.x;
                self.saved_y = self.y;
                self.saved_attr = self.attr;
            }
            b'8' => {
                self.set_cursor(self.saved_x, self.saved_y);
                self.attr = self.saved_attr;
            }
            b'>' | b'=' => {
                // Keypad mode selection; the keypad always sends numeric
                // sequences here.
            }
            other => trace!("ignored ESC final 0x{other:02x}"),
        }
    }

    /// `ESC % x`: switch the input decoder.
    pub(crate) fn percent_dispatch(&mut self, byte: u8) {
        self.state = ParserState::Norm;
        match byte {
            b'@' => self.mode.remove(TermMode::UTF8),
            b'G' | b'8' => self.mode.insert(TermMode::UTF8),
            other => trace!("ignored ESC % selector 0x{other:02x}"),
        }
    }

    /// `ESC ( x` / `ESC ) x`: pick the codec for a font slot.
    pub(crate) fn designate(&mut self, slot: FontSlot, byte: u8) {
        self.state = ParserState::Norm;
        match Codec::from_designator(byte) {
            Some(codec) => self.codecs[slot.to_bit() as usize] = codec,
            None => trace!("ignored charset designator 0x{byte:02x}"),
        }
    }

    /// `ESC ] x`: palette programming is the only OSC we speak.
    pub(crate) fn nonstd_dispatch(&mut self, byte: u8) {
        match byte {
            b'P' => {
                self.osc_value = 0;
                self.osc_nibbles = 0;
                self.state = ParserState::Palette;
            }
            b'R' => {
                self.reset_palette();
                self.state = ParserState::Norm;
            }
            other => {
                trace!("ignored OSC introducer 0x{other:02x}");
                self.state = ParserState::Norm;
            }
        }
    }

    /// `ESC ] P nrrggbb`: seven hex nibbles, palette index then colour.
    pub(crate) fn palette_dispatch(&mut self, byte: u8) {
        let nibble = match byte {
            b'0'..=b'9' => u32::from(byte - b'0'),
            b'a'..=b'f' => u32::from(byte - b'a') + 10,
            b'A'..=b'F' => u32::from(byte - b'A') + 10,
            _ => {
                trace!("aborted palette sequence on 0x{byte:02x}");
                self.state = ParserState::Norm;
                return;
            }
        };
        self.osc_value = (self.osc_value << 4) | nibble;
        self.osc_nibbles += 1;
        if self.osc_nibbles == 7 {
            let index = (self.osc_value >> 24) as u8;
            let rgb = Rgb::new(
                (self.osc_value >> 16) as u8,
                (self.osc_value >> 8) as u8,
                self.osc_value as u8,
            );
            self.apply_palette_entry(index, rgb);
            self.state = ParserState::Norm;
        }
    }
}
