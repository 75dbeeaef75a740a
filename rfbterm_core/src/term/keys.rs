//! Keysym to host byte-sequence encoding.
//!
//! RFB key events arrive as X keysyms; this module turns them into the
//! byte sequences a Linux-console application expects, honouring the
//! cursor-key mode, the Insert-key toggle, and Ctrl/Alt modifiers.

use crate::event::DisplayListener;

use super::{TermMode, Terminal};

// X keysym values the encoder recognises.
pub const XK_BACKSPACE: u32 = 0xFF08;
pub const XK_TAB: u32 = 0xFF09;
pub const XK_RETURN: u32 = 0xFF0D;
pub const XK_ESCAPE: u32 = 0xFF1B;
pub const XK_HOME: u32 = 0xFF50;
pub const XK_LEFT: u32 = 0xFF51;
pub const XK_UP: u32 = 0xFF52;
pub const XK_RIGHT: u32 = 0xFF53;
pub const XK_DOWN: u32 = 0xFF54;
pub const XK_PAGE_UP: u32 = 0xFF55;
pub const XK_PAGE_DOWN: u32 = 0xFF56;
pub const XK_END: u32 = 0xFF57;
pub const XK_INSERT: u32 = 0xFF63;
pub const XK_KP_ENTER: u32 = 0xFF8D;
pub const XK_KP_HOME: u32 = 0xFF95;
pub const XK_KP_LEFT: u32 = 0xFF96;
pub const XK_KP_UP: u32 = 0xFF97;
pub const XK_KP_RIGHT: u32 = 0xFF98;
pub const XK_KP_DOWN: u32 = 0xFF99;
pub const XK_KP_PAGE_UP: u32 = 0xFF9A;
pub const XK_KP_PAGE_DOWN: u32 = 0xFF9B;
pub const XK_KP_END: u32 = 0xFF9C;
pub const XK_KP_INSERT: u32 = 0xFF9E;
pub const XK_KP_DELETE: u32 = 0xFF9F;
pub const XK_KP_MULTIPLY: u32 = 0xFFAA;
pub const XK_KP_ADD: u32 = 0xFFAB;
pub const XK_KP_SEPARATOR: u32 = 0xFFAC;
pub const XK_KP_SUBTRACT: u32 = 0xFFAD;
pub const XK_KP_DECIMAL: u32 = 0xFFAE;
pub const XK_KP_DIVIDE: u32 = 0xFFAF;
pub const XK_KP_0: u32 = 0xFFB0;
pub const XK_KP_9: u32 = 0xFFB9;
pub const XK_F1: u32 = 0xFFBE;
pub const XK_F5: u32 = 0xFFC2;
pub const XK_F6: u32 = 0xFFC3;
pub const XK_F14: u32 = 0xFFCB;
pub const XK_DELETE: u32 = 0xFFFF;

/// Lines jumped by Shift+PageUp / Shift+PageDown.
const VIEW_SCROLL_PAGE: isize = 10;

impl<L: DisplayListener> Terminal<L> {
    /// Handle a key press, writing the encoded bytes to the host.
    ///
    /// Scrollback paging keys are consumed here and never reach the host.
    pub fn key_event(&mut self, keysym: u32, ctrl: bool, shift: bool, alt: bool) {
        if shift && keysym == XK_PAGE_UP {
            self.scroll_view(VIEW_SCROLL_PAGE);
            return;
        }
        if shift && keysym == XK_PAGE_DOWN {
            self.scroll_view(-VIEW_SCROLL_PAGE);
            return;
        }
        if ctrl && keysym == XK_UP {
            self.scroll_view(1);
            return;
        }
        if ctrl && keysym == XK_DOWN {
            self.scroll_view(-1);
            return;
        }

        let mut bytes = match self.encode_keysym(keysym) {
            Some(bytes) => bytes,
            None => return,
        };

        if ctrl && bytes.len() == 1 && bytes[0] < 0x80 {
            bytes[0] &= 0x1F;
        }
        if alt {
            bytes.insert(0, 0x1B);
        }
        self.listener.host_write(&bytes);
    }

    /// The keysym → byte-sequence table.
    fn encode_keysym(&mut self, keysym: u32) -> Option<Vec<u8>> {
        let app_cursor = self.mode.contains(TermMode::CURSORKEY);
        let arrow = |letter: u8| {
            if app_cursor {
                vec![0x1B, b'O', letter]
            } else {
                vec![0x1B, b'[', letter]
            }
        };
        Some(match keysym {
            XK_UP | XK_KP_UP => arrow(b'A'),
            XK_DOWN | XK_KP_DOWN => arrow(b'B'),
            XK_RIGHT | XK_KP_RIGHT => arrow(b'C'),
            XK_LEFT | XK_KP_LEFT => arrow(b'D'),
            XK_F1..=XK_F5 => {
                let letter = b'A' + (keysym - XK_F1) as u8;
                vec![0x1B, b'[', b'[', letter]
            }
            XK_F6..=XK_F14 => {
                // F6..F10 → 17..21, F11..F14 → 23..26.
                let mut num = 17 + (keysym - XK_F6) as u8;
                if num >= 22 {
                    num += 1;
                }
                format!("\x1b[{num}~").into_bytes()
            }
            XK_INSERT | XK_KP_INSERT => {
                self.kbd_insert_toggle = !self.kbd_insert_toggle;
                if self.kbd_insert_toggle {
                    b"\x1b[4h".to_vec()
                } else {
                    b"\x1b[4l".to_vec()
                }
            }
            XK_DELETE | XK_KP_DELETE => b"\x1b[3~".to_vec(),
            XK_HOME | XK_KP_HOME => b"\x1b[1~".to_vec(),
            XK_END | XK_KP_END => b"\x1b[4~".to_vec(),
            XK_PAGE_UP | XK_KP_PAGE_UP => b"\x1b[5~".to_vec(),
            XK_PAGE_DOWN | XK_KP_PAGE_DOWN => b"\x1b[6~".to_vec(),
            XK_BACKSPACE => vec![0x7F],
            XK_TAB => vec![0x09],
            XK_RETURN | XK_KP_ENTER => vec![0x0D],
            XK_ESCAPE => vec![0x1B],
            XK_KP_0..=XK_KP_9 => vec![b'0' + (keysym - XK_KP_0) as u8],
            XK_KP_MULTIPLY => vec![b'*'],
            XK_KP_ADD => vec![b'+'],
            XK_KP_SEPARATOR => vec![b','],
            XK_KP_SUBTRACT => vec![b'-'],
            XK_KP_DECIMAL => vec![b'.'],
            XK_KP_DIVIDE => vec![b'/'],
            sym if sym < 0x100 => vec![sym as u8],
            _ => return None,
        })
    }
}
