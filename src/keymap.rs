//! Keysym → PC scancode layout.
//!
//! The RFB input path only needs scancodes for three things: tracking
//! modifier state, keeping the virtual NumLock in sync with the client,
//! and the raw scancode path for graphic-mode hosts. This built-in en-US
//! table covers those; the byte sequences an application receives come
//! from the keysym encoder in the terminal core.

/// Set-1 scancodes of interest.
pub const SC_LSHIFT: u8 = 0x2A;
pub const SC_RSHIFT: u8 = 0x36;
pub const SC_LCTRL: u8 = 0x1D;
pub const SC_RCTRL: u8 = 0x9D;
pub const SC_LALT: u8 = 0x38;
pub const SC_RALT: u8 = 0xB8;
pub const SC_CAPSLOCK: u8 = 0x3A;
pub const SC_NUMLOCK: u8 = 0x45;

/// The NumLock keysym.
pub const XK_NUM_LOCK: u32 = 0xFF7F;

/// Built-in en-US keysym → scancode mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct Keymap;

impl Keymap {
    /// Translate a keysym to a scancode, 0 when unmapped.
    pub fn keysym_to_scancode(&self, keysym: u32) -> u8 {
        match keysym & 0xFFFF {
            0xFFE1 => SC_LSHIFT,
            0xFFE2 => SC_RSHIFT,
            0xFFE3 => SC_LCTRL,
            0xFFE4 => SC_RCTRL,
            0xFFE9 | 0xFFE7 => SC_LALT,
            0xFFEA | 0xFFE8 => SC_RALT,
            0xFFE5 => SC_CAPSLOCK,
            0xFF7F => SC_NUMLOCK,
            // Keypad block.
            0xFFB7 | 0xFF95 => 0x47, // KP_7 / KP_Home
            0xFFB8 | 0xFF97 => 0x48, // KP_8 / KP_Up
            0xFFB9 | 0xFF9A => 0x49, // KP_9 / KP_PageUp
            0xFFAD => 0x4A,          // KP_Subtract
            0xFFB4 | 0xFF96 => 0x4B, // KP_4 / KP_Left
            0xFFB5 | 0xFF9D => 0x4C, // KP_5 / KP_Begin
            0xFFB6 | 0xFF98 => 0x4D, // KP_6 / KP_Right
            0xFFAB => 0x4E,          // KP_Add
            0xFFB1 | 0xFF9C => 0x4F, // KP_1 / KP_End
            0xFFB2 | 0xFF99 => 0x50, // KP_2 / KP_Down
            0xFFB3 | 0xFF9B => 0x51, // KP_3 / KP_PageDown
            0xFFB0 | 0xFF9E => 0x52, // KP_0 / KP_Insert
            0xFFAE | 0xFF9F => 0x53, // KP_Decimal / KP_Delete
            0xFFAA => 0x37,          // KP_Multiply
            0xFFAF => 0xB5,          // KP_Divide
            0xFF8D => 0x9C,          // KP_Enter
            // Editing and cursor block.
            0xFF08 => 0x0E,
            0xFF09 => 0x0F,
            0xFF0D => 0x1C,
            0xFF1B => 0x01,
            0xFF50 => 0xC7,
            0xFF51 => 0xCB,
            0xFF52 => 0xC8,
            0xFF53 => 0xCD,
            0xFF54 => 0xD0,
            0xFF55 => 0xC9,
            0xFF56 => 0xD1,
            0xFF57 => 0xCF,
            0xFF63 => 0xD2,
            0xFFFF => 0xD3,
            // Printable ASCII rows.
            sym @ 0x20..=0x7E => ascii_scancode(sym as u8),
            _ => 0,
        }
    }

    /// Whether a keysym is the NumLock key.
    pub fn is_numlock_keysym(&self, keysym: u32) -> bool {
        keysym & 0xFFFF == XK_NUM_LOCK
    }

    /// Whether a keysym belongs to the numeric keypad.
    pub fn is_keypad_keysym(&self, keysym: u32) -> bool {
        matches!(keysym & 0xFFFF, 0xFF95..=0xFF9F | 0xFFAA..=0xFFB9)
    }

    /// Whether a scancode belongs to the numeric keypad block.
    pub fn is_keypad_scancode(&self, code: u8) -> bool {
        matches!(code, 0x47..=0x53)
    }

    /// Whether a scancode is a modifier key.
    pub fn is_modifier_scancode(&self, code: u8) -> bool {
        matches!(
            code,
            SC_LSHIFT | SC_RSHIFT | SC_LCTRL | SC_RCTRL | SC_LALT | SC_RALT
        )
    }
}

/// Scancodes for the printable ASCII range on an en-US layout.
fn ascii_scancode(ch: u8) -> u8 {
    match ch.to_ascii_lowercase() {
        b'1' | b'!' => 0x02,
        b'2' | b'@' => 0x03,
        b'3' | b'#' => 0x04,
        b'4' | b'$' => 0x05,
        b'5' | b'%' => 0x06,
        b'6' | b'^' => 0x07,
        b'7' | b'&' => 0x08,
        b'8' | b'*' => 0x09,
        b'9' | b'(' => 0x0A,
        b'0' | b')' => 0x0B,
        b'-' | b'_' => 0x0C,
        b'=' | b'+' => 0x0D,
        b'q' => 0x10,
        b'w' => 0x11,
        b'e' => 0x12,
        b'r' => 0x13,
        b't' => 0x14,
        b'y' => 0x15,
        b'u' => 0x16,
        b'i' => 0x17,
        b'o' => 0x18,
        b'p' => 0x19,
        b'[' | b'{' => 0x1A,
        b']' | b'}' => 0x1B,
        b'a' => 0x1E,
        b's' => 0x1F,
        b'd' => 0x20,
        b'f' => 0x21,
        b'g' => 0x22,
        b'h' => 0x23,
        b'j' => 0x24,
        b'k' => 0x25,
        b'l' => 0x26,
        b';' | b':' => 0x27,
        b'\'' | b'"' => 0x28,
        b'`' | b'~' => 0x29,
        b'\\' | b'|' => 0x2B,
        b'z' => 0x2C,
        b'x' => 0x2D,
        b'c' => 0x2E,
        b'v' => 0x2F,
        b'b' => 0x30,
        b'n' => 0x31,
        b'm' => 0x32,
        b',' | b'<' => 0x33,
        b'.' | b'>' => 0x34,
        b'/' | b'?' => 0x35,
        b' ' => 0x39,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::{Keymap, SC_LCTRL, SC_LSHIFT, SC_NUMLOCK};

    #[test]
    fn modifier_keysyms_map_to_modifier_scancodes() {
        let map = Keymap;
        assert_eq!(map.keysym_to_scancode(0xFFE1), SC_LSHIFT);
        assert_eq!(map.keysym_to_scancode(0xFFE3), SC_LCTRL);
        assert!(map.is_modifier_scancode(SC_LSHIFT));
        assert!(!map.is_modifier_scancode(SC_NUMLOCK));
    }

    #[test]
    fn keypad_classification() {
        let map = Keymap;
        assert!(map.is_keypad_keysym(0xFFB5));
        assert!(map.is_keypad_scancode(map.keysym_to_scancode(0xFFB5)));
        assert!(!map.is_keypad_keysym(u32::from(b'5')));
        assert!(map.is_numlock_keysym(0xFF7F));
    }

    #[test]
    fn ascii_letters_have_scancodes() {
        let map = Keymap;
        assert_eq!(map.keysym_to_scancode(u32::from(b'a')), 0x1E);
        assert_eq!(map.keysym_to_scancode(u32::from(b'A')), 0x1E);
        assert_eq!(map.keysym_to_scancode(u32::from(b' ')), 0x39);
    }
}
