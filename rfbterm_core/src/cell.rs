//! Terminal cell types.
//!
//! A [`Cell`] is one character position in the grid: a glyph byte in the
//! active font's 8-bit codepage plus packed text and cell attributes.
//! Cells are 5 bytes and `Copy`; the whole grid is a flat array of them.

use bitflags::bitflags;

use crate::color;

bitflags! {
    /// SGR-style text attribute flags, plus the internal `USED` marker.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AttrFlags: u8 {
        const BOLD      = 1 << 0;
        const UNDERLINE = 1 << 1;
        const BLINK     = 1 << 2;
        const INVERSE   = 1 << 3;
        const HIDDEN    = 1 << 4;
        /// Set when a glyph has actually been written to the cell.
        /// Selection extraction skips never-used cells.
        const USED      = 1 << 5;
    }
}

/// Which font slot (and therefore which codec) a cell was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontSlot {
    #[default]
    G0,
    G1,
}

impl FontSlot {
    /// Snapshot/bit encoding: G0 = 0, G1 = 1.
    pub fn to_bit(self) -> u16 {
        match self {
            Self::G0 => 0,
            Self::G1 => 1,
        }
    }

    pub fn from_bit(bit: u16) -> Self {
        if bit & 1 == 0 { Self::G0 } else { Self::G1 }
    }
}

/// Text attributes: 4-bit foreground and background colour indices,
/// attribute flags, and the font slot the glyph belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextAttr {
    /// Foreground colour index (0..8).
    pub fg: u8,
    /// Background colour index (0..8).
    pub bg: u8,
    pub flags: AttrFlags,
    pub font: FontSlot,
}

impl Default for TextAttr {
    fn default() -> Self {
        Self {
            fg: color::WHITE,
            bg: color::BLACK,
            flags: AttrFlags::empty(),
            font: FontSlot::G0,
        }
    }
}

impl TextAttr {
    /// Pack into the 16-bit snapshot representation.
    ///
    /// Layout: bits 0-3 fg, 4-7 bg, 8-13 flags, 14 font slot.
    pub fn pack(self) -> u16 {
        u16::from(self.fg & 0x0F)
            | (u16::from(self.bg & 0x0F) << 4)
            | (u16::from(self.flags.bits()) << 8)
            | (self.font.to_bit() << 14)
    }

    /// Unpack from the 16-bit snapshot representation. Unknown flag bits
    /// are dropped; colour indices are clipped to the 3-bit palette range.
    pub fn unpack(raw: u16) -> Self {
        Self {
            fg: ((raw & 0x0F) as u8).min(7),
            bg: (((raw >> 4) & 0x0F) as u8).min(7),
            flags: AttrFlags::from_bits_truncate((raw >> 8) as u8),
            font: FontSlot::from_bit(raw >> 14),
        }
    }
}

bitflags! {
    /// Per-cell attributes that are not text styling.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellAttr: u16 {
        /// Cell is inside the committed or in-progress selection.
        const HIGHLIT = 1 << 0;
        /// The logical line continues on the next row (deferred wrap
        /// happened here). Selection joins such rows without a newline.
        const WRAPPED = 1 << 1;
        /// First cell of a two-column glyph.
        const WIDE    = 1 << 2;
        /// Continuation cell of a two-column glyph; holds no glyph byte.
        const SPANNED = 1 << 3;
    }
}

impl CellAttr {
    /// Column span of the glyph starting at this cell: 2 for wide, else 1.
    pub fn span(self) -> usize {
        if self.contains(Self::WIDE) { 2 } else { 1 }
    }
}

/// One character position in the terminal grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// Glyph byte in the font codepage (post codec translation).
    pub glyph: u8,
    pub attr: TextAttr,
    pub cell_attr: CellAttr,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            glyph: b' ',
            attr: TextAttr::default(),
            cell_attr: CellAttr::empty(),
        }
    }
}

impl Cell {
    /// A blank cell carrying the given attributes' colours.
    ///
    /// Erase operations preserve the current fg/bg but none of the other
    /// attributes, matching how the emulator clears regions.
    pub fn blank(attr: TextAttr) -> Self {
        Self {
            glyph: b' ',
            attr: TextAttr {
                fg: attr.fg,
                bg: attr.bg,
                ..TextAttr::default()
            },
            cell_attr: CellAttr::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AttrFlags, Cell, CellAttr, FontSlot, TextAttr};
    use crate::color;

    #[test]
    fn default_cell_is_blank_white_on_black() {
        let cell = Cell::default();
        assert_eq!(cell.glyph, b' ');
        assert_eq!(cell.attr.fg, color::WHITE);
        assert_eq!(cell.attr.bg, color::BLACK);
        assert!(cell.attr.flags.is_empty());
        assert!(cell.cell_attr.is_empty());
    }

    #[test]
    fn text_attr_pack_roundtrip() {
        let attr = TextAttr {
            fg: color::CYAN,
            bg: color::RED,
            flags: AttrFlags::BOLD | AttrFlags::UNDERLINE | AttrFlags::USED,
            font: FontSlot::G1,
        };
        assert_eq!(TextAttr::unpack(attr.pack()), attr);
    }

    #[test]
    fn unpack_clips_out_of_range_colors() {
        // fg nibble 0xF is outside the 8-colour palette.
        let attr = TextAttr::unpack(0x000F);
        assert_eq!(attr.fg, 7);
    }

    #[test]
    fn span_follows_wide_flag() {
        assert_eq!(CellAttr::empty().span(), 1);
        assert_eq!(CellAttr::WIDE.span(), 2);
        assert_eq!(CellAttr::SPANNED.span(), 1);
    }

    #[test]
    fn blank_keeps_colors_but_not_flags() {
        let attr = TextAttr {
            fg: color::GREEN,
            bg: color::BLUE,
            flags: AttrFlags::BOLD | AttrFlags::USED,
            font: FontSlot::G1,
        };
        let blank = Cell::blank(attr);
        assert_eq!(blank.attr.fg, color::GREEN);
        assert_eq!(blank.attr.bg, color::BLUE);
        assert!(blank.attr.flags.is_empty());
        assert_eq!(blank.attr.font, FontSlot::G0);
    }
}
