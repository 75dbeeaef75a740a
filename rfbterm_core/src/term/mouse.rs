//! Pointer handling and text selection.
//!
//! Selection coordinates are **virtual** (ring rows), so a committed
//! selection stays anchored to its text while the view scrolls.

use crate::cell::{AttrFlags, CellAttr};
use crate::event::DisplayListener;

use super::Terminal;

/// One selection span: start and end cell in virtual coordinates.
/// The end is exclusive in the linear cell order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
}

impl Selection {
    pub fn is_zero(&self) -> bool {
        self.start_x == 0 && self.start_y == 0 && self.end_x == 0 && self.end_y == 0
    }
}

impl<L: DisplayListener> Terminal<L> {
    /// Handle a pointer event with axes normalised to `0..=0x7FFF`.
    ///
    /// `buttons` uses bit 0 for left, bit 1 for middle, bit 2 for right;
    /// `dz` is ±1 for wheel steps. Left-button press/drag/release drives
    /// the selection machinery; a wheel step scrolls the view.
    pub fn mouse_event(&mut self, dx: i32, dy: i32, dz: i32, buttons: u8) {
        let width = self.width() as i32;
        let height = self.height() as i32;
        let x = (dx * width / 0x7FFF).clamp(0, width - 1) as usize;
        let y = (dy * height / 0x7FFF).clamp(0, height - 1) as usize;

        if dz == -1 {
            self.scroll_view(1);
        } else if dz == 1 {
            self.scroll_view(-1);
        }

        self.mouse_x = x as i32;
        self.mouse_y = y as i32;

        if buttons == 0 {
            if self.selecting {
                let text = self.selection_text(self.selections[0]);
                if !text.is_empty() {
                    self.listener.cut_text(text);
                }
                self.selecting = false;
                self.selections[1] = self.selections[0];
            }
        } else if buttons == 1 {
            let vy = self.buffer.screen_to_virtual(y) as i32;
            if !self.selecting {
                // A stale committed highlight is taken down first.
                let committed = self.selections[1];
                if !committed.is_zero() {
                    self.toggle_highlight(committed);
                }
                self.selections[1] = Selection::default();
                self.selections[0] = Selection {
                    start_x: x as i32,
                    start_y: vy,
                    end_x: x as i32,
                    end_y: vy,
                };
                self.selecting = true;
            } else {
                // Toggle just the delta between the old and new end.
                let delta = Selection {
                    start_x: self.selections[0].end_x,
                    start_y: self.selections[0].end_y,
                    end_x: x as i32,
                    end_y: vy,
                };
                self.toggle_highlight(delta);
                self.selections[0].end_x = x as i32;
                self.selections[0].end_y = vy;
            }
        }
    }

    /// The committed selection spans.
    pub fn selections(&self) -> &[Selection; 2] {
        &self.selections
    }

    /// Normalize a span to screen coordinates with start ≤ end.
    fn span_on_screen(&self, sel: Selection) -> ((usize, usize), (usize, usize)) {
        let from = (
            sel.start_x.max(0) as usize,
            self.buffer.virtual_to_screen(sel.start_y.max(0) as usize),
        );
        let to = (
            sel.end_x.max(0) as usize,
            self.buffer.virtual_to_screen(sel.end_y.max(0) as usize),
        );
        let width = self.width();
        if to.1 * width + to.0 < from.1 * width + from.0 {
            (to, from)
        } else {
            (from, to)
        }
    }

    /// Toggle the highlight attribute over a span, repainting used cells.
    pub(crate) fn toggle_highlight(&mut self, sel: Selection) {
        let ((mut x, mut y), (to_x, to_y)) = self.span_on_screen(sel);
        let width = self.width();
        let end = to_y * width + to_x;
        while y * width + x < end && y < self.buffer.total_height() {
            let row = self.buffer.screen_to_virtual(y);
            let cell = self.buffer.cell_at_mut(x, row);
            if cell.attr.flags.contains(AttrFlags::USED) {
                cell.cell_attr.toggle(CellAttr::HIGHLIT);
                self.update_xy(x, y);
            }
            x += 1;
            if x >= width {
                x = 0;
                y += 1;
            }
        }
    }

    /// Extract the selected text as glyph bytes. Rows are joined with a
    /// newline unless the row ended in a wrapped run.
    pub(crate) fn selection_text(&self, sel: Selection) -> Vec<u8> {
        let ((mut x, mut y), (to_x, to_y)) = self.span_on_screen(sel);
        let width = self.width();
        let end = to_y * width + to_x;
        let mut text = Vec::new();
        while y * width + x < end && y < self.buffer.total_height() {
            let row = self.buffer.screen_to_virtual(y);
            let cell = self.buffer.cell_at(x, row);
            if cell.attr.flags.contains(AttrFlags::USED) {
                text.push(cell.glyph);
            }
            x += 1;
            if x >= width {
                let last = self.buffer.cell_at(width - 1, row);
                if !last.cell_attr.contains(CellAttr::WRAPPED) {
                    text.push(b'\n');
                }
                x = 0;
                y += 1;
            }
        }
        text
    }
}
