use crate::cell::{AttrFlags, CellAttr};
use crate::color;
use crate::color::Depth;
use crate::event::DisplayListener;
use crate::term::{TermMode, Terminal};

/// Listener that records everything the terminal reports outward.
#[derive(Default)]
struct Recording {
    host: Vec<u8>,
    bells: usize,
    cuts: Vec<Vec<u8>>,
    resizes: Vec<(usize, usize)>,
}

impl DisplayListener for Recording {
    fn bell(&mut self) {
        self.bells += 1;
    }

    fn cut_text(&mut self, text: Vec<u8>) {
        self.cuts.push(text);
    }

    fn host_write(&mut self, bytes: &[u8]) {
        self.host.extend_from_slice(bytes);
    }

    fn dpy_resize(&mut self, width: usize, height: usize) {
        self.resizes.push((width, height));
    }
}

fn term(cols: usize, rows: usize) -> Terminal<Recording> {
    Terminal::new(cols * 8, rows * 16, Depth::D32, 128, Recording::default())
}

fn row_text(t: &Terminal<Recording>, y: usize) -> String {
    let row = t.buffer().screen_to_virtual(y);
    (0..t.width())
        .map(|x| t.buffer().cell_at(x, row).glyph as char)
        .collect()
}

fn glyph(t: &Terminal<Recording>, x: usize, y: usize) -> u8 {
    t.buffer().cell_at(x, t.buffer().screen_to_virtual(y)).glyph
}

#[test]
fn plain_text_advances_cursor() {
    let mut t = term(80, 25);
    t.process(b"Hello");
    assert_eq!(t.cursor(), (5, 0));
    assert!(row_text(&t, 0).starts_with("Hello     "));
}

#[test]
fn autowrap_defers_until_next_glyph() {
    let mut t = term(80, 25);
    t.process(&[b'A'; 81]);
    assert_eq!(row_text(&t, 0), "A".repeat(80));
    let last = t.buffer().cell_at(79, t.buffer().screen_to_virtual(0));
    assert!(last.cell_attr.contains(CellAttr::WRAPPED));
    assert_eq!(glyph(&t, 0, 1), b'A');
    assert_eq!(t.cursor(), (1, 1));
}

#[test]
fn wrap_does_not_happen_for_exactly_full_line() {
    let mut t = term(80, 25);
    t.process(&[b'B'; 80]);
    // Cursor parks on the last column until one more glyph arrives.
    assert_eq!(t.cursor(), (79, 0));
    assert_eq!(glyph(&t, 0, 1), b' ');
}

#[test]
fn scroll_region_and_linefeed() {
    let mut t = term(80, 25);
    t.process(b"\x1b[2;5r");
    // DECSTBM parks the cursor at the top of the region.
    assert_eq!(t.cursor(), (0, 1));
    t.process(b"\x1b[H");
    assert_eq!(t.cursor(), (0, 0));
    t.process(b"ABCDE\n");
    assert_eq!(glyph(&t, 0, 0), b'A');
    // LF keeps the column.
    assert_eq!(t.cursor(), (5, 1));
}

#[test]
fn linefeed_scrolls_only_inside_region() {
    let mut t = term(10, 6);
    t.process(b"\x1b[2;4r\x1b[4;1Hbottom");
    t.process(b"\n");
    // Row 1 (region top) scrolled away; cursor stays on the region
    // bottom; row 0 untouched.
    assert_eq!(t.cursor().1, 3);
    assert_eq!(t.buffer().y_base(), 0);
}

#[test]
fn full_screen_scroll_goes_through_the_ring() {
    let mut t = term(10, 4);
    t.process(b"one\r\ntwo\r\nthree\r\nfour\r\nfive");
    assert_eq!(t.buffer().y_base(), 1);
    assert_eq!(t.buffer().backscroll(), 1);
    assert!(row_text(&t, 0).starts_with("two"));
}

#[test]
fn utf8_lat1_fast_path() {
    let mut t = term(80, 25);
    t.process(&[0xC3, 0xA9]); // U+00E9 é
    assert_eq!(glyph(&t, 0, 0), 0xE9);
    assert_eq!(t.cursor(), (1, 0));
}

#[test]
fn utf8_invalid_continuation_emits_replacement() {
    let mut t = term(80, 25);
    t.process(&[0xC3, b'x']);
    assert_eq!(glyph(&t, 0, 0), b'?');
    // The interrupting byte itself is dropped with the partial state.
    assert_eq!(t.cursor(), (1, 0));
}

#[test]
fn utf8_wide_char_reserves_two_cells() {
    let mut t = term(80, 25);
    // U+597D 好 (wide) — unmapped in Lat1, so the replacement glyph
    // still spans two columns.
    t.process("好".as_bytes());
    let row = t.buffer().screen_to_virtual(0);
    assert_eq!(t.buffer().cell_at(0, row).glyph, b'?');
    assert!(t.buffer().cell_at(0, row).cell_attr.contains(CellAttr::WIDE));
    assert!(t.buffer().cell_at(1, row).cell_attr.contains(CellAttr::SPANNED));
    assert_eq!(t.cursor(), (2, 0));
}

#[test]
fn overwriting_half_a_wide_pair_heals_it() {
    let mut t = term(80, 25);
    t.process("好".as_bytes());
    t.process(b"\x1b[1;2HX");
    let row = t.buffer().screen_to_virtual(0);
    assert_eq!(t.buffer().cell_at(0, row).glyph, b' ');
    assert!(!t.buffer().cell_at(0, row).cell_attr.contains(CellAttr::WIDE));
    assert_eq!(t.buffer().cell_at(1, row).glyph, b'X');
}

#[test]
fn ibmpc_codec_translates_box_drawing() {
    let mut t = term(80, 25);
    t.process(b"\x1b(U");
    t.process("─".as_bytes()); // U+2500
    assert_eq!(glyph(&t, 0, 0), 0xC4);
}

#[test]
fn unmapped_codepoint_is_replacement() {
    let mut t = term(80, 25);
    t.process("€".as_bytes()); // U+20AC, not in Latin-1
    assert_eq!(glyph(&t, 0, 0), b'?');
}

#[test]
fn esc_percent_toggles_utf8() {
    let mut t = term(80, 25);
    t.process(b"\x1b%@");
    assert!(!t.mode().contains(TermMode::UTF8));
    t.process(&[0xC3, 0xA9]);
    // Both bytes land as raw glyphs now.
    assert_eq!(glyph(&t, 0, 0), 0xC3);
    assert_eq!(glyph(&t, 1, 0), 0xA9);
    t.process(b"\x1b%G");
    assert!(t.mode().contains(TermMode::UTF8));
}

#[test]
fn decset_2_inverts_utf8() {
    let mut t = term(80, 25);
    t.process(b"\x1b[?2h");
    assert!(!t.mode().contains(TermMode::UTF8));
    t.process(b"\x1b[?2l");
    assert!(t.mode().contains(TermMode::UTF8));
}

#[test]
fn so_si_switch_fonts_and_display_ctrl() {
    let mut t = term(80, 25);
    t.process(&[0x0E]);
    assert!(t.mode().contains(TermMode::DISPLAY_CTRL));
    t.process(b"q");
    let row = t.buffer().screen_to_virtual(0);
    let cell = t.buffer().cell_at(0, row);
    assert_eq!(cell.attr.font, crate::cell::FontSlot::G1);
    t.process(&[0x0F]);
    assert!(!t.mode().contains(TermMode::DISPLAY_CTRL));
}

#[test]
fn toggle_meta_sets_high_bit() {
    let mut t = term(80, 25);
    t.process(b"\x1b[12mA");
    assert_eq!(glyph(&t, 0, 0), b'A' | 0x80);
}

#[test]
fn sgr_colors_and_reset() {
    let mut t = term(80, 25);
    t.process(b"\x1b[1;31;44mX\x1b[mY");
    let row = t.buffer().screen_to_virtual(0);
    let x = t.buffer().cell_at(0, row);
    assert_eq!(x.attr.fg, color::RED);
    assert_eq!(x.attr.bg, color::BLUE);
    assert!(x.attr.flags.contains(AttrFlags::BOLD));
    let y = t.buffer().cell_at(1, row);
    assert_eq!(y.attr.fg, color::WHITE);
    assert!(!y.attr.flags.contains(AttrFlags::BOLD));
}

#[test]
fn sgr_38_39_drive_underline() {
    let mut t = term(80, 25);
    t.process(b"\x1b[38mA");
    let row = t.buffer().screen_to_virtual(0);
    assert!(t.buffer().cell_at(0, row).attr.flags.contains(AttrFlags::UNDERLINE));
    t.process(b"\x1b[39mB");
    assert!(!t.buffer().cell_at(1, row).attr.flags.contains(AttrFlags::UNDERLINE));
}

#[test]
fn ich_inserts_and_clears() {
    let mut t = term(10, 4);
    t.process(b"ABCDEF\x1b[1;3H\x1b[2@");
    assert!(row_text(&t, 0).starts_with("AB  CDEF"));
}

#[test]
fn dch_shifts_left_and_blanks_tail() {
    let mut t = term(10, 4);
    t.process(b"ABCDEF\x1b[1;2H\x1b[2P");
    // Shift left by two, rightmost two cells of the line blank.
    assert!(row_text(&t, 0).starts_with("ADEF      "));
    assert_eq!(glyph(&t, 9, 0), b' ');
}

#[test]
fn ech_erases_in_place() {
    let mut t = term(10, 4);
    t.process(b"ABCDEF\x1b[1;2H\x1b[3X");
    assert!(row_text(&t, 0).starts_with("A   EF"));
}

#[test]
fn ed_variants() {
    let mut t = term(4, 3);
    t.process(b"aaaabbbbcccc\x1b[2;3H");
    t.process(b"\x1b[J");
    assert_eq!(row_text(&t, 0), "aaaa");
    assert_eq!(row_text(&t, 1), "bb  ");
    assert_eq!(row_text(&t, 2), "    ");

    let mut t = term(4, 3);
    t.process(b"aaaabbbbcccc\x1b[2;3H\x1b[1J");
    assert_eq!(row_text(&t, 0), "    ");
    assert_eq!(row_text(&t, 1), "  bb");

    let mut t = term(4, 3);
    t.process(b"aaaabbbbcccc\x1b[2J");
    assert_eq!(t.cursor(), (0, 0));
    for y in 0..3 {
        assert_eq!(row_text(&t, y), "    ");
    }
}

#[test]
fn el_variants() {
    let mut t = term(6, 2);
    t.process(b"abcdef\x1b[1;3H\x1b[K");
    assert_eq!(row_text(&t, 0), "ab    ");

    let mut t = term(6, 2);
    t.process(b"abcdef\x1b[1;3H\x1b[1K");
    assert_eq!(row_text(&t, 0), "   def");

    let mut t = term(6, 2);
    t.process(b"abcdef\x1b[2K");
    assert_eq!(row_text(&t, 0), "      ");
}

#[test]
fn il_dl_within_region() {
    let mut t = term(4, 4);
    t.process(b"1111\r\n2222\r\n3333\r\n4444");
    t.process(b"\x1b[2;1H\x1b[L");
    assert_eq!(row_text(&t, 1), "    ");
    assert_eq!(row_text(&t, 2), "2222");
    t.process(b"\x1b[2;1H\x1b[M");
    assert_eq!(row_text(&t, 1), "2222");
}

#[test]
fn device_attributes_reply() {
    let mut t = term(10, 4);
    t.process(b"\x1b[c");
    assert_eq!(t.listener().host, b"\x1b[?6c");
}

#[test]
fn identify_reply_matches_da() {
    let mut t = term(10, 4);
    t.process(b"\x1bZ");
    assert_eq!(t.listener().host, b"\x1b[?6c");
}

#[test]
fn cursor_position_report() {
    let mut t = term(20, 5);
    t.process(b"\x1b[3;7H\x1b[6n");
    assert_eq!(t.listener().host, b"\x1b[3;7R");
}

#[test]
fn status_report() {
    let mut t = term(10, 4);
    t.process(b"\x1b[5n");
    assert_eq!(t.listener().host, b"\x1b[0n");
}

#[test]
fn request_terminal_parameters_reply() {
    let mut t = term(10, 4);
    t.process(b"\x1b[x");
    assert_eq!(t.listener().host, b"\x1b[2;1;1;120;120;1;0x");
}

#[test]
fn bell_is_forwarded() {
    let mut t = term(10, 4);
    t.process(b"\x07\x07");
    assert_eq!(t.listener().bells, 2);
}

#[test]
fn backspace_and_tab() {
    let mut t = term(80, 25);
    t.process(b"abc\x08");
    assert_eq!(t.cursor(), (2, 0));
    t.process(b"\t");
    assert_eq!(t.cursor(), (8, 0));
    t.process(b"\t");
    assert_eq!(t.cursor(), (16, 0));
}

#[test]
fn can_aborts_a_sequence() {
    let mut t = term(20, 4);
    t.process(b"\x1b[2\x18Xm");
    // The CSI was aborted, so the X prints and 'm' is literal text.
    assert_eq!(glyph(&t, 0, 0), b'X');
    assert_eq!(glyph(&t, 1, 0), b'm');
}

#[test]
fn excess_csi_params_are_dropped() {
    let mut t = term(20, 4);
    let mut seq = b"\x1b[".to_vec();
    for _ in 0..40 {
        seq.extend_from_slice(b"7;");
    }
    seq.push(b'm');
    t.process(&seq);
    // No panic, attributes from the surviving params applied.
    let row = t.buffer().screen_to_virtual(0);
    t.process(b"Z");
    assert!(t.buffer().cell_at(0, row).attr.flags.contains(AttrFlags::INVERSE));
}

#[test]
fn save_restore_cursor_with_attributes() {
    let mut t = term(20, 5);
    t.process(b"\x1b[31m\x1b[2;3H\x1b7\x1b[m\x1b[H\x1b8X");
    let row = t.buffer().screen_to_virtual(1);
    let cell = t.buffer().cell_at(2, row);
    assert_eq!(cell.glyph, b'X');
    assert_eq!(cell.attr.fg, color::RED);
}

#[test]
fn origin_mode_offsets_cup() {
    let mut t = term(20, 10);
    t.process(b"\x1b[3;6r\x1b[?6h\x1b[1;1HA");
    assert_eq!(glyph(&t, 0, 2), b'A');
}

#[test]
fn insert_mode_shifts_line() {
    let mut t = term(10, 4);
    t.process(b"abc\x1b[1;1H\x1b[4hX");
    assert!(row_text(&t, 0).starts_with("Xabc"));
    t.process(b"\x1b[4l");
    assert!(!t.mode().contains(TermMode::INSERT));
}

#[test]
fn reverse_index_scrolls_at_top() {
    let mut t = term(6, 3);
    t.process(b"top\r\nmid");
    t.process(b"\x1b[1;1H\x1bM");
    assert_eq!(row_text(&t, 0), "      ");
    assert_eq!(row_text(&t, 1), "top   ");
}

#[test]
fn full_reset_clears_and_homes() {
    let mut t = term(10, 4);
    t.process(b"\x1b[31mjunk\x1bc");
    assert_eq!(t.cursor(), (0, 0));
    assert_eq!(row_text(&t, 0), "          ");
    t.process(b"A");
    let row = t.buffer().screen_to_virtual(0);
    assert_eq!(t.buffer().cell_at(0, row).attr.fg, color::WHITE);
}

/// Normalised axis value that projects onto the given cell.
fn norm(cell: usize, extent: usize) -> i32 {
    ((cell * 0x7FFF) / extent + 1) as i32
}

#[test]
fn selection_commit_sends_cut_text() {
    let mut t = term(10, 4);
    t.process(b"hello");
    // Press at cell (0,0), drag to (5,0), release.
    t.mouse_event(norm(0, 10), norm(0, 4), 0, 1);
    t.mouse_event(norm(5, 10), norm(0, 4), 0, 1);
    t.mouse_event(norm(5, 10), norm(0, 4), 0, 0);
    assert_eq!(t.listener().cuts, vec![b"hello".to_vec()]);
    assert!(!t.selections()[1].is_zero());
}

#[test]
fn selection_joins_wrapped_lines_without_newline() {
    let mut t = term(4, 4);
    t.process(b"abcdef"); // wraps after 4 cells
    t.mouse_event(norm(0, 4), norm(0, 4), 0, 1);
    t.mouse_event(norm(2, 4), norm(1, 4), 0, 1);
    t.mouse_event(norm(2, 4), norm(1, 4), 0, 0);
    assert_eq!(t.listener().cuts, vec![b"abcdef".to_vec()]);
}

#[test]
fn selection_highlight_toggles_once_per_pass() {
    let mut t = term(10, 4);
    t.process(b"hello");
    t.mouse_event(norm(0, 10), norm(0, 4), 0, 1);
    t.mouse_event(norm(5, 10), norm(0, 4), 0, 1);
    let row = t.buffer().screen_to_virtual(0);
    for x in 0..5 {
        assert!(
            t.buffer().cell_at(x, row).cell_attr.contains(CellAttr::HIGHLIT),
            "cell {x} not highlit"
        );
    }
    t.mouse_event(norm(5, 10), norm(0, 4), 0, 0);
    // A new press cancels the previous highlight.
    t.mouse_event(norm(8, 10), norm(0, 4), 0, 1);
    for x in 0..5 {
        assert!(!t.buffer().cell_at(x, row).cell_attr.contains(CellAttr::HIGHLIT));
    }
}

#[test]
fn wheel_scrolls_view() {
    let mut t = term(10, 4);
    for _ in 0..8 {
        t.process(b"line\r\n");
    }
    assert!(t.buffer().backscroll() > 0);
    t.mouse_event(0, 0, -1, 0);
    assert_eq!(t.buffer().y_scroll(), 1);
    t.mouse_event(0, 0, 1, 0);
    assert_eq!(t.buffer().y_scroll(), 0);
}

#[test]
fn cursor_key_mode_changes_arrow_encoding() {
    let mut t = term(10, 4);
    t.key_event(super::keys::XK_UP, false, false, false);
    assert_eq!(t.listener().host, b"\x1b[A");
    t.listener_mut().host.clear();
    t.process(b"\x1b[?1h");
    t.key_event(super::keys::XK_UP, false, false, false);
    assert_eq!(t.listener().host, b"\x1bOA");
}

#[test]
fn function_key_encoding() {
    let mut t = term(10, 4);
    t.key_event(super::keys::XK_F1, false, false, false);
    t.key_event(super::keys::XK_F6, false, false, false);
    t.key_event(super::keys::XK_F14, false, false, false);
    assert_eq!(t.listener().host, b"\x1b[[A\x1b[17~\x1b[26~");
}

#[test]
fn insert_key_toggles_sequences() {
    let mut t = term(10, 4);
    t.key_event(super::keys::XK_INSERT, false, false, false);
    t.key_event(super::keys::XK_INSERT, false, false, false);
    assert_eq!(t.listener().host, b"\x1b[4h\x1b[4l");
}

#[test]
fn ctrl_and_alt_modify_ascii() {
    let mut t = term(10, 4);
    t.key_event(u32::from(b'c'), true, false, false);
    assert_eq!(t.listener().host, &[0x03]);
    t.listener_mut().host.clear();
    t.key_event(u32::from(b'x'), false, false, true);
    assert_eq!(t.listener().host, &[0x1B, b'x']);
}

#[test]
fn backspace_sends_del() {
    let mut t = term(10, 4);
    t.key_event(super::keys::XK_BACKSPACE, false, false, false);
    assert_eq!(t.listener().host, &[0x7F]);
}

#[test]
fn palette_sequence_reprograms_entry() {
    let mut t = term(10, 4);
    t.process(b"\x1b]P1ff8000");
    let rgb = {
        // Entry 1 (dark red slot) now carries the programmed colour.
        let table = t.framebuffer();
        table.color(false, 1)
    };
    assert_eq!(rgb, 0x00FF_8000);
    t.process(b"\x1b]R");
    assert_eq!(t.framebuffer().color(false, 1), 0x00AA_0000);
}

#[test]
fn resize_preserves_content_and_reports() {
    let mut t = term(10, 4);
    t.process(b"keep");
    t.resize(20 * 8, 6 * 16);
    assert_eq!(t.width(), 20);
    assert_eq!(t.height(), 6);
    assert!(row_text(&t, 0).starts_with("keep"));
    assert_eq!(t.listener().resizes.last(), Some(&(160, 96)));
}

#[test]
fn cursor_stays_in_bounds_under_stress() {
    let mut t = term(10, 4);
    t.process(b"\x1b[99;99H\x1b[99C\x1b[99B");
    let (x, y) = t.cursor();
    assert!(x < 10 && y < 4);
    t.process(b"\x1b[0;0H");
    assert_eq!(t.cursor(), (0, 0));
}
