//! RFB 3.3 server core.
//!
//! Connection lifecycle per client: version handshake, optional VNC
//! authentication, ServerInit, then the message loop. Each client owns
//! its input/output buffers, dirty map, and pending-message state; the
//! server owns the shared refresh pacing and the input translation to
//! terminal events.
//!
//! Socket registration and the poll loop live in the event-loop module;
//! this module never blocks.

pub mod client;
pub mod des;
pub mod hextile;
pub mod pixfmt;

use std::io::{Read, Write};
use std::net::TcpStream;

use bytes::{BufMut, BytesMut};
use log::{debug, trace, warn};
use rfbterm_core::{Depth, Framebuffer};

use crate::dirty::Rect;
use crate::keymap::{Keymap, SC_LALT, SC_LCTRL, SC_LSHIFT, SC_NUMLOCK, SC_RALT, SC_RCTRL, SC_RSHIFT};
use client::{Client, ReadState};
use pixfmt::{PixelEncoder, PixelFormat};

/// Client slot count.
pub const MAX_CLIENTS: usize = 8;

/// The protocol version the server speaks.
pub const RFB_GREETING: &[u8; 12] = b"RFB 003.003\n";

pub const ENCODING_RAW: i32 = 0;
pub const ENCODING_COPY_RECT: i32 = 1;
pub const ENCODING_HEXTILE: i32 = 5;
pub const ENCODING_DESKTOP_RESIZE: i32 = -223;
pub const ENCODING_CURSOR: i32 = -239;
pub const ENCODING_XEN_CLIENT: i32 = -254;
pub const ENCODING_VNCVIEWER: i32 = -255;
pub const ENCODING_POINTER_TYPE_CHANGE: i32 = -257;

/// Refresh pacing, milliseconds.
pub const REFRESH_INTERVAL_BASE: u64 = 30;
pub const REFRESH_INTERVAL_INC: u64 = 50;
pub const REFRESH_INTERVAL_MAX: u64 = 2000;
/// Idle bound before the keep-alive null update.
pub const MAX_UPDATE_INTERVAL: u64 = 5000;

/// Upper bound on stored client cut text.
const MAX_CUT_TEXT: usize = 1 << 20;

/// Cursor shape pushed through the cursor pseudo-encoding: an 8×16
/// two-tone I-beam, one mask byte per row, MSB-left.
const CURSOR_MASK: [u8; 16] = [
    0xFF, 0x3C, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x3C,
    0xFF,
];

/// Input decoded from client messages, applied to the terminal by the
/// caller once the server borrow is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Key {
        keysym: u32,
        ctrl: bool,
        shift: bool,
        alt: bool,
    },
    Pointer {
        dx: i32,
        dy: i32,
        dz: i32,
        buttons: u8,
    },
    /// Middle-click paste of the stored client cut text.
    Paste(Vec<u8>),
    /// Raw scancode (message 254 or graphic-mode key).
    Scancode { down: bool, code: u32 },
}

/// The RFB server state: client slots, pacing, and input translation.
pub struct VncServer {
    title: String,
    password: Option<Vec<u8>>,
    depth: Depth,
    fb_width: usize,
    fb_height: usize,

    clients: Vec<Option<Client>>,

    visible: Rect,
    has_update: bool,
    timer_interval: u64,
    last_update_time: u64,
    timer_deadline: Option<u64>,

    keymap: Keymap,
    /// Keyboard modifier state indexed by scancode.
    modifiers: [bool; 256],
    /// Host keyboard mode: raw scancodes instead of byte sequences.
    graphic_mode: bool,

    server_cut_text: Vec<u8>,
    client_cut_text: Vec<u8>,
    challenge_seed: u64,
}

impl VncServer {
    pub fn new(
        title: String,
        password: Option<Vec<u8>>,
        depth: Depth,
        fb_width: usize,
        fb_height: usize,
    ) -> Self {
        let mut modifiers = [false; 256];
        // NumLock starts on, as consoles boot.
        modifiers[usize::from(SC_NUMLOCK)] = true;
        Self {
            title,
            password,
            depth,
            fb_width,
            fb_height,
            clients: (0..MAX_CLIENTS).map(|_| None).collect(),
            visible: Rect::new(0, 0, fb_width, fb_height),
            has_update: false,
            timer_interval: REFRESH_INTERVAL_BASE,
            last_update_time: 0,
            timer_deadline: None,
            keymap: Keymap,
            modifiers,
            graphic_mode: false,
            server_cut_text: Vec::new(),
            client_cut_text: Vec::new(),
            challenge_seed: 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Absolute deadline of the next refresh tick, if armed.
    pub fn timer_deadline(&self) -> Option<u64> {
        self.timer_deadline
    }

    /// Accept a connection into a free slot. Returns the slot, or `None`
    /// when all slots are taken (the socket is dropped).
    pub fn accept(&mut self, sock: TcpStream, now: u64) -> Option<usize> {
        let slot = self.clients.iter().position(Option::is_none)?;
        if sock.set_nonblocking(true).is_err() {
            return None;
        }
        let mut cl = Client::new(
            sock,
            PixelFormat::native(self.depth),
            self.fb_width,
            self.fb_height,
        );
        cl.output.put_slice(RFB_GREETING);
        debug!("client {slot}: greeting sent");
        self.clients[slot] = Some(cl);
        self.mark_all_clients(0, 0, self.fb_width, self.fb_height, now);
        Some(slot)
    }

    pub fn client(&self, slot: usize) -> Option<&Client> {
        self.clients.get(slot).and_then(Option::as_ref)
    }

    pub fn client_mut(&mut self, slot: usize) -> Option<&mut Client> {
        self.clients.get_mut(slot).and_then(Option::as_mut)
    }

    /// Drain readable bytes from a client socket and run the protocol
    /// handlers. Returned actions must be applied to the terminal.
    pub fn handle_readable(&mut self, slot: usize, now: u64) -> Vec<InputAction> {
        let mut actions = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let Some(cl) = self.client_mut(slot) else {
                return actions;
            };
            match cl.sock.read(&mut buf) {
                Ok(0) => {
                    debug!("client {slot}: closed by peer");
                    self.close_client(slot);
                    return actions;
                }
                Ok(n) => {
                    cl.input.put_slice(&buf[..n]);
                    if n < buf.len() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("client {slot}: read error: {e}");
                    self.close_client(slot);
                    return actions;
                }
            }
        }
        self.process_input(slot, now, &mut actions);
        actions
    }

    fn process_input(&mut self, slot: usize, now: u64, actions: &mut Vec<InputAction>) {
        loop {
            let Some(cl) = self.client_mut(slot) else {
                return;
            };
            if cl.defunct || cl.input.len() < cl.expect {
                return;
            }
            let progressed = match cl.read_state {
                ReadState::Version => self.handle_version(slot, now),
                ReadState::AuthResponse => self.handle_auth(slot),
                ReadState::ClientInit => self.handle_client_init(slot),
                ReadState::Message => self.handle_message(slot, now, actions),
            };
            if !progressed {
                return;
            }
        }
    }

    /// `RFB %03d.%03d\n` from the client; only 3.3 and 3.4 pass.
    fn handle_version(&mut self, slot: usize, now: u64) -> bool {
        let challenge = self.make_challenge(now);
        let has_password = self.password.is_some();
        let Some(cl) = self.client_mut(slot) else {
            return false;
        };
        let data = cl.input.split_to(12);
        let ok = data.starts_with(b"RFB ")
            && data[7] == b'.'
            && data[11] == b'\n'
            && data[4..7].iter().all(u8::is_ascii_digit)
            && data[8..11].iter().all(u8::is_ascii_digit);
        if !ok {
            warn!("client {slot}: malformed version string");
            self.close_client(slot);
            return false;
        }
        let major: u32 = data[4..7].iter().fold(0, |a, &b| a * 10 + u32::from(b - b'0'));
        let minor: u32 = data[8..11].iter().fold(0, |a, &b| a * 10 + u32::from(b - b'0'));
        if major != 3 || !(minor == 3 || minor == 4) {
            warn!("client {slot}: unsupported protocol version {major}.{minor}");
            self.close_client(slot);
            return false;
        }
        debug!("client {slot}: version {major}.{minor}");
        if has_password {
            cl.output.put_u32(2); // VNC authentication
            cl.challenge = challenge;
            cl.output.put_slice(&challenge);
            cl.read_when(ReadState::AuthResponse, 16);
        } else {
            cl.output.put_u32(1); // no authentication
            cl.read_when(ReadState::ClientInit, 1);
        }
        true
    }

    fn handle_auth(&mut self, slot: usize) -> bool {
        let password = self.password.clone().unwrap_or_default();
        let Some(cl) = self.client_mut(slot) else {
            return false;
        };
        let mut response = [0u8; 16];
        response.copy_from_slice(&cl.input.split_to(16));
        if des::verify_response(&password, &cl.challenge, &response) {
            debug!("client {slot}: authenticated");
            cl.output.put_u32(0);
            cl.read_when(ReadState::ClientInit, 1);
            true
        } else {
            warn!("client {slot}: authentication failure");
            let reason = b"Authentication failure";
            cl.output.put_u32(1);
            cl.output.put_u32(reason.len() as u32);
            cl.output.put_slice(reason);
            self.close_client(slot);
            false
        }
    }

    fn handle_client_init(&mut self, slot: usize) -> bool {
        let (width, height, depth) = (self.fb_width, self.fb_height, self.depth);
        let title = self.title.clone();
        let Some(cl) = self.client_mut(slot) else {
            return false;
        };
        let _shared = cl.input.split_to(1);
        cl.output.put_u16(width as u16);
        cl.output.put_u16(height as u16);
        PixelFormat::native(depth).encode(&mut cl.output);
        cl.output.put_u32(title.len() as u32);
        cl.output.put_slice(title.as_bytes());
        cl.format = PixelFormat::native(depth);
        cl.encoder = PixelEncoder::Copy;
        cl.active = true;
        cl.read_when(ReadState::Message, 1);
        debug!("client {slot}: initialised {width}x{height}");
        true
    }

    /// Dispatch one client message once it is fully buffered. Returns
    /// false when more bytes are needed (after raising `expect`).
    fn handle_message(&mut self, slot: usize, now: u64, actions: &mut Vec<InputAction>) -> bool {
        let data = {
            let Some(cl) = self.client_mut(slot) else {
                return false;
            };
            let avail = cl.input.len();
            let msg_type = cl.input[0];
            let head = match msg_type {
                0 => 20,
                2 => 4,
                3 => 10,
                4 => 8,
                5 => 6,
                6 => 8,
                254 => 8,
                other => {
                    warn!("client {slot}: unknown message type {other}");
                    0
                }
            };
            if head == 0 {
                self.close_client(slot);
                return false;
            }
            let Some(cl) = self.client_mut(slot) else {
                return false;
            };
            if avail < head {
                cl.expect = head;
                return false;
            }
            let total = match msg_type {
                2 => {
                    let n = usize::from(u16::from_be_bytes([cl.input[2], cl.input[3]]));
                    4 + n * 4
                }
                6 => {
                    let len = u32::from_be_bytes([
                        cl.input[4], cl.input[5], cl.input[6], cl.input[7],
                    ]) as usize;
                    if len > MAX_CUT_TEXT {
                        warn!("client {slot}: oversized cut text ({len} bytes)");
                        usize::MAX
                    } else {
                        8 + len
                    }
                }
                _ => head,
            };
            if total == usize::MAX {
                self.close_client(slot);
                return false;
            }
            let Some(cl) = self.client_mut(slot) else {
                return false;
            };
            if avail < total {
                cl.expect = total;
                return false;
            }
            let data = cl.input.split_to(total);
            cl.expect = 1;
            data
        };
        let msg_type = data[0];

        match msg_type {
            0 => self.set_pixel_format(slot, &data[4..20], now),
            2 => {
                let ids: Vec<i32> = data[4..]
                    .chunks_exact(4)
                    .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                self.set_encodings(slot, &ids);
            }
            3 => {
                let incremental = data[1] != 0;
                let x = usize::from(u16::from_be_bytes([data[2], data[3]]));
                let y = usize::from(u16::from_be_bytes([data[4], data[5]]));
                let w = usize::from(u16::from_be_bytes([data[6], data[7]]));
                let h = usize::from(u16::from_be_bytes([data[8], data[9]]));
                self.update_request(slot, incremental, x, y, w, h, now);
            }
            4 => {
                let down = data[1] != 0;
                let keysym = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
                self.reset_pacing(now);
                if let Some(action) = self.translate_key(down, keysym) {
                    actions.push(action);
                }
            }
            5 => {
                let mask = data[1];
                let x = i32::from(u16::from_be_bytes([data[2], data[3]]));
                let y = i32::from(u16::from_be_bytes([data[4], data[5]]));
                self.reset_pacing(now);
                if let Some(action) = self.translate_pointer(slot, mask, x, y) {
                    actions.push(action);
                }
            }
            6 => {
                self.client_cut_text = data[8..].to_vec();
                trace!("client {slot}: stored {} bytes of cut text", data.len() - 8);
            }
            254 => {
                let down = data[1] != 0;
                let code = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
                self.reset_pacing(now);
                actions.push(InputAction::Scancode { down, code });
            }
            _ => unreachable!(),
        }
        true
    }

    fn set_pixel_format(&mut self, slot: usize, block: &[u8], now: u64) {
        let Some(format) = PixelFormat::parse(block) else {
            warn!("client {slot}: unsupported pixel format");
            self.close_client(slot);
            return;
        };
        let depth = self.depth;
        let Some(cl) = self.client_mut(slot) else {
            return;
        };
        cl.format = format;
        cl.encoder = PixelEncoder::select(format, depth);
        let cursor = cl.has_cursor;
        cl.pending.cursor = cursor;
        debug!(
            "client {slot}: pixel format bpp {} ({})",
            format.bytes_per_pixel * 8,
            if matches!(cl.encoder, PixelEncoder::Copy) { "copy" } else { "generic" },
        );
        // A format change invalidates everything the client has seen.
        self.mark_all_clients(0, 0, self.fb_width, self.fb_height, now);
    }

    fn set_encodings(&mut self, slot: usize, ids: &[i32]) {
        let Some(cl) = self.client_mut(slot) else {
            return;
        };
        cl.has_hextile = false;
        cl.has_resize = false;
        cl.has_pointer_type_change = false;
        cl.has_cursor = false;
        cl.absolute = None;
        for &id in ids.iter().rev() {
            match id {
                ENCODING_RAW => cl.has_hextile = false,
                ENCODING_HEXTILE => cl.has_hextile = true,
                ENCODING_DESKTOP_RESIZE => cl.has_resize = true,
                ENCODING_CURSOR => cl.has_cursor = true,
                ENCODING_XEN_CLIENT => {}
                ENCODING_VNCVIEWER => cl.is_vncviewer = true,
                ENCODING_POINTER_TYPE_CHANGE => cl.has_pointer_type_change = true,
                other => trace!("client {slot}: ignored encoding {other}"),
            }
        }
        if cl.active && cl.has_cursor {
            cl.pending.cursor = true;
        }
        self.check_pointer_type_change(slot);
    }

    /// Tell the client the pointer is absolute, once.
    fn check_pointer_type_change(&mut self, slot: usize) {
        let (width, height) = (self.fb_width, self.fb_height);
        let Some(cl) = self.client_mut(slot) else {
            return;
        };
        if cl.has_pointer_type_change && cl.absolute != Some(true) {
            cl.output.put_u8(0);
            cl.output.put_u8(0);
            cl.output.put_u16(1);
            put_rect_header(
                &mut cl.output,
                Rect::new(1, 0, width, height),
                ENCODING_POINTER_TYPE_CHANGE,
            );
        }
        cl.absolute = Some(true);
    }

    fn update_request(
        &mut self,
        _slot: usize,
        incremental: bool,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
        now: u64,
    ) {
        if !incremental {
            self.mark_all_clients(x, y, w, h, now);
        }
        // The visible window snaps to the full framebuffer.
        self.visible = Rect::new(0, 0, self.fb_width, self.fb_height);
        self.arm_timer(now);
    }

    /// Key pacing: input snaps the refresh interval back to base.
    fn reset_pacing(&mut self, now: u64) {
        self.timer_interval = REFRESH_INTERVAL_BASE;
        self.arm_timer(now + self.timer_interval);
    }

    fn translate_key(&mut self, down: bool, keysym: u32) -> Option<InputAction> {
        let code = self.keymap.keysym_to_scancode(keysym);
        if self.keymap.is_modifier_scancode(code) {
            self.modifiers[usize::from(code)] = down;
            return None;
        }
        if code == SC_NUMLOCK && !down {
            self.modifiers[usize::from(SC_NUMLOCK)] ^= true;
        }
        if self.keymap.is_keypad_scancode(code) {
            // Keep the virtual NumLock aligned with what the client's
            // keypad keysym implies.
            let wants_numlock = matches!(keysym & 0xFFFF, 0xFFAE | 0xFFB0..=0xFFB9);
            self.modifiers[usize::from(SC_NUMLOCK)] = wants_numlock;
        }
        if self.graphic_mode {
            return Some(InputAction::Scancode {
                down,
                code: u32::from(code),
            });
        }
        if !down {
            return None;
        }
        Some(InputAction::Key {
            keysym,
            ctrl: self.modifiers[usize::from(SC_LCTRL)] || self.modifiers[usize::from(SC_RCTRL)],
            shift: self.modifiers[usize::from(SC_LSHIFT)]
                || self.modifiers[usize::from(SC_RSHIFT)],
            alt: self.modifiers[usize::from(SC_LALT)] || self.modifiers[usize::from(SC_RALT)],
        })
    }

    fn translate_pointer(&mut self, slot: usize, mask: u8, x: i32, y: i32) -> Option<InputAction> {
        let buttons = mask & 0x07;
        let dz = if mask & 0x08 != 0 {
            -1
        } else if mask & 0x10 != 0 {
            1
        } else {
            0
        };
        if buttons == 0x02 && dz == 0 {
            // Middle button pastes the stored client clipboard.
            return Some(InputAction::Paste(self.client_cut_text.clone()));
        }
        let (fbw, fbh) = (self.fb_width.max(1) as i32, self.fb_height.max(1) as i32);
        let cl = self.client_mut(slot)?;
        cl.last_x = x;
        cl.last_y = y;
        let dx = (x * 0x7FFF / fbw).clamp(0, 0x7FFF);
        let dy = (y * 0x7FFF / fbh).clamp(0, 0x7FFF);
        Some(InputAction::Pointer {
            dx,
            dy,
            dz,
            buttons,
        })
    }

    // Display capabilities ---------------------------------------------

    /// Mark a framebuffer rectangle dirty for every active client.
    pub fn dpy_update(&mut self, x: usize, y: usize, w: usize, h: usize, now: u64) {
        self.mark_all_clients(x, y, w, h, now);
    }

    fn mark_all_clients(&mut self, x: usize, y: usize, w: usize, h: usize, now: u64) {
        let mut any = false;
        for cl in self.clients.iter_mut().flatten() {
            if cl.active && !cl.defunct {
                cl.dirty.mark(x, y, w, h);
                any = true;
            }
        }
        if any && !self.has_update {
            self.has_update = true;
            self.arm_timer(now + self.timer_interval);
        }
    }

    /// The framebuffer geometry changed.
    pub fn dpy_resize(&mut self, width: usize, height: usize, now: u64) {
        if width == self.fb_width && height == self.fb_height {
            return;
        }
        debug!("display resize {}x{} -> {width}x{height}", self.fb_width, self.fb_height);
        self.fb_width = width;
        self.fb_height = height;
        self.visible = Rect::new(0, 0, width, height);
        for cl in self.clients.iter_mut().flatten() {
            cl.dirty.resize(width, height);
            if cl.active {
                cl.pending.resize = cl.has_resize;
                cl.dirty.mark(0, 0, width, height);
            }
        }
        self.has_update = true;
        self.arm_timer(now);
    }

    /// Replay a framebuffer move as a CopyRect message, immediately.
    pub fn dpy_copy_rect(
        &mut self,
        src_x: usize,
        src_y: usize,
        dst_x: usize,
        dst_y: usize,
        w: usize,
        h: usize,
    ) {
        for cl in self.clients.iter_mut().flatten() {
            if !cl.active || cl.defunct {
                continue;
            }
            cl.output.put_u8(0);
            cl.output.put_u8(0);
            cl.output.put_u16(1);
            put_rect_header(&mut cl.output, Rect::new(dst_x, dst_y, w, h), ENCODING_COPY_RECT);
            cl.output.put_u16(src_x as u16);
            cl.output.put_u16(src_y as u16);
        }
    }

    pub fn bell(&mut self, now: u64) {
        for cl in self.clients.iter_mut().flatten() {
            if cl.active && !cl.defunct {
                cl.pending.bell += 1;
            }
        }
        self.has_update = true;
        self.arm_timer(now);
    }

    /// The terminal committed a selection; queue it for all clients.
    pub fn set_server_cut_text(&mut self, text: Vec<u8>, now: u64) {
        if text.is_empty() {
            return;
        }
        self.server_cut_text = text;
        for cl in self.clients.iter_mut().flatten() {
            if cl.active && !cl.defunct {
                cl.pending.cut_text = true;
            }
        }
        self.has_update = true;
        self.arm_timer(now);
    }

    pub fn clients_connected(&self) -> usize {
        self.clients
            .iter()
            .flatten()
            .filter(|cl| cl.active && !cl.defunct)
            .count()
    }

    /// Close every client that identified itself as vncviewer.
    pub fn close_tagged_clients(&mut self) {
        let tagged: Vec<usize> = self
            .clients
            .iter()
            .enumerate()
            .filter_map(|(i, cl)| cl.as_ref().filter(|c| c.is_vncviewer).map(|_| i))
            .collect();
        for slot in tagged {
            self.close_client(slot);
        }
    }

    // Refresh ----------------------------------------------------------

    fn arm_timer(&mut self, deadline: u64) {
        self.timer_deadline = Some(match self.timer_deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
    }

    /// One refresh tick: drain dirty state into client output buffers,
    /// adapting the refresh interval to the observed activity.
    pub fn refresh_tick(&mut self, now: u64, fb: &Framebuffer) {
        self.timer_deadline = None;

        if !self.has_update
            || self.visible.y >= self.fb_height
            || self.visible.x >= self.fb_width
        {
            // No update: back off, keeping a keep-alive trickle so a
            // minimised viewer does not desynchronise.
            self.timer_interval = (self.timer_interval + REFRESH_INTERVAL_INC)
                .min(REFRESH_INTERVAL_MAX);
            if self.timer_interval == REFRESH_INTERVAL_MAX
                && now.saturating_sub(self.last_update_time) >= MAX_UPDATE_INTERVAL
            {
                trace!("sending null update");
                for cl in self.clients.iter_mut().flatten() {
                    if cl.active && !cl.defunct {
                        cl.dirty.push_rect(Rect::new(0, 0, 1, 1));
                    }
                }
                self.write_updates(fb);
                self.last_update_time = now;
                return;
            }
            self.arm_timer(now + self.timer_interval);
            return;
        }

        self.has_update = false;
        self.write_updates(fb);
        self.last_update_time = now;
        self.timer_interval = (self.timer_interval / 2).max(REFRESH_INTERVAL_BASE);
    }

    /// Build the pending messages and update rectangles for every client.
    fn write_updates(&mut self, fb: &Framebuffer) {
        let visible = self.visible;
        let depth = self.depth;
        let (fbw, fbh) = (self.fb_width, self.fb_height);
        let cut_text = self.server_cut_text.clone();
        for cl in self.clients.iter_mut().flatten() {
            if !cl.active || cl.defunct {
                continue;
            }
            if cl.pending.resize {
                cl.output.put_u8(0);
                cl.output.put_u8(0);
                cl.output.put_u16(1);
                put_rect_header(&mut cl.output, Rect::new(0, 0, fbw, fbh), ENCODING_DESKTOP_RESIZE);
                cl.pending.resize = false;
            }
            while cl.pending.bell > 0 {
                cl.output.put_u8(2);
                cl.pending.bell -= 1;
            }
            if cl.pending.cut_text {
                cl.output.put_u8(3);
                cl.output.put_bytes(0, 3);
                cl.output.put_u32(cut_text.len() as u32);
                cl.output.put_slice(&cut_text);
                cl.pending.cut_text = false;
            }
            if cl.pending.cursor {
                if cl.has_cursor {
                    push_cursor_update(cl);
                }
                cl.pending.cursor = false;
            }

            let rects = cl.dirty.drain(visible, fbw, fbh);
            if rects.is_empty() {
                continue;
            }
            cl.output.put_u8(0);
            cl.output.put_u8(0);
            cl.output.put_u16(rects.len() as u16);
            for rect in rects {
                let encoding = if cl.has_hextile {
                    ENCODING_HEXTILE
                } else {
                    ENCODING_RAW
                };
                put_rect_header(&mut cl.output, rect, encoding);
                if cl.has_hextile {
                    hextile::encode_rect(&mut cl.output, fb, rect, &cl.encoder);
                } else {
                    let bpp = depth.bytes_per_pixel();
                    for row in rect.y..rect.y + rect.h {
                        let start = row * fb.linesize() + rect.x * bpp;
                        cl.encoder.write_pixels(
                            &mut cl.output,
                            &fb.data()[start..start + rect.w * bpp],
                            depth,
                        );
                    }
                }
            }
        }
    }

    // Socket plumbing --------------------------------------------------

    /// Push buffered output to the socket. Returns true while bytes
    /// remain buffered (the caller keeps write interest).
    pub fn flush_client(&mut self, slot: usize) -> bool {
        let mut failed = false;
        let mut more = false;
        if let Some(cl) = self.client_mut(slot) {
            while !cl.output.is_empty() {
                match cl.sock.write(&cl.output) {
                    Ok(0) => {
                        failed = true;
                        break;
                    }
                    Ok(n) => {
                        let _ = cl.output.split_to(n);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        more = true;
                        break;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("client {slot}: write error: {e}");
                        failed = true;
                        break;
                    }
                }
            }
        }
        if failed {
            self.close_client(slot);
            return false;
        }
        more
    }

    /// Flush every client; returns the slots that still want writes.
    pub fn flush_all(&mut self) -> Vec<usize> {
        (0..MAX_CLIENTS)
            .filter(|&slot| self.client(slot).is_some() && self.flush_client(slot))
            .collect()
    }

    /// Mark a client for teardown and reset its per-client state.
    pub fn close_client(&mut self, slot: usize) {
        if let Some(cl) = self.client_mut(slot) {
            debug!("client {slot}: closing");
            cl.defunct = true;
            cl.active = false;
            cl.input.clear();
            cl.pending.reset();
            cl.dirty.clear();
        }
    }

    /// Remove defunct clients, handing their sockets back for poller
    /// deregistration.
    pub fn reap_defunct(&mut self) -> Vec<(usize, TcpStream)> {
        let mut reaped = Vec::new();
        for slot in 0..MAX_CLIENTS {
            let is_defunct = self
                .clients[slot]
                .as_ref()
                .is_some_and(|cl| cl.defunct);
            if is_defunct {
                // Best-effort flush of any goodbye message.
                let _ = self.flush_client(slot);
                if let Some(cl) = self.clients[slot].take() {
                    reaped.push((slot, cl.sock));
                }
            }
        }
        reaped
    }

    /// Weak per-session challenge bytes (the DES step is the actual
    /// gate; the original used `rand()` here too).
    fn make_challenge(&mut self, now: u64) -> [u8; 16] {
        self.challenge_seed = self
            .challenge_seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(now | 1);
        let a = self.challenge_seed;
        let b = a.rotate_left(31) ^ now.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&a.to_le_bytes());
        out[8..].copy_from_slice(&b.to_le_bytes());
        out
    }
}

/// `u16 x, u16 y, u16 w, u16 h, s32 encoding` — the rectangle header.
fn put_rect_header(out: &mut BytesMut, rect: Rect, encoding: i32) {
    out.put_u16(rect.x as u16);
    out.put_u16(rect.y as u16);
    out.put_u16(rect.w as u16);
    out.put_u16(rect.h as u16);
    out.put_i32(encoding);
}

/// The cursor pseudo-encoding: an 8×16 two-tone pixmap plus its mask,
/// hotspot at the glyph centre.
fn push_cursor_update(cl: &mut Client) {
    cl.output.put_u8(0);
    cl.output.put_u8(0);
    cl.output.put_u16(1);
    put_rect_header(
        &mut cl.output,
        Rect::new(4, CURSOR_MASK.len() / 2, 8, CURSOR_MASK.len()),
        ENCODING_CURSOR,
    );
    let format = cl.format;
    let grey = cursor_pixel(&format, 0xC0);
    for mask in CURSOR_MASK {
        for bit in 0..8 {
            if mask & (0x80 >> bit) != 0 {
                cl.output.put_slice(&grey[..usize::from(format.bytes_per_pixel)]);
            } else {
                cl.output.put_bytes(0, usize::from(format.bytes_per_pixel));
            }
        }
    }
    cl.output.put_slice(&CURSOR_MASK);
}

/// A grey-level pixel in the client's format and byte order.
fn cursor_pixel(format: &PixelFormat, level: u8) -> [u8; 4] {
    let scale = |max: u16| u32::from(level) * (u32::from(max) + 1) / 256;
    let value = (scale(format.red_max) << format.red_shift)
        | (scale(format.green_max) << format.green_shift)
        | (scale(format.blue_max) << format.blue_shift);
    match format.bytes_per_pixel {
        1 => [value as u8, 0, 0, 0],
        2 => {
            let b = if format.big_endian {
                (value as u16).to_be_bytes()
            } else {
                (value as u16).to_le_bytes()
            };
            [b[0], b[1], 0, 0]
        }
        _ => {
            if format.big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            }
        }
    }
}

#[cfg(test)]
mod tests;
