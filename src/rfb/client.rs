//! Per-client RFB connection state.

use std::net::TcpStream;

use bytes::BytesMut;

use super::pixfmt::{PixelEncoder, PixelFormat};
use crate::dirty::DirtyMap;

/// What the connection is waiting for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// The 12-byte client version string.
    Version,
    /// The 16-byte DES auth response.
    AuthResponse,
    /// The 1-byte ClientInit.
    ClientInit,
    /// A client message (type byte first, length grows per type).
    Message,
}

/// Messages queued for the next refresh tick.
#[derive(Debug, Default, Clone)]
pub struct Pending {
    pub resize: bool,
    pub bell: u32,
    pub cut_text: bool,
    pub cursor: bool,
}

impl Pending {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One connected RFB client.
pub struct Client {
    pub sock: TcpStream,
    /// Unconsumed inbound bytes.
    pub input: BytesMut,
    /// Outbound bytes awaiting a writable socket.
    pub output: BytesMut,
    pub read_state: ReadState,
    /// Bytes the current read handler needs before it can run.
    pub expect: usize,

    /// Set once ServerInit has been sent; only active clients receive
    /// updates.
    pub active: bool,
    /// Marked for teardown; the event loop reaps it.
    pub defunct: bool,

    pub format: PixelFormat,
    pub encoder: PixelEncoder,

    pub has_hextile: bool,
    pub has_resize: bool,
    pub has_pointer_type_change: bool,
    pub has_cursor: bool,
    pub is_vncviewer: bool,

    /// Pointer mode the client was last told about (None = never told).
    pub absolute: Option<bool>,
    pub last_x: i32,
    pub last_y: i32,

    pub dirty: DirtyMap,
    pub pending: Pending,
    pub challenge: [u8; 16],
}

impl Client {
    pub fn new(sock: TcpStream, format: PixelFormat, fb_width: usize, fb_height: usize) -> Self {
        Self {
            sock,
            input: BytesMut::with_capacity(4096),
            output: BytesMut::with_capacity(4096),
            read_state: ReadState::Version,
            expect: 12,
            active: false,
            defunct: false,
            format,
            encoder: PixelEncoder::Copy,
            has_hextile: false,
            has_resize: false,
            has_pointer_type_change: false,
            has_cursor: false,
            is_vncviewer: false,
            absolute: None,
            last_x: -1,
            last_y: -1,
            dirty: DirtyMap::new(fb_width, fb_height),
            pending: Pending::default(),
            challenge: [0; 16],
        }
    }

    /// Switch the read handler.
    pub fn read_when(&mut self, state: ReadState, expect: usize) {
        self.read_state = state;
        self.expect = expect;
    }
}
