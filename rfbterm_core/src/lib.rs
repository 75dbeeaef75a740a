//! Core terminal emulation for the RFB text-terminal server.
//!
//! This crate provides the in-process terminal: the ring cell buffer with
//! scrollback, the bitmap-font framebuffer renderer, the VT-family escape
//! state machine, selection, keysym encoding, and durable state snapshots.
//! It contains no sockets, no PTY handling, and no event loop — those live
//! in the server crate, which drives this one through the
//! [`event::DisplayListener`] capability trait.

#![deny(unsafe_code)]

pub mod buffer;
pub mod cell;
pub mod codec;
pub mod color;
pub mod event;
pub mod font;
pub mod framebuffer;
pub mod snapshot;
pub mod term;

pub use buffer::CellBuffer;
pub use cell::{AttrFlags, Cell, CellAttr, TextAttr};
pub use codec::Codec;
pub use color::{Depth, Palette, Rgb};
pub use event::{DisplayListener, VoidListener};
pub use font::{FONT_HEIGHT, FONT_WIDTH};
pub use framebuffer::Framebuffer;
pub use snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use term::{FontSlot, ParserState, Selection, TermMode, Terminal};
