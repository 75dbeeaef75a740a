//! RFB/VNC text-terminal server.
//!
//! Serves an interactive terminal session over the RFB 3.3 protocol:
//! the terminal emulation and framebuffer rendering live in
//! `rfbterm_core`; this crate adds the RFB server, per-client dirty
//! tracking, the PTY plumbing, and the single-threaded event loop.

pub mod app;
pub mod config;
pub mod dirty;
pub mod keymap;
pub mod logger;
pub mod pty;
pub mod rfb;
