//! PTY pair, shell spawning, and the chunked host write queue.

use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::process::{Child, Command, Stdio};

use log::{debug, warn};
use rustix::termios::Winsize;

use rfbterm_core::{FONT_HEIGHT, FONT_WIDTH};

/// A spawned shell behind a PTY.
pub struct Pty {
    /// The controller (master) side, non-blocking.
    pub master: OwnedFd,
    pub child: Child,
}

/// Open a PTY and spawn `shell` on the user side, with the slave as the
/// child's controlling terminal.
pub fn spawn_shell(shell: &str, cols: u16, rows: u16) -> io::Result<Pty> {
    let window = Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: cols * FONT_WIDTH as u16,
        ws_ypixel: rows * FONT_HEIGHT as u16,
    };
    let pair = rustix_openpty::openpty(None, Some(&window))?;
    set_nonblocking(&pair.controller)?;

    let mut cmd = Command::new(shell);
    cmd.env("TERM", "linux");
    cmd.stdin(Stdio::from(pair.user.try_clone()?));
    cmd.stdout(Stdio::from(pair.user.try_clone()?));
    cmd.stderr(Stdio::from(pair.user));
    unsafe {
        use std::os::unix::process::CommandExt;
        cmd.pre_exec(|| {
            // New session, and the PTY slave becomes the controlling
            // terminal of the child.
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            if libc::ioctl(0, libc::TIOCSCTTY as _, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    let child = cmd.spawn()?;
    debug!("spawned {shell} (pid {}) on a {cols}x{rows} pty", child.id());
    Ok(Pty {
        master: pair.controller,
        child,
    })
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let flags = rustix::fs::fcntl_getfl(fd)?;
    rustix::fs::fcntl_setfl(fd, flags | rustix::fs::OFlags::NONBLOCK)?;
    Ok(())
}

/// Propagate a terminal resize to the child.
pub fn set_window_size(master: &OwnedFd, cols: u16, rows: u16) -> io::Result<()> {
    let window = Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: cols * FONT_WIDTH as u16,
        ws_ypixel: rows * FONT_HEIGHT as u16,
    };
    rustix::termios::tcsetwinsize(master, window)?;
    Ok(())
}

/// A pending partial write.
struct Chunk {
    data: Vec<u8>,
    offset: usize,
}

/// Best-effort non-blocking writer with a FIFO of unwritten tails.
///
/// A write first drains the queue head, then attempts the new payload in
/// place; whatever the descriptor refuses is appended as a new chunk.
/// Nothing is dropped on partial failure — only a fatal descriptor error
/// releases the queue.
pub struct HostWriter {
    fd: OwnedFd,
    chunks: VecDeque<Chunk>,
    dead: bool,
}

impl HostWriter {
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            fd,
            chunks: VecDeque::new(),
            dead: false,
        }
    }

    /// Whether the descriptor failed fatally.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Queue depth (for tests and diagnostics).
    pub fn pending(&self) -> usize {
        self.chunks.iter().map(|c| c.data.len() - c.offset).sum()
    }

    /// Write `buf`, queueing whatever does not fit.
    pub fn write(&mut self, buf: &[u8]) {
        if self.dead {
            return;
        }
        if !self.drain_queue() {
            if !self.dead && !buf.is_empty() {
                self.chunks.push_back(Chunk {
                    data: buf.to_vec(),
                    offset: 0,
                });
            }
            return;
        }
        let mut done = 0;
        while done < buf.len() {
            match rustix::io::write(self.fd.as_fd(), &buf[done..]) {
                Ok(n) => done += n,
                Err(rustix::io::Errno::AGAIN) => break,
                Err(rustix::io::Errno::INTR) => continue,
                Err(e) => {
                    warn!("host write failed: {e}");
                    self.mark_dead();
                    return;
                }
            }
        }
        if done < buf.len() {
            self.chunks.push_back(Chunk {
                data: buf[done..].to_vec(),
                offset: 0,
            });
        }
    }

    /// Retry queued chunks (call when the descriptor becomes writable).
    pub fn flush_pending(&mut self) {
        if !self.dead {
            self.drain_queue();
        }
    }

    /// True when the queue is fully drained.
    fn drain_queue(&mut self) -> bool {
        while let Some(chunk) = self.chunks.front_mut() {
            match rustix::io::write(self.fd.as_fd(), &chunk.data[chunk.offset..]) {
                Ok(n) => {
                    chunk.offset += n;
                    if chunk.offset == chunk.data.len() {
                        self.chunks.pop_front();
                    }
                }
                Err(rustix::io::Errno::AGAIN) => return false,
                Err(rustix::io::Errno::INTR) => {}
                Err(e) => {
                    warn!("host write failed: {e}");
                    self.mark_dead();
                    return false;
                }
            }
        }
        true
    }

    fn mark_dead(&mut self) {
        self.dead = true;
        self.chunks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::HostWriter;
    use std::io::Read;
    use std::os::fd::OwnedFd;

    /// A non-blocking pipe pair for exercising the writer.
    fn pipe_pair() -> (OwnedFd, OwnedFd) {
        let (read_end, write_end) = rustix::pipe::pipe().expect("pipe");
        let flags = rustix::fs::fcntl_getfl(&write_end).expect("getfl");
        rustix::fs::fcntl_setfl(&write_end, flags | rustix::fs::OFlags::NONBLOCK).expect("setfl");
        (read_end, write_end)
    }

    #[test]
    fn small_writes_pass_through() {
        let (read_end, write_end) = pipe_pair();
        let mut writer = HostWriter::new(write_end);
        writer.write(b"hello");
        assert_eq!(writer.pending(), 0);
        let mut file = std::fs::File::from(read_end);
        let mut buf = [0u8; 5];
        file.read_exact(&mut buf).expect("read");
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn overflow_is_queued_not_dropped() {
        let (read_end, write_end) = pipe_pair();
        let mut writer = HostWriter::new(write_end);
        // Overfill the pipe; the tail must be queued.
        let payload = vec![0x55u8; 1 << 20];
        writer.write(&payload);
        assert!(writer.pending() > 0);
        let queued = writer.pending();

        // Drain the pipe, then retry: the queue shrinks.
        let mut file = std::fs::File::from(read_end);
        let mut sink = vec![0u8; 1 << 18];
        file.read_exact(&mut sink).expect("read");
        writer.flush_pending();
        assert!(writer.pending() < queued);
    }

    #[test]
    fn fatal_error_releases_queue() {
        let (read_end, write_end) = pipe_pair();
        let mut writer = HostWriter::new(write_end);
        drop(read_end);
        writer.write(b"doomed");
        assert!(writer.is_dead());
        assert_eq!(writer.pending(), 0);
    }
}
