//! Session wiring and the single-threaded event loop.
//!
//! One poller drives everything: the listening socket, the client
//! sockets, and the PTY master. The terminal reports display changes
//! through [`ServerHandle`] into the shared server state; client input
//! comes back out of the server as [`InputAction`]s and is applied to
//! the terminal only after the server borrow is released, so the two
//! never re-enter each other.

use std::cell::RefCell;
use std::io;
use std::net::TcpListener;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use polling::{Event, Events, Poller};
use rfbterm_core::{Depth, DisplayListener, Terminal, FONT_HEIGHT, FONT_WIDTH};

use crate::config::Config;
use crate::pty::{self, HostWriter};
use crate::rfb::{InputAction, VncServer, MAX_CLIENTS};

const KEY_LISTENER: usize = 0;
const KEY_PTY: usize = 1;
const CLIENT_KEY_BASE: usize = 2;

/// Monotonic millisecond clock for refresh pacing.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// The display capability record handed to the terminal: every callback
/// lands in the shared server state or the host write queue.
pub struct ServerHandle {
    server: Rc<RefCell<VncServer>>,
    host: Rc<RefCell<HostWriter>>,
    clock: Clock,
}

impl DisplayListener for ServerHandle {
    fn dpy_update(&mut self, x: usize, y: usize, w: usize, h: usize) {
        self.server
            .borrow_mut()
            .dpy_update(x, y, w, h, self.clock.now_ms());
    }

    fn dpy_resize(&mut self, width: usize, height: usize) {
        self.server
            .borrow_mut()
            .dpy_resize(width, height, self.clock.now_ms());
    }

    fn dpy_copy_rect(
        &mut self,
        src_x: usize,
        src_y: usize,
        dst_x: usize,
        dst_y: usize,
        w: usize,
        h: usize,
    ) {
        self.server
            .borrow_mut()
            .dpy_copy_rect(src_x, src_y, dst_x, dst_y, w, h);
    }

    fn bell(&mut self) {
        self.server.borrow_mut().bell(self.clock.now_ms());
    }

    fn cut_text(&mut self, text: Vec<u8>) {
        self.server
            .borrow_mut()
            .set_server_cut_text(text, self.clock.now_ms());
    }

    fn clients_connected(&self) -> usize {
        self.server.borrow().clients_connected()
    }

    fn close_tagged_clients(&mut self) {
        self.server.borrow_mut().close_tagged_clients();
    }

    fn host_write(&mut self, bytes: &[u8]) {
        self.host.borrow_mut().write(bytes);
    }
}

/// The running session.
pub struct App;

impl App {
    pub fn run(config: Config) -> io::Result<()> {
        let clock = Clock::new();
        let depth = Depth::from_bits(config.depth).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported depth {}", config.depth),
            )
        })?;

        // Snap the geometry to the cell grid.
        let cols = (config.width / FONT_WIDTH).max(1);
        let rows = (config.height / FONT_HEIGHT).max(1);
        let (width_px, height_px) = (cols * FONT_WIDTH, rows * FONT_HEIGHT);

        let mut pty = pty::spawn_shell(&config.shell_command(), cols as u16, rows as u16)?;
        let host = Rc::new(RefCell::new(HostWriter::new(pty.master.try_clone()?)));

        let server = Rc::new(RefCell::new(VncServer::new(
            config.title.clone(),
            config.password(),
            depth,
            width_px,
            height_px,
        )));

        let mut term = Terminal::new(
            width_px,
            height_px,
            depth,
            config.scrollback.max(rows),
            ServerHandle {
                server: Rc::clone(&server),
                host: Rc::clone(&host),
                clock,
            },
        );

        if let Some(path) = &config.restore {
            let mut file = std::fs::File::open(path)?;
            term.load_snapshot(&mut file)?;
            info!("restored snapshot from {}", path.display());
            if term.width() != cols || term.height() != rows {
                pty::set_window_size(&pty.master, term.width() as u16, term.height() as u16)?;
            }
        }

        let listener = bind_listener(&config)?;
        listener.set_nonblocking(true)?;
        info!("listening on {}", listener.local_addr()?);

        let poller = Poller::new()?;
        unsafe {
            poller.add(&listener, Event::readable(KEY_LISTENER))?;
            poller.add(&pty.master, Event::readable(KEY_PTY))?;
        }
        let mut events = Events::new();
        let mut running = true;

        while running {
            let timeout = server
                .borrow()
                .timer_deadline()
                .map(|deadline| Duration::from_millis(deadline.saturating_sub(clock.now_ms())));
            events.clear();
            match poller.wait(&mut events, timeout) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            let now = clock.now_ms();

            for ev in events.iter() {
                match ev.key {
                    KEY_LISTENER => {
                        accept_clients(&listener, &server, &poller, now);
                        poller.modify(&listener, Event::readable(KEY_LISTENER))?;
                    }
                    KEY_PTY => {
                        running = drain_pty(&pty.master, &mut term);
                        host.borrow_mut().flush_pending();
                        if running {
                            poller.modify(&pty.master, Event::readable(KEY_PTY))?;
                        }
                    }
                    key => {
                        let slot = key - CLIENT_KEY_BASE;
                        let actions = server.borrow_mut().handle_readable(slot, now);
                        for action in actions {
                            apply_action(&mut term, &host, action);
                        }
                    }
                }
            }

            let now = clock.now_ms();
            let due = server
                .borrow()
                .timer_deadline()
                .is_some_and(|deadline| deadline <= now);
            if due {
                server.borrow_mut().refresh_tick(now, term.framebuffer());
            }

            // Flush output, refresh poll interest, reap the dead.
            let mut srv = server.borrow_mut();
            srv.flush_all();
            for slot in 0..MAX_CLIENTS {
                if let Some(cl) = srv.client(slot) {
                    if !cl.defunct {
                        let key = CLIENT_KEY_BASE + slot;
                        let interest = if cl.output.is_empty() {
                            Event::readable(key)
                        } else {
                            Event::all(key)
                        };
                        let _ = poller.modify(&cl.sock, interest);
                    }
                }
            }
            for (slot, sock) in srv.reap_defunct() {
                info!("client {slot} disconnected");
                let _ = poller.delete(&sock);
            }
        }

        info!("session ended");
        if let Some(path) = &config.dump_on_exit {
            let mut file = std::fs::File::create(path)?;
            term.save_snapshot(&mut file)?;
            info!("wrote snapshot to {}", path.display());
        }
        let _ = pty.child.kill();
        let _ = pty.child.wait();
        Ok(())
    }
}

/// Bind the listening socket, optionally walking upward to a free port.
fn bind_listener(config: &Config) -> io::Result<TcpListener> {
    let mut port = config.port;
    loop {
        match TcpListener::bind((config.listen.as_str(), port)) {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && config.find_unused_port => {
                debug!("port {port} in use, trying {}", port + 1);
                port = port.checked_add(1).ok_or(e)?;
            }
            Err(e) => return Err(e),
        }
    }
}

fn accept_clients(
    listener: &TcpListener,
    server: &Rc<RefCell<VncServer>>,
    poller: &Poller,
    now: u64,
) {
    loop {
        match listener.accept() {
            Ok((sock, peer)) => {
                let slot = server.borrow_mut().accept(sock, now);
                match slot {
                    Some(slot) => {
                        info!("client {slot}: connection from {peer}");
                        let srv = server.borrow();
                        let added = srv.client(slot).map(|cl| unsafe {
                            poller.add(&cl.sock, Event::all(CLIENT_KEY_BASE + slot))
                        });
                        if matches!(added, Some(Err(_))) {
                            drop(srv);
                            server.borrow_mut().close_client(slot);
                        }
                    }
                    None => warn!("connection from {peer} refused: all slots busy"),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!("accept failed: {e}");
                return;
            }
        }
    }
}

/// Feed available PTY output into the terminal. Returns false when the
/// child side is gone.
fn drain_pty(master: &std::os::fd::OwnedFd, term: &mut Terminal<ServerHandle>) -> bool {
    let mut buf = [0u8; 4096];
    loop {
        match rustix::io::read(master, &mut buf) {
            Ok(0) => return false,
            Ok(n) => {
                term.process(&buf[..n]);
                if n < buf.len() {
                    return true;
                }
            }
            Err(rustix::io::Errno::AGAIN) => return true,
            Err(rustix::io::Errno::INTR) => continue,
            Err(rustix::io::Errno::IO) => return false,
            Err(e) => {
                warn!("pty read failed: {e}");
                return false;
            }
        }
    }
}

fn apply_action(
    term: &mut Terminal<ServerHandle>,
    host: &Rc<RefCell<HostWriter>>,
    action: InputAction,
) {
    match action {
        InputAction::Key {
            keysym,
            ctrl,
            shift,
            alt,
        } => term.key_event(keysym, ctrl, shift, alt),
        InputAction::Pointer {
            dx,
            dy,
            dz,
            buttons,
        } => term.mouse_event(dx, dy, dz, buttons),
        InputAction::Paste(text) => host.borrow_mut().write(&text),
        InputAction::Scancode { down, code } => {
            // No scancode consumer behind a PTY host.
            log::trace!("scancode {code:#x} {}", if down { "down" } else { "up" });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Clock;

    #[test]
    fn clock_is_monotonic() {
        let clock = Clock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
