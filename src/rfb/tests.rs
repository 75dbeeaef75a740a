use std::io::Write;
use std::net::{TcpListener, TcpStream};

use bytes::Buf;
use rfbterm_core::{Depth, Framebuffer, Palette};

use super::{InputAction, VncServer, MAX_UPDATE_INTERVAL, REFRESH_INTERVAL_BASE};

/// A connected socket pair over loopback.
fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let peer = TcpStream::connect(addr).expect("connect");
    let (server_side, _) = listener.accept().expect("accept");
    (server_side, peer)
}

fn server(depth: Depth, width: usize, height: usize, password: Option<&[u8]>) -> VncServer {
    VncServer::new(
        "test term".to_string(),
        password.map(<[u8]>::to_vec),
        depth,
        width,
        height,
    )
}

/// Feed client-side bytes and run the protocol handlers.
fn feed(srv: &mut VncServer, peer: &mut TcpStream, slot: usize, bytes: &[u8]) -> Vec<InputAction> {
    peer.write_all(bytes).expect("peer write");
    // Loopback delivery is immediate for these sizes.
    std::thread::sleep(std::time::Duration::from_millis(10));
    srv.handle_readable(slot, 0)
}

fn take_output(srv: &mut VncServer, slot: usize) -> Vec<u8> {
    let cl = srv.client_mut(slot).expect("client");
    let len = cl.output.len();
    cl.output.copy_to_bytes(len).to_vec()
}

/// Handshake a passwordless client up to the running state.
fn handshake(srv: &mut VncServer, peer: &mut TcpStream, slot: usize) -> Vec<u8> {
    let greeting = take_output(srv, slot);
    assert_eq!(&greeting, b"RFB 003.003\n");
    feed(srv, peer, slot, b"RFB 003.003\n");
    assert_eq!(take_output(srv, slot), 1u32.to_be_bytes());
    feed(srv, peer, slot, &[1]); // ClientInit, shared
    take_output(srv, slot)
}

#[test]
fn server_init_layout_for_8bit_depth() {
    let mut srv = server(Depth::D8, 640, 384, None);
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 0).expect("slot");

    let init = handshake(&mut srv, &mut peer, slot);
    let mut expect = Vec::new();
    expect.extend_from_slice(&640u16.to_be_bytes());
    expect.extend_from_slice(&384u16.to_be_bytes());
    expect.extend_from_slice(&[
        8,                                   // bits per pixel
        8,                                   // depth
        u8::from(cfg!(target_endian = "big")),
        1,                                   // true colour
        0, 7, 0, 7, 0, 3,                    // channel maxima
        5, 2, 0,                             // channel shifts
        0, 0, 0,                             // padding
    ]);
    expect.extend_from_slice(&(b"test term".len() as u32).to_be_bytes());
    expect.extend_from_slice(b"test term");
    assert_eq!(init, expect);
}

#[test]
fn malformed_version_closes_client() {
    let mut srv = server(Depth::D8, 640, 384, None);
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 0).expect("slot");
    let _ = take_output(&mut srv, slot);
    feed(&mut srv, &mut peer, slot, b"HTTP/1.1 200\n");
    assert!(srv.client(slot).expect("slot kept").defunct);
    assert!(!srv.reap_defunct().is_empty());
    assert!(srv.client(slot).is_none());
}

#[test]
fn auth_challenge_and_failure() {
    let mut srv = server(Depth::D8, 640, 384, Some(b"sesame"));
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 1234).expect("slot");
    let _ = take_output(&mut srv, slot);

    feed(&mut srv, &mut peer, slot, b"RFB 003.003\n");
    let out = take_output(&mut srv, slot);
    // u32(2) = VNC auth, then the 16-byte challenge.
    assert_eq!(&out[..4], &2u32.to_be_bytes());
    assert_eq!(out.len(), 20);

    // A wrong response is refused with a reason string.
    feed(&mut srv, &mut peer, slot, &[0u8; 16]);
    let out = take_output(&mut srv, slot);
    assert_eq!(&out[..4], &1u32.to_be_bytes());
    let reason_len = u32::from_be_bytes(out[4..8].try_into().unwrap()) as usize;
    assert_eq!(&out[8..8 + reason_len], b"Authentication failure");
    assert!(srv.client(slot).expect("slot").defunct);
}

#[test]
fn auth_success_with_correct_des_response() {
    let mut srv = server(Depth::D8, 640, 384, Some(b"sesame"));
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 99).expect("slot");
    let _ = take_output(&mut srv, slot);

    feed(&mut srv, &mut peer, slot, b"RFB 003.003\n");
    let out = take_output(&mut srv, slot);
    let challenge: [u8; 16] = out[4..20].try_into().unwrap();
    let response = super::des::encrypt_challenge(b"sesame", &challenge);
    feed(&mut srv, &mut peer, slot, &response);
    assert_eq!(take_output(&mut srv, slot), 0u32.to_be_bytes());
    assert!(!srv.client(slot).expect("slot").defunct);
}

#[test]
fn set_encodings_updates_feature_flags() {
    let mut srv = server(Depth::D8, 640, 384, None);
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 0).expect("slot");
    handshake(&mut srv, &mut peer, slot);

    let mut msg = vec![2u8, 0, 0, 4];
    for id in [5i32, -223, -239, -255] {
        msg.extend_from_slice(&id.to_be_bytes());
    }
    feed(&mut srv, &mut peer, slot, &msg);
    let cl = srv.client(slot).expect("client");
    assert!(cl.has_hextile);
    assert!(cl.has_resize);
    assert!(cl.has_cursor);
    assert!(cl.is_vncviewer);
    assert!(!cl.has_pointer_type_change);
}

#[test]
fn update_request_then_tick_emits_raw_rect() {
    let mut srv = server(Depth::D8, 640, 32, None);
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 0).expect("slot");
    handshake(&mut srv, &mut peer, slot);

    let fb = Framebuffer::new(640, 32, Depth::D8, &Palette::default());
    srv.dpy_update(0, 0, 16, 16, 0);
    // Incremental request arms the timer.
    let mut msg = vec![3u8, 1];
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&640u16.to_be_bytes());
    msg.extend_from_slice(&32u16.to_be_bytes());
    feed(&mut srv, &mut peer, slot, &msg);
    assert!(srv.timer_deadline().is_some());

    srv.refresh_tick(0, &fb);
    let out = take_output(&mut srv, slot);
    // FramebufferUpdate, 1 rect at (0,0) 16x16, Raw.
    assert_eq!(&out[..4], &[0, 0, 0, 1]);
    assert_eq!(&out[4..8], &[0, 0, 0, 0]);
    assert_eq!(&out[8..12], &[0, 16, 0, 16]);
    assert_eq!(&out[12..16], &0i32.to_be_bytes());
    assert_eq!(out.len(), 16 + 16 * 16);
}

#[test]
fn idle_ticks_back_off_and_send_null_update() {
    let mut srv = server(Depth::D8, 640, 32, None);
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 0).expect("slot");
    handshake(&mut srv, &mut peer, slot);

    let fb = Framebuffer::new(640, 32, Depth::D8, &Palette::default());
    // Repeated idle ticks grow the interval to the cap.
    let mut now = 0;
    for _ in 0..50 {
        srv.refresh_tick(now, &fb);
        now += 100;
    }
    let _ = take_output(&mut srv, slot);
    // Past the idle bound a 1×1 keep-alive rectangle goes out.
    srv.refresh_tick(now + MAX_UPDATE_INTERVAL, &fb);
    let out = take_output(&mut srv, slot);
    assert_eq!(&out[..4], &[0, 0, 0, 1]);
    // The keep-alive rectangle is 1×1 at the origin.
    assert_eq!(&out[4..8], &[0, 0, 0, 0]);
    assert_eq!(&out[8..12], &[0, 1, 0, 1]);
}

#[test]
fn key_events_track_modifiers() {
    let mut srv = server(Depth::D8, 640, 384, None);
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 0).expect("slot");
    handshake(&mut srv, &mut peer, slot);

    let key = |down: u8, sym: u32| {
        let mut m = vec![4u8, down, 0, 0];
        m.extend_from_slice(&sym.to_be_bytes());
        m
    };
    // Ctrl down, 'c' down, both up.
    let mut msgs = Vec::new();
    msgs.extend(key(1, 0xFFE3));
    msgs.extend(key(1, u32::from(b'c')));
    msgs.extend(key(0, u32::from(b'c')));
    msgs.extend(key(0, 0xFFE3));
    let actions = feed(&mut srv, &mut peer, slot, &msgs);
    assert_eq!(
        actions,
        vec![InputAction::Key {
            keysym: u32::from(b'c'),
            ctrl: true,
            shift: false,
            alt: false,
        }]
    );
}

#[test]
fn key_event_resets_pacing() {
    let mut srv = server(Depth::D8, 640, 384, None);
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 0).expect("slot");
    handshake(&mut srv, &mut peer, slot);

    let fb = Framebuffer::new(640, 384, Depth::D8, &Palette::default());
    for now in [0, 100, 200, 300] {
        srv.refresh_tick(now, &fb);
    }
    let mut msg = vec![4u8, 1, 0, 0];
    msg.extend_from_slice(&u32::from(b'a').to_be_bytes());
    feed(&mut srv, &mut peer, slot, &msg);
    assert_eq!(srv.timer_deadline(), Some(REFRESH_INTERVAL_BASE));
}

#[test]
fn pointer_events_translate_and_paste() {
    let mut srv = server(Depth::D8, 640, 384, None);
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 0).expect("slot");
    handshake(&mut srv, &mut peer, slot);

    // Store cut text, then press middle button.
    let mut cut = vec![6u8, 0, 0, 0];
    cut.extend_from_slice(&5u32.to_be_bytes());
    cut.extend_from_slice(b"paste");
    feed(&mut srv, &mut peer, slot, &cut);

    let pointer = |mask: u8, x: u16, y: u16| {
        let mut m = vec![5u8, mask];
        m.extend_from_slice(&x.to_be_bytes());
        m.extend_from_slice(&y.to_be_bytes());
        m
    };
    let actions = feed(&mut srv, &mut peer, slot, &pointer(0x02, 10, 10));
    assert_eq!(actions, vec![InputAction::Paste(b"paste".to_vec())]);

    let actions = feed(&mut srv, &mut peer, slot, &pointer(0x01, 320, 192));
    match &actions[..] {
        [InputAction::Pointer { dx, dy, dz, buttons }] => {
            assert_eq!(*buttons, 1);
            assert_eq!(*dz, 0);
            // Halfway across projects to roughly the middle.
            assert!((*dx - 0x4000).abs() < 0x200, "dx {dx}");
            assert!((*dy - 0x4000).abs() < 0x200, "dy {dy}");
        }
        other => panic!("unexpected actions {other:?}"),
    }

    // Wheel up.
    let actions = feed(&mut srv, &mut peer, slot, &pointer(0x08, 0, 0));
    assert!(matches!(actions[..], [InputAction::Pointer { dz: -1, .. }]));
}

#[test]
fn bell_and_cut_text_ride_the_next_tick() {
    let mut srv = server(Depth::D8, 640, 32, None);
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 0).expect("slot");
    handshake(&mut srv, &mut peer, slot);

    let fb = Framebuffer::new(640, 32, Depth::D8, &Palette::default());
    srv.bell(0);
    srv.set_server_cut_text(b"copied".to_vec(), 0);
    srv.refresh_tick(0, &fb);
    let out = take_output(&mut srv, slot);
    // Bell message first, then ServerCutText.
    assert_eq!(out[0], 2);
    assert_eq!(out[1], 3);
    assert_eq!(&out[2..5], &[0, 0, 0]);
    assert_eq!(&out[5..9], &6u32.to_be_bytes());
    assert_eq!(&out[9..15], b"copied");
}

#[test]
fn copy_rect_is_written_immediately() {
    let mut srv = server(Depth::D8, 640, 32, None);
    let (sock, mut peer) = socket_pair();
    let slot = srv.accept(sock, 0).expect("slot");
    handshake(&mut srv, &mut peer, slot);

    srv.dpy_copy_rect(0, 16, 0, 0, 640, 16);
    let out = take_output(&mut srv, slot);
    assert_eq!(&out[..4], &[0, 0, 0, 1]);
    assert_eq!(&out[12..16], &1i32.to_be_bytes()); // CopyRect
    assert_eq!(&out[16..20], &[0, 0, 0, 16]); // src x, src y
}

#[test]
fn slots_fill_and_recycle() {
    let mut srv = server(Depth::D8, 640, 32, None);
    let mut keep = Vec::new();
    for i in 0..super::MAX_CLIENTS {
        let (sock, peer) = socket_pair();
        assert_eq!(srv.accept(sock, 0), Some(i));
        keep.push(peer);
    }
    let (sock, _peer) = socket_pair();
    assert_eq!(srv.accept(sock, 0), None);

    srv.close_client(3);
    let reaped = srv.reap_defunct();
    assert_eq!(reaped.len(), 1);
    let (sock, _peer2) = socket_pair();
    assert_eq!(srv.accept(sock, 0), Some(3));
}
