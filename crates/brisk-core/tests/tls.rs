//! HTTPS sessions end to end, with a rustls client over loopback TCP

#![cfg(feature = "tls")]

use brisk_core::{Response, Server, TlsConfig};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Fixture {
    server: Server,
    client_config: Arc<ClientConfig>,
    calls: Arc<AtomicUsize>,
}

fn fixture() -> Fixture {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let tls = TlsConfig::from_pem(certified.cert.pem(), certified.key_pair.serialize_pem());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut server = Server::with_tls(tls).unwrap();
    server
        .get("/hello", move |_req| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Response::text("world") }
        })
        .listen(0, "127.0.0.1")
        .unwrap();
    server.start(2).unwrap();
    assert!(server.is_tls());

    let mut roots = RootCertStore::empty();
    roots.add(certified.cert.der().clone()).unwrap();
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let client_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Fixture {
        server,
        client_config: Arc::new(client_config),
        calls,
    }
}

fn tls_connect(addr: SocketAddr, config: &Arc<ClientConfig>) -> StreamOwned<ClientConnection, TcpStream> {
    let tcp = TcpStream::connect(addr).unwrap();
    tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let name = ServerName::try_from("localhost").unwrap();
    let conn = ClientConnection::new(Arc::clone(config), name).unwrap();
    StreamOwned::new(conn, tcp)
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_single_request_then_close_notify() {
    let fx = fixture();
    let mut stream = tls_connect(fx.server.endpoint().unwrap(), &fx.client_config);

    stream
        .write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .unwrap();

    // read_to_end only succeeds if the server sent close_notify before FIN
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(text.matches("HTTP/1.1 ").count(), 1);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("connection: close\r\n"));
    assert!(text.ends_with("world"));
    assert_eq!(fx.calls.load(Ordering::SeqCst), 1);

    wait_until(|| fx.server.active_sessions() == 0);
}

#[test]
fn test_keep_alive_over_tls() {
    let fx = fixture();
    let mut stream = tls_connect(fx.server.endpoint().unwrap(), &fx.client_config);

    for expected in 1..=2 {
        stream.write_all(b"GET /hello HTTP/1.1\r\n\r\n").unwrap();
        let mut seen = Vec::new();
        let mut buf = [0u8; 512];
        while !String::from_utf8_lossy(&seen).ends_with("world") {
            let n = stream.read(&mut buf).unwrap();
            assert!(n > 0);
            seen.extend_from_slice(&buf[..n]);
        }
        assert_eq!(fx.calls.load(Ordering::SeqCst), expected);
    }
    assert_eq!(fx.server.active_sessions(), 1);
}

#[test]
fn test_failed_handshake_never_dispatches() {
    let fx = fixture();
    let mut tcp = TcpStream::connect(fx.server.endpoint().unwrap()).unwrap();
    tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    tcp.write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .unwrap();
    let mut out = Vec::new();
    let _ = tcp.read_to_end(&mut out);

    assert!(!String::from_utf8_lossy(&out).contains("HTTP/1.1"));
    assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    wait_until(|| fx.server.active_sessions() == 0);
}

#[test]
fn test_untrusted_client_aborts() {
    let fx = fixture();

    // A client trusting nothing rejects the server certificate
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let strict = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    let mut stream = tls_connect(fx.server.endpoint().unwrap(), &Arc::new(strict));

    assert!(stream.write_all(b"GET /hello HTTP/1.1\r\n\r\n").is_err());
    drop(stream);

    wait_until(|| fx.server.active_sessions() == 0);
    assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
}
